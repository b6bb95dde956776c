//! usdi core - stage parsing, composition, and mesh enumeration.
//!
//! This crate provides:
//!
//! - **Scene-language support**: tokenizer, lenient stage parser, and
//!   the stage/prim/value data model (`usd` module)
//! - **Composition**: the traversal engine that resolves sub-layers,
//!   references, payloads, and variants into a stream of
//!   [`MeshRecord`]s (`compose` module)
//! - **Geometry helpers**: triangulation, primvar expansion, flat
//!   normals, and bind-pose centering (`geometry` module)
//!
//! # Example
//!
//! ```ignore
//! use usdi_core::{Traverser, TraversalConfig};
//!
//! let mut traverser = Traverser::new(TraversalConfig::default());
//! let records = traverser.run_collect("scene.usda".as_ref())?;
//! println!("found {} meshes", records.len());
//! ```

pub mod compose;
pub mod geometry;
pub mod usd;

// Re-export commonly used types
pub use compose::{
    ComposeError, ComposeResult, MeshRecord, MeshSink, TraversalConfig, TraversalStats, Traverser,
};
pub use geometry::MeshGeometry;
pub use usd::{Prim, Stage, StageError, Value};
