//! usdi index - the scene-index binary artifact.
//!
//! This crate owns both ends of the index format: the streaming
//! shard writer that the traversal feeds, and the strict reader that
//! hosts use to load placements back. The two host-facing entry
//! points are [`build_index`] and [`load_from_index`].
//!
//! # Format
//!
//! Little-endian throughout:
//!
//! ```text
//! magic   "USDI"
//! varint  version (1 or 2; writers emit 2)
//! varint  source_count, then source_count string_7 paths (sorted)
//! varint  mesh_count, then mesh_count records:
//!     varint    source_index
//!     string_7  mesh_name
//!     string_7  mesh_path
//!     3 x f32   position
//!     4 x f32   rotation quaternion (x, y, z, w)
//!     3 x f32   scale
//!     u8        flags: bit0 = has_skeleton, bit1 = has_extent
//!     6 x f32   extent min/max, present iff bit1
//! ```
//!
//! `string_7` is a 7-bit (unsigned LEB128) varint byte length followed
//! by UTF-8 bytes. Version-1 records store source-frame values which
//! the reader converts on load; version 2 is already in the target
//! frame.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod reader;
pub mod varint;
pub mod writer;

pub use reader::{IndexRecord, SceneIndex};
pub use writer::{IndexSummary, IndexWriter, IndexWriterConfig};

use usdi_core::{ComposeError, TraversalConfig, Traverser};

/// Index file magic.
pub(crate) const MAGIC: [u8; 4] = *b"USDI";

/// Format version emitted by writers.
pub(crate) const FORMAT_VERSION: u64 = 2;

/// Default flush threshold for [`build_index`].
const DEFAULT_FLUSH_EVERY: usize = 4096;

/// Errors from the index writer, reader, and build pipeline.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad magic; not a scene index")]
    BadMagic,

    #[error("unsupported index version {0}")]
    UnsupportedVersion(u64),

    #[error("corrupt index: {0}")]
    Corrupt(String),

    #[error("composition failed: {0}")]
    Compose(#[from] ComposeError),
}

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Compose the scene under `input_stage` and write its index to
/// `output_path`.
///
/// Shards are spilled next to the output (`<output>.shards`) and
/// removed after successful finalization; on failure they are left in
/// place for diagnosis.
pub fn build_index(input_stage: &Path, output_path: &Path) -> IndexResult<IndexSummary> {
    let temp_dir = shard_dir(output_path);
    let mut writer = IndexWriter::new(IndexWriterConfig {
        flush_every_n_meshes: DEFAULT_FLUSH_EVERY,
        temp_dir,
        output_path: output_path.to_path_buf(),
    })?;

    let mut traverser = Traverser::new(TraversalConfig {
        flush_every: writer.config().flush_every_n_meshes,
        ..Default::default()
    });
    let stats = traverser.run(input_stage, &mut writer)?;
    log::info!(
        "traversed {} files, {} prims, emitted {} meshes",
        stats.files_entered,
        stats.prims_visited,
        stats.meshes_emitted
    );

    writer.finalize()
}

/// Load a scene index back into memory, optionally capping the
/// number of records.
pub fn load_from_index(index_path: &Path, max_meshes: Option<usize>) -> IndexResult<SceneIndex> {
    SceneIndex::load(index_path, max_meshes)
}

fn shard_dir(output_path: &Path) -> PathBuf {
    let mut name = output_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    name.push_str(".shards");
    output_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use usdi_math::Vec3;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    const SCENE: &str = r#"#usda 1.0
def Xform "world" {
    double3 xformOp:translate = (10, 20, 30)
    uniform token[] xformOpOrder = ["xformOp:translate"]

    def Mesh "floor" {
        point3f[] points = [(0, 0, 0), (1, 0, 0), (1, 1, 0), (0, 1, 0)]
        int[] faceVertexCounts = [4]
        int[] faceVertexIndices = [0, 1, 2, 3]
        float3[] extent = [(0, 0, 0), (1, 1, 0)]
    }
}

def Mesh "prop" {
    point3f[] points = [(0, 0, 0), (1, 0, 0), (0.5, 1, 0)]
    int[] faceVertexCounts = [3]
    int[] faceVertexIndices = [0, 1, 2]
}
"#;

    #[test]
    fn test_build_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let root = write(dir.path(), "scene.usda", SCENE);
        let out = dir.path().join("scene.usdi");

        let summary = build_index(&root, &out).unwrap();
        assert_eq!(summary.mesh_count, 2);
        assert_eq!(summary.source_count, 1);
        assert!(!dir.path().join("scene.usdi.shards").exists());

        let index = load_from_index(&out, None).unwrap();
        assert_eq!(index.version, 2);
        assert_eq!(index.records.len(), 2);

        // Emission order is depth-first pre-order.
        assert_eq!(index.records[0].name, "floor");
        assert_eq!(index.records[0].prim_path, "/world/floor");
        assert_eq!(index.records[1].name, "prop");

        // Every source index resolves through the table.
        for record in &index.records {
            assert!(record.source_index < index.sources.len());
            assert_eq!(index.sources[record.source_index], record.source_path);
        }

        // Values are stored in the target frame: no conversion on load.
        assert!((index.records[0].position - Vec3::new(20.0, -10.0, 30.0)).length() < 1e-4);
        assert!(index.records[0].extent.is_some());
        assert!(index.records[1].extent.is_none());
    }

    #[test]
    fn test_rebuild_is_deterministic() {
        let dir = tempdir().unwrap();
        let root = write(dir.path(), "scene.usda", SCENE);

        let out_a = dir.path().join("a.usdi");
        let out_b = dir.path().join("b.usdi");
        build_index(&root, &out_a).unwrap();
        build_index(&root, &out_b).unwrap();

        assert_eq!(fs::read(out_a).unwrap(), fs::read(out_b).unwrap());
    }

    #[test]
    fn test_source_table_is_sorted_and_deduplicated() {
        let dir = tempdir().unwrap();
        // Reference the same file twice and a second file once; name
        // them so discovery order differs from lexicographic order.
        write(
            dir.path(),
            "zebra.usda",
            r#"#usda 1.0
def Mesh "z" {
    point3f[] points = [(0, 0, 0)]
    int[] faceVertexCounts = [3]
    int[] faceVertexIndices = [0, 0, 0]
}
"#,
        );
        write(
            dir.path(),
            "alpha.usda",
            r#"#usda 1.0
def Mesh "a" {
    point3f[] points = [(0, 0, 0)]
    int[] faceVertexCounts = [3]
    int[] faceVertexIndices = [0, 0, 0]
}
"#,
        );
        let root = write(
            dir.path(),
            "root.usda",
            r#"#usda 1.0
def Xform "r1" (references = @./zebra.usda@) {}
def Xform "r2" (references = @./alpha.usda@) {}
def Xform "r3" (references = @./zebra.usda@) {}
"#,
        );
        let out = dir.path().join("out.usdi");
        build_index(&root, &out).unwrap();

        let index = load_from_index(&out, None).unwrap();
        let mut sorted = index.sources.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(index.sources, sorted);

        // Record order is unaffected by the table sort: zebra first.
        let names: Vec<_> = index.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["z", "a", "z"]);
    }

    #[test]
    fn test_missing_root_fails() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.usdi");
        let err = build_index(&dir.path().join("gone.usda"), &out).unwrap_err();
        assert!(matches!(err, IndexError::Compose(_)));
    }

    #[test]
    fn test_load_caps_records() {
        let dir = tempdir().unwrap();
        let root = write(dir.path(), "scene.usda", SCENE);
        let out = dir.path().join("scene.usdi");
        build_index(&root, &out).unwrap();

        let index = load_from_index(&out, Some(1)).unwrap();
        assert_eq!(index.records.len(), 1);
    }
}
