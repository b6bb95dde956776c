//! In-memory representation of one parsed source file (a stage) and
//! its prim tree.
//!
//! Prims live in an arena owned by their stage; parent/child links
//! are arena indices, which keeps the graph free of reference
//! counting even though children point back at their parents.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;

use super::value::Value;

/// Errors surfaced by stage loading. Parsing itself is lenient and
/// never fails; only file I/O is reported.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for stage operations.
pub type StageResult<T> = Result<T, StageError>;

/// Index of a prim within its stage's arena.
pub type PrimId = usize;

/// Prim specifier keyword.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Specifier {
    Def,
    Over,
    Class,
}

/// Scene up-axis declared in stage metadata.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpAxis {
    #[default]
    Y,
    Z,
}

/// A composition arc: `@file@` optionally followed by `</prim/path>`.
#[derive(Clone, Debug, PartialEq)]
pub struct Reference {
    /// Asset path verbatim from the source (relative or absolute).
    pub asset_path: String,

    /// Optional target prim path within the referenced file.
    pub prim_path: Option<String>,
}

/// A named relationship with verbatim target paths. Targets are
/// never dereferenced at parse time.
#[derive(Clone, Debug, PartialEq)]
pub struct Relationship {
    pub name: String,
    pub targets: Vec<String>,
}

/// One variant set: insertion-ordered variant name to the nested
/// prim that carries that variant's arcs and children. Insertion
/// order matters: it drives fallback selection.
#[derive(Clone, Debug, Default)]
pub struct VariantSet {
    pub variants: IndexMap<String, PrimId>,
}

/// A node in a stage's scene graph.
#[derive(Clone, Debug)]
pub struct Prim {
    /// Name, unique among siblings.
    pub name: String,

    /// Absolute path within the stage (`/a/b/c`).
    pub path: String,

    /// Type name (`Mesh`, `Skeleton`, `Xform`, ...; may be empty).
    pub type_name: String,

    pub specifier: Specifier,

    pub parent: Option<PrimId>,

    /// Children in source order.
    pub children: Vec<PrimId>,

    /// Attribute name to typed value.
    pub attributes: HashMap<String, Value>,

    /// Metadata name to typed value (`kind`, `instanceable`, ...).
    pub metadata: HashMap<String, Value>,

    /// Reference arcs in source order.
    pub references: Vec<Reference>,

    /// Payload arcs in source order.
    pub payloads: Vec<Reference>,

    /// Inherit target paths (parsed, not composed).
    pub inherits: Vec<String>,

    /// Variant sets in declaration order.
    pub variant_sets: IndexMap<String, VariantSet>,

    /// Recorded variant selections (`variants = { ... }` metadata).
    pub variant_selections: IndexMap<String, String>,

    /// Relationships in source order.
    pub relationships: Vec<Relationship>,

    /// Applied API schema names.
    pub api_schemas: Vec<String>,
}

impl Prim {
    pub(crate) fn new(name: &str, path: String, specifier: Specifier, parent: Option<PrimId>) -> Self {
        Self {
            name: name.to_string(),
            path,
            type_name: String::new(),
            specifier,
            parent,
            children: Vec::new(),
            attributes: HashMap::new(),
            metadata: HashMap::new(),
            references: Vec::new(),
            payloads: Vec::new(),
            inherits: Vec::new(),
            variant_sets: IndexMap::new(),
            variant_selections: IndexMap::new(),
            relationships: Vec::new(),
            api_schemas: Vec::new(),
        }
    }

    /// Look up an attribute by name.
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Look up a relationship by name.
    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Rendering purpose; `guide` prims are helpers, not geometry.
    pub fn purpose(&self) -> Option<&str> {
        self.attr("purpose").and_then(Value::as_text)
    }

    /// True when this prim is bound to a skeleton: a non-empty
    /// `skel:skeleton` relationship target and a non-empty
    /// joint-indices primvar.
    pub fn has_skeleton_binding(&self) -> bool {
        let bound = self
            .relationship("skel:skeleton")
            .map(|r| !r.targets.is_empty())
            .unwrap_or(false);
        if !bound {
            return false;
        }
        self.attr("primvars:skel:jointIndices")
            .and_then(Value::as_int_array)
            .map(|a| !a.is_empty())
            .unwrap_or(false)
    }
}

/// The contents of one source file.
#[derive(Clone, Debug)]
pub struct Stage {
    /// Path this stage was parsed from.
    pub source_path: PathBuf,

    /// Stage documentation string, if authored.
    pub doc: Option<String>,

    /// Default prim name from stage metadata.
    pub default_prim: Option<String>,

    pub up_axis: UpAxis,

    /// Meters per linear unit (authoring default is centimeters).
    pub meters_per_unit: f64,

    // Time-code metadata; parsed but not used for composition.
    pub time_codes_per_second: Option<f64>,
    pub frames_per_second: Option<f64>,
    pub start_time_code: Option<f64>,
    pub end_time_code: Option<f64>,

    /// Sub-layer asset paths in authored order.
    pub sub_layers: Vec<String>,

    /// Root prims in source order.
    pub root_prims: Vec<PrimId>,

    prims: Vec<Prim>,
    paths: HashMap<String, PrimId>,
}

impl Stage {
    /// Create an empty stage for the given source path.
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            doc: None,
            default_prim: None,
            up_axis: UpAxis::default(),
            meters_per_unit: 0.01,
            time_codes_per_second: None,
            frames_per_second: None,
            start_time_code: None,
            end_time_code: None,
            sub_layers: Vec::new(),
            root_prims: Vec::new(),
            prims: Vec::new(),
            paths: HashMap::new(),
        }
    }

    /// Read and parse a stage from disk. I/O failures surface;
    /// malformed content inside the file never does.
    pub fn load(path: impl AsRef<Path>) -> StageResult<Stage> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content, path))
    }

    /// Parse a stage from in-memory text.
    pub fn parse(content: &str, source_path: impl Into<PathBuf>) -> Stage {
        super::parser::parse_stage(content, source_path.into())
    }

    /// Allocate a prim in the arena and register its absolute path.
    pub(crate) fn alloc_prim(&mut self, prim: Prim) -> PrimId {
        let id = self.prims.len();
        self.paths.insert(prim.path.clone(), id);
        self.prims.push(prim);
        id
    }

    pub fn prim(&self, id: PrimId) -> &Prim {
        &self.prims[id]
    }

    pub(crate) fn prim_mut(&mut self, id: PrimId) -> &mut Prim {
        &mut self.prims[id]
    }

    pub fn prim_count(&self) -> usize {
        self.prims.len()
    }

    /// Resolve an absolute prim path to its prim.
    ///
    /// Falls back to suffix matching against root prims so that a
    /// reference like `</Chair>` finds `/Props/Chair` in files that
    /// nest their content one level down.
    pub fn prim_at_path(&self, path: &str) -> Option<PrimId> {
        if let Some(&id) = self.paths.get(path) {
            return Some(id);
        }
        self.root_prims
            .iter()
            .copied()
            .find(|&id| self.prims[id].path.ends_with(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_registers_path() {
        let mut stage = Stage::new("test.usda");
        let id = stage.alloc_prim(Prim::new("World", "/World".into(), Specifier::Def, None));
        stage.root_prims.push(id);

        assert_eq!(stage.prim_at_path("/World"), Some(id));
        assert_eq!(stage.prim(id).name, "World");
        assert_eq!(stage.prim(id).specifier, Specifier::Def);
    }

    #[test]
    fn test_path_suffix_fallback() {
        let mut stage = Stage::new("test.usda");
        let id = stage.alloc_prim(Prim::new("Chair", "/Props/Chair".into(), Specifier::Def, None));
        stage.root_prims.push(id);

        assert_eq!(stage.prim_at_path("/Chair"), Some(id));
        assert_eq!(stage.prim_at_path("/Table"), None);
    }

    #[test]
    fn test_skeleton_binding_requires_both_halves() {
        let mut prim = Prim::new("m", "/m".into(), Specifier::Def, None);
        assert!(!prim.has_skeleton_binding());

        prim.relationships.push(Relationship {
            name: "skel:skeleton".into(),
            targets: vec!["/Skel".into()],
        });
        assert!(!prim.has_skeleton_binding());

        prim.attributes.insert(
            "primvars:skel:jointIndices".into(),
            Value::IntArray(vec![0, 0, 1]),
        );
        assert!(prim.has_skeleton_binding());
    }

    #[test]
    fn test_stage_defaults() {
        let stage = Stage::new("s.usda");
        assert_eq!(stage.up_axis, UpAxis::Y);
        assert!((stage.meters_per_unit - 0.01).abs() < 1e-9);
        assert!(stage.default_prim.is_none());
    }
}
