//! Composition and traversal: walk a root stage and everything it
//! reaches through sub-layers, references, payloads, and variant
//! selections, and stream out one record per renderable mesh.
//!
//! The walk is single-threaded and cooperative. Records accumulate in
//! a bounded buffer; when it fills, the [`MeshSink`] flush callback
//! runs synchronously on the traversal thread and its return value
//! decides whether emission continues. After each successful flush the
//! stage cache is trimmed to its most recent entries so arbitrarily
//! large scenes compose in bounded memory.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;
use usdi_math::convert;
use usdi_math::{Mat4, Quat, Vec3};

use crate::geometry;
use crate::usd::{Prim, PrimId, Reference, Stage, StageError, Value};

/// Errors surfaced by traversal. Only the root stage is strict;
/// referenced stages that fail to load compose as empty.
#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("stage error: {0}")]
    Stage(#[from] StageError),
}

/// Result type for traversal operations.
pub type ComposeResult<T> = Result<T, ComposeError>;

/// One renderable mesh discovered by the traversal.
///
/// The transform and extent are in the target frame; the extent is
/// the mesh's declared local bound, not a world-space box.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshRecord {
    /// Stage file that contains the mesh geometry.
    pub source_path: String,

    /// Prim name.
    pub name: String,

    /// Absolute prim path within its source stage.
    pub prim_path: String,

    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,

    /// The mesh is bound to a skeleton; its transform is the bind
    /// pose, not an animated pose.
    pub has_skeleton: bool,

    /// Declared extent (min, max), when authored.
    pub extent: Option<(Vec3, Vec3)>,
}

/// Receiver for buffered mesh records.
///
/// `on_flush` is invoked synchronously whenever the traversal buffer
/// reaches the flush threshold, and once more at the end of the walk
/// for the remainder. Returning `true` continues emission; `false`
/// halts it cleanly.
pub trait MeshSink {
    fn on_flush(&mut self, batch: &[MeshRecord]) -> bool;
}

impl<F: FnMut(&[MeshRecord]) -> bool> MeshSink for F {
    fn on_flush(&mut self, batch: &[MeshRecord]) -> bool {
        self(batch)
    }
}

/// Per-traversal tuning knobs.
#[derive(Clone, Debug)]
pub struct TraversalConfig {
    /// Maximum composition depth (sub-layers, references, payloads).
    pub max_depth: usize,

    /// Hard cap on distinct source files, counted after `skip_files`.
    /// `None` is unbounded; `Some(0)` loads nothing at all.
    pub max_files: Option<usize>,

    /// Meshes from the first `skip_files` distinct source files (in
    /// discovery order) are not emitted.
    pub skip_files: usize,

    /// Buffered record count that triggers a flush.
    pub flush_every: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_files: None,
            skip_files: 0,
            flush_every: 4096,
        }
    }
}

/// Counters reported after a walk.
#[derive(Clone, Debug, Default)]
pub struct TraversalStats {
    /// Distinct source files entered, in discovery order.
    pub files_entered: usize,

    /// Prims visited across all composed stages.
    pub prims_visited: usize,

    /// Records handed to the sink in accepted flushes.
    pub meshes_emitted: u64,

    /// Meshes rejected by the purpose, geometry, or file gates.
    pub meshes_filtered: u64,
}

/// Path substrings (matched case-insensitively) that mark helper
/// sub-scenes with no stage-relevant geometry.
const SKIP_PATH_PATTERNS: &[&str] = &[
    "/breadcrumbs/",
    "/endpoints/",
    "/audio/",
    "/lighting/",
    "/ui/",
    "/vfx/",
    "/fx/",
    "breadcrumb",
    "endpoint",
    "_audio",
    "_sound",
    "_fx",
    "_vfx",
    "_lighting",
];

/// How many stages the cache keeps after a flush trims it.
const CACHE_KEEP_AFTER_FLUSH: usize = 20;

/// True when a resolved reference path points into a helper sub-scene
/// that the index should not follow.
pub fn is_skipped_path(path: &Path) -> bool {
    let lower = path.to_string_lossy().to_lowercase();
    SKIP_PATH_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Parsed-stage cache with recency tracking. Doubles as the
/// memoization layer that keeps one traversal from re-parsing files.
#[derive(Default)]
struct StageCache {
    stages: HashMap<PathBuf, Rc<Stage>>,
    recency: Vec<PathBuf>,
}

impl StageCache {
    fn get(&mut self, path: &Path) -> Option<Rc<Stage>> {
        let stage = self.stages.get(path)?.clone();
        self.touch(path);
        Some(stage)
    }

    fn insert(&mut self, path: PathBuf, stage: Rc<Stage>) {
        self.stages.insert(path.clone(), stage);
        self.touch(&path);
    }

    fn touch(&mut self, path: &Path) {
        if let Some(pos) = self.recency.iter().position(|p| p == path) {
            self.recency.remove(pos);
        }
        self.recency.push(path.to_path_buf());
    }

    /// Drop everything but the `keep` most recently used stages.
    fn shrink_to(&mut self, keep: usize) {
        while self.recency.len() > keep {
            let evicted = self.recency.remove(0);
            self.stages.remove(&evicted);
        }
    }

    fn clear(&mut self) {
        self.stages.clear();
        self.recency.clear();
    }
}

/// The traversal engine. One instance owns its caches and is not
/// shared across traversals.
pub struct Traverser {
    config: TraversalConfig,

    cache: StageCache,

    /// Files on the current recursion stack; a file already here is
    /// not re-entered, which breaks reference cycles while still
    /// letting distinct branches instance the same file repeatedly.
    active: HashSet<PathBuf>,

    /// Distinct source files to their 1-based discovery index.
    discovered: HashMap<PathBuf, usize>,

    /// Skeleton prims seen so far, keyed `source|prim-path`.
    skeletons: HashSet<String>,

    /// Skinned meshes held back until the walk completes.
    pending_skinned: Vec<MeshRecord>,

    buffer: Vec<MeshRecord>,

    /// Paths of prims visited since the last flush.
    prim_log: Vec<String>,

    stats: TraversalStats,
    halted: bool,
}

impl Traverser {
    pub fn new(config: TraversalConfig) -> Self {
        Self {
            config,
            cache: StageCache::default(),
            active: HashSet::new(),
            discovered: HashMap::new(),
            skeletons: HashSet::new(),
            pending_skinned: Vec::new(),
            buffer: Vec::new(),
            prim_log: Vec::new(),
            stats: TraversalStats::default(),
            halted: false,
        }
    }

    /// Walk the composed scene under `root`, streaming mesh records
    /// into `sink`. Returns the traversal counters.
    ///
    /// A missing or unreadable root surfaces as an error; any other
    /// broken file composes as empty with a warning.
    pub fn run(&mut self, root: &Path, sink: &mut dyn MeshSink) -> ComposeResult<TraversalStats> {
        self.reset();

        let root = normalize_path(root);
        let stage = Rc::new(Stage::load(&root)?);
        self.cache.insert(root.clone(), stage);

        self.process_stage(&root, Mat4::IDENTITY, 0, None, sink);

        // Promote skinned meshes: bind-pose resolution is not applied,
        // the accumulated world transform and the flag are recorded.
        let pending = std::mem::take(&mut self.pending_skinned);
        for record in pending {
            self.push_record(record, sink);
        }
        self.flush(sink);

        self.stats.files_entered = self.discovered.len();
        Ok(self.stats.clone())
    }

    /// Collect every record in memory. Convenience wrapper used by
    /// hosts that do not stream.
    pub fn run_collect(&mut self, root: &Path) -> ComposeResult<Vec<MeshRecord>> {
        let mut records = Vec::new();
        let mut sink = |batch: &[MeshRecord]| {
            records.extend_from_slice(batch);
            true
        };
        self.run(root, &mut sink)?;
        Ok(records)
    }

    /// Skeleton prims discovered by the last walk, keyed
    /// `source|prim-path`. Consumers resolving bind poses look
    /// bindings up here.
    pub fn skeletons(&self) -> &HashSet<String> {
        &self.skeletons
    }

    /// Prim paths visited since the last accepted flush (the output
    /// prim list; discarded on flush to bound memory).
    pub fn visited_prims(&self) -> &[String] {
        &self.prim_log
    }

    fn reset(&mut self) {
        self.cache.clear();
        self.active.clear();
        self.discovered.clear();
        self.skeletons.clear();
        self.pending_skinned.clear();
        self.buffer.clear();
        self.prim_log.clear();
        self.stats = TraversalStats::default();
        self.halted = false;
    }

    // ------------------------------------------------------------------
    // File gates
    // ------------------------------------------------------------------

    /// Register a file in discovery order and decide whether the
    /// traversal may process it at all.
    fn admit_file(&mut self, path: &Path) -> bool {
        let next_index = self.discovered.len() + 1;
        let index = *self
            .discovered
            .entry(path.to_path_buf())
            .or_insert(next_index);

        match self.config.max_files {
            Some(max) => index.saturating_sub(self.config.skip_files) <= max,
            None => true,
        }
    }

    /// Whether meshes from this file are past the skip window.
    fn file_emits(&self, path: &Path) -> bool {
        self.discovered
            .get(path)
            .map(|&index| index > self.config.skip_files)
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Stages
    // ------------------------------------------------------------------

    /// Compose one stage file under `parent_transform`. When `inner`
    /// is given, only the prim at that path participates; otherwise
    /// the stage's sub-layers and all root prims do.
    fn process_stage(
        &mut self,
        path: &Path,
        parent_transform: Mat4,
        depth: usize,
        inner: Option<&str>,
        sink: &mut dyn MeshSink,
    ) {
        if self.halted || depth > self.config.max_depth {
            return;
        }
        if self.active.contains(path) {
            // Reference cycle; this branch is simply not re-entered.
            log::debug!("composition cycle at {}", path.display());
            return;
        }
        if !self.admit_file(path) {
            return;
        }

        let stage = match self.load_stage(path) {
            Some(stage) => stage,
            None => return,
        };

        // Geometry files carry an authoring-origin offset on their
        // root prims, not scene placement.
        let skip_root_transform = is_geometry_file(path);

        self.active.insert(path.to_path_buf());

        match inner {
            Some(inner_path) => match stage.prim_at_path(inner_path) {
                Some(id) => self.process_prim(
                    &stage,
                    id,
                    parent_transform,
                    path,
                    depth,
                    skip_root_transform,
                    sink,
                ),
                None => log::warn!(
                    "reference target {} not found in {}",
                    inner_path,
                    path.display()
                ),
            },
            None => {
                for layer in &stage.sub_layers {
                    let Some(target) = resolve_asset(layer, path) else {
                        continue;
                    };
                    self.process_stage(&target, parent_transform, depth + 1, None, sink);
                }
                for &id in &stage.root_prims {
                    self.process_prim(
                        &stage,
                        id,
                        parent_transform,
                        path,
                        depth,
                        skip_root_transform,
                        sink,
                    );
                }
            }
        }

        self.active.remove(path);
    }

    /// Load a stage through the cache. I/O failures warn and compose
    /// as empty.
    fn load_stage(&mut self, path: &Path) -> Option<Rc<Stage>> {
        if let Some(stage) = self.cache.get(path) {
            return Some(stage);
        }
        match Stage::load(path) {
            Ok(stage) => {
                let stage = Rc::new(stage);
                self.cache.insert(path.to_path_buf(), stage.clone());
                Some(stage)
            }
            Err(err) => {
                log::warn!("failed to load stage {}: {}", path.display(), err);
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Prims
    // ------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn process_prim(
        &mut self,
        stage: &Rc<Stage>,
        id: PrimId,
        parent_transform: Mat4,
        source_path: &Path,
        depth: usize,
        skip_local_transform: bool,
        sink: &mut dyn MeshSink,
    ) {
        if self.halted || depth > self.config.max_depth {
            return;
        }

        let prim = stage.prim(id);

        let local = if skip_local_transform {
            Mat4::IDENTITY
        } else {
            local_transform(prim)
        };
        let world = parent_transform * local;

        for arc in prim.references.iter().chain(prim.payloads.iter()) {
            self.load_reference(arc, world, source_path, depth, sink);
            if self.halted {
                return;
            }
        }

        // Variant sets: recorded selection, or the first inserted
        // variant as the fallback.
        for (set_name, set) in &prim.variant_sets {
            let selected = prim
                .variant_selections
                .get(set_name)
                .and_then(|name| set.variants.get(name).copied())
                .or_else(|| set.variants.first().map(|(_, &vid)| vid));
            let Some(variant_id) = selected else {
                continue;
            };

            let variant = stage.prim(variant_id);
            for arc in variant.references.iter().chain(variant.payloads.iter()) {
                self.load_reference(arc, world, source_path, depth, sink);
                if self.halted {
                    return;
                }
            }
            for &child in &variant.children {
                self.process_prim(stage, child, world, source_path, depth, false, sink);
            }
        }

        self.stats.prims_visited += 1;
        self.prim_log.push(prim.path.clone());

        if prim.type_name == "Skeleton" {
            self.skeletons
                .insert(format!("{}|{}", source_path.display(), prim.path));
        }

        if prim.type_name == "Mesh" {
            self.handle_mesh(prim, world, source_path, sink);
        }

        for &child in &prim.children {
            self.process_prim(stage, child, world, source_path, depth, false, sink);
        }
    }

    fn handle_mesh(&mut self, prim: &Prim, world: Mat4, source_path: &Path, sink: &mut dyn MeshSink) {
        if !self.file_emits(source_path) {
            self.stats.meshes_filtered += 1;
            return;
        }
        if prim.purpose() == Some("guide") {
            self.stats.meshes_filtered += 1;
            return;
        }

        let has_points = prim
            .attr("points")
            .and_then(Value::as_vec3_array)
            .map(|p| !p.is_empty())
            .unwrap_or(false);
        let has_indices = prim
            .attr("faceVertexIndices")
            .and_then(Value::as_int_array)
            .map(|i| !i.is_empty())
            .unwrap_or(false);
        if !has_points || !has_indices {
            self.stats.meshes_filtered += 1;
            return;
        }

        let transform = usdi_math::Transform::from_matrix(&world);
        let extent = geometry::extent_attr(prim).map(|(min, max)| convert::extent_to_target(min, max));
        let has_skeleton = prim.has_skeleton_binding();

        let record = MeshRecord {
            source_path: source_path.to_string_lossy().into_owned(),
            name: prim.name.clone(),
            prim_path: prim.path.clone(),
            position: transform.translation,
            rotation: transform.rotation,
            scale: transform.scale,
            has_skeleton,
            extent,
        };

        if has_skeleton {
            self.pending_skinned.push(record);
        } else {
            self.push_record(record, sink);
        }
    }

    fn push_record(&mut self, record: MeshRecord, sink: &mut dyn MeshSink) {
        if self.halted {
            return;
        }
        self.buffer.push(record);
        if self.buffer.len() >= self.config.flush_every {
            self.flush(sink);
        }
    }

    fn flush(&mut self, sink: &mut dyn MeshSink) {
        if self.halted || self.buffer.is_empty() {
            return;
        }
        if sink.on_flush(&self.buffer) {
            self.stats.meshes_emitted += self.buffer.len() as u64;
            self.buffer.clear();
            self.prim_log.clear();
            self.cache.shrink_to(CACHE_KEEP_AFTER_FLUSH);
        } else {
            log::debug!("sink halted emission after {} records", self.stats.meshes_emitted);
            self.halted = true;
        }
    }

    // ------------------------------------------------------------------
    // References
    // ------------------------------------------------------------------

    fn load_reference(
        &mut self,
        arc: &Reference,
        world: Mat4,
        source_path: &Path,
        depth: usize,
        sink: &mut dyn MeshSink,
    ) {
        if self.halted || depth + 1 > self.config.max_depth {
            return;
        }

        let Some(target) = resolve_asset(&arc.asset_path, source_path) else {
            return;
        };

        if is_skipped_path(&target) {
            log::debug!("skipping filtered reference {}", target.display());
            return;
        }

        self.process_stage(&target, world, depth + 1, arc.prim_path.as_deref(), sink);
    }
}

// ----------------------------------------------------------------------
// Path handling
// ----------------------------------------------------------------------

/// Resolve an asset path from a composition arc against the directory
/// of the file that contains the arc. Strips a leading `./`, rewrites
/// the binary file suffix to its textual twin, and normalizes the
/// result.
fn resolve_asset(asset_path: &str, source_path: &Path) -> Option<PathBuf> {
    let trimmed = asset_path.trim();
    if trimmed.is_empty() {
        return None;
    }
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);

    // The binary-to-text converter runs out-of-band; arcs authored
    // against the binary form load its textual twin.
    let rewritten = if let Some(base) = trimmed.strip_suffix(".usdc") {
        format!("{}.usda", base)
    } else {
        trimmed.to_string()
    };

    let candidate = Path::new(&rewritten);
    let resolved = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        source_path.parent().unwrap_or(Path::new(".")).join(candidate)
    };
    Some(normalize_path(&resolved))
}

/// Lexically normalize a path: drop `.` components and resolve `..`
/// so that the same file always maps to the same cache key.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Geometry files are named `<base>.geo.<ext>`; their root transform
/// is an authoring-origin offset, not scene placement.
fn is_geometry_file(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase().contains(".geo."))
        .unwrap_or(false)
}

// ----------------------------------------------------------------------
// Local transforms
// ----------------------------------------------------------------------

/// Compose a prim's local transform from its transform ops, already
/// converted to the target frame.
///
/// Ops compose in `xformOpOrder` order. Without an order attribute
/// the local transform is the identity, unless a bare
/// `xformOp:transform` matrix is authored.
pub fn local_transform(prim: &Prim) -> Mat4 {
    let source = match prim.attr("xformOpOrder").and_then(Value::as_text_array) {
        Some(order) => {
            let mut matrix = Mat4::IDENTITY;
            for op_name in order {
                if let Some(op) = op_matrix(prim, op_name) {
                    matrix *= op;
                }
            }
            matrix
        }
        None => prim
            .attr("xformOp:transform")
            .and_then(Value::as_matrix)
            .copied()
            .unwrap_or(Mat4::IDENTITY),
    };
    convert::matrix_to_target(&source)
}

/// Source-frame matrix for one named transform op. Unknown op names
/// and missing attributes contribute nothing.
fn op_matrix(prim: &Prim, op_name: &str) -> Option<Mat4> {
    let value = prim.attr(op_name)?;
    let kind = op_name.strip_prefix("xformOp:")?.split(':').next()?;

    match kind {
        "translate" => value.as_vec3().map(Mat4::from_translation),
        "rotateX" => value
            .as_number()
            .map(|deg| Mat4::from_rotation_x((deg as f32).to_radians())),
        "rotateY" => value
            .as_number()
            .map(|deg| Mat4::from_rotation_y((deg as f32).to_radians())),
        "rotateZ" => value
            .as_number()
            .map(|deg| Mat4::from_rotation_z((deg as f32).to_radians())),
        // Intrinsic XYZ: the combined matrix is Rz * Ry * Rx.
        "rotateXYZ" => value.as_vec3().map(|euler| {
            Mat4::from_rotation_z(euler.z.to_radians())
                * Mat4::from_rotation_y(euler.y.to_radians())
                * Mat4::from_rotation_x(euler.x.to_radians())
        }),
        "scale" => value.as_vec3().map(Mat4::from_scale),
        "orient" => value
            .as_vec4()
            .map(|q| Mat4::from_quat(Quat::from_xyzw(q.x, q.y, q.z, q.w).normalize())),
        "transform" => value.as_matrix().copied(),
        _ => None,
    }
}
