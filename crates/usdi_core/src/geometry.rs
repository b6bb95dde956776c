//! Mesh geometry helpers: triangulation, primvar expansion, flat
//! normals, and bind-pose centering heuristics.
//!
//! These helpers operate in the source frame; coordinate conversion
//! happens after them, at the consumer boundary.

use once_cell::sync::Lazy;
use regex::Regex;
use usdi_math::{Vec2, Vec3};

use crate::usd::{Prim, Value};

/// Fan-triangulate polygon faces.
///
/// Every face with `n >= 3` vertices becomes `n - 2` triangles pivoted
/// on its first vertex; smaller faces are skipped. Returns two
/// parallel lists: point indices (into the points array) and
/// face-vertex slot indices (into any per-face-vertex attribute
/// array), so callers can re-index expanded primvars alongside the
/// positions.
pub fn triangulate(face_vertex_counts: &[i32], face_vertex_indices: &[i32]) -> (Vec<u32>, Vec<u32>) {
    let mut point_indices = Vec::new();
    let mut slot_indices = Vec::new();
    let mut offset = 0usize;

    for &count in face_vertex_counts {
        let count = count.max(0) as usize;
        if offset + count > face_vertex_indices.len() {
            break;
        }
        if count < 3 {
            offset += count;
            continue;
        }

        // Fan: (0,1,2), (0,2,3), ... (0,n-2,n-1)
        for i in 1..(count - 1) {
            for slot in [offset, offset + i, offset + i + 1] {
                point_indices.push(face_vertex_indices[slot] as u32);
                slot_indices.push(slot as u32);
            }
        }

        offset += count;
    }

    (point_indices, slot_indices)
}

/// Expand an indexed primvar to a per-face-vertex array.
///
/// When `indices` is present (`primvars:<name>:indices`), each output
/// element is the dereferenced value; otherwise the raw array is
/// returned unchanged. Out-of-range indices produce the default value.
pub fn expand_indexed<T: Clone + Default>(values: &[T], indices: Option<&[i32]>) -> Vec<T> {
    match indices {
        Some(indices) => indices
            .iter()
            .map(|&i| values.get(i.max(0) as usize).cloned().unwrap_or_default())
            .collect(),
        None => values.to_vec(),
    }
}

/// Synthesize one flat normal per face, repeated for each of its
/// face-vertices, from the cross product of the first two edges.
/// Degenerate faces fall back to +Z.
pub fn flat_normals(points: &[Vec3], face_vertex_counts: &[i32], face_vertex_indices: &[i32]) -> Vec<Vec3> {
    let mut normals = Vec::with_capacity(face_vertex_indices.len());
    let mut offset = 0usize;

    for &count in face_vertex_counts {
        let count = count.max(0) as usize;
        if offset + count > face_vertex_indices.len() {
            break;
        }

        let mut normal = Vec3::Z;
        if count >= 3 {
            let p = |slot: usize| {
                points
                    .get(face_vertex_indices[offset + slot].max(0) as usize)
                    .copied()
                    .unwrap_or(Vec3::ZERO)
            };
            let cross = (p(1) - p(0)).cross(p(2) - p(0));
            if cross.length_squared() > 1e-12 {
                normal = cross.normalize();
            }
        }

        for _ in 0..count {
            normals.push(normal);
        }
        offset += count;
    }

    normals
}

/// Shape names that were authored away from the origin and need
/// recentering before placement.
static CENTERED_NAME_PATTERNS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"^polySurfaceShape\d*$").unwrap(),
        Regex::new(r"^pPlaneShape\d*$").unwrap(),
        Regex::new(r"^geoShape\d*$").unwrap(),
    ]
});

/// How far off-origin a declared extent midpoint must be (on either
/// planar axis) before a name-matched mesh is recentered.
const CENTERING_THRESHOLD: f32 = 10.0;

/// Decide whether a mesh should be recentered to its bind pose.
///
/// A mesh is centered iff it carries a skeleton binding, or its name
/// matches one of the known generated-shape patterns while its
/// declared extent midpoint sits more than [`CENTERING_THRESHOLD`]
/// units off-origin on the X or Y axis.
pub fn should_center(name: &str, has_skeleton: bool, extent: Option<(Vec3, Vec3)>) -> bool {
    if has_skeleton {
        return true;
    }
    if !CENTERED_NAME_PATTERNS.iter().any(|re| re.is_match(name)) {
        return false;
    }
    match extent {
        Some((min, max)) => {
            let mid = (min + max) * 0.5;
            mid.x.abs() > CENTERING_THRESHOLD || mid.y.abs() > CENTERING_THRESHOLD
        }
        None => false,
    }
}

/// Offset subtracted from every point when centering. Z is left
/// untouched to preserve ground contact.
pub fn centering_offset(extent: (Vec3, Vec3)) -> Vec3 {
    let (min, max) = extent;
    Vec3::new((min.x + max.x) * 0.5, (min.y + max.y) * 0.5, 0.0)
}

/// Renderable geometry gathered from a `Mesh` prim, triangulated and
/// with primvars expanded to per-face-vertex arrays.
///
/// This is the contract the mesh/model host consumes to build its
/// render objects; everything here is still in the source frame.
#[derive(Clone, Debug, Default)]
pub struct MeshGeometry {
    /// Vertex positions.
    pub points: Vec<Vec3>,

    /// Triangulated point indices (every 3 form a triangle).
    pub point_indices: Vec<u32>,

    /// One normal per triangulated face-vertex.
    pub normals: Vec<Vec3>,

    /// One UV per triangulated face-vertex, when authored.
    pub uvs: Option<Vec<Vec2>>,

    /// Declared axis-aligned extent (min, max), when authored.
    pub extent: Option<(Vec3, Vec3)>,
}

impl MeshGeometry {
    /// Gather geometry from a `Mesh` prim. Returns `None` when the
    /// prim has no points or no face-vertex indices.
    pub fn from_prim(prim: &Prim) -> Option<MeshGeometry> {
        let points = prim.attr("points").and_then(Value::as_vec3_array)?;
        let counts = prim.attr("faceVertexCounts").and_then(Value::as_int_array)?;
        let indices = prim.attr("faceVertexIndices").and_then(Value::as_int_array)?;
        if points.is_empty() || indices.is_empty() {
            return None;
        }

        let (point_indices, slot_indices) = triangulate(counts, indices);

        // Normals: authored (with optional index expansion) or flat.
        let authored_normals = prim
            .attr("normals")
            .or_else(|| prim.attr("primvars:normals"))
            .and_then(Value::as_vec3_array);
        let normal_indices = prim
            .attr("primvars:normals:indices")
            .and_then(Value::as_int_array);

        let per_face_vertex_normals = match authored_normals {
            Some(values) => expand_indexed(values, normal_indices),
            None => flat_normals(points, counts, indices),
        };
        let normals = reindex(&per_face_vertex_normals, &point_indices, &slot_indices, points.len());

        let uvs = prim
            .attr("primvars:st")
            .and_then(Value::as_vec2_array)
            .map(|values| {
                let st_indices = prim.attr("primvars:st:indices").and_then(Value::as_int_array);
                let expanded = expand_indexed(values, st_indices);
                reindex(&expanded, &point_indices, &slot_indices, points.len())
            });

        let extent = extent_attr(prim);

        Some(MeshGeometry {
            points: points.to_vec(),
            point_indices,
            normals,
            uvs,
            extent,
        })
    }

    pub fn triangle_count(&self) -> usize {
        self.point_indices.len() / 3
    }
}

/// Read a declared `extent = [(min), (max)]` attribute.
pub fn extent_attr(prim: &Prim) -> Option<(Vec3, Vec3)> {
    let extent = prim.attr("extent").and_then(Value::as_vec3_array)?;
    if extent.len() == 2 {
        Some((extent[0], extent[1]))
    } else {
        None
    }
}

/// Re-index a per-face-vertex or per-point attribute to the
/// triangulated layout: one value per triangulated face-vertex.
fn reindex<T: Clone + Default>(
    values: &[T],
    point_indices: &[u32],
    slot_indices: &[u32],
    point_count: usize,
) -> Vec<T> {
    if values.len() == point_count {
        // Per-point attribute: follow the point indices.
        point_indices
            .iter()
            .map(|&i| values.get(i as usize).cloned().unwrap_or_default())
            .collect()
    } else {
        // Per-face-vertex attribute: follow the slots.
        slot_indices
            .iter()
            .map(|&i| values.get(i as usize).cloned().unwrap_or_default())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usd::Stage;

    #[test]
    fn test_triangulate_triangle_and_quad() {
        let (points, slots) = triangulate(&[3, 4], &[0, 1, 2, 4, 5, 6, 7]);
        // Triangle stays, quad fans into two triangles.
        assert_eq!(points, vec![0, 1, 2, 4, 5, 6, 4, 6, 7]);
        assert_eq!(slots, vec![0, 1, 2, 3, 4, 5, 3, 5, 6]);
    }

    #[test]
    fn test_triangulate_skips_degenerate_faces() {
        let (points, slots) = triangulate(&[2, 3], &[9, 9, 0, 1, 2]);
        assert_eq!(points, vec![0, 1, 2]);
        assert_eq!(slots, vec![2, 3, 4]);
    }

    #[test]
    fn test_triangulate_degenerate_triangle_survives() {
        // A triangle with a repeated point index is still one triangle.
        let (points, _) = triangulate(&[3], &[0, 0, 0]);
        assert_eq!(points, vec![0, 0, 0]);
    }

    #[test]
    fn test_expand_indexed() {
        let values = vec![10, 20, 30];
        assert_eq!(expand_indexed(&values, Some(&[2, 0, 2, 1])), vec![30, 10, 30, 20]);
        assert_eq!(expand_indexed(&values, None), values);
        // Out of range dereferences to default.
        assert_eq!(expand_indexed(&values, Some(&[5])), vec![0]);
    }

    #[test]
    fn test_flat_normals() {
        let points = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let normals = flat_normals(&points, &[3], &[0, 1, 2]);
        assert_eq!(normals.len(), 3);
        for n in &normals {
            assert!((*n - Vec3::Z).length() < 1e-5);
        }
    }

    #[test]
    fn test_flat_normals_degenerate_face_falls_back() {
        let points = vec![Vec3::ZERO];
        let normals = flat_normals(&points, &[3], &[0, 0, 0]);
        assert_eq!(normals, vec![Vec3::Z; 3]);
    }

    #[test]
    fn test_centering_name_patterns() {
        let far = Some((Vec3::new(90.0, -5.0, 0.0), Vec3::new(110.0, 5.0, 2.0)));
        assert!(should_center("polySurfaceShape12", false, far));
        assert!(should_center("pPlaneShape", false, far));
        assert!(should_center("geoShape3", false, far));
        assert!(!should_center("polySurface12", false, far));
        assert!(!should_center("myMesh", false, far));
    }

    #[test]
    fn test_centering_needs_offset_extent() {
        let near = Some((Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, 1.0, 2.0)));
        assert!(!should_center("polySurfaceShape1", false, near));
        assert!(!should_center("polySurfaceShape1", false, None));
        // Skeleton bindings always center.
        assert!(should_center("anything", true, None));
    }

    #[test]
    fn test_centering_offset_preserves_z() {
        let offset = centering_offset((Vec3::new(90.0, 10.0, 5.0), Vec3::new(110.0, 30.0, 9.0)));
        assert_eq!(offset, Vec3::new(100.0, 20.0, 0.0));
    }

    #[test]
    fn test_mesh_geometry_from_prim() {
        let stage = Stage::parse(
            r#"
def Mesh "quad" {
    point3f[] points = [(0, 0, 0), (1, 0, 0), (1, 1, 0), (0, 1, 0)]
    int[] faceVertexCounts = [4]
    int[] faceVertexIndices = [0, 1, 2, 3]
    texCoord2f[] primvars:st = [(0, 0), (1, 1)]
    int[] primvars:st:indices = [0, 1, 1, 0]
    float3[] extent = [(0, 0, 0), (1, 1, 0)]
}
"#,
            "quad.usda",
        );

        let prim = stage.prim(stage.root_prims[0]);
        let geo = MeshGeometry::from_prim(prim).expect("geometry");

        assert_eq!(geo.triangle_count(), 2);
        assert_eq!(geo.point_indices, vec![0, 1, 2, 0, 2, 3]);
        // No authored normals: flat synthesis, one per face-vertex.
        assert_eq!(geo.normals.len(), 6);
        let uvs = geo.uvs.expect("uvs expanded");
        assert_eq!(uvs.len(), 6);
        assert_eq!(uvs[0], Vec2::new(0.0, 0.0));
        assert_eq!(uvs[1], Vec2::new(1.0, 1.0));
        assert_eq!(geo.extent, Some((Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0))));
    }

    #[test]
    fn test_mesh_geometry_rejects_empty() {
        let stage = Stage::parse(
            r#"
def Mesh "empty" {
    point3f[] points = []
    int[] faceVertexCounts = []
    int[] faceVertexIndices = []
}
"#,
            "empty.usda",
        );
        let prim = stage.prim(stage.root_prims[0]);
        assert!(MeshGeometry::from_prim(prim).is_none());
    }
}
