use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, ThermalError};
use crate::math::{Point3, Vec3};

/// Legacy VTK cell type code for a triangle, the only cell type this reader
/// accepts (per the specification's "unstructured grid, triangles only").
const VTK_TRIANGLE_CELL_TYPE: i64 = 5;

/// A finite ordered sequence of triangles sharing one right-handed Cartesian
/// frame (meters), plus their per-element unit normals. This is the mesh the
/// BVH is built over and the view-factor kernels sample from.
pub struct Mesh {
    vertices: Vec<[Point3; 3]>,
    normals: Vec<Vec3>,
}

impl Mesh {
    fn from_triangles(vertices: Vec<[Point3; 3]>) -> Result<Self> {
        if vertices.is_empty() {
            return Err(ThermalError::BadMesh {
                path: PathBuf::new(),
                reason: "mesh has zero elements".into(),
            });
        }
        let normals = vertices.iter().map(|t| triangle_normal(t)).collect();
        Ok(Self { vertices, normals })
    }

    /// Parses a legacy VTK unstructured-grid file (ASCII), keeping only
    /// triangle cells (VTK cell type 5). Fails with `BadMesh` if a
    /// non-triangle cell type appears, or a cell's point count is not 3.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ThermalError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_legacy_vtk(&text, path)
    }

    pub(crate) fn parse_legacy_vtk(text: &str, path: &Path) -> Result<Self> {
        let tokens: Vec<&str> = text.split_ascii_whitespace().collect();
        let bad = |reason: String| ThermalError::BadMesh {
            path: path.to_path_buf(),
            reason,
        };

        let points_at = tokens
            .iter()
            .position(|&t| t == "POINTS")
            .ok_or_else(|| bad("missing POINTS section".into()))?;
        let point_count: usize = tokens
            .get(points_at + 1)
            .ok_or_else(|| bad("truncated POINTS header".into()))?
            .parse()
            .map_err(|_| bad("non-numeric POINTS count".into()))?;
        let points_start = points_at + 3; // skip count and datatype token
        let points_needed = point_count * 3;
        let point_floats: Vec<f64> = tokens
            [points_start..points_start.checked_add(points_needed).ok_or_else(|| {
                bad("POINTS count overflow".into())
            })?]
            .iter()
            .map(|t| {
                t.parse::<f64>()
                    .map_err(|_| bad(format!("non-numeric point coordinate {t:?}")))
            })
            .collect::<Result<_>>()?;
        let points: Vec<Point3> = point_floats
            .chunks_exact(3)
            .map(|c| Point3::new(c[0], c[1], c[2]))
            .collect();
        for p in &points {
            if !p.is_finite() {
                return Err(bad("non-finite vertex coordinate".into()));
            }
        }

        let cells_at = tokens
            .iter()
            .position(|&t| t == "CELLS")
            .ok_or_else(|| bad("missing CELLS section".into()))?;
        let cell_count: usize = tokens
            .get(cells_at + 1)
            .ok_or_else(|| bad("truncated CELLS header".into()))?
            .parse()
            .map_err(|_| bad("non-numeric CELLS count".into()))?;
        let cell_list_size: usize = tokens
            .get(cells_at + 2)
            .ok_or_else(|| bad("truncated CELLS header".into()))?
            .parse()
            .map_err(|_| bad("non-numeric CELLS list size".into()))?;

        let mut cells: Vec<Vec<usize>> = Vec::with_capacity(cell_count);
        let mut cursor = cells_at + 3;
        let mut consumed = 0usize;
        for _ in 0..cell_count {
            let n: usize = tokens
                .get(cursor)
                .ok_or_else(|| bad("truncated CELLS body".into()))?
                .parse()
                .map_err(|_| bad("non-numeric cell vertex count".into()))?;
            let indices: Result<Vec<usize>> = tokens[cursor + 1..cursor + 1 + n]
                .iter()
                .map(|t| {
                    t.parse::<usize>()
                        .map_err(|_| bad(format!("non-numeric cell index {t:?}")))
                })
                .collect();
            cells.push(indices?);
            cursor += n + 1;
            consumed += n + 1;
        }
        if consumed != cell_list_size {
            return Err(bad(format!(
                "CELLS list size {cell_list_size} does not match parsed size {consumed}"
            )));
        }

        let types_at = tokens
            .iter()
            .position(|&t| t == "CELL_TYPES")
            .ok_or_else(|| bad("missing CELL_TYPES section".into()))?;
        let types_count: usize = tokens
            .get(types_at + 1)
            .ok_or_else(|| bad("truncated CELL_TYPES header".into()))?
            .parse()
            .map_err(|_| bad("non-numeric CELL_TYPES count".into()))?;
        if types_count != cell_count {
            return Err(bad(format!(
                "CELL_TYPES count {types_count} does not match CELLS count {cell_count}"
            )));
        }
        let types_start = types_at + 2;
        let cell_types: Result<Vec<i64>> = tokens[types_start..types_start + types_count]
            .iter()
            .map(|t| {
                t.parse::<i64>()
                    .map_err(|_| bad(format!("non-numeric cell type {t:?}")))
            })
            .collect();
        let cell_types = cell_types?;

        let mut triangles = Vec::with_capacity(cell_count);
        for (cell, &cell_type) in cells.iter().zip(cell_types.iter()) {
            if cell_type != VTK_TRIANGLE_CELL_TYPE {
                return Err(bad(format!("unsupported cell type {cell_type}")));
            }
            if cell.len() != 3 {
                return Err(bad(format!(
                    "triangle cell has {} vertices, expected 3",
                    cell.len()
                )));
            }
            let v0 = *points
                .get(cell[0])
                .ok_or_else(|| bad("cell references out-of-range vertex".into()))?;
            let v1 = *points
                .get(cell[1])
                .ok_or_else(|| bad("cell references out-of-range vertex".into()))?;
            let v2 = *points
                .get(cell[2])
                .ok_or_else(|| bad("cell references out-of-range vertex".into()))?;
            triangles.push([v0, v1, v2]);
        }

        Self::from_triangles(triangles).map_err(|_| {
            bad("mesh has zero triangle elements".into())
        })
    }

    pub fn element_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle(&self, i: usize) -> [Point3; 3] {
        self.vertices[i]
    }

    pub fn normal(&self, i: usize) -> Vec3 {
        self.normals[i]
    }

    pub fn centroid(&self, i: usize) -> Point3 {
        let [a, b, c] = self.vertices[i];
        (a + b + c) / 3.0
    }

    pub fn triangles(&self) -> &[[Point3; 3]] {
        &self.vertices
    }

    /// Applies an in-place rigid rotation about `axis` (need not be unit
    /// length — it is normalized here) by `angle` radians, using the
    /// Euler-Rodrigues formula. Any BVH built over this mesh is invalidated;
    /// callers must rebuild before further ray queries.
    pub fn rotate(&mut self, axis: Vec3, angle: f64) {
        let rotate_point = rodrigues_rotation(axis, angle);
        for tri in &mut self.vertices {
            tri[0] = rotate_point(tri[0]);
            tri[1] = rotate_point(tri[1]);
            tri[2] = rotate_point(tri[2]);
        }
        for (i, tri) in self.vertices.iter().enumerate() {
            self.normals[i] = triangle_normal(tri);
        }
    }

    /// Rotates the mesh so that its local +Z axis matches `direction`,
    /// composing a rotation about X by `theta` and about Z by `phi`, the
    /// spherical-coordinate angles of `direction`. This is the "look-at"
    /// precondition the element↔element kernel requires before the BVH is
    /// rebuilt (see the kernel module docs for why order matters).
    pub fn look_at(&mut self, direction: Vec3) {
        let (_, phi, theta) = spherical_coordinates(direction);
        self.rotate(Vec3::new(1.0, 0.0, 0.0), theta);
        self.rotate(Vec3::new(0.0, 0.0, 1.0), phi);
    }
}

fn triangle_normal(tri: &[Point3; 3]) -> Vec3 {
    let edge1 = tri[1] - tri[0];
    let edge2 = tri[2] - tri[0];
    edge1.cross(edge2).normalized()
}

/// Returns (norm, phi, theta) of `vector` in the convention the original
/// look-at routine uses: theta = arccos(z/norm) e [0, pi], phi the signed
/// azimuth from +x rotated by pi/2, 0 when the vector already lies on the
/// z axis.
fn spherical_coordinates(vector: Vec3) -> (f64, f64, f64) {
    let norm = vector.length();
    let theta = (vector.z / norm).acos();
    let mut phi = 0.0;
    if vector.x != 0.0 || vector.y != 0.0 {
        phi = vector.y.signum() * (vector.x / (vector.x * vector.x + vector.y * vector.y).sqrt()).acos()
            + PI / 2.0;
    }
    (norm, phi, theta)
}

/// Builds a closure rotating any point by `angle` radians about `axis`
/// (Euler-Rodrigues formula), matching the original `_rotation_matrix`.
fn rodrigues_rotation(axis: Vec3, angle: f64) -> impl Fn(Point3) -> Point3 {
    let axis = axis.normalized();
    let half = angle / 2.0;
    let a = half.cos();
    let (b, c, d) = (-axis.x * half.sin(), -axis.y * half.sin(), -axis.z * half.sin());
    let (aa, bb, cc, dd) = (a * a, b * b, c * c, d * d);
    let (bc, ad, ac, ab, bd, cd) = (b * c, a * d, a * c, a * b, b * d, c * d);

    let r00 = aa + bb - cc - dd;
    let r01 = 2.0 * (bc + ad);
    let r02 = 2.0 * (bd - ac);
    let r10 = 2.0 * (bc - ad);
    let r11 = aa + cc - bb - dd;
    let r12 = 2.0 * (cd + ab);
    let r20 = 2.0 * (bd + ac);
    let r21 = 2.0 * (cd - ab);
    let r22 = aa + dd - bb - cc;

    move |p: Point3| {
        Point3::new(
            r00 * p.x + r01 * p.y + r02 * p.z,
            r10 * p.x + r11 * p.y + r12 * p.z,
            r20 * p.x + r21 * p.y + r22 * p.z,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pyramid_vtk() -> String {
        // A 4-triangle pyramid, apex below a square base — just enough for
        // a round-trip parse check.
        "# vtk DataFile Version 3.0\ntest\nASCII\nDATASET UNSTRUCTURED_GRID\n\
         POINTS 5 float\n\
         0 0 1\n1 0 0\n0 1 0\n-1 0 0\n0 -1 0\n\
         CELLS 4 16\n\
         3 0 1 2\n3 0 2 3\n3 0 3 4\n3 0 4 1\n\
         CELL_TYPES 4\n5\n5\n5\n5\n"
            .to_string()
    }

    #[test]
    fn loads_triangle_count_and_normals() {
        let text = pyramid_vtk();
        let mesh = Mesh::parse_legacy_vtk(&text, Path::new("pyramid.vtk")).unwrap();
        assert_eq!(mesh.element_count(), 4);
        for i in 0..4 {
            let n = mesh.normal(i);
            assert!((n.length() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn rejects_non_triangle_cell_type() {
        let text = "# vtk DataFile Version 3.0\ntest\nASCII\nDATASET UNSTRUCTURED_GRID\n\
            POINTS 4 float\n0 0 0\n1 0 0\n0 1 0\n0 0 1\n\
            CELLS 1 5\n4 0 1 2 3\n\
            CELL_TYPES 1\n10\n";
        let err = Mesh::parse_legacy_vtk(text, Path::new("tet.vtk")).unwrap_err();
        assert!(matches!(err, ThermalError::BadMesh { .. }));
    }

    #[test]
    fn look_at_aligns_local_z_with_target_direction() {
        let text = pyramid_vtk();
        let mut mesh = Mesh::parse_legacy_vtk(&text, Path::new("pyramid.vtk")).unwrap();
        // apex (0,0,1) should map onto the +direction axis through the origin
        let direction = Vec3::new(1.0, 0.0, 0.0);
        mesh.look_at(direction);
        let apex = mesh.triangle(0)[0];
        let apex_dir = apex.normalized();
        assert!((apex_dir.dot(direction.normalized()) - 1.0).abs() < 1e-6);
    }
}
