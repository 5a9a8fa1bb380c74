use std::cmp::Ordering;

use crate::math::{Aabb, Point3, Ray, Vec3};
use crate::mesh::Mesh;

/// Sentinel returned by `first_hit` when a ray intersects nothing.
pub const MISS: usize = usize::MAX;

/// The result of a batch "first hit with location" query: which triangle
/// was hit, which ray in the batch hit it, and where.
#[derive(Debug, Clone, Copy)]
pub struct RayHit {
    pub element_id: usize,
    pub ray_id: usize,
    pub point: Point3,
}

struct Triangle {
    v0: Point3,
    v1: Point3,
    v2: Point3,
}

impl Triangle {
    fn bbox(&self) -> Aabb {
        let mut bbox = Aabb::empty();
        bbox.grow(self.v0);
        bbox.grow(self.v1);
        bbox.grow(self.v2);
        bbox
    }

    /// Möller–Trumbore ray-triangle intersection. Returns the hit
    /// parameter `t` and the hit point when the ray crosses within
    /// [t_min, t_max].
    fn intersect(&self, ray: &Ray, t_min: f64, t_max: f64) -> Option<(f64, Point3)> {
        const EPS: f64 = 1e-8;
        let edge1 = self.v1 - self.v0;
        let edge2 = self.v2 - self.v0;
        let h = ray.direction.cross(edge2);
        let a = edge1.dot(h);
        if a.abs() < EPS {
            return None;
        }
        let f = 1.0 / a;
        let s = ray.origin - self.v0;
        let u = f * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(edge1);
        let v = f * ray.direction.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = f * edge2.dot(q);
        if t < t_min || t > t_max {
            return None;
        }
        Some((t, ray.at(t)))
    }
}

enum Node {
    Leaf {
        tri_index: usize,
        bbox: Aabb,
    },
    Interior {
        left: Box<Node>,
        right: Box<Node>,
        bbox: Aabb,
    },
}

impl Node {
    fn bbox(&self) -> Aabb {
        match self {
            Node::Leaf { bbox, .. } => *bbox,
            Node::Interior { bbox, .. } => *bbox,
        }
    }
}

/// An opaque acceleration structure built once over a mesh's triangles,
/// after any rigid reorientation (see `Mesh::rotate` / `Mesh::look_at`).
/// Supports first-hit, any-hit, and batch first-hit-with-location queries.
/// The BVH owns a snapshot of the triangle vertex data at build time, so a
/// later mesh rotation never silently invalidates an in-use BVH — it simply
/// requires a fresh `Bvh::build` call, as the specification requires.
pub struct Bvh {
    triangles: Vec<Triangle>,
    root: Node,
}

impl Bvh {
    pub fn build(mesh: &Mesh) -> Self {
        let triangles: Vec<Triangle> = (0..mesh.element_count())
            .map(|i| {
                let [v0, v1, v2] = mesh.triangle(i);
                Triangle { v0, v1, v2 }
            })
            .collect();

        let mut indices: Vec<usize> = (0..triangles.len()).collect();
        let root = Self::build_node(&triangles, &mut indices);
        Self { triangles, root }
    }

    fn build_node(triangles: &[Triangle], indices: &mut [usize]) -> Node {
        if indices.len() == 1 {
            let i = indices[0];
            return Node::Leaf {
                tri_index: i,
                bbox: triangles[i].bbox(),
            };
        }

        let enclosing = indices
            .iter()
            .map(|&i| triangles[i].bbox())
            .reduce(|a, b| Aabb::surrounding(&a, &b))
            .expect("indices is non-empty");
        let axis = enclosing.longest_axis();

        indices.sort_by(|&a, &b| {
            let ba = triangles[a].bbox();
            let bb = triangles[b].bbox();
            let ca = ba.min[axis] + ba.max[axis];
            let cb = bb.min[axis] + bb.max[axis];
            ca.partial_cmp(&cb).unwrap_or(Ordering::Equal)
        });

        let mid = indices.len() / 2;
        let (left_idx, right_idx) = indices.split_at_mut(mid);
        let left = Box::new(Self::build_node(triangles, left_idx));
        let right = Box::new(Self::build_node(triangles, right_idx));
        let bbox = Aabb::surrounding(&left.bbox(), &right.bbox());
        Node::Interior { left, right, bbox }
    }

    fn intersect_node(node: &Node, triangles: &[Triangle], ray: &Ray, t_min: f64, t_max: f64) -> Option<(usize, f64, Point3)> {
        if !node.bbox().hit(ray, t_min, t_max) {
            return None;
        }
        match node {
            Node::Leaf { tri_index, .. } => triangles[*tri_index]
                .intersect(ray, t_min, t_max)
                .map(|(t, p)| (*tri_index, t, p)),
            Node::Interior { left, right, .. } => {
                let hit_left = Self::intersect_node(left, triangles, ray, t_min, t_max);
                let far = hit_left.as_ref().map_or(t_max, |h| h.1);
                let hit_right = Self::intersect_node(right, triangles, ray, t_min, far);
                hit_right.or(hit_left)
            }
        }
    }

    /// Returns the index of the first triangle the ray intersects, or
    /// `MISS`.
    pub fn first_hit(&self, origin: Point3, direction: Vec3) -> usize {
        let ray = Ray::new(origin, direction);
        Self::intersect_node(&self.root, &self.triangles, &ray, 0.0, f64::INFINITY)
            .map(|(i, _, _)| i)
            .unwrap_or(MISS)
    }

    /// Returns, for each hit triangle with its point, `(element_id, t,
    /// point)`; `None` for rays that miss.
    fn first_hit_full(&self, origin: Point3, direction: Vec3) -> Option<(usize, f64, Point3)> {
        let ray = Ray::new(origin, direction);
        Self::intersect_node(&self.root, &self.triangles, &ray, 0.0, f64::INFINITY)
    }

    pub fn any_hit(&self, origins: &[Point3], directions: &[Vec3]) -> Vec<bool> {
        origins
            .iter()
            .zip(directions.iter())
            .map(|(&o, &d)| self.first_hit(o, d) != MISS)
            .collect()
    }

    /// Returns the single first-hit tuple for each ray that hits something;
    /// rays that miss are simply absent (length ≤ batch size).
    pub fn hits(&self, origins: &[Point3], directions: &[Vec3]) -> Vec<RayHit> {
        origins
            .iter()
            .zip(directions.iter())
            .enumerate()
            .filter_map(|(ray_id, (&o, &d))| {
                self.first_hit_full(o, d).map(|(element_id, _, point)| RayHit {
                    element_id,
                    ray_id,
                    point,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;
    use std::path::Path;

    fn single_triangle_vtk() -> &'static str {
        "# vtk DataFile Version 3.0\ntest\nASCII\nDATASET UNSTRUCTURED_GRID\n\
         POINTS 3 float\n0 0 0\n1 0 0\n0 1 0\n\
         CELLS 1 4\n3 0 1 2\n\
         CELL_TYPES 1\n5\n"
    }

    #[test]
    fn first_hit_finds_the_only_triangle() {
        let mesh = Mesh::parse_legacy_vtk(single_triangle_vtk(), Path::new("tri.vtk")).unwrap();
        let bvh = Bvh::build(&mesh);
        let hit = bvh.first_hit(Point3::new(0.2, 0.2, -1.0), Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(hit, 0);
    }

    #[test]
    fn first_hit_misses_outside_the_triangle() {
        let mesh = Mesh::parse_legacy_vtk(single_triangle_vtk(), Path::new("tri.vtk")).unwrap();
        let bvh = Bvh::build(&mesh);
        let hit = bvh.first_hit(Point3::new(5.0, 5.0, -1.0), Vec3::new(0.0, 0.0, 1.0));
        assert_eq!(hit, MISS);
    }

    #[test]
    fn any_hit_matches_first_hit_presence() {
        let mesh = Mesh::parse_legacy_vtk(single_triangle_vtk(), Path::new("tri.vtk")).unwrap();
        let bvh = Bvh::build(&mesh);
        let origins = vec![Point3::new(0.2, 0.2, -1.0), Point3::new(5.0, 5.0, -1.0)];
        let directions = vec![Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.0, 1.0)];
        assert_eq!(bvh.any_hit(&origins, &directions), vec![true, false]);
    }
}
