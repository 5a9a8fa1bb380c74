use rand::Rng;

use crate::bvh::Bvh;
use crate::math::{Point3, Ray, Vec3};
use crate::mesh::Mesh;
use crate::properties::PropertyAtlas;
use crate::sampling::{flip_around_axis, orient_toward, uniform_point_in_triangle, uniform_unit_vector};

/// Fixed forward displacement (mesh units) applied to every ray origin to
/// avoid re-intersecting the triangle it was just cast from or just
/// reflected off of.
pub const EPSILON: f64 = 1e-4;

/// Empirical normalizer calibrating the stochastic Earth-IR estimator to
/// the analytic flat-plate-above-Earth case. Do not change without
/// recalibrating against the estimator's known-good cases.
pub const IR_SCALE: f64 = 2.35;

/// The original driver always calls the Earth kernel with a hard shadow
/// edge (no penumbra softening); kept as a named constant rather than a
/// config field since nothing in this toolchain ever overrides it.
pub const PENUMBRA_FRACTION: f64 = 0.0;

/// The penumbra edge function: zero for rays arriving from deep within
/// Earth's umbra, `|x|` otherwise. `p` widens the soft transition between
/// umbra and full illumination; `p = 0` is a hard shadow, `p = 1` disables
/// the eclipse cutoff entirely.
fn albedo_edge(x: f64, p: f64) -> f64 {
    let min_albedo_dot = (-(1.0 - p) * std::f64::consts::FRAC_PI_2).cos();
    if x < -min_albedo_dot {
        0.0
    } else {
        x.abs()
    }
}

/// Element↔Earth kernel: for each element, Monte Carlo estimates of the
/// IR and albedo view factors against the Earth, given the current orbit
/// sample's Earth and Sun directions (both unit vectors, Earth-centered
/// frame). Returns `(vf_ir, vf_albedo)`, one value per element.
pub fn element_earth(
    mesh: &Mesh,
    bvh: &Bvh,
    earth_dir: Vec3,
    sun_dir: Vec3,
    ray_amount: usize,
    rng: &mut impl Rng,
) -> (Vec<f64>, Vec<f64>) {
    let earth_dir = earth_dir.normalized();
    let sun_dir = sun_dir.normalized();
    let n = mesh.element_count();
    let mut vf_ir = vec![0.0; n];
    let mut vf_albedo = vec![0.0; n];

    for i in 0..n {
        let tri = mesh.triangle(i);
        let normal = mesh.normal(i);

        let origins: Vec<Point3> = (0..ray_amount)
            .map(|_| uniform_point_in_triangle(tri, rng))
            .collect();
        let directions: Vec<Vec3> = (0..ray_amount)
            .map(|_| orient_toward(uniform_unit_vector(rng), earth_dir))
            .collect();
        let offset_origins: Vec<Point3> = origins
            .iter()
            .zip(directions.iter())
            .map(|(&o, &d)| Ray::new(o, d).offset(EPSILON).origin)
            .collect();

        let hit = bvh.any_hit(&offset_origins, &directions);

        let mut ir_sum = 0.0;
        let mut albedo_sum = 0.0;
        for (ray_hit, &direction) in hit.iter().zip(directions.iter()) {
            if *ray_hit {
                continue;
            }
            let d = flip_around_axis(direction, earth_dir);
            let cos_sat = d.dot(normal).abs();
            let cos_earth = d.dot(earth_dir).max(0.0);
            let cos_sun = d.dot(-sun_dir);

            ir_sum += cos_earth * cos_sat;
            albedo_sum += cos_earth * cos_sat * albedo_edge(cos_sun, PENUMBRA_FRACTION);
        }

        vf_ir[i] = IR_SCALE * ir_sum / ray_amount as f64;
        vf_albedo[i] = albedo_sum / ray_amount as f64;
    }

    (vf_ir, vf_albedo)
}

/// Element↔Sun kernel: one deterministic ray per element from its
/// centroid along the sun direction, zeroed out by self-occlusion. No
/// sampling — a single snapshot.
pub fn element_sun(mesh: &Mesh, bvh: &Bvh, sun_dir: Vec3) -> Vec<f64> {
    let sun_dir = sun_dir.normalized();
    let n = mesh.element_count();
    let mut vf_sun = vec![0.0; n];

    let origins: Vec<Point3> = (0..n)
        .map(|i| Ray::new(mesh.centroid(i), sun_dir).offset(EPSILON).origin)
        .collect();
    let directions: Vec<Vec3> = vec![sun_dir; n];
    let occluded = bvh.any_hit(&origins, &directions);

    for i in 0..n {
        if occluded[i] {
            continue;
        }
        vf_sun[i] = mesh.normal(i).dot(sun_dir).abs();
    }
    vf_sun
}

struct ActiveRay {
    origin: Point3,
    direction: Vec3,
    emitter: usize,
}

/// Element↔element kernel: the reflection-walk Monte Carlo estimator for
/// internal infrared exchange. Returns the N×N matrix where row `i` sums
/// to at most 1 — missing mass is absorption by the emitter itself (when
/// `two_sides` is set) or escape to space.
pub fn element_element(
    mesh: &Mesh,
    bvh: &Bvh,
    atlas: &PropertyAtlas,
    ray_amount: usize,
    max_reflections: usize,
    rng: &mut impl Rng,
    mut on_row_done: impl FnMut(usize, usize),
) -> Vec<Vec<f64>> {
    let n = mesh.element_count();
    let mut matrix = vec![vec![0.0; n]; n];

    for i in 0..n {
        let tri = mesh.triangle(i);
        let normal = mesh.normal(i);

        let mut active: Vec<ActiveRay> = (0..ray_amount)
            .map(|_| {
                let origin = uniform_point_in_triangle(tri, rng);
                let mut direction = uniform_unit_vector(rng);
                if !atlas.two_sides(i) {
                    direction = orient_toward(direction, normal);
                }
                let offset = Ray::new(origin, direction).offset(EPSILON);
                ActiveRay {
                    origin: offset.origin,
                    direction,
                    emitter: i,
                }
            })
            .collect();

        for bounce in 0..=max_reflections {
            if active.is_empty() {
                break;
            }
            let origins: Vec<Point3> = active.iter().map(|r| r.origin).collect();
            let directions: Vec<Vec3> = active.iter().map(|r| r.direction).collect();
            let hits = bvh.hits(&origins, &directions);

            let mut next = Vec::new();
            for hit in &hits {
                let ray = &active[hit.ray_id];
                let u: f64 = rng.gen();
                if u <= atlas.alpha_ir(hit.element_id) {
                    matrix[ray.emitter][hit.element_id] += 1.0;
                    continue;
                }
                if bounce == max_reflections {
                    continue;
                }
                let hit_normal = mesh.normal(hit.element_id);
                let reflected = ray.direction.reflect(hit_normal);
                let offset = Ray::new(hit.point, hit_normal).offset(EPSILON);
                next.push(ActiveRay {
                    origin: offset.origin,
                    direction: reflected,
                    emitter: ray.emitter,
                });
            }
            active = next;
        }

        for j in 0..n {
            matrix[i][j] /= ray_amount as f64;
        }
        on_row_done(i + 1, n);
    }

    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::path::Path;

    fn flat_plate_vtk() -> String {
        "# vtk DataFile Version 3.0\ntest\nASCII\nDATASET UNSTRUCTURED_GRID\n\
         POINTS 4 float\n-5 -5 0\n5 -5 0\n5 5 0\n-5 5 0\n\
         CELLS 2 8\n3 0 1 2\n3 0 2 3\n\
         CELL_TYPES 2\n5\n5\n"
            .to_string()
    }

    #[test]
    fn element_sun_sees_full_cosine_when_unoccluded() {
        let mesh = Mesh::parse_legacy_vtk(&flat_plate_vtk(), Path::new("plate.vtk")).unwrap();
        let bvh = Bvh::build(&mesh);
        let sun_dir = Vec3::new(0.0, 0.0, 1.0);
        let vf = element_sun(&mesh, &bvh, sun_dir);
        for v in vf {
            assert!((v - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn element_earth_ir_is_nonnegative_and_bounded() {
        let mesh = Mesh::parse_legacy_vtk(&flat_plate_vtk(), Path::new("plate.vtk")).unwrap();
        let bvh = Bvh::build(&mesh);
        let mut rng = SmallRng::seed_from_u64(42);
        let earth_dir = Vec3::new(0.0, 0.0, -1.0);
        let sun_dir = Vec3::new(0.0, 0.0, 1.0);
        let (vf_ir, vf_albedo) = element_earth(&mesh, &bvh, earth_dir, sun_dir, 2000, &mut rng);
        for v in &vf_ir {
            assert!(*v >= 0.0 && *v < IR_SCALE);
        }
        for v in &vf_albedo {
            assert!(*v >= 0.0 && *v < 1.0);
        }
    }

    #[test]
    fn albedo_edge_zeroes_out_deep_umbra_rays() {
        assert_eq!(albedo_edge(-1.0, 0.0), 0.0);
        assert!((albedo_edge(1.0, 0.0) - 1.0).abs() < 1e-12);
    }

    fn pyramid_cavity_vtk() -> String {
        "# vtk DataFile Version 3.0\ntest\nASCII\nDATASET UNSTRUCTURED_GRID\n\
         POINTS 5 float\n0 0 1\n1 0 0\n0 1 0\n-1 0 0\n0 -1 0\n\
         CELLS 4 16\n3 0 1 2\n3 0 2 3\n3 0 3 4\n3 0 4 1\n\
         CELL_TYPES 4\n5\n5\n5\n5\n"
            .to_string()
    }

    #[test]
    fn element_element_row_sums_stay_within_unit_budget() {
        let mesh = Mesh::parse_legacy_vtk(&pyramid_cavity_vtk(), Path::new("pyr.vtk")).unwrap();
        let bvh = Bvh::build(&mesh);
        let atlas = PropertyAtlas {
            material_index: vec![0; 4],
            alpha_ir: vec![1.0; 4],
            two_sides: vec![false; 4],
        };
        let mut rng = SmallRng::seed_from_u64(9);
        let matrix = element_element(&mesh, &bvh, &atlas, 500, 4, &mut rng, |_, _| {});
        for row in &matrix {
            let sum: f64 = row.iter().sum();
            assert!(sum <= 1.0 + 1e-9);
        }
    }
}
