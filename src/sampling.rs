use rand::Rng;

use crate::math::{Point3, Vec3};

/// Draws a uniformly distributed point inside a triangle by folding two
/// uniform samples into barycentric weights (not rejection sampling):
/// u, v ~ Uniform(0,1); if u + v > 1, reflect both across 1. The resulting
/// (u, v, 1-u-v) triple is a valid barycentric coordinate with uniform
/// density over the triangle's area.
pub fn uniform_point_in_triangle(tri: [Point3; 3], rng: &mut impl Rng) -> Point3 {
    let mut u: f64 = rng.gen();
    let mut v: f64 = rng.gen();
    if u + v > 1.0 {
        u = 1.0 - u;
        v = 1.0 - v;
    }
    let w = 1.0 - u - v;
    tri[0] * w + tri[1] * u + tri[2] * v
}

/// Draws a direction uniformly distributed on the unit sphere by sampling
/// three independent standard normals and normalizing the resulting vector
/// — the normal distribution's rotational symmetry makes this exact, unlike
/// rejection sampling inside a cube which wastes samples and needs a loop.
pub fn uniform_unit_vector(rng: &mut impl Rng) -> Vec3 {
    let v = Vec3::new(
        sample_standard_normal(rng),
        sample_standard_normal(rng),
        sample_standard_normal(rng),
    );
    v.normalized()
}

/// Box-Muller transform for one standard-normal sample. `rand`'s own
/// distributions module pulls in `rand_distr` for this; a single transform
/// here avoids a whole extra dependency for three scalar draws per ray.
fn sample_standard_normal(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Flips `v` to the opposite sign if it points away from `d`. Turns a
/// full-sphere sample into a hemisphere sample around `d` — cheaper than
/// rejection sampling. Vectors exactly orthogonal to `d` are left
/// unchanged (documented zero-contribution pathology: `v.dot(d) == 0.0`).
pub fn orient_toward(v: Vec3, d: Vec3) -> Vec3 {
    if v.dot(d) < 0.0 {
        -v
    } else {
        v
    }
}

/// Rotates `v` by pi radians around `axis`, i.e. reflects it through the
/// axis. Used to reinterpret rays that missed the geometry as though they
/// had been emitted in the opposite direction (see the Earth kernel).
pub fn flip_around_axis(v: Vec3, axis: Vec3) -> Vec3 {
    let axis = axis.normalized();
    // Rodrigues' rotation formula specialized to theta = pi: cos(pi) = -1,
    // sin(pi) = 0, so R(v) = 2(axis . v)axis - v.
    axis * (2.0 * axis.dot(v)) - v
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn is_barycentric(tri: [Point3; 3], p: Point3) -> bool {
        let area = |a: Point3, b: Point3, c: Point3| (b - a).cross(c - a).length() / 2.0;
        let total = area(tri[0], tri[1], tri[2]);
        let a0 = area(p, tri[1], tri[2]);
        let a1 = area(tri[0], p, tri[2]);
        let a2 = area(tri[0], tri[1], p);
        (a0 + a1 + a2 - total).abs() < 1e-6
    }

    #[test]
    fn triangle_samples_stay_inside_the_triangle() {
        let tri = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
        ];
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..10_000 {
            let p = uniform_point_in_triangle(tri, &mut rng);
            assert!(is_barycentric(tri, p));
        }
    }

    #[test]
    fn unit_vectors_are_actually_unit_length() {
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..10_000 {
            let v = uniform_unit_vector(&mut rng);
            assert!((v.length() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn orient_toward_never_points_away_from_target() {
        let mut rng = SmallRng::seed_from_u64(3);
        let d = Vec3::new(0.0, 0.0, 1.0);
        for _ in 0..1_000 {
            let v = uniform_unit_vector(&mut rng);
            let oriented = orient_toward(v, d);
            assert!(oriented.dot(d) >= -1e-12);
        }
    }

    #[test]
    fn flip_around_axis_is_an_involution() {
        let axis = Vec3::new(0.0, 0.0, 1.0);
        let v = Vec3::new(0.6, -0.3, 0.2);
        let flipped_twice = flip_around_axis(flip_around_axis(v, axis), axis);
        assert!((flipped_twice - v).length() < 1e-9);
    }
}
