use rand::Rng;

use crate::bvh::Bvh;
use crate::error::{Result, ThermalError};
use crate::kernels::element_earth;
use crate::math::Vec3;
use crate::mesh::Mesh;
use crate::orbit::OrbitReport;

/// One orbit division's Earth-kernel result: the sample timestamp plus the
/// per-element IR and albedo view factors at that point in the orbit.
pub struct DivisionSample {
    pub timestamp_s: f64,
    pub vf_ir: Vec<f64>,
    pub vf_albedo: Vec<f64>,
}

/// Picks `divisions` representative sample indices out of an elapsed-time
/// series, one nearest each of the `divisions` evenly spaced target times
/// `{0, T/K, ..., (K-1)T/K}`. Sample `s` represents target time `k*T/K` when
/// the next sample's elapsed time has already passed the target and `s` is
/// at least as close to it as `s+1` is; the final sample is always eligible
/// as the division representative for the last target.
pub fn choose_divisions(elapsed: &[f64], period_s: f64, divisions: usize) -> Result<Vec<usize>> {
    if divisions == 0 {
        return Ok(Vec::new());
    }
    if divisions > elapsed.len() {
        return Err(ThermalError::TooFewOrbitSamples {
            requested: divisions,
            available: elapsed.len(),
        });
    }

    let mut chosen = Vec::with_capacity(divisions);
    for k in 0..divisions {
        let target = k as f64 * period_s / divisions as f64;
        let mut pick = elapsed.len() - 1;
        for s in 0..elapsed.len() {
            if s + 1 >= elapsed.len() {
                pick = s;
                break;
            }
            if elapsed[s + 1] > target && (target - elapsed[s]).abs() <= (target - elapsed[s + 1]).abs() {
                pick = s;
                break;
            }
        }
        chosen.push(pick);
    }
    Ok(chosen)
}

/// Runs the Earth kernel at `orbit_divisions` representative points in the
/// orbit (Earth direction = `-normalize(sat_position)` at each chosen
/// sample), plus the Sun kernel exactly once, stamped with the first
/// sample's elapsed time.
pub fn run_orbit_divisions(
    mesh: &Mesh,
    bvh: &Bvh,
    orbit: &OrbitReport,
    divisions: usize,
    earth_ray_amount: usize,
    rng: &mut impl Rng,
) -> Result<Vec<DivisionSample>> {
    let elapsed: Vec<f64> = orbit.sat_positions.iter().map(|(t, _)| *t).collect();
    let indices = choose_divisions(&elapsed, orbit.period_s, divisions)?;

    let sun_dir = orbit.sun_position.normalized();

    let mut samples = Vec::with_capacity(indices.len());
    for &idx in &indices {
        let (timestamp_s, sat_position) = orbit.sat_positions[idx];
        let earth_dir = (-sat_position).normalized();
        let (vf_ir, vf_albedo) = element_earth(mesh, bvh, earth_dir, sun_dir, earth_ray_amount, rng);
        samples.push(DivisionSample {
            timestamp_s,
            vf_ir,
            vf_albedo,
        });
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chooses_one_representative_per_target_time() {
        let elapsed = vec![0.0, 100.0, 200.0, 300.0, 400.0, 500.0];
        let period = 600.0;
        let chosen = choose_divisions(&elapsed, period, 3).unwrap();
        assert_eq!(chosen.len(), 3);
        assert_eq!(chosen[0], 0);
    }

    #[test]
    fn too_few_samples_is_an_error() {
        let elapsed = vec![0.0, 1.0];
        let err = choose_divisions(&elapsed, 10.0, 5).unwrap_err();
        assert!(matches!(err, ThermalError::TooFewOrbitSamples { .. }));
    }

    #[test]
    fn last_sample_is_eligible_as_final_division() {
        let elapsed = vec![0.0, 50.0, 300.0];
        let chosen = choose_divisions(&elapsed, 300.0, 2).unwrap();
        assert_eq!(*chosen.last().unwrap(), elapsed.len() - 1);
    }
}
