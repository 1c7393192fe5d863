//! Initial configurations: non-overlapping random placement and thermal velocities.

use crate::core::boundary::Boundary;
use crate::core::particle::Species;
use crate::core::vector::{self, Vector, DIM, ZERO};
use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

const MAX_ATTEMPTS: usize = 1_000_000;

/// Seeded generator, or one seeded from the thread RNG.
pub fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::seed_from_u64(rand::rng().random()),
    }
}

/// Rejection-sample `n` centers at least `min_distance` apart (minimum image),
/// keeping `margin` away from every non-periodic face.
pub fn random_positions<R: Rng>(
    rng: &mut R,
    n: usize,
    boundary: &Boundary,
    min_distance: f64,
    margin: f64,
) -> Result<Vec<Vector>> {
    let size = boundary.box_size();
    for k in 0..DIM {
        if !boundary.is_periodic(k) && size[k] <= 2.0 * margin {
            return Err(Error::InvalidParam(format!(
                "box edge {k} ({}) leaves no room for margin {margin}",
                size[k]
            )));
        }
    }
    let min_sq = min_distance * min_distance;
    let mut out: Vec<Vector> = Vec::with_capacity(n);
    for id in 0..n {
        let mut attempts = 0usize;
        let r = loop {
            if attempts >= MAX_ATTEMPTS {
                return Err(Error::InvalidParam(format!(
                    "failed to place particle {id} without overlap; try fewer particles or a smaller diameter"
                )));
            }
            attempts += 1;
            let mut r = ZERO;
            for (k, r_k) in r.iter_mut().enumerate() {
                *r_k = if boundary.is_periodic(k) {
                    rng.random_range(0.0..size[k])
                } else {
                    rng.random_range(margin..=size[k] - margin)
                };
            }
            let clear = out.iter().all(|other| {
                vector::squared(&boundary.nearest_image(vector::sub(&r, other))) >= min_sq
            });
            if clear {
                break r;
            }
        };
        out.push(r);
    }
    Ok(out)
}

/// One Maxwell-Boltzmann draw at `temperature` (k_B = 1); zero for an
/// immovable species.
pub fn thermal_velocity<R: Rng>(rng: &mut R, species: &Species, temperature: f64) -> Result<Vector> {
    if !temperature.is_finite() || temperature < 0.0 {
        return Err(Error::InvalidParam("temperature must be finite and >= 0".into()));
    }
    if !species.is_movable() {
        return Ok(ZERO);
    }
    let sigma = (temperature * species.inv_mass).sqrt();
    let unit = Normal::new(0.0, 1.0).map_err(|e| Error::MathError(e.to_string()))?;
    let mut v = ZERO;
    v.iter_mut().for_each(|x| *x = sigma * unit.sample(rng));
    Ok(v)
}

/// Maxwell-Boltzmann velocities at `temperature` (k_B = 1) with the total
/// momentum of the movable particles removed.
pub fn thermal_velocities<R: Rng>(
    rng: &mut R,
    species: &[Species],
    types: &[usize],
    temperature: f64,
) -> Result<Vec<Vector>> {
    let mut velocities = Vec::with_capacity(types.len());
    for &t in types {
        let sp = species
            .get(t)
            .ok_or_else(|| Error::InvalidParam(format!("unknown species {t}")))?;
        velocities.push(thermal_velocity(rng, sp, temperature)?);
    }
    if velocities.len() > 1 {
        remove_drift(species, types, &mut velocities);
    }
    Ok(velocities)
}

/// Subtract the center-of-mass velocity of the movable particles from each of them.
pub fn remove_drift(species: &[Species], types: &[usize], velocities: &mut [Vector]) {
    let mut momentum = ZERO;
    let mut total_mass = 0.0;
    for (v, &t) in velocities.iter().zip(types) {
        let sp = &species[t];
        if sp.is_movable() {
            vector::add_scaled(&mut momentum, sp.mass, v);
            total_mass += sp.mass;
        }
    }
    if total_mass == 0.0 {
        return;
    }
    let drift = vector::scaled(1.0 / total_mass, &momentum);
    for (v, &t) in velocities.iter_mut().zip(types) {
        if species[t].is_movable() {
            vector::add_scaled(v, -1.0, &drift);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn placement_respects_distance_and_walls() -> Result<()> {
        let boundary = Boundary::walled([6.0, 6.0, 6.0])?;
        let mut rng = make_rng(Some(7));
        let pos = random_positions(&mut rng, 20, &boundary, 1.0, 0.5)?;
        for (a, ra) in pos.iter().enumerate() {
            assert!(ra.iter().all(|&x| (0.5..=5.5).contains(&x)));
            for rb in &pos[a + 1..] {
                assert!(vector::squared(&vector::sub(ra, rb)) >= 1.0);
            }
        }
        Ok(())
    }

    #[test]
    fn placement_fails_when_box_is_too_small() -> Result<()> {
        let boundary = Boundary::walled([1.0, 6.0, 6.0])?;
        let mut rng = make_rng(Some(1));
        assert!(random_positions(&mut rng, 2, &boundary, 1.0, 0.5).is_err());
        Ok(())
    }

    #[test]
    fn thermal_velocities_have_zero_momentum() -> Result<()> {
        let species = [Species::new(1.0, 0.5)?, Species::new(3.0, 0.5)?];
        let types: Vec<usize> = (0..50).map(|i| i % 2).collect();
        let mut rng = make_rng(Some(11));
        let v = thermal_velocities(&mut rng, &species, &types, 1.5)?;
        let mut p = ZERO;
        for (vi, &t) in v.iter().zip(&types) {
            vector::add_scaled(&mut p, species[t].mass, vi);
        }
        for pk in p {
            assert_abs_diff_eq!(pk, 0.0, epsilon = 1e-10);
        }
        Ok(())
    }

    #[test]
    fn immovable_species_gets_no_velocity() -> Result<()> {
        let wall = Species::immovable(0.5)?;
        let mut rng = make_rng(Some(2));
        assert_eq!(thermal_velocity(&mut rng, &wall, 3.0)?, ZERO);
        assert!(thermal_velocity(&mut rng, &Species::new(1.0, 0.5)?, f64::NAN).is_err());
        Ok(())
    }

    #[test]
    fn same_seed_same_state() -> Result<()> {
        let boundary = Boundary::periodic([5.0, 5.0, 5.0])?;
        let a = random_positions(&mut make_rng(Some(3)), 5, &boundary, 1.0, 0.0)?;
        let b = random_positions(&mut make_rng(Some(3)), 5, &boundary, 1.0, 0.0)?;
        assert_eq!(a, b);
        Ok(())
    }
}
