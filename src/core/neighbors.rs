//! Candidate-partner lists for the collision predictor.

use crate::core::boundary::Boundary;
use crate::core::vector;
use crate::core::Particle;
use crate::error::{Error, Result};

/// Directional neighbor query.
///
/// `up_neighbors(i)` holds partners with a larger index, `down_neighbors(i)`
/// those with a smaller one, so each pair is visited once from each side.
/// The engine only reads these lists.
pub trait NeighborSource {
    fn up_neighbors(&self, atom: usize) -> &[usize];
    fn down_neighbors(&self, atom: usize) -> &[usize];
}

/// Check that `source` describes a directed pair graph over `n` particles:
/// up-neighbors of `i` lie in `i+1..n`, down-neighbors below `i`, and every
/// up entry is mirrored by a down entry.
pub fn validate(source: &dyn NeighborSource, n: usize) -> Result<()> {
    for i in 0..n {
        for &j in source.up_neighbors(i) {
            if j <= i || j >= n {
                return Err(Error::InvalidParam(format!(
                    "up-neighbor {j} of particle {i} is outside {}..{n}",
                    i + 1
                )));
            }
            if !source.down_neighbors(j).contains(&i) {
                return Err(Error::InvalidParam(format!(
                    "particle {j} lists {i} as up-neighbor but not the reverse"
                )));
            }
        }
        if let Some(&j) = source.down_neighbors(i).iter().find(|&&j| j >= i) {
            return Err(Error::InvalidParam(format!(
                "down-neighbor {j} of particle {i} is not below it"
            )));
        }
    }
    Ok(())
}

/// Precomputed up/down lists.
#[derive(Clone, Debug, Default)]
pub struct NeighborLists {
    up: Vec<Vec<usize>>,
    down: Vec<Vec<usize>>,
}

impl NeighborLists {
    /// Every particle is a candidate partner of every other one.
    pub fn all_pairs(n: usize) -> Self {
        let up = (0..n).map(|i| ((i + 1)..n).collect()).collect();
        let down = (0..n).map(|i| (0..i).collect()).collect();
        Self { up, down }
    }

    /// Pairs closer than `cutoff` (minimum image) at the time of the call.
    ///
    /// The lists are not refreshed as particles move; callers hand a rebuilt
    /// list to the simulation when drift exceeds their skin.
    pub fn within_cutoff(particles: &[Particle], boundary: &Boundary, cutoff: f64) -> Self {
        let n = particles.len();
        let mut up = vec![Vec::new(); n];
        let mut down = vec![Vec::new(); n];
        let cutoff_sq = cutoff * cutoff;
        for i in 0..n {
            for j in (i + 1)..n {
                let dr = boundary.nearest_image(vector::sub(&particles[j].r, &particles[i].r));
                if vector::squared(&dr) < cutoff_sq {
                    up[i].push(j);
                    down[j].push(i);
                }
            }
        }
        Self { up, down }
    }

    pub fn len(&self) -> usize {
        self.up.len()
    }

    pub fn is_empty(&self) -> bool {
        self.up.is_empty()
    }
}

impl NeighborSource for NeighborLists {
    fn up_neighbors(&self, atom: usize) -> &[usize] {
        self.up.get(atom).map(Vec::as_slice).unwrap_or(&[])
    }

    fn down_neighbors(&self, atom: usize) -> &[usize] {
        self.down.get(atom).map(Vec::as_slice).unwrap_or(&[])
    }
}
