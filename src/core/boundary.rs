//! Box geometry: edge lengths, periodic axes and the fixed hard walls on the others.

use crate::core::vector::{Vector, DIM};
use crate::error::{Error, Result};

/// Axis-aligned box `[0, L_k]` per axis.
///
/// Periodic axes wrap; every non-periodic axis carries two fixed hard walls:
/// `wall_id = 2*k` at `x_k = 0` and `wall_id = 2*k + 1` at `x_k = L_k`.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    size: Vector,
    periodic: [bool; DIM],
}

impl Boundary {
    pub fn new(size: Vector, periodic: [bool; DIM]) -> Result<Self> {
        validate_size(&size)?;
        Ok(Self { size, periodic })
    }

    /// Fully periodic box.
    pub fn periodic(size: Vector) -> Result<Self> {
        Self::new(size, [true; DIM])
    }

    /// Box closed by hard walls on every axis.
    pub fn walled(size: Vector) -> Result<Self> {
        Self::new(size, [false; DIM])
    }

    #[inline]
    pub fn box_size(&self) -> Vector {
        self.size
    }

    #[inline]
    pub fn is_periodic(&self, axis: usize) -> bool {
        self.periodic[axis]
    }

    pub(crate) fn set_box_size(&mut self, size: Vector) -> Result<()> {
        validate_size(&size)?;
        self.size = size;
        Ok(())
    }

    /// Minimum-image separation along periodic axes.
    pub fn nearest_image(&self, mut dr: Vector) -> Vector {
        for k in 0..DIM {
            if !self.periodic[k] {
                continue;
            }
            let l = self.size[k];
            if dr[k] > 0.5 * l {
                dr[k] -= l * (dr[k] / l + 0.5).floor();
            } else if dr[k] < -0.5 * l {
                dr[k] += l * (-dr[k] / l + 0.5).floor();
            }
        }
        dr
    }

    /// Fold a position back into the box along periodic axes.
    pub fn wrap(&self, r: &mut Vector) {
        for k in 0..DIM {
            if self.periodic[k] {
                r[k] = r[k].rem_euclid(self.size[k]);
            }
        }
    }

    /// Shortest edge among the periodic axes, `None` in a fully walled box.
    pub fn min_periodic_edge(&self) -> Option<f64> {
        (0..DIM)
            .filter(|&k| self.periodic[k])
            .map(|k| self.size[k])
            .reduce(f64::min)
    }

    /// Ids of the fixed walls present in this box.
    pub fn wall_ids(&self) -> impl Iterator<Item = u32> + '_ {
        (0..DIM)
            .filter(|&k| !self.periodic[k])
            .flat_map(|k| [(2 * k) as u32, (2 * k + 1) as u32])
    }
}

/// `(axis, is_max)` for a wall id.
#[inline]
pub fn wall_axis_side(wall_id: u32) -> (usize, bool) {
    let axis = (wall_id / 2) as usize;
    let is_max = wall_id % 2 == 1;
    (axis, is_max)
}

fn validate_size(size: &Vector) -> Result<()> {
    if !size.iter().all(|&l| l.is_finite() && l > 0.0) {
        return Err(Error::InvalidParam(
            "box size components must be finite and > 0".into(),
        ));
    }
    Ok(())
}
