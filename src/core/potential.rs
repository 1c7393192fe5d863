//! Discrete (stepwise) pair potentials.
//!
//! A potential is a *ladder*: transition radii `r_0 < r_1 < ... < r_k` with an
//! energy `U_i` that holds for `r_{i-1} <= r < r_i` (and `U_0 = +inf` inside the
//! hard core). Beyond `r_k` the energy is zero. The pair *state* is the rung
//! index implied by the separation:
//!
//! - `0`: inside the core (only reachable through overlap)
//! - `1..=k`: inside rung `s`, bounded by `r_{s-1}` and `r_s`
//! - `k + 1`: outside every radius

use crate::error::{Error, Result};
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub struct Ladder {
    radii: Vec<f64>,
    radii_sq: Vec<f64>,
    energies: Vec<f64>,
}

impl Ladder {
    /// Build a ladder; `energies[0]` must be `+inf`, the rest finite.
    pub fn new(radii: Vec<f64>, energies: Vec<f64>) -> Result<Self> {
        if radii.is_empty() {
            return Err(Error::InvalidParam("ladder needs at least a core radius".into()));
        }
        if radii.len() != energies.len() {
            return Err(Error::InvalidParam(format!(
                "ladder has {} radii but {} energies",
                radii.len(),
                energies.len()
            )));
        }
        if !radii.iter().all(|r| r.is_finite() && *r > 0.0) {
            return Err(Error::InvalidParam("ladder radii must be finite and > 0".into()));
        }
        if radii.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::InvalidParam(
                "ladder radii must be strictly increasing".into(),
            ));
        }
        if energies[0] != f64::INFINITY {
            return Err(Error::InvalidParam("core energy must be +infinity".into()));
        }
        if !energies[1..].iter().all(|u| u.is_finite()) {
            return Err(Error::InvalidParam("well energies must be finite".into()));
        }
        let radii_sq = radii.iter().map(|r| r * r).collect();
        Ok(Self {
            radii,
            radii_sq,
            energies,
        })
    }

    #[inline]
    pub fn radii(&self) -> &[f64] {
        &self.radii
    }

    #[inline]
    pub fn energies(&self) -> &[f64] {
        &self.energies
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.radii.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.radii.is_empty()
    }

    #[inline]
    pub(crate) fn radius_sq(&self, k: usize) -> f64 {
        self.radii_sq[k]
    }

    #[inline]
    pub fn core(&self) -> f64 {
        self.radii[0]
    }

    /// Outermost transition radius.
    #[inline]
    pub fn range(&self) -> f64 {
        self.radii[self.radii.len() - 1]
    }

    /// Rung index for squared separation `r2`.
    #[inline]
    pub fn state(&self, r2: f64) -> usize {
        self.radii_sq.partition_point(|&rs| rs <= r2)
    }

    /// Energy of a rung; `state == len()` is the non-interacting outside.
    #[inline]
    pub fn energy(&self, state: usize) -> f64 {
        self.energies.get(state).copied().unwrap_or(0.0)
    }

    /// Energy at squared separation `r2`.
    pub fn energy_at(&self, r2: f64) -> f64 {
        self.energy(self.state(r2))
    }

    /// Index of the transition radius closest to `sqrt(r2)`.
    pub fn nearest_boundary(&self, r2: f64) -> usize {
        let mut best = 0;
        let mut best_gap = f64::INFINITY;
        for (k, rs) in self.radii_sq.iter().enumerate() {
            let gap = (r2 - rs).abs();
            if gap < best_gap {
                best_gap = gap;
                best = k;
            }
        }
        best
    }

    fn scale_radii(&mut self, factor: f64) {
        for r in &mut self.radii {
            *r *= factor;
        }
        self.radii_sq = self.radii.iter().map(|r| r * r).collect();
    }
}

/// Hard pair potential shapes.
///
/// The ladder carries all geometry; the variant only decides which
/// parameters make sense to modify.
#[derive(Debug, Clone, PartialEq)]
pub enum PairPotential {
    /// Pure hard core of diameter `sigma`.
    HardCore(Ladder),
    /// Core `sigma` inside a well of depth `epsilon` reaching `lambda * sigma`.
    SquareWell(Ladder),
    /// Arbitrary ladder of shoulders and wells.
    Stepped(Ladder),
}

impl PairPotential {
    pub fn hard_sphere(diameter: f64) -> Result<Self> {
        Ok(Self::HardCore(Ladder::new(
            vec![diameter],
            vec![f64::INFINITY],
        )?))
    }

    pub fn square_well(diameter: f64, lambda: f64, epsilon: f64) -> Result<Self> {
        if !lambda.is_finite() || lambda <= 1.0 {
            return Err(Error::InvalidParam("lambda must be finite and > 1".into()));
        }
        Ok(Self::SquareWell(Ladder::new(
            vec![diameter, lambda * diameter],
            vec![f64::INFINITY, -epsilon],
        )?))
    }

    pub fn stepped(radii: Vec<f64>, energies: Vec<f64>) -> Result<Self> {
        Ok(Self::Stepped(Ladder::new(radii, energies)?))
    }

    #[inline]
    pub fn ladder(&self) -> &Ladder {
        match self {
            Self::HardCore(l) | Self::SquareWell(l) | Self::Stepped(l) => l,
        }
    }

    fn ladder_mut(&mut self) -> &mut Ladder {
        match self {
            Self::HardCore(l) | Self::SquareWell(l) | Self::Stepped(l) => l,
        }
    }

    pub fn diameter(&self) -> f64 {
        self.ladder().core()
    }

    /// Change the core diameter; outer radii scale along with it.
    pub fn set_diameter(&mut self, diameter: f64) -> Result<()> {
        if !diameter.is_finite() || diameter <= 0.0 {
            return Err(Error::InvalidParam("diameter must be finite and > 0".into()));
        }
        let factor = diameter / self.diameter();
        self.ladder_mut().scale_radii(factor);
        Ok(())
    }

    /// Well width relative to the core. Only meaningful for square wells.
    pub fn lambda(&self) -> Option<f64> {
        match self {
            Self::SquareWell(l) => Some(l.radii()[1] / l.radii()[0]),
            _ => None,
        }
    }

    pub fn set_lambda(&mut self, lambda: f64) -> Result<()> {
        let (core, epsilon) = match self {
            Self::SquareWell(l) => (l.core(), -l.energies()[1]),
            _ => {
                return Err(Error::InvalidParam(
                    "lambda only applies to square-well potentials".into(),
                ))
            }
        };
        *self = Self::square_well(core, lambda, epsilon)?;
        Ok(())
    }

    /// Well depth. Only meaningful for square wells.
    pub fn epsilon(&self) -> Option<f64> {
        match self {
            Self::SquareWell(l) => Some(-l.energies()[1]),
            _ => None,
        }
    }

    pub fn set_epsilon(&mut self, epsilon: f64) -> Result<()> {
        let (core, lambda) = match self {
            Self::SquareWell(l) => (l.core(), l.radii()[1] / l.radii()[0]),
            _ => {
                return Err(Error::InvalidParam(
                    "epsilon only applies to square-well potentials".into(),
                ))
            }
        };
        *self = Self::square_well(core, lambda, epsilon)?;
        Ok(())
    }
}

/// Pair potentials indexed by species.
#[derive(Debug, Clone, Default)]
pub struct PotentialRegistry {
    n_types: usize,
    pairs: Vec<Option<Rc<PairPotential>>>,
}

impl PotentialRegistry {
    pub fn new(n_types: usize) -> Self {
        Self {
            n_types,
            pairs: vec![None; n_types * n_types],
        }
    }

    /// Registry with a single species interacting through `potential`.
    pub fn single(potential: PairPotential) -> Self {
        let mut reg = Self::new(1);
        reg.pairs[0] = Some(Rc::new(potential));
        reg
    }

    #[inline]
    pub fn n_types(&self) -> usize {
        self.n_types
    }

    /// Register `potential` for both `(a, b)` and `(b, a)`.
    pub fn set(&mut self, a: usize, b: usize, potential: PairPotential) -> Result<()> {
        self.check(a, b)?;
        let shared = Rc::new(potential);
        self.pairs[a * self.n_types + b] = Some(Rc::clone(&shared));
        self.pairs[b * self.n_types + a] = Some(shared);
        Ok(())
    }

    #[inline]
    pub fn potential_for(&self, a: usize, b: usize) -> Option<&PairPotential> {
        self.shared(a, b).map(Rc::as_ref)
    }

    /// Handle on the `(a, b)` potential as it is now; later modifications
    /// replace the registry's copy and leave the handle untouched.
    #[inline]
    pub fn shared(&self, a: usize, b: usize) -> Option<&Rc<PairPotential>> {
        self.pairs.get(a * self.n_types + b).and_then(Option::as_ref)
    }

    /// Apply `f` to the `(a, b)` potential and mirror the result onto `(b, a)`.
    pub fn modify<F>(&mut self, a: usize, b: usize, f: F) -> Result<()>
    where
        F: FnOnce(&mut PairPotential) -> Result<()>,
    {
        self.check(a, b)?;
        let mut updated = self
            .potential_for(a, b)
            .cloned()
            .ok_or_else(|| Error::InvalidParam(format!("no potential registered for types ({a}, {b})")))?;
        f(&mut updated)?;
        let shared = Rc::new(updated);
        self.pairs[a * self.n_types + b] = Some(Rc::clone(&shared));
        self.pairs[b * self.n_types + a] = Some(shared);
        Ok(())
    }

    /// Largest interaction range over all registered potentials.
    pub fn range(&self) -> f64 {
        self.pairs
            .iter()
            .flatten()
            .map(|p| p.ladder().range())
            .fold(0.0, f64::max)
    }

    fn check(&self, a: usize, b: usize) -> Result<()> {
        if a >= self.n_types || b >= self.n_types {
            return Err(Error::InvalidParam(format!(
                "types ({a}, {b}) out of range for {} species",
                self.n_types
            )));
        }
        Ok(())
    }
}
