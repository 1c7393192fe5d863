use crate::core::vector::{self, Vector, DIM};
use crate::error::{Error, Result};

/// Per-type properties shared by every particle of a species.
///
/// `inv_mass == 0` encodes an immovable particle: impulses never change its
/// velocity and it never collides with walls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Species {
    /// Mass (> 0, may be `f64::INFINITY`).
    pub mass: f64,
    /// `1 / mass`, exactly zero for infinite mass.
    pub inv_mass: f64,
    /// Contact distance against the fixed box walls (>= 0).
    pub wall_radius: f64,
}

impl Species {
    /// Create a species after validating invariants.
    ///
    /// Errors:
    /// - `Error::InvalidParam` if `mass` is non-positive or NaN, or `wall_radius` is negative or not finite.
    pub fn new(mass: f64, wall_radius: f64) -> Result<Self> {
        if mass.is_nan() || mass <= 0.0 {
            return Err(Error::InvalidParam("mass must be > 0".into()));
        }
        if !wall_radius.is_finite() || wall_radius < 0.0 {
            return Err(Error::InvalidParam(
                "wall_radius must be finite and >= 0".into(),
            ));
        }
        let inv_mass = if mass.is_infinite() { 0.0 } else { 1.0 / mass };
        Ok(Self {
            mass,
            inv_mass,
            wall_radius,
        })
    }

    /// A species that no impulse can move.
    pub fn immovable(wall_radius: f64) -> Result<Self> {
        Self::new(f64::INFINITY, wall_radius)
    }

    #[inline]
    pub fn is_movable(&self) -> bool {
        self.inv_mass > 0.0
    }
}

/// A hard particle in D=3.
///
/// Fields:
/// - `id`: stable identifier (index into the store)
/// - `r`: position valid at the scheduler's base time
/// - `v`: velocity
/// - `species`: index into the species table
/// - `collision_count`: incremented each time the particle takes part in a resolved event
#[derive(Debug, Clone)]
pub struct Particle {
    /// Stable particle identifier.
    pub id: usize,
    /// Position (x, y, z).
    pub r: Vector,
    /// Velocity (vx, vy, vz).
    pub v: Vector,
    /// Species index.
    pub species: usize,
    /// Resolved-event participation counter.
    pub collision_count: u64,
}

impl Particle {
    /// Create a new particle after validating that position and velocity are finite.
    pub fn new(id: usize, r: Vector, v: Vector, species: usize) -> Result<Self> {
        if !vector::is_finite(&r) {
            return Err(Error::InvalidParam("position must be finite".into()));
        }
        if !vector::is_finite(&v) {
            return Err(Error::InvalidParam("velocity must be finite".into()));
        }
        Ok(Self {
            id,
            r,
            v,
            species,
            collision_count: 0,
        })
    }

    #[inline]
    pub fn bump_collision_count(&mut self) {
        self.collision_count = self.collision_count.saturating_add(1);
    }

    /// Kinetic energy `1/2 m |v|^2`; zero for immovable particles.
    #[inline]
    pub fn kinetic_energy(&self, species: &Species) -> f64 {
        if !species.is_movable() {
            return 0.0;
        }
        0.5 * species.mass * vector::squared(&self.v)
    }

    /// Momentum `m v`; zero for immovable particles.
    pub fn momentum(&self, species: &Species) -> Vector {
        if !species.is_movable() {
            return [0.0; DIM];
        }
        vector::scaled(species.mass, &self.v)
    }

    /// Position after free flight for `dt`.
    #[inline]
    pub fn position_at(&self, dt: f64) -> Vector {
        let mut r = self.r;
        vector::add_scaled(&mut r, dt, &self.v);
        r
    }

    /// Set position (validated as finite).
    pub fn set_position(&mut self, r: Vector) -> Result<()> {
        if !vector::is_finite(&r) {
            return Err(Error::InvalidParam("position must be finite".into()));
        }
        self.r = r;
        Ok(())
    }

    /// Set velocity (validated as finite).
    pub fn set_velocity(&mut self, v: Vector) -> Result<()> {
        if !vector::is_finite(&v) {
            return Err(Error::InvalidParam("velocity must be finite".into()));
        }
        self.v = v;
        Ok(())
    }
}

/// Mutable borrows of two distinct particles.
pub(crate) fn pair_mut(
    particles: &mut [Particle],
    i: usize,
    j: usize,
) -> Result<(&mut Particle, &mut Particle)> {
    if i == j || i >= particles.len() || j >= particles.len() {
        return Err(Error::InvalidParam(format!(
            "invalid particle pair ({i}, {j})"
        )));
    }
    if i < j {
        let (lo, hi) = particles.split_at_mut(j);
        Ok((&mut lo[i], &mut hi[0]))
    } else {
        let (lo, hi) = particles.split_at_mut(i);
        Ok((&mut hi[0], &mut lo[j]))
    }
}
