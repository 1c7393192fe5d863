//! One-dimensional moving hard wall driven by an imposed pressure.

use crate::core::boundary::Boundary;
use crate::core::collision::{Bump, Transition, OVERLAP_TIME_FACTOR};
use crate::core::event::EventKind;
use crate::core::particle::Particle;
use crate::core::vector::{DIM, ZERO};
use crate::error::{Error, Result};
use tracing::warn;

/// Side of the piston the particles live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasSide {
    /// Gas occupies `x < position`; pressure pushes the wall toward `-x`.
    Below,
    /// Gas occupies `x > position`; pressure pushes the wall toward `+x`.
    Above,
}

impl GasSide {
    #[inline]
    fn sign(self) -> f64 {
        match self {
            GasSide::Below => -1.0,
            GasSide::Above => 1.0,
        }
    }
}

/// Piston state. Position and velocity are valid at the scheduler's base
/// time; between events the wall follows `x + v t + a t^2 / 2` with
/// `a = F / M` and `F = P A`.
#[derive(Debug, Clone, PartialEq)]
pub struct MovingBoundary {
    axis: usize,
    position: f64,
    velocity: f64,
    mass: f64,
    inv_mass: f64,
    pressure: f64,
    collision_radius: f64,
    gas_side: GasSide,
}

impl MovingBoundary {
    /// Piston normal to `axis` at `position`, initially at rest.
    pub fn new(
        axis: usize,
        position: f64,
        mass: f64,
        pressure: f64,
        collision_radius: f64,
        gas_side: GasSide,
    ) -> Result<Self> {
        if axis >= DIM {
            return Err(Error::InvalidParam(format!("piston axis {axis} out of range")));
        }
        if !position.is_finite() {
            return Err(Error::InvalidParam("piston position must be finite".into()));
        }
        if !collision_radius.is_finite() || collision_radius < 0.0 {
            return Err(Error::InvalidParam(
                "piston collision radius must be finite and >= 0".into(),
            ));
        }
        let mut piston = Self {
            axis,
            position,
            velocity: 0.0,
            mass: f64::INFINITY,
            inv_mass: 0.0,
            pressure: 0.0,
            collision_radius,
            gas_side,
        };
        piston.set_mass(mass)?;
        piston.set_pressure(pressure)?;
        Ok(piston)
    }

    /// Infinitely heavy wall that never moves.
    pub fn stationary(axis: usize, position: f64, collision_radius: f64, gas_side: GasSide) -> Result<Self> {
        Self::new(axis, position, f64::INFINITY, 0.0, collision_radius, gas_side)
    }

    #[inline]
    pub fn axis(&self) -> usize {
        self.axis
    }

    #[inline]
    pub fn position(&self) -> f64 {
        self.position
    }

    #[inline]
    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    #[inline]
    pub fn mass(&self) -> f64 {
        self.mass
    }

    #[inline]
    pub fn pressure(&self) -> f64 {
        self.pressure
    }

    #[inline]
    pub fn collision_radius(&self) -> f64 {
        self.collision_radius
    }

    #[inline]
    pub fn gas_side(&self) -> GasSide {
        self.gas_side
    }

    #[inline]
    pub fn is_stationary(&self) -> bool {
        self.inv_mass == 0.0
    }

    pub fn set_position(&mut self, position: f64) -> Result<()> {
        if !position.is_finite() {
            return Err(Error::InvalidParam("piston position must be finite".into()));
        }
        self.position = position;
        Ok(())
    }

    pub fn set_velocity(&mut self, velocity: f64) -> Result<()> {
        if !velocity.is_finite() {
            return Err(Error::InvalidParam("piston velocity must be finite".into()));
        }
        if self.is_stationary() && velocity != 0.0 {
            return Err(Error::InvalidParam("a stationary piston cannot move".into()));
        }
        self.velocity = velocity;
        Ok(())
    }

    pub fn set_pressure(&mut self, pressure: f64) -> Result<()> {
        if !pressure.is_finite() || pressure < 0.0 {
            return Err(Error::InvalidParam("piston pressure must be finite and >= 0".into()));
        }
        self.pressure = pressure;
        Ok(())
    }

    /// Set the wall mass; `+inf` makes it stationary and zeroes its velocity.
    pub fn set_mass(&mut self, mass: f64) -> Result<()> {
        if mass.is_nan() || mass <= 0.0 {
            return Err(Error::InvalidParam("piston mass must be > 0".into()));
        }
        self.mass = mass;
        if mass.is_infinite() {
            self.inv_mass = 0.0;
            self.velocity = 0.0;
        } else {
            self.inv_mass = 1.0 / mass;
        }
        Ok(())
    }

    /// Switch between a stationary wall and a free one of the given mass.
    pub fn set_stationary(&mut self, stationary: bool, mass: f64) -> Result<()> {
        if stationary {
            self.set_mass(f64::INFINITY)
        } else {
            self.set_mass(mass)
        }
    }

    /// Cross-section pressed by the gas. Recomputed from the current box on
    /// every call since the box may be resized between events.
    pub fn area(&self, boundary: &Boundary) -> f64 {
        let size = boundary.box_size();
        (0..DIM)
            .filter(|&k| k != self.axis)
            .map(|k| (size[k] - 2.0 * self.collision_radius).max(0.0))
            .product()
    }

    /// Signed force along the axis; points into the gas.
    pub fn force(&self, boundary: &Boundary) -> f64 {
        self.gas_side.sign() * self.pressure * self.area(boundary)
    }

    /// Acceleration of the wall, zero when stationary.
    pub fn acceleration(&self, boundary: &Boundary) -> f64 {
        if self.is_stationary() {
            return 0.0;
        }
        self.force(boundary) * self.inv_mass
    }

    /// `(position, velocity)` after free flight for `dt`.
    pub fn state_at(&self, dt: f64, boundary: &Boundary) -> (f64, f64) {
        let a = self.acceleration(boundary);
        (
            self.position + self.velocity * dt + 0.5 * a * dt * dt,
            self.velocity + a * dt,
        )
    }

    pub(crate) fn advance(&mut self, dt: f64, boundary: &Boundary) {
        let (x, v) = self.state_at(dt, boundary);
        self.position = x;
        self.velocity = v;
    }

    pub fn kinetic_energy(&self) -> f64 {
        if self.is_stationary() {
            return 0.0;
        }
        0.5 * self.mass * self.velocity * self.velocity
    }

    /// Field energy `-F x` of the imposed force.
    pub fn potential_energy(&self, boundary: &Boundary) -> f64 {
        if self.is_stationary() {
            return 0.0;
        }
        -self.force(boundary) * self.position
    }

    /// Time after `false_time` until particle `p` touches the wall, or `+inf`.
    pub fn collision_time(
        &self,
        p: &Particle,
        inv_mass: f64,
        boundary: &Boundary,
        false_time: f64,
        ignore_overlap: bool,
    ) -> Result<f64> {
        if inv_mass == 0.0 {
            return Ok(f64::INFINITY);
        }
        let a = self.acceleration(boundary);
        let (wall_x, wall_v) = self.state_at(false_time, boundary);
        let dr = p.r[self.axis] + p.v[self.axis] * false_time - wall_x;
        let dv = p.v[self.axis] - wall_v;
        let da = -a;

        // gap and its derivatives, positive gap means separated
        let s = self.gas_side.sign();
        let gap = s * dr - self.collision_radius;
        let u = s * dv;
        let g = s * da;

        if u >= 0.0 && g >= 0.0 {
            return Ok(f64::INFINITY);
        }
        let kind = EventKind::Piston { i: p.id };
        // overlapped and closing, or too slow to clear a wall accelerating into it
        let disc = u * u - 2.0 * g * gap;
        if gap < 0.0 && (u < 0.0 || disc < 0.0) {
            if !ignore_overlap {
                return Err(Error::Overlap {
                    kind,
                    separation: gap,
                    approach: u,
                });
            }
            let t = if u < 0.0 {
                OVERLAP_TIME_FACTOR * gap.abs() / u.abs()
            } else {
                OVERLAP_TIME_FACTOR * (2.0 * gap.abs() / g.abs()).sqrt()
            };
            warn!(%kind, gap, nudge_time = t, "particle behind piston; nudging back");
            return Ok(t);
        }

        let time = if g == 0.0 {
            // free wall: no pressure or a stationary wall
            -gap / u
        } else if g < 0.0 {
            (u + disc.max(0.0).sqrt()) / (-g)
        } else {
            if disc < 0.0 {
                return Ok(f64::INFINITY);
            }
            (-u - disc.sqrt()) / g
        };

        if time < 0.0 {
            if ignore_overlap {
                return Ok(0.0);
            }
            return Err(Error::NegativeTime {
                kind,
                time,
                discriminant: disc,
            });
        }
        Ok(time)
    }

    /// Elastic collision with particle `p` at `false_time`.
    ///
    /// Both the particle and the wall are back-corrected so their positions
    /// at the event time are unchanged.
    pub fn bump(
        &mut self,
        p: &mut Particle,
        inv_mass: f64,
        boundary: &Boundary,
        false_time: f64,
    ) -> Result<Bump> {
        let inv_sum = inv_mass + self.inv_mass;
        if inv_sum == 0.0 {
            return Err(Error::MathError(format!(
                "immovable particle {} against a stationary piston",
                p.id
            )));
        }
        let axis = self.axis;
        let (_, wall_v) = self.state_at(false_time, boundary);
        let dp = 2.0 * (wall_v - p.v[axis]) / inv_sum;

        let dv_particle = inv_mass * dp;
        p.v[axis] += dv_particle;
        p.r[axis] -= false_time * dv_particle;

        if !self.is_stationary() {
            let dv_wall = -self.inv_mass * dp;
            self.velocity += dv_wall;
            self.position -= false_time * dv_wall;
        }

        let mut impulse = ZERO;
        impulse[axis] = dp;
        Ok(Bump {
            transition: Transition::Wall,
            impulse,
            virial: 0.0,
            energy_change: 0.0,
        })
    }
}
