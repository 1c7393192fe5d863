//! Measurements built on the collision-listener hook.

use crate::core::listener::{Collision, CollisionListener};
use crate::core::EventKind;
use crate::error::{Error, Result};

/// Mechanical pressure on the piston from the impulses it receives.
///
/// `pressure = sum |dp| / (elapsed * area)` where `dp` is the momentum
/// handed to each particle bouncing off the wall.
#[derive(Debug, Clone, Default)]
pub struct PistonPressure {
    start: f64,
    impulse: f64,
    hits: u64,
}

impl PistonPressure {
    /// Meter that starts accumulating at `start` (usually the current time).
    pub fn new(start: f64) -> Self {
        Self {
            start,
            ..Self::default()
        }
    }

    pub fn total_impulse(&self) -> f64 {
        self.impulse
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Average pressure over `[start, now]` on a wall of cross-section `area`.
    pub fn pressure(&self, now: f64, area: f64) -> Result<f64> {
        let elapsed = now - self.start;
        if !(elapsed.is_finite() && elapsed > 0.0 && area.is_finite() && area > 0.0) {
            return Err(Error::InvalidParam(format!(
                "pressure needs a positive window and area (elapsed {elapsed}, area {area})"
            )));
        }
        Ok(self.impulse / (elapsed * area))
    }

    /// Drop the accumulated impulse and restart the window at `start`.
    pub fn restart(&mut self, start: f64) {
        *self = Self::new(start);
    }
}

impl CollisionListener for PistonPressure {
    fn collision_action(&mut self, collision: &Collision) {
        if let EventKind::Piston { .. } = collision.kind {
            let dp: f64 = collision.bump.impulse.iter().map(|x| x * x).sum::<f64>().sqrt();
            self.impulse += dp;
            self.hits += 1;
        }
    }
}

/// Counts resolved events by kind and keeps the running virial sum.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollisionCounter {
    pub pairs: u64,
    pub walls: u64,
    pub piston: u64,
    /// Sum of `r . dp` over pair events.
    pub virial_sum: f64,
    /// Net potential-energy change reported by the bumps.
    pub energy_change: f64,
}

impl CollisionCounter {
    pub fn total(&self) -> u64 {
        self.pairs + self.walls + self.piston
    }
}

impl CollisionListener for CollisionCounter {
    fn collision_action(&mut self, collision: &Collision) {
        match collision.kind {
            EventKind::Pair { .. } => {
                self.pairs += 1;
                self.virial_sum += collision.bump.virial;
            }
            EventKind::Wall { .. } => self.walls += 1,
            EventKind::Piston { .. } => self.piston += 1,
            EventKind::Recheck { .. } => {}
        }
        self.energy_change += collision.bump.energy_change;
    }
}
