//! Event-driven molecular dynamics for hard particles.
//!
//! Particles interact through stepwise pair potentials (hard spheres, square
//! wells, general shoulder/well ladders), bounce off fixed box walls and off
//! an optional pressure-driven piston. Between events everything moves
//! ballistically; the engine jumps from one collision to the next.
//!
//! ```
//! use hardmd::config::EngineConfig;
//! use hardmd::core::{Boundary, PairPotential, Simulation};
//!
//! let mut sim = Simulation::random_gas(
//!     EngineConfig { seed: Some(1), ..EngineConfig::default() },
//!     Boundary::periodic([8.0, 8.0, 8.0]).unwrap(),
//!     16,
//!     1.0,
//!     PairPotential::square_well(1.0, 1.5, 1.0).unwrap(),
//!     1.0,
//! )
//! .unwrap();
//! sim.advance_to(1.0).unwrap();
//! assert!(sim.current_time() >= 1.0);
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod meters;

#[cfg(feature = "python")]
mod python;

pub use crate::config::{EngineConfig, Thermostat};
pub use crate::core::Simulation;
pub use crate::error::{Error, Result};
