//! Event-driven engine for hard (stepwise) potentials.
//!
//! Bottom-up: `vector` and `particle` hold the state, `boundary`,
//! `neighbors` and `potential` are the collaborators the engine reads,
//! `collision` and `piston` predict and resolve single events, `event` and
//! `queue` order them, and `sim` drives the loop.

pub mod boundary;
pub mod collision;
pub mod event;
pub mod init;
pub mod listener;
pub mod neighbors;
pub mod particle;
pub mod piston;
pub mod potential;
pub mod queue;
pub mod sim;
pub mod vector;

pub use boundary::Boundary;
pub use collision::{Bump, Transition};
pub use event::{Event, EventKind};
pub use listener::{Collision, CollisionListener, ListenerId};
pub use neighbors::{NeighborLists, NeighborSource};
pub use particle::{Particle, Species};
pub use piston::{GasSide, MovingBoundary};
pub use potential::{Ladder, PairPotential, PotentialRegistry};
pub use queue::EventQueue;
pub use sim::Simulation;
pub use vector::{Vector, DIM};
