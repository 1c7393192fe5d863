use crate::core::EventKind;
use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the hard-particle engine.
///
/// Geometric and ordering faults (`Overlap`, `NegativeTime`, `TimeMachine`,
/// `StaleSchedule`) mean the event stream can no longer be trusted; see
/// [`Error::is_unrecoverable`]. Everything else is a caller mistake surfaced
/// before any state is touched.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid user or API parameter.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Numerical issue that is not a geometric inconsistency (e.g. two infinite masses colliding).
    #[error("numerical error: {0}")]
    MathError(String),

    /// Participants found inside a hard core (or behind a wall) while still approaching.
    #[error("overlap in {kind}: separation {separation:.6e}, approach rate {approach:.6e}")]
    Overlap {
        kind: EventKind,
        separation: f64,
        approach: f64,
    },

    /// A predictor produced a collision time in the past.
    #[error("negative collision time {time:.6e} in {kind} (discriminant {discriminant:.6e})")]
    NegativeTime {
        kind: EventKind,
        time: f64,
        discriminant: f64,
    },

    /// The next event precedes one that was already resolved.
    #[error("event at t={time} precedes the previous event at t={previous}")]
    TimeMachine { time: f64, previous: f64 },

    /// The live schedule disagrees with a from-scratch recomputation.
    #[error("stale prediction for particle {particle}: scheduled {live}, recomputed {fresh}")]
    StaleSchedule {
        particle: usize,
        live: f64,
        fresh: f64,
    },

    /// Malformed configuration document.
    #[error(transparent)]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for faults that invalidate the global event stream.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            Error::Overlap { .. }
                | Error::NegativeTime { .. }
                | Error::TimeMachine { .. }
                | Error::StaleSchedule { .. }
        )
    }
}
