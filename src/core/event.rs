use crate::error::{Error, Result};
use ordered_float::NotNan;
use std::cmp::Ordering;
use std::fmt;

/// What a scheduled event involves.
///
/// The particle owning the event is always `i`. For `Pair`, `j` is one of its
/// up-neighbors. `Recheck` is bookkeeping: nothing collides, the particle's
/// predictions are refreshed before a periodic image could slip past them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Pair transition between particle `i` and its up-neighbor `j`.
    Pair { i: usize, j: usize },
    /// Particle `i` hitting fixed box wall `wall_id`.
    Wall { i: usize, wall_id: u32 },
    /// Particle `i` hitting the moving boundary.
    Piston { i: usize },
    /// Particle `i` travelled its re-prediction distance in a periodic box.
    Recheck { i: usize },
}

impl EventKind {
    #[inline]
    pub fn primary(&self) -> usize {
        match *self {
            EventKind::Pair { i, .. }
            | EventKind::Wall { i, .. }
            | EventKind::Piston { i }
            | EventKind::Recheck { i } => i,
        }
    }

    /// Second particle, `None` for one-body events.
    #[inline]
    pub fn partner(&self) -> Option<usize> {
        match *self {
            EventKind::Pair { j, .. } => Some(j),
            _ => None,
        }
    }

    #[inline]
    pub fn is_piston(&self) -> bool {
        matches!(self, EventKind::Piston { .. })
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            EventKind::Pair { i, j } => write!(f, "pair ({i}, {j})"),
            EventKind::Wall { i, wall_id } => write!(f, "particle {i} / wall {wall_id}"),
            EventKind::Piston { i } => write!(f, "particle {i} / piston"),
            EventKind::Recheck { i } => write!(f, "particle {i} recheck"),
        }
    }
}

/// A scheduled event with a deterministic total order.
///
/// - `time`: absolute event time (finite, non-NaN).
/// - `seq`: registration sequence number; among equal times the earlier registration wins.
/// - `kind`: participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub time: NotNan<f64>,
    pub seq: u64,
    pub kind: EventKind,
}

impl Event {
    /// Create a new event, validating that time is finite and non-NaN.
    pub fn new(time: f64, seq: u64, kind: EventKind) -> Result<Self> {
        if !time.is_finite() {
            return Err(Error::InvalidParam(format!(
                "event time must be finite, got {time} for {kind}"
            )));
        }
        let time = NotNan::new(time)
            .map_err(|_| Error::InvalidParam("event time cannot be NaN".into()))?;
        Ok(Self { time, seq, kind })
    }

    /// Returns the raw f64 event time.
    #[inline]
    pub fn time_f64(&self) -> f64 {
        self.time.into_inner()
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
