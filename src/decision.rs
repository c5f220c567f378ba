//! Strategies deciding the agent's next move.
//!
//! This module defines the [`Strategy`] trait and the only strategy shipped with this crate,
//! [`GrimTrigger`] (the "Friedman" strategy).
//!
//! A strategy is a pure state machine: it never performs I/O and is always called with
//! exclusive access to its own memory. Serializing concurrent calls is the job of the
//! [`AgentService`](crate::service::AgentService).

use std::fmt;

/// What the opponent did in the round that just completed.
///
/// `None` covers both "the opponent did not defect" and "a new game starts". The playing field
/// decides when a game begins by sending `None`.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum OpponentSignal {
    /// No prior round, reset, or no defection.
    None,
    /// The opponent defected.
    Defected,
}

/// The move the agent plays in the upcoming round.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum OwnMove {
    /// Cooperate with the opponent.
    Cooperate,
    /// Defect against the opponent.
    Defect,
}

impl fmt::Display for OpponentSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpponentSignal::None => write!(f, "NONE"),
            OpponentSignal::Defected => write!(f, "DEFECTED"),
        }
    }
}

impl fmt::Display for OwnMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnMove::Cooperate => write!(f, "COOPERATE"),
            OwnMove::Defect => write!(f, "DEFECT"),
        }
    }
}

/// A policy producing the next move from the latest opponent signal.
///
/// Implementations hold their own memory and must not perform blocking work in
/// [`decide`](Strategy::decide): it runs inside the service's critical section.
pub trait Strategy: Send {
    /// Display name announced to the playing field.
    fn name(&self) -> &str;

    /// Consume the latest opponent signal and return the move for the next round.
    fn decide(&mut self, signal: OpponentSignal) -> OwnMove;
}

/// Grim trigger collapsed to two states: cooperating and triggered.
///
/// Cooperates until the opponent defects, then defects on every round until the playing
/// field sends [`OpponentSignal::None`]. There is no forgiveness path besides that reset.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GrimTrigger {
    triggered: bool,
}

impl GrimTrigger {
    /// Display name used when registering.
    pub const NAME: &'static str = "Friedman";

    /// A fresh, untriggered strategy.
    pub fn new() -> Self {
        Self { triggered: false }
    }

    /// True if the opponent defected since the last reset.
    pub fn is_triggered(&self) -> bool {
        self.triggered
    }
}

impl Strategy for GrimTrigger {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn decide(&mut self, signal: OpponentSignal) -> OwnMove {
        self.triggered = match signal {
            OpponentSignal::Defected => true,
            OpponentSignal::None => false,
        };

        if self.triggered {
            OwnMove::Defect
        } else {
            OwnMove::Cooperate
        }
    }
}
