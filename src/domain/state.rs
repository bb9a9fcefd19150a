use serde::{Deserialize, Serialize};
use std::fmt;

/// Mapping session lifecycle phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    /// No session exists
    Closed,
    /// Session opened, station snapshot fetch in flight
    Loading,
    /// Operator may select tools and slots
    Ready,
    /// Job start request in flight, bindings frozen
    Submitting,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Closed => "CLOSED",
            SessionPhase::Loading => "LOADING",
            SessionPhase::Ready => "READY",
            SessionPhase::Submitting => "SUBMITTING",
        }
    }

    /// Check if this phase can transition to another phase
    pub fn can_transition_to(&self, target: SessionPhase) -> bool {
        use SessionPhase::*;

        match (self, target) {
            // open(job)
            (Closed, Loading) => true,

            // Fetch resolved (successfully or not)
            (Loading, Ready) => true,

            // Select/bind/remove and in-place snapshot refresh
            (Ready, Ready) => true,

            // submit() with a complete mapping
            (Ready, Submitting) => true,

            // Executor succeeded / failed
            (Submitting, Closed) => true,
            (Submitting, Ready) => true,

            // Explicit cancel
            (Loading, Closed) => true,
            (Ready, Closed) => true,

            _ => false,
        }
    }

    /// Can the operator change selection or bindings in this phase?
    pub fn accepts_edits(&self) -> bool {
        matches!(self, SessionPhase::Loading | SessionPhase::Ready)
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, SessionPhase::Closed)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for SessionPhase {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "CLOSED" => Ok(SessionPhase::Closed),
            "LOADING" => Ok(SessionPhase::Loading),
            "READY" => Ok(SessionPhase::Ready),
            "SUBMITTING" => Ok(SessionPhase::Submitting),
            _ => Err(format!("Unknown phase: {}", s)),
        }
    }
}
