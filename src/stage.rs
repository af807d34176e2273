//! Pipeline stages and their fixed forward order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One state of the transformation pipeline.
///
/// ```text
/// Idle → Validating → Parsing → Mapping → Formatting → Verifying → Packaging → Done
///   ▲         └──────────┴─────────┴──────────┴────────────┴───────────┴──→ Error
///   └──────────────────────── reset() ─────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Stage {
    #[default]
    Idle,
    Validating,
    Parsing,
    Mapping,
    Formatting,
    Verifying,
    Packaging,
    Done,
    Error,
}

impl Stage {
    /// The working stages, in execution order.
    pub const STEPS: [Stage; 6] = [
        Stage::Validating,
        Stage::Parsing,
        Stage::Mapping,
        Stage::Formatting,
        Stage::Verifying,
        Stage::Packaging,
    ];

    /// Successor on the success path. `None` for terminal states.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Idle => Some(Stage::Validating),
            Stage::Validating => Some(Stage::Parsing),
            Stage::Parsing => Some(Stage::Mapping),
            Stage::Mapping => Some(Stage::Formatting),
            Stage::Formatting => Some(Stage::Verifying),
            Stage::Verifying => Some(Stage::Packaging),
            Stage::Packaging => Some(Stage::Done),
            Stage::Done | Stage::Error => None,
        }
    }

    /// `Done` and `Error` end a run; only `reset()` leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Error)
    }

    /// A run is in flight between leaving `Idle` and reaching a terminal state.
    pub fn is_running(self) -> bool {
        !matches!(self, Stage::Idle | Stage::Done | Stage::Error)
    }

    /// 0-based position among [`Stage::STEPS`], for progress displays.
    pub fn step_index(self) -> Option<usize> {
        Self::STEPS.iter().position(|s| *s == self)
    }

    /// Whether `to` is a legal transition from `self`.
    ///
    /// `Error` is reachable from any working stage; `Idle` from anywhere
    /// through a reset.
    pub fn can_transition_to(self, to: Stage) -> bool {
        match to {
            Stage::Idle => true,
            Stage::Error => self.is_running(),
            _ => self.next() == Some(to),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Idle => "Idle",
            Stage::Validating => "Validating",
            Stage::Parsing => "Parsing",
            Stage::Mapping => "Mapping",
            Stage::Formatting => "Formatting",
            Stage::Verifying => "Verifying",
            Stage::Packaging => "Packaging",
            Stage::Done => "Done",
            Stage::Error => "Error",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_path_walks_every_step_once() {
        let mut seen = Vec::new();
        let mut s = Stage::Idle;
        while let Some(n) = s.next() {
            seen.push(n);
            s = n;
        }
        assert_eq!(s, Stage::Done);
        assert_eq!(&seen[..6], &Stage::STEPS);
        assert_eq!(seen.last(), Some(&Stage::Done));
    }

    #[test]
    fn no_skipping_or_reentry() {
        assert!(Stage::Validating.can_transition_to(Stage::Parsing));
        assert!(!Stage::Validating.can_transition_to(Stage::Mapping));
        assert!(!Stage::Mapping.can_transition_to(Stage::Parsing));
        assert!(!Stage::Done.can_transition_to(Stage::Validating));
    }

    #[test]
    fn error_only_from_working_stages() {
        for s in Stage::STEPS {
            assert!(s.can_transition_to(Stage::Error), "{s}");
        }
        assert!(!Stage::Idle.can_transition_to(Stage::Error));
        assert!(!Stage::Done.can_transition_to(Stage::Error));
        assert!(!Stage::Error.can_transition_to(Stage::Error));
    }

    #[test]
    fn reset_is_always_legal() {
        assert!(Stage::Done.can_transition_to(Stage::Idle));
        assert!(Stage::Error.can_transition_to(Stage::Idle));
        assert!(Stage::Mapping.can_transition_to(Stage::Idle));
    }

    #[test]
    fn step_index_covers_working_stages_only() {
        assert_eq!(Stage::Validating.step_index(), Some(0));
        assert_eq!(Stage::Packaging.step_index(), Some(5));
        assert_eq!(Stage::Idle.step_index(), None);
        assert_eq!(Stage::Done.step_index(), None);
    }
}
