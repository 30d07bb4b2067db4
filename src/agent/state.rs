//! Turn state types

use std::fmt;

/// Where the agent is within the current turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    /// No turn has run yet
    #[default]
    Idle,

    /// Request for `round` in flight
    AwaitingModel { round: u32 },

    /// Running the tool calls returned in `round`
    ExecutingTools { round: u32 },

    /// Final answer produced
    Done,

    Interrupted,

    /// Protocol error or round cap
    Failed,
}

impl TurnState {
    /// No turn in progress; a new one may start
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            TurnState::Idle | TurnState::Done | TurnState::Interrupted | TurnState::Failed
        )
    }

    pub fn is_working(self) -> bool {
        !self.is_settled()
    }

    pub fn can_transition_to(self, next: TurnState) -> bool {
        use TurnState::{AwaitingModel, Done, ExecutingTools, Failed, Interrupted};

        match (self, next) {
            (from, AwaitingModel { round: 1 } | Interrupted | Failed) if from.is_settled() => true,
            (AwaitingModel { round }, ExecutingTools { round: next }) => round == next,
            (ExecutingTools { round }, AwaitingModel { round: next }) => next == round + 1,
            (AwaitingModel { .. } | ExecutingTools { .. }, Done | Interrupted | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnState::Idle => write!(f, "idle"),
            TurnState::AwaitingModel { round } => write!(f, "awaiting model (round {round})"),
            TurnState::ExecutingTools { round } => write!(f, "executing tools (round {round})"),
            TurnState::Done => write!(f, "done"),
            TurnState::Interrupted => write!(f, "interrupted"),
            TurnState::Failed => write!(f, "failed"),
        }
    }
}

/// How a call to `Agent::ask` ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed(String),
    Interrupted,
    Failed(String),
}

impl TurnOutcome {
    pub fn text(&self) -> Option<&str> {
        match self {
            TurnOutcome::Completed(text) => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let path = [
            TurnState::Idle,
            TurnState::AwaitingModel { round: 1 },
            TurnState::ExecutingTools { round: 1 },
            TurnState::AwaitingModel { round: 2 },
            TurnState::Done,
            TurnState::AwaitingModel { round: 1 },
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_rounds_cannot_skip() {
        assert!(!TurnState::ExecutingTools { round: 1 }
            .can_transition_to(TurnState::AwaitingModel { round: 3 }));
        assert!(!TurnState::AwaitingModel { round: 2 }
            .can_transition_to(TurnState::ExecutingTools { round: 1 }));
        assert!(!TurnState::Idle.can_transition_to(TurnState::AwaitingModel { round: 2 }));
    }

    #[test]
    fn test_interrupt_reachable_from_working_states() {
        for state in [
            TurnState::AwaitingModel { round: 4 },
            TurnState::ExecutingTools { round: 4 },
        ] {
            assert!(state.is_working());
            assert!(state.can_transition_to(TurnState::Interrupted));
            assert!(state.can_transition_to(TurnState::Failed));
        }
        assert!(!TurnState::Done.can_transition_to(TurnState::Done));
        assert!(!TurnState::Idle.can_transition_to(TurnState::ExecutingTools { round: 1 }));
    }

    #[test]
    fn test_outcome_text() {
        assert_eq!(TurnOutcome::Completed("hi".into()).text(), Some("hi"));
        assert_eq!(TurnOutcome::Interrupted.text(), None);
    }
}
