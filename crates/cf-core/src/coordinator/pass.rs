//! Generation tokens and the completion barrier of one pass kind

use serde::{Deserialize, Serialize};

/// Generation token of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PassToken(pub u64);

/// Outcome of asking for a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassRequest {
    /// No pass was active; a new one starts with this token
    Start(PassToken),
    /// A pass is in flight; the request was folded into its follow-up
    Coalesced(PassToken),
    /// Refresh is disabled, nothing happens
    Disabled,
}

/// What happens once the last widget of a pass has reported back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassClose {
    /// No request arrived meanwhile
    Idle,
    /// A newer request arrived; a follow-up pass is owed
    Retrigger,
}

/// Per-kind state machine: `Idle -> PassActive -> Idle`
#[derive(Debug, Default)]
pub struct PassState {
    next_token: u64,
    /// Token of the most recent request; `Some` while a pass is active
    latest: Option<PassToken>,
    /// Token of the pass whose completions are being counted
    running: Option<PassToken>,
    completed: usize,
    expected: usize,
    passes: usize,
}

impl PassState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request. Only the first request of an idle state starts a
    /// pass; later ones overwrite the latest token.
    pub fn request(&mut self) -> PassRequest {
        let token = PassToken(self.next_token);
        self.next_token += 1;

        let was_idle = self.latest.is_none();
        self.latest = Some(token);
        if was_idle {
            self.passes += 1;
            PassRequest::Start(token)
        } else {
            PassRequest::Coalesced(token)
        }
    }

    /// Arm the completion counter for a freshly started pass
    pub fn begin(&mut self, token: PassToken, expected: usize) {
        self.running = Some(token);
        self.completed = 0;
        self.expected = expected;
    }

    /// Count one widget completion (success or failure) of `token`.
    /// Returns `Some` when this was the last outstanding widget.
    pub fn complete_one(&mut self, token: PassToken) -> Option<PassClose> {
        if self.running != Some(token) {
            return None;
        }
        self.completed += 1;
        if self.completed < self.expected {
            return None;
        }
        Some(self.close(token))
    }

    /// Close a pass outright; used when it has no asynchronous widgets
    pub fn close(&mut self, token: PassToken) -> PassClose {
        self.completed = 0;
        self.running = None;
        let superseded = self.latest != Some(token);
        self.latest = None;
        if superseded {
            PassClose::Retrigger
        } else {
            PassClose::Idle
        }
    }

    /// Whether `token` is still the most recent request
    pub fn is_current(&self, token: PassToken) -> bool {
        self.latest == Some(token)
    }

    pub fn is_idle(&self) -> bool {
        self.latest.is_none()
    }

    /// Number of passes started so far
    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn expected(&self) -> usize {
        self.expected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_during_a_pass_coalesce() {
        let mut state = PassState::new();

        let first = match state.request() {
            PassRequest::Start(token) => token,
            other => panic!("expected a new pass, got {:?}", other),
        };
        state.begin(first, 3);
        assert!(matches!(state.request(), PassRequest::Coalesced(_)));
        assert!(matches!(state.request(), PassRequest::Coalesced(_)));
        assert_eq!(state.passes(), 1);
        assert!(!state.is_current(first));

        assert_eq!(state.complete_one(first), None);
        assert_eq!(state.complete_one(first), None);
        assert_eq!(state.complete_one(first), Some(PassClose::Retrigger));
        assert!(state.is_idle());

        let second = match state.request() {
            PassRequest::Start(token) => token,
            other => panic!("expected a follow-up pass, got {:?}", other),
        };
        assert!(second > first);
        state.begin(second, 1);
        assert_eq!(state.complete_one(second), Some(PassClose::Idle));
        assert_eq!(state.passes(), 2);
    }

    #[test]
    fn test_completions_of_other_tokens_are_ignored() {
        let mut state = PassState::new();
        let token = match state.request() {
            PassRequest::Start(token) => token,
            _ => unreachable!(),
        };
        state.begin(token, 1);
        assert_eq!(state.complete_one(PassToken(99)), None);
        assert!(!state.is_idle());
        assert_eq!(state.complete_one(token), Some(PassClose::Idle));
    }
}
