use notify_core::types::{Notification, NotificationState};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Default bound on failed attempts that may be re-admitted.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Named lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Approve,
    Send,
    MarkAsSent,
    MarkAsFailed,
    Retry,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Approve => "approve",
            Transition::Send => "send",
            Transition::MarkAsSent => "mark_as_sent",
            Transition::MarkAsFailed => "mark_as_failed",
            Transition::Retry => "retry",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra precondition evaluated after the source state matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Always,
    RetriesRemaining,
}

/// Describes a single valid state transition.
#[derive(Debug, Clone, Copy)]
pub struct TransitionRule {
    pub transition: Transition,
    pub from: NotificationState,
    pub to: NotificationState,
    pub guard: Guard,
}

/// Result of applying a transition. A failed guard is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum TransitionOutcome {
    Applied {
        from: NotificationState,
        to: NotificationState,
    },
    NotPermitted {
        state: NotificationState,
    },
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Guards the notification lifecycle by enforcing a finite table of
/// transitions.
#[derive(Debug, Clone)]
pub struct NotificationStateMachine {
    rules: Vec<TransitionRule>,
    max_retries: u32,
}

impl NotificationStateMachine {
    pub fn new() -> Self {
        Self::with_max_retries(DEFAULT_MAX_RETRIES)
    }

    pub fn with_max_retries(max_retries: u32) -> Self {
        use NotificationState::*;

        let rules = vec![
            TransitionRule {
                transition: Transition::Approve,
                from: Draft,
                to: Approved,
                guard: Guard::Always,
            },
            TransitionRule {
                transition: Transition::Send,
                from: Approved,
                to: Sending,
                guard: Guard::Always,
            },
            TransitionRule {
                transition: Transition::MarkAsSent,
                from: Sending,
                to: Sent,
                guard: Guard::Always,
            },
            TransitionRule {
                transition: Transition::MarkAsFailed,
                from: Sending,
                to: Failed,
                guard: Guard::Always,
            },
            TransitionRule {
                transition: Transition::Retry,
                from: Failed,
                to: Approved,
                guard: Guard::RetriesRemaining,
            },
        ];

        Self { rules, max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn rule_for(&self, notification: &Notification, transition: Transition) -> Option<&TransitionRule> {
        self.rules
            .iter()
            .find(|r| r.transition == transition && r.from == notification.state)
            .filter(|r| match r.guard {
                Guard::Always => true,
                Guard::RetriesRemaining => notification.retry_count < self.max_retries,
            })
    }

    /// Returns `true` if `transition` may be applied in the current state.
    pub fn can(&self, notification: &Notification, transition: Transition) -> bool {
        self.rule_for(notification, transition).is_some()
    }

    /// Transitions currently permitted for the notification.
    pub fn enabled_transitions(&self, notification: &Notification) -> Vec<Transition> {
        self.rules
            .iter()
            .map(|r| r.transition)
            .filter(|t| self.can(notification, *t))
            .collect()
    }

    /// Moves the notification's state if the guard holds. The caller persists.
    pub fn apply(&self, notification: &mut Notification, transition: Transition) -> TransitionOutcome {
        let Some(rule) = self.rule_for(notification, transition) else {
            info!(
                notification_id = %notification.id,
                transition = %transition,
                current_state = %notification.state,
                "Transition not permitted"
            );
            return TransitionOutcome::NotPermitted {
                state: notification.state,
            };
        };

        let (from, to) = (rule.from, rule.to);
        notification.state = to;
        info!(
            notification_id = %notification.id,
            channel = %notification.channel,
            transition = %transition,
            from = %from,
            to = %to,
            "Transition applied"
        );
        TransitionOutcome::Applied { from, to }
    }
}

impl Default for NotificationStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify_core::types::Channel;

    fn in_state(state: NotificationState) -> Notification {
        let mut n = Notification::new(Channel::Email, "a@x.com", "hi");
        n.state = state;
        n
    }

    const ALL_TRANSITIONS: [Transition; 5] = [
        Transition::Approve,
        Transition::Send,
        Transition::MarkAsSent,
        Transition::MarkAsFailed,
        Transition::Retry,
    ];

    #[test]
    fn test_each_transition_permitted_only_from_its_source() {
        let sm = NotificationStateMachine::new();
        let expected = [
            (Transition::Approve, NotificationState::Draft, NotificationState::Approved),
            (Transition::Send, NotificationState::Approved, NotificationState::Sending),
            (Transition::MarkAsSent, NotificationState::Sending, NotificationState::Sent),
            (Transition::MarkAsFailed, NotificationState::Sending, NotificationState::Failed),
            (Transition::Retry, NotificationState::Failed, NotificationState::Approved),
        ];

        for (transition, source, target) in expected {
            for state in NotificationState::ALL {
                let mut n = in_state(state);
                let permitted = sm.can(&n, transition);
                assert_eq!(permitted, state == source, "{transition} from {state}");

                let outcome = sm.apply(&mut n, transition);
                if state == source {
                    assert_eq!(outcome, TransitionOutcome::Applied { from: source, to: target });
                    assert_eq!(n.state, target);
                } else {
                    assert_eq!(outcome, TransitionOutcome::NotPermitted { state });
                    assert_eq!(n.state, state);
                }
            }
        }
    }

    #[test]
    fn test_retry_guard_uses_retry_count() {
        let sm = NotificationStateMachine::new();
        let mut n = in_state(NotificationState::Failed);

        n.retry_count = 2;
        assert!(sm.can(&n, Transition::Retry));

        n.retry_count = 3;
        assert!(!sm.can(&n, Transition::Retry));
        assert!(!sm.apply(&mut n, Transition::Retry).is_applied());
        assert_eq!(n.state, NotificationState::Failed);
    }

    #[test]
    fn test_retry_does_not_touch_retry_count() {
        let sm = NotificationStateMachine::new();
        let mut n = in_state(NotificationState::Failed);
        n.retry_count = 1;
        assert!(sm.apply(&mut n, Transition::Retry).is_applied());
        assert_eq!(n.retry_count, 1);
    }

    #[test]
    fn test_custom_retry_bound() {
        let sm = NotificationStateMachine::with_max_retries(1);
        let mut n = in_state(NotificationState::Failed);
        n.retry_count = 1;
        assert!(!sm.can(&n, Transition::Retry));
    }

    #[test]
    fn test_enabled_transitions() {
        let sm = NotificationStateMachine::new();
        assert_eq!(
            sm.enabled_transitions(&in_state(NotificationState::Sending)),
            vec![Transition::MarkAsSent, Transition::MarkAsFailed]
        );
        assert!(sm
            .enabled_transitions(&in_state(NotificationState::Sent))
            .is_empty());
        for t in ALL_TRANSITIONS {
            assert!(!sm.can(&in_state(NotificationState::Sent), t));
        }
    }
}
