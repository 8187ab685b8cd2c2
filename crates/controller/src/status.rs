//! Status state machine: the next status is a pure function of this cycle's observations.

use jso_core::{JsonServerStatus, SyncState};

pub const MSG_UPDATING: &str = "Updating";
pub const MSG_SYNCED: &str = "Synced successfully!";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusInputs {
    pub critical_errors: Vec<String>,
    pub actions_executed: usize,
    /// Available workload replicas; `None` when the observation failed.
    pub observed_replicas: Option<i32>,
    pub requested_replicas: Option<i32>,
    pub selector: Option<String>,
}

/// First match wins: errors, then executed actions, then replica mismatch, else synced.
pub fn next_status(input: &StatusInputs) -> JsonServerStatus {
    let (state, message) = if !input.critical_errors.is_empty() {
        (SyncState::Error, input.critical_errors.join("; "))
    } else if input.actions_executed > 0 {
        (SyncState::NotSynced, MSG_UPDATING.to_string())
    } else {
        match (input.observed_replicas, input.requested_replicas) {
            (Some(have), Some(want)) if have != want => {
                (SyncState::NotSynced, format!("AvailableReplicas {} of {}", have, want))
            }
            _ => (SyncState::Synced, MSG_SYNCED.to_string()),
        }
    };
    JsonServerStatus { state, message, replicas: input.observed_replicas, selector: input.selector.clone() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(errors: &[&str], actions: usize, observed: Option<i32>, requested: Option<i32>) -> StatusInputs {
        StatusInputs {
            critical_errors: errors.iter().map(|s| s.to_string()).collect(),
            actions_executed: actions,
            observed_replicas: observed,
            requested_replicas: requested,
            selector: Some("app=app-a".into()),
        }
    }

    #[test]
    fn errors_outrank_everything() {
        let st = next_status(&inputs(&["x"], 3, Some(0), Some(2)));
        assert_eq!(st.state, SyncState::Error);
        assert_eq!(st.message, "x");

        let st = next_status(&inputs(&["a", "b"], 0, None, None));
        assert_eq!(st.message, "a; b");
    }

    #[test]
    fn actions_outrank_replica_mismatch() {
        let st = next_status(&inputs(&[], 1, Some(0), Some(2)));
        assert_eq!((st.state, st.message.as_str()), (SyncState::NotSynced, "Updating"));
        assert_eq!(st.replicas, Some(0));
    }

    #[test]
    fn replica_mismatch_reports_progress() {
        let st = next_status(&inputs(&[], 0, Some(1), Some(3)));
        assert_eq!((st.state, st.message.as_str()), (SyncState::NotSynced, "AvailableReplicas 1 of 3"));
    }

    #[test]
    fn synced_when_nothing_to_do() {
        for (observed, requested) in [(Some(2), Some(2)), (Some(5), None), (None, Some(2)), (None, None)] {
            let st = next_status(&inputs(&[], 0, observed, requested));
            assert_eq!((st.state, st.message.as_str()), (SyncState::Synced, "Synced successfully!"));
            assert_eq!(st.replicas, observed);
        }
    }

    #[test]
    fn precedence_holds_across_input_grid() {
        for errs in [0usize, 1, 2] {
            for actions in [0usize, 1, 3] {
                for observed in [None, Some(0), Some(2)] {
                    for requested in [None, Some(0), Some(2)] {
                        let errors: Vec<String> = (0..errs).map(|i| format!("e{}", i)).collect();
                        let st = next_status(&StatusInputs {
                            critical_errors: errors,
                            actions_executed: actions,
                            observed_replicas: observed,
                            requested_replicas: requested,
                            selector: None,
                        });
                        let expected = if errs > 0 {
                            SyncState::Error
                        } else if actions > 0 || matches!((observed, requested), (Some(o), Some(r)) if o != r) {
                            SyncState::NotSynced
                        } else {
                            SyncState::Synced
                        };
                        assert_eq!(st.state, expected, "errs={} actions={} obs={:?} req={:?}", errs, actions, observed, requested);
                    }
                }
            }
        }
    }
}
