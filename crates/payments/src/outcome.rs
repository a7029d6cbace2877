//! Pure reconciliation decision: given the current payment status and a
//! reported provider outcome, what (if anything) should change.

use serde::{Deserialize, Serialize};

use jobboard_jobs::JobStatus;

use crate::payment::PaymentStatus;

/// Provider outcome after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportedOutcome {
    Success,
    Failed,
    Cancelled,
    Expired,
    /// Provider could not (yet) say. Never changes state.
    Unknown,
}

impl ReportedOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportedOutcome::Success => "SUCCESS",
            ReportedOutcome::Failed => "FAILED",
            ReportedOutcome::Cancelled => "CANCELLED",
            ReportedOutcome::Expired => "EXPIRED",
            ReportedOutcome::Unknown => "UNKNOWN",
        }
    }

    /// The state pair this outcome settles a pending payment into.
    pub fn transition(&self) -> Option<Transition> {
        match self {
            ReportedOutcome::Success => Some(Transition {
                payment_status: PaymentStatus::Success,
                job_status: Some(JobStatus::Published),
            }),
            ReportedOutcome::Failed | ReportedOutcome::Expired => Some(Transition {
                payment_status: PaymentStatus::Failed,
                job_status: Some(JobStatus::Rejected),
            }),
            // The job stays pending so the owner can retry checkout.
            ReportedOutcome::Cancelled => Some(Transition {
                payment_status: PaymentStatus::Cancelled,
                job_status: None,
            }),
            ReportedOutcome::Unknown => None,
        }
    }
}

impl core::fmt::Display for ReportedOutcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target statuses for one settlement. `job_status: None` leaves the job untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub payment_status: PaymentStatus,
    pub job_status: Option<JobStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Payment is pending and the outcome is determinate.
    Apply(Transition),
    /// Payment already reached this terminal status; nothing to do.
    AlreadySettled(PaymentStatus),
    /// Outcome is `Unknown`; nothing to do.
    Undetermined,
}

/// First terminal outcome wins; everything after it is a no-op.
pub fn decide(current: PaymentStatus, outcome: ReportedOutcome) -> Decision {
    if current.is_terminal() {
        return Decision::AlreadySettled(current);
    }
    match outcome.transition() {
        Some(t) => Decision::Apply(t),
        None => Decision::Undetermined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn success_publishes_job() {
        let d = decide(PaymentStatus::Pending, ReportedOutcome::Success);
        assert_eq!(
            d,
            Decision::Apply(Transition {
                payment_status: PaymentStatus::Success,
                job_status: Some(JobStatus::Published),
            })
        );
    }

    #[test]
    fn expired_is_recorded_as_failed() {
        match decide(PaymentStatus::Pending, ReportedOutcome::Expired) {
            Decision::Apply(t) => {
                assert_eq!(t.payment_status, PaymentStatus::Failed);
                assert_eq!(t.job_status, Some(JobStatus::Rejected));
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[test]
    fn cancel_leaves_job_pending() {
        match decide(PaymentStatus::Pending, ReportedOutcome::Cancelled) {
            Decision::Apply(t) => {
                assert_eq!(t.payment_status, PaymentStatus::Cancelled);
                assert_eq!(t.job_status, None);
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[test]
    fn unknown_is_a_no_op() {
        assert_eq!(
            decide(PaymentStatus::Pending, ReportedOutcome::Unknown),
            Decision::Undetermined
        );
    }

    #[test]
    fn late_failure_does_not_override_success() {
        assert_eq!(
            decide(PaymentStatus::Success, ReportedOutcome::Failed),
            Decision::AlreadySettled(PaymentStatus::Success)
        );
    }

    fn any_outcome() -> impl Strategy<Value = ReportedOutcome> {
        prop_oneof![
            Just(ReportedOutcome::Success),
            Just(ReportedOutcome::Failed),
            Just(ReportedOutcome::Cancelled),
            Just(ReportedOutcome::Expired),
            Just(ReportedOutcome::Unknown),
        ]
    }

    proptest! {
        #[test]
        fn first_determinate_outcome_wins(outcomes in proptest::collection::vec(any_outcome(), 0..16)) {
            let mut status = PaymentStatus::Pending;
            let mut applied = 0usize;
            for o in &outcomes {
                if let Decision::Apply(t) = decide(status, *o) {
                    status = t.payment_status;
                    applied += 1;
                }
            }

            let first = outcomes.iter().find(|o| **o != ReportedOutcome::Unknown);
            match first {
                Some(o) => {
                    prop_assert_eq!(applied, 1);
                    prop_assert_eq!(Some(status), o.transition().map(|t| t.payment_status));
                }
                None => {
                    prop_assert_eq!(applied, 0);
                    prop_assert_eq!(status, PaymentStatus::Pending);
                }
            }
        }
    }
}
