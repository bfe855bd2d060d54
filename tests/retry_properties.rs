//! Property coverage for the retry policy's backoff curve (C1, spec §4.1):
//! delays never decrease across increasing attempt numbers and never exceed
//! the policy's configured ceiling.

use cashapp_engine::workflow::retry::RetryPolicy;
use proptest::prelude::*;

fn policies() -> Vec<RetryPolicy> {
    vec![RetryPolicy::read_path(), RetryPolicy::write_path(), RetryPolicy::in_process()]
}

proptest! {
    #[test]
    fn delay_for_attempt_is_monotone_and_capped(attempt in 1u32..50) {
        for policy in policies() {
            let delay = policy.delay_for_attempt(attempt);
            prop_assert!(delay <= policy.max_interval);

            if attempt > 1 {
                let previous = policy.delay_for_attempt(attempt - 1);
                prop_assert!(delay >= previous);
            }
        }
    }

    #[test]
    fn should_retry_never_exceeds_max_attempts(attempts_so_far in 0u32..20) {
        for policy in policies() {
            let error = cashapp_engine::WorkflowError::TransientCollaborator("boom".to_string());
            let retry = policy.should_retry(&error, attempts_so_far);
            if attempts_so_far >= policy.max_attempts {
                prop_assert!(!retry);
            }
        }
    }

    #[test]
    fn non_retryable_kinds_are_never_retried(attempts_so_far in 0u32..5) {
        for policy in policies() {
            let error = cashapp_engine::WorkflowError::InvalidInput("bad".to_string());
            prop_assert!(!policy.should_retry(&error, attempts_so_far));
        }
    }
}

#[test]
fn delay_for_attempt_one_equals_initial_interval() {
    for policy in policies() {
        assert_eq!(policy.delay_for_attempt(1), policy.initial_interval.min(policy.max_interval));
    }
}
