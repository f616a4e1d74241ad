use crate::models::booking::{CancelSource, MealStatus, RejectReason, SlotState};

/// Outcome of validating one requested slot transition. `status` is what the
/// slot will hold after this decision is applied (for rejections, what it
/// already holds).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDecision {
    pub accepted: bool,
    pub status: MealStatus,
    pub reason: Option<RejectReason>,
}

impl SlotDecision {
    fn reject(status: MealStatus, reason: RejectReason) -> Self {
        Self { accepted: false, status, reason: Some(reason) }
    }

    fn accept(status: MealStatus) -> Self {
        Self { accepted: true, status, reason: None }
    }
}

/// Decide one student-requested transition. Pure; all context is passed in.
///
/// The precedence is fixed and deliberate: a locked or cutoff-passed slot
/// rejects before a leave check so the reason reported is the one closest to
/// the root cause the caller can no longer influence.
pub fn validate(
    current: Option<&SlotState>,
    requested: MealStatus,
    menu_content: &str,
    on_leave: bool,
    cutoff_passed: bool,
    past_date: bool,
) -> SlotDecision {
    let current_status = current.map(|s| s.status).unwrap_or(MealStatus::Pending);

    if menu_content.trim().is_empty() {
        return SlotDecision::reject(MealStatus::NotApplicable, RejectReason::NoMenuItem);
    }
    if past_date {
        return SlotDecision::reject(current_status, RejectReason::PastDate);
    }
    if current.map(|s| s.locked).unwrap_or(false) {
        return SlotDecision::reject(current_status, RejectReason::Locked);
    }
    if cutoff_passed {
        return SlotDecision::reject(current_status, RejectReason::CutoffPassed);
    }
    if on_leave && requested == MealStatus::Confirmed {
        return SlotDecision::reject(current_status, RejectReason::Leave);
    }

    SlotDecision::accept(requested)
}

/// The slot state an accepted decision persists: requested status, unlocked,
/// consumption reset. Student-driven SKIP/CANCEL records a manual source.
pub fn accepted_state(requested: MealStatus) -> SlotState {
    let mut state = SlotState::new(requested);
    state.cancel_source = match requested {
        MealStatus::Skipped | MealStatus::Cancelled => Some(CancelSource::Manual),
        _ => None,
    };
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locked_slot() -> SlotState {
        let mut s = SlotState::new(MealStatus::Confirmed);
        s.locked = true;
        s
    }

    #[test]
    fn empty_menu_rejects_first() {
        // Even a locked slot on a past date reports no_menu_item
        let slot = locked_slot();
        let d = validate(Some(&slot), MealStatus::Confirmed, "", true, true, true);
        assert!(!d.accepted);
        assert_eq!(d.reason, Some(RejectReason::NoMenuItem));
        assert_eq!(d.status, MealStatus::NotApplicable);
    }

    #[test]
    fn whitespace_menu_counts_as_empty() {
        let d = validate(None, MealStatus::Confirmed, "   ", false, false, false);
        assert_eq!(d.reason, Some(RejectReason::NoMenuItem));
    }

    #[test]
    fn past_date_rejects_before_lock() {
        let slot = locked_slot();
        let d = validate(Some(&slot), MealStatus::Skipped, "dal rice", false, true, true);
        assert_eq!(d.reason, Some(RejectReason::PastDate));
    }

    #[test]
    fn locked_rejects_before_cutoff_and_leave() {
        let slot = locked_slot();
        let d = validate(Some(&slot), MealStatus::Confirmed, "dal rice", true, true, false);
        assert_eq!(d.reason, Some(RejectReason::Locked));
        assert_eq!(d.status, MealStatus::Confirmed);
    }

    #[test]
    fn cutoff_rejects_before_leave() {
        let d = validate(None, MealStatus::Confirmed, "dal rice", true, true, false);
        assert_eq!(d.reason, Some(RejectReason::CutoffPassed));
    }

    #[test]
    fn leave_rejects_confirm_but_allows_skip() {
        let confirm = validate(None, MealStatus::Confirmed, "poha", true, false, false);
        assert!(!confirm.accepted);
        assert_eq!(confirm.reason, Some(RejectReason::Leave));

        let skip = validate(None, MealStatus::Skipped, "poha", true, false, false);
        assert!(skip.accepted);
        assert_eq!(skip.status, MealStatus::Skipped);
    }

    #[test]
    fn accept_resets_consumed_and_stays_unlocked() {
        let d = validate(None, MealStatus::Confirmed, "poha", false, false, false);
        assert!(d.accepted);
        let state = accepted_state(d.status);
        assert!(!state.locked);
        assert!(!state.consumed);
        assert_eq!(state.cancel_source, None);
    }

    #[test]
    fn manual_skip_records_cancel_source() {
        let state = accepted_state(MealStatus::Skipped);
        assert_eq!(state.cancel_source, Some(CancelSource::Manual));
    }

    #[test]
    fn locked_slot_never_changes_under_any_request_history() {
        // Property: once locked, no sequence of student requests is accepted.
        let slot = locked_slot();
        for requested in [MealStatus::Confirmed, MealStatus::Skipped, MealStatus::Cancelled] {
            for on_leave in [false, true] {
                for cutoff in [false, true] {
                    let d = validate(Some(&slot), requested, "meal", on_leave, cutoff, false);
                    assert!(!d.accepted);
                    assert_eq!(d.status, MealStatus::Confirmed);
                }
            }
        }
    }
}
