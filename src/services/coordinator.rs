use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, NaiveDateTime};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::models::booking::{
    BookingSubmission, BookingSummary, DateMealsRequest, DateResult, MealBookingRecord, MealSlot,
    MealStatus, SlotMap, SlotResult, SlotState,
};
use crate::models::leave::ApprovedLeave;
use crate::models::menu::DailyMenu;
use crate::models::policy::HostelPolicy;
use crate::services::bookings::BookingStore;
use crate::services::leaves::LeaveService;
use crate::services::menu::MenuService;
use crate::services::notifications::{NotificationKind, NotificationService};
use crate::services::policy::{cutoff_instant, resolve_cutoff};
use crate::services::validator::{accepted_state, validate};

/// Everything a submission needs, fetched up front in one round trip each.
/// The context may be milliseconds stale; the locked guard at write time is
/// what actually protects racing transitions.
pub struct BookingContext {
    pub today: NaiveDate,
    pub now: NaiveDateTime,
    pub policy: HostelPolicy,
    pub leaves: Vec<ApprovedLeave>,
    pub existing: HashMap<NaiveDate, MealBookingRecord>,
    pub menus: HashMap<NaiveDate, DailyMenu>,
}

/// Persisted effect of one date within a submission.
#[derive(Debug)]
pub enum DateWrite {
    Update {
        booking_id: Uuid,
        date: NaiveDate,
        slots: Vec<(MealSlot, SlotState)>,
    },
    Create {
        date: NaiveDate,
        menu_id: Option<Uuid>,
        slots: SlotMap<SlotState>,
    },
}

#[derive(Debug)]
pub struct BookingPlan {
    pub results: Vec<DateResult>,
    pub summary: BookingSummary,
    pub writes: Vec<DateWrite>,
}

/// Deduplicate by date, keeping the last occurrence: later entries override
/// earlier ones for the same date within one submission.
pub fn dedup_last_wins(requests: &[DateMealsRequest]) -> BTreeMap<NaiveDate, DateMealsRequest> {
    let mut by_date = BTreeMap::new();
    for req in requests {
        by_date.insert(req.date, req.clone());
    }
    by_date
}

/// Pure decision phase of a bulk submission: dedup, precompute cutoffs,
/// validate every requested slot, and emit the writes to persist.
pub fn plan(requests: &[DateMealsRequest], ctx: &BookingContext) -> BookingPlan {
    let deduped = dedup_last_wins(requests);

    // Cutoff booleans once per (date, slot), reused across the batch.
    let mut cutoff_passed: HashMap<(NaiveDate, MealSlot), bool> = HashMap::new();
    for date in deduped.keys() {
        for slot in MealSlot::ALL {
            let cutoff = resolve_cutoff(&ctx.policy, slot);
            let passed = ctx.now >= cutoff_instant(*date, &cutoff);
            cutoff_passed.insert((*date, slot), passed);
        }
    }

    let mut results = Vec::new();
    let mut summary = BookingSummary::default();
    let mut writes = Vec::new();

    for (date, request) in &deduped {
        let menu = ctx.menus.get(date);
        let on_leave = ctx.leaves.iter().any(|l| l.covers(*date));
        let past_date = *date < ctx.today;
        let existing = ctx.existing.get(date);

        let mut slot_results: SlotMap<Option<SlotResult>> = SlotMap::default();
        let mut accepted_slots: Vec<(MealSlot, SlotState)> = Vec::new();

        for slot in MealSlot::ALL {
            let Some(requested) = *request.meals.get(slot) else {
                continue;
            };
            // Only these statuses are student-requestable; anything else in
            // the payload is treated as an untouched slot.
            if !matches!(
                requested,
                MealStatus::Confirmed | MealStatus::Skipped | MealStatus::Cancelled
            ) {
                continue;
            }
            let current = existing.map(|r| r.meals.get(slot));
            let menu_content = menu.map(|m| m.content(slot)).unwrap_or("");
            let passed = *cutoff_passed.get(&(*date, slot)).unwrap_or(&true);

            let decision = validate(current, requested, menu_content, on_leave, passed, past_date);

            if decision.accepted {
                match decision.status {
                    MealStatus::Confirmed => summary.confirmed += 1,
                    MealStatus::Skipped | MealStatus::Cancelled => summary.cancelled += 1,
                    _ => {}
                }
                accepted_slots.push((slot, accepted_state(decision.status)));
            } else {
                summary.rejected += 1;
            }

            *slot_results.get_mut(slot) = Some(SlotResult {
                accepted: decision.accepted,
                status: decision.status,
                reason: decision.reason,
            });
        }

        if !accepted_slots.is_empty() {
            match existing {
                Some(record) => {
                    // Apply only the slots that actually change.
                    let changed: Vec<(MealSlot, SlotState)> = accepted_slots
                        .into_iter()
                        .filter(|(slot, state)| record.meals.get(*slot) != state)
                        .collect();
                    if !changed.is_empty() {
                        writes.push(DateWrite::Update {
                            booking_id: record.id,
                            date: *date,
                            slots: changed,
                        });
                    }
                }
                None => {
                    // New record: accepted slots take their state, untouched
                    // slots default to PENDING, menu-less slots are
                    // NOT_APPLICABLE from day one.
                    let mut slots = SlotMap::from_fn(|slot| {
                        if menu.map(|m| m.has_item(slot)).unwrap_or(false) {
                            SlotState::default()
                        } else {
                            SlotState::not_applicable()
                        }
                    });
                    for (slot, state) in accepted_slots {
                        *slots.get_mut(slot) = state;
                    }
                    writes.push(DateWrite::Create {
                        date: *date,
                        menu_id: menu.map(|m| m.id),
                        slots,
                    });
                }
            }
        }

        results.push(DateResult { date: *date, slots: slot_results });
    }

    BookingPlan { results, summary, writes }
}

/// Downgrade a previously accepted slot to a `locked` rejection. Covers the
/// race where the hourly sweep locks the slot between the bulk context fetch
/// and the guarded write: the update is a no-op, and the response must say
/// so rather than report the stale acceptance.
pub fn downgrade_to_locked(
    results: &mut [DateResult],
    summary: &mut BookingSummary,
    date: NaiveDate,
    slot: MealSlot,
    stored_status: MealStatus,
) {
    let Some(result) = results.iter_mut().find(|r| r.date == date) else {
        return;
    };
    let Some(slot_result) = result.slots.get_mut(slot).as_mut() else {
        return;
    };
    if slot_result.accepted {
        match slot_result.status {
            MealStatus::Confirmed => summary.confirmed = summary.confirmed.saturating_sub(1),
            MealStatus::Skipped | MealStatus::Cancelled => {
                summary.cancelled = summary.cancelled.saturating_sub(1)
            }
            _ => {}
        }
        summary.rejected += 1;
    }
    *slot_result = SlotResult {
        accepted: false,
        status: stored_status,
        reason: Some(crate::models::booking::RejectReason::Locked),
    };
}

pub struct BookingCoordinator;

impl BookingCoordinator {
    /// Submit a student's batch of date/meal requests. Per-slot rejections are
    /// response data; only infrastructure failures error, rolling back the
    /// whole batch so the response never disagrees with the store.
    pub async fn submit_bookings(
        pool: &PgPool,
        notifications: &NotificationService,
        hostel_id: Uuid,
        student_id: Uuid,
        requests: &[DateMealsRequest],
        now: NaiveDateTime,
    ) -> anyhow::Result<BookingSubmission> {
        if requests.is_empty() {
            return Ok(BookingSubmission {
                per_date_results: Vec::new(),
                summary: BookingSummary::default(),
            });
        }

        let deduped = dedup_last_wins(requests);
        let span_start = deduped.keys().next().copied().unwrap_or(now.date());
        let span_end = deduped.keys().next_back().copied().unwrap_or(now.date());

        // One bulk fetch each for the full span.
        let policy = crate::services::policy::PolicyService::load_cutoffs(pool, hostel_id).await?;
        let leaves =
            LeaveService::approved_overlapping(pool, &[student_id], span_start, span_end).await?;
        let records =
            BookingStore::get_range(pool, hostel_id, student_id, span_start, span_end).await?;
        let menus = MenuService::menus_for_range(pool, hostel_id, span_start, span_end).await?;

        let ctx = BookingContext {
            today: now.date(),
            now,
            policy,
            leaves,
            existing: records.into_iter().map(|r| (r.date, r)).collect(),
            menus: menus.into_iter().map(|m| (m.date, m)).collect(),
        };

        let mut plan = plan(requests, &ctx);
        let writes = std::mem::take(&mut plan.writes);

        let mut tx = pool.begin().await?;
        for write in &writes {
            match write {
                DateWrite::Update { booking_id, date, slots } => {
                    for (slot, state) in slots {
                        let applied = BookingStore::update_slot_guarded(
                            &mut tx,
                            *booking_id,
                            *slot,
                            state,
                            "student",
                        )
                        .await?;
                        // The sweep locked this slot after the context fetch:
                        // the guarded write was a no-op, so the response must
                        // report the slot as locked, not accepted.
                        if !applied {
                            warn!(
                                "Booking {} slot {} locked mid-submission, downgrading",
                                booking_id,
                                slot.as_str()
                            );
                            let stored_status = ctx
                                .existing
                                .get(date)
                                .map(|r| r.meals.get(*slot).status)
                                .unwrap_or(MealStatus::Pending);
                            downgrade_to_locked(
                                &mut plan.results,
                                &mut plan.summary,
                                *date,
                                *slot,
                                stored_status,
                            );
                        }
                    }
                }
                DateWrite::Create { date, menu_id, slots } => {
                    BookingStore::insert_record(
                        &mut tx, hostel_id, student_id, *date, *menu_id, slots, true, "student",
                    )
                    .await?;
                }
            }
        }
        tx.commit().await?;

        // Fire-and-forget; a dispatch failure never unwinds the submission.
        notifications
            .notify(
                student_id,
                NotificationKind::BookingSummary,
                serde_json::json!({
                    "confirmed": plan.summary.confirmed,
                    "cancelled": plan.summary.cancelled,
                    "rejected": plan.summary.rejected,
                }),
            )
            .await;

        Ok(BookingSubmission {
            per_date_results: plan.results,
            summary: plan.summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Utc};
    use crate::models::booking::RejectReason;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn menu(date: NaiveDate, dinner: &str) -> DailyMenu {
        DailyMenu {
            id: Uuid::new_v4(),
            hostel_id: Uuid::new_v4(),
            date,
            breakfast: "poha".into(),
            lunch: "dal rice".into(),
            snacks: "samosa".into(),
            dinner: dinner.into(),
        }
    }

    fn ctx_for(today: NaiveDate, at: NaiveTime, menus: Vec<DailyMenu>) -> BookingContext {
        BookingContext {
            today,
            now: today.and_time(at),
            policy: HostelPolicy::default(),
            leaves: Vec::new(),
            existing: HashMap::new(),
            menus: menus.into_iter().map(|m| (m.date, m)).collect(),
        }
    }

    fn request(date: NaiveDate, lunch: Option<MealStatus>, dinner: Option<MealStatus>) -> DateMealsRequest {
        DateMealsRequest {
            date,
            meals: SlotMap { breakfast: None, lunch, snacks: None, dinner },
        }
    }

    #[test]
    fn lunch_confirm_succeeds_before_default_cutoff() {
        // Scenario A: default lunch cutoff is same-day 08:00
        let ctx = ctx_for(d(10), t(7, 59), vec![menu(d(10), "roti")]);
        let reqs = [request(d(10), Some(MealStatus::Confirmed), None)];
        let plan = plan(&reqs, &ctx);

        let result = plan.results[0].slots.lunch.as_ref().unwrap();
        assert!(result.accepted);
        assert_eq!(plan.summary.confirmed, 1);
        assert_eq!(plan.writes.len(), 1);
    }

    #[test]
    fn lunch_confirm_rejected_after_default_cutoff() {
        let ctx = ctx_for(d(10), t(8, 1), vec![menu(d(10), "roti")]);
        let reqs = [request(d(10), Some(MealStatus::Confirmed), None)];
        let plan = plan(&reqs, &ctx);

        let result = plan.results[0].slots.lunch.as_ref().unwrap();
        assert!(!result.accepted);
        assert_eq!(result.reason, Some(RejectReason::CutoffPassed));
        assert!(plan.writes.is_empty());
    }

    #[test]
    fn duplicate_dates_last_entry_wins() {
        // Scenario C: two entries for the same date, second overrides first
        let ctx = ctx_for(d(10), t(7, 0), vec![menu(d(11), "roti")]);
        let reqs = [
            request(d(11), Some(MealStatus::Confirmed), None),
            request(d(11), Some(MealStatus::Skipped), None),
        ];
        let plan = plan(&reqs, &ctx);

        assert_eq!(plan.results.len(), 1);
        let result = plan.results[0].slots.lunch.as_ref().unwrap();
        assert_eq!(result.status, MealStatus::Skipped);
        assert_eq!(plan.summary.cancelled, 1);
        assert_eq!(plan.summary.confirmed, 0);
    }

    #[test]
    fn missing_dinner_menu_yields_not_applicable() {
        // Scenario D: lunch has a menu, dinner does not
        let ctx = ctx_for(d(10), t(7, 0), vec![menu(d(11), "")]);
        let reqs = [request(
            d(11),
            Some(MealStatus::Confirmed),
            Some(MealStatus::Confirmed),
        )];
        let plan = plan(&reqs, &ctx);

        let slots = &plan.results[0].slots;
        assert!(slots.lunch.as_ref().unwrap().accepted);
        let dinner = slots.dinner.as_ref().unwrap();
        assert!(!dinner.accepted);
        assert_eq!(dinner.reason, Some(RejectReason::NoMenuItem));
        assert_eq!(dinner.status, MealStatus::NotApplicable);

        // The created record carries lunch confirmed, dinner permanently N/A
        match &plan.writes[0] {
            DateWrite::Create { slots, .. } => {
                assert_eq!(slots.lunch.status, MealStatus::Confirmed);
                assert_eq!(slots.dinner.status, MealStatus::NotApplicable);
                assert!(slots.dinner.locked);
                // Untouched slots with a menu default to pending
                assert_eq!(slots.breakfast.status, MealStatus::Pending);
            }
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[test]
    fn leave_blocks_confirm_but_not_skip() {
        // Scenario B
        let mut ctx = ctx_for(d(10), t(6, 0), vec![menu(d(10), "roti")]);
        ctx.leaves.push(ApprovedLeave {
            student_id: Uuid::new_v4(),
            start_date: d(9),
            end_date: d(12),
        });

        let confirm = plan(&[request(d(10), Some(MealStatus::Confirmed), None)], &ctx);
        let r = confirm.results[0].slots.lunch.as_ref().unwrap();
        assert_eq!(r.reason, Some(RejectReason::Leave));

        let skip = plan(&[request(d(10), Some(MealStatus::Skipped), None)], &ctx);
        assert!(skip.results[0].slots.lunch.as_ref().unwrap().accepted);
    }

    #[test]
    fn past_date_rejected() {
        let ctx = ctx_for(d(10), t(7, 0), vec![menu(d(9), "roti")]);
        let plan = plan(&[request(d(9), Some(MealStatus::Confirmed), None)], &ctx);
        let r = plan.results[0].slots.lunch.as_ref().unwrap();
        assert_eq!(r.reason, Some(RejectReason::PastDate));
        assert!(plan.writes.is_empty());
    }

    #[test]
    fn slot_locked_mid_submission_downgrades_to_locked_rejection() {
        // A sweep can lock a slot between the context fetch and the guarded
        // write; the no-op write must surface as a locked rejection.
        let ctx = ctx_for(d(10), t(6, 0), vec![menu(d(11), "roti")]);
        let reqs = [request(d(11), Some(MealStatus::Confirmed), None)];
        let mut p = plan(&reqs, &ctx);
        assert!(p.results[0].slots.lunch.as_ref().unwrap().accepted);
        assert_eq!(p.summary.confirmed, 1);

        downgrade_to_locked(
            &mut p.results,
            &mut p.summary,
            d(11),
            MealSlot::Lunch,
            MealStatus::Pending,
        );

        let r = p.results[0].slots.lunch.as_ref().unwrap();
        assert!(!r.accepted);
        assert_eq!(r.reason, Some(RejectReason::Locked));
        assert_eq!(r.status, MealStatus::Pending);
        assert_eq!(p.summary.confirmed, 0);
        assert_eq!(p.summary.rejected, 1);

        // Re-applying is a no-op on the counters
        downgrade_to_locked(
            &mut p.results,
            &mut p.summary,
            d(11),
            MealSlot::Lunch,
            MealStatus::Pending,
        );
        assert_eq!(p.summary.rejected, 1);
    }

    #[test]
    fn unchanged_slot_produces_no_write() {
        let mut ctx = ctx_for(d(10), t(6, 0), vec![menu(d(11), "roti")]);
        let mut meals: SlotMap<SlotState> = SlotMap::default();
        meals.lunch = SlotState::new(MealStatus::Confirmed);
        ctx.existing.insert(
            d(11),
            MealBookingRecord {
                id: Uuid::new_v4(),
                hostel_id: Uuid::new_v4(),
                student_id: Uuid::new_v4(),
                date: d(11),
                menu_id: None,
                booking_number: 1,
                is_manual_booking: true,
                meals,
                created_by: "student".into(),
                updated_by: "student".into(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        );

        let plan = plan(&[request(d(11), Some(MealStatus::Confirmed), None)], &ctx);
        assert!(plan.results[0].slots.lunch.as_ref().unwrap().accepted);
        assert!(plan.writes.is_empty());
    }
}
