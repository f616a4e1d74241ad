use std::collections::HashSet;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, Timelike};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::booking::{
    CancelSource, MealBookingRecord, MealSlot, MealStatus, SlotMap, SlotState,
};
use crate::models::leave::ApprovedLeave;
use crate::models::menu::DailyMenu;
use crate::models::policy::HostelPolicy;
use crate::services::bookings::BookingStore;
use crate::services::directory::DirectoryService;
use crate::services::leaves::LeaveService;
use crate::services::menu::MenuService;
use crate::services::notifications::{NotificationKind, NotificationService};
use crate::services::policy::{cutoff_instant, resolve_cutoff, PolicyService};

/// Upper bound on a single lock-sweep UPDATE statement.
const LOCK_CHUNK: i64 = 500;

/// Hour (hostel-local) at which the next-day auto-booking job fires, shortly
/// after noon so no cutoff for tomorrow has passed yet.
const AUTO_BOOKING_HOUR: u32 = 12;
const AUTO_BOOKING_MINUTE: u32 = 5;

/// Default slot states the auto-booking job materializes for a student
/// without a record: N/A where no menu item, SKIPPED where on leave,
/// CONFIRMED otherwise.
pub fn default_slot_states(menu: &DailyMenu, on_leave: bool) -> SlotMap<SlotState> {
    SlotMap::from_fn(|slot| {
        if !menu.has_item(slot) {
            SlotState::not_applicable()
        } else if on_leave {
            let mut state = SlotState::new(MealStatus::Skipped);
            state.cancel_source = Some(CancelSource::Leave);
            state
        } else {
            SlotState::new(MealStatus::Confirmed)
        }
    })
}

/// What the auto-booking job decides to do for one hostel.
#[derive(Debug, PartialEq, Eq)]
pub enum AutoBookingAction {
    /// Promote still-PENDING slots of existing records for these slots.
    Promote { slots: Vec<MealSlot> },
    /// Create a fresh record for a student without one.
    Create { student_id: Uuid, slots: SlotMap<SlotState> },
}

pub struct AutoBookingContext {
    pub date: NaiveDate,
    pub menu: DailyMenu,
    pub students: Vec<Uuid>,
    pub leaves: Vec<ApprovedLeave>,
    pub existing: Vec<MealBookingRecord>,
}

/// Pure planning for one hostel's next-day auto-booking run. Re-entrant:
/// planning over the state a previous run produced yields no Create actions
/// and the Promote updates are no-ops at the store level.
pub fn plan_auto_booking(ctx: &AutoBookingContext) -> Vec<AutoBookingAction> {
    let mut actions = Vec::new();

    // Promotion targets only the slots a menu item exists for; menu-less
    // slots were N/A at creation and stay untouched.
    let promotable: Vec<MealSlot> = MealSlot::ALL
        .into_iter()
        .filter(|slot| ctx.menu.has_item(*slot))
        .collect();
    if !promotable.is_empty() && !ctx.existing.is_empty() {
        actions.push(AutoBookingAction::Promote { slots: promotable });
    }

    let have_record: HashSet<Uuid> = ctx.existing.iter().map(|r| r.student_id).collect();
    for student_id in &ctx.students {
        if have_record.contains(student_id) {
            continue;
        }
        let on_leave = ctx
            .leaves
            .iter()
            .any(|l| l.student_id == *student_id && l.covers(ctx.date));
        actions.push(AutoBookingAction::Create {
            student_id: *student_id,
            slots: default_slot_states(&ctx.menu, on_leave),
        });
    }

    actions
}

pub struct ReconciliationScheduler;

impl ReconciliationScheduler {
    /// Next-day auto-booking: materialize default states for every active
    /// student of every active hostel for tomorrow. Not cutoff-gated. Each
    /// hostel runs in its own transaction; one hostel's failure is logged and
    /// the run continues.
    pub async fn run_auto_booking(
        pool: &PgPool,
        notifications: &NotificationService,
        now: NaiveDateTime,
    ) -> anyhow::Result<()> {
        let tomorrow = now.date() + Duration::days(1);
        let hostels = DirectoryService::active_hostels(pool).await?;
        info!("Auto-booking for {}: {} active hostel(s)", tomorrow, hostels.len());

        for hostel_id in hostels {
            if let Err(e) = Self::auto_book_hostel(pool, notifications, hostel_id, tomorrow).await {
                warn!("Auto-booking failed for hostel {}: {e}", hostel_id);
            }
        }
        Ok(())
    }

    async fn auto_book_hostel(
        pool: &PgPool,
        notifications: &NotificationService,
        hostel_id: Uuid,
        date: NaiveDate,
    ) -> anyhow::Result<()> {
        // No menu for tomorrow: skip the hostel entirely for this run.
        let Some(menu) = MenuService::menu_for_date(pool, hostel_id, date).await? else {
            info!("Auto-booking: hostel {} has no menu for {}, skipping", hostel_id, date);
            return Ok(());
        };

        let students = DirectoryService::active_students(pool, hostel_id).await?;
        let leaves = LeaveService::approved_overlapping(pool, &students, date, date).await?;
        let existing = BookingStore::get_all_for_hostel_and_date(pool, hostel_id, date).await?;

        let ctx = AutoBookingContext { date, menu, students, leaves, existing };
        let actions = plan_auto_booking(&ctx);

        let mut created_students: Vec<Uuid> = Vec::new();
        let mut promoted = 0u64;
        let mut tx = pool.begin().await?;
        for action in actions {
            match action {
                AutoBookingAction::Promote { slots } => {
                    for slot in slots {
                        promoted +=
                            BookingStore::promote_pending(&mut tx, hostel_id, date, slot).await?;
                    }
                }
                AutoBookingAction::Create { student_id, slots } => {
                    BookingStore::insert_record(
                        &mut tx,
                        hostel_id,
                        student_id,
                        date,
                        Some(ctx.menu.id),
                        &slots,
                        false,
                        "auto-booking",
                    )
                    .await?;
                    created_students.push(student_id);
                }
            }
        }
        tx.commit().await?;

        // Fire-and-forget; dispatch failures never fail the hostel's run.
        for student_id in &created_students {
            notifications
                .notify(
                    *student_id,
                    NotificationKind::AutoBookingCreated,
                    serde_json::json!({ "date": date }),
                )
                .await;
        }

        info!(
            "Auto-booking hostel {}: {} record(s) created, {} slot(s) promoted",
            hostel_id,
            created_students.len(),
            promoted
        );
        Ok(())
    }

    /// Hourly lock sweep: lock any CONFIRMED/PENDING slot whose cutoff has
    /// passed, over a rolling yesterday/today/tomorrow window. Only sets
    /// `locked`; never changes status. Safe to re-run at any time.
    pub async fn run_lock_sweep(pool: &PgPool, now: NaiveDateTime) -> anyhow::Result<()> {
        let hostels = DirectoryService::active_hostels(pool).await?;

        for hostel_id in hostels {
            if let Err(e) = Self::sweep_hostel(pool, hostel_id, now).await {
                warn!("Lock sweep failed for hostel {}: {e}", hostel_id);
            }
        }
        Ok(())
    }

    async fn sweep_hostel(pool: &PgPool, hostel_id: Uuid, now: NaiveDateTime) -> anyhow::Result<()> {
        let policy = PolicyService::load_cutoffs(pool, hostel_id).await?;
        let mut locked_total = 0u64;

        for (date, slot) in sweep_targets(&policy, now) {
            loop {
                let locked =
                    BookingStore::lock_slots_chunk(pool, hostel_id, date, slot, LOCK_CHUNK).await?;
                locked_total += locked;
                if locked < LOCK_CHUNK as u64 {
                    break;
                }
            }
        }

        if locked_total > 0 {
            info!("Lock sweep hostel {}: {} slot(s) locked", hostel_id, locked_total);
        }
        Ok(())
    }

    /// Spawn the two recurring jobs: auto-booking daily shortly after local
    /// noon, and the lock sweep at the top of every hour.
    pub fn start(pool: PgPool, notifications: std::sync::Arc<NotificationService>) {
        let auto_pool = pool.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(secs_until_daily_run(
                    Local::now().naive_local(),
                )))
                .await;

                let now = Local::now().naive_local();
                if let Err(e) = Self::run_auto_booking(&auto_pool, &notifications, now).await {
                    warn!("Auto-booking run failed: {e}");
                }
            }
        });

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(secs_until_next_hour(
                    Local::now().naive_local(),
                )))
                .await;

                let now = Local::now().naive_local();
                if let Err(e) = Self::run_lock_sweep(&pool, now).await {
                    warn!("Lock sweep run failed: {e}");
                }
            }
        });
    }
}

/// The (date, slot) pairs whose cutoff has passed at `now`, over the rolling
/// three-day window. Covers late-running cutoffs and clock skew.
pub fn sweep_targets(policy: &HostelPolicy, now: NaiveDateTime) -> Vec<(NaiveDate, MealSlot)> {
    let today = now.date();
    let mut targets = Vec::new();
    for offset in -1..=1i64 {
        let date = today + Duration::days(offset);
        for slot in MealSlot::ALL {
            let cutoff = resolve_cutoff(policy, slot);
            if now >= cutoff_instant(date, &cutoff) {
                targets.push((date, slot));
            }
        }
    }
    targets
}

fn secs_until_daily_run(now: NaiveDateTime) -> u64 {
    let target_secs = (AUTO_BOOKING_HOUR * 3600 + AUTO_BOOKING_MINUTE * 60) as i64;
    let secs_today = (now.hour() * 3600 + now.minute() * 60 + now.second()) as i64;
    if secs_today < target_secs {
        (target_secs - secs_today) as u64
    } else {
        (86_400 - secs_today + target_secs) as u64
    }
}

fn secs_until_next_hour(now: NaiveDateTime) -> u64 {
    let past = (now.minute() * 60 + now.second()) as u64;
    3600 - past
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Utc};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn menu(date: NaiveDate) -> DailyMenu {
        DailyMenu {
            id: Uuid::new_v4(),
            hostel_id: Uuid::new_v4(),
            date,
            breakfast: "poha".into(),
            lunch: "dal rice".into(),
            snacks: "samosa".into(),
            dinner: "roti".into(),
        }
    }

    fn record(student_id: Uuid, date: NaiveDate, meals: SlotMap<SlotState>) -> MealBookingRecord {
        MealBookingRecord {
            id: Uuid::new_v4(),
            hostel_id: Uuid::new_v4(),
            student_id,
            date,
            menu_id: None,
            booking_number: 1,
            is_manual_booking: true,
            meals,
            created_by: "student".into(),
            updated_by: "student".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn creates_records_for_students_without_one() {
        // Scenario E shape: one student already booked, the rest are fresh
        let booked = Uuid::new_v4();
        let fresh: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let mut students = fresh.clone();
        students.push(booked);

        let mut meals: SlotMap<SlotState> = SlotMap::default();
        meals.breakfast = SlotState::new(MealStatus::Pending);

        let ctx = AutoBookingContext {
            date: d(11),
            menu: menu(d(11)),
            students,
            leaves: Vec::new(),
            existing: vec![record(booked, d(11), meals)],
        };

        let actions = plan_auto_booking(&ctx);
        // One promote pass plus one create per fresh student, none for booked
        let creates: Vec<_> = actions
            .iter()
            .filter_map(|a| match a {
                AutoBookingAction::Create { student_id, slots } => Some((student_id, slots)),
                _ => None,
            })
            .collect();
        assert_eq!(creates.len(), 3);
        for (id, slots) in &creates {
            assert!(fresh.contains(*id));
            assert_eq!(slots.breakfast.status, MealStatus::Confirmed);
            assert_eq!(slots.dinner.status, MealStatus::Confirmed);
        }
        assert!(actions
            .iter()
            .any(|a| matches!(a, AutoBookingAction::Promote { slots } if slots.len() == 4)));
    }

    #[test]
    fn leave_students_get_skipped_with_leave_source() {
        let on_leave = Uuid::new_v4();
        let ctx = AutoBookingContext {
            date: d(11),
            menu: menu(d(11)),
            students: vec![on_leave],
            leaves: vec![ApprovedLeave {
                student_id: on_leave,
                start_date: d(10),
                end_date: d(12),
            }],
            existing: Vec::new(),
        };

        let actions = plan_auto_booking(&ctx);
        match &actions[0] {
            AutoBookingAction::Create { slots, .. } => {
                assert_eq!(slots.lunch.status, MealStatus::Skipped);
                assert_eq!(slots.lunch.cancel_source, Some(CancelSource::Leave));
            }
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[test]
    fn menuless_slot_defaults_to_not_applicable() {
        let mut m = menu(d(11));
        m.snacks = String::new();
        let ctx = AutoBookingContext {
            date: d(11),
            menu: m,
            students: vec![Uuid::new_v4()],
            leaves: Vec::new(),
            existing: Vec::new(),
        };

        let actions = plan_auto_booking(&ctx);
        match &actions[0] {
            AutoBookingAction::Create { slots, .. } => {
                assert_eq!(slots.snacks.status, MealStatus::NotApplicable);
                assert!(slots.snacks.locked);
                assert_eq!(slots.breakfast.status, MealStatus::Confirmed);
            }
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[test]
    fn rerun_over_own_output_creates_nothing() {
        // Idempotence: every student already has a record after the first run
        let students: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        let m = menu(d(11));
        let existing: Vec<MealBookingRecord> = students
            .iter()
            .map(|id| record(*id, d(11), default_slot_states(&m, false)))
            .collect();

        let ctx = AutoBookingContext {
            date: d(11),
            menu: m,
            students,
            leaves: Vec::new(),
            existing,
        };

        let actions = plan_auto_booking(&ctx);
        assert!(!actions
            .iter()
            .any(|a| matches!(a, AutoBookingAction::Create { .. })));
    }

    #[test]
    fn sweep_window_and_cutoff_gating() {
        let policy = HostelPolicy::default();
        // 09:00 today: lunch cutoff (08:00) has passed for today and
        // yesterday, but not for tomorrow.
        let now = d(10).and_time(t(9, 0));
        let targets = sweep_targets(&policy, now);

        assert!(targets.contains(&(d(10), MealSlot::Lunch)));
        assert!(targets.contains(&(d(9), MealSlot::Lunch)));
        assert!(!targets.contains(&(d(11), MealSlot::Lunch)));

        // Breakfast cutoff is prev-day 21:00: passed for today and yesterday,
        // not yet for tomorrow (that would need 21:00 today).
        assert!(targets.contains(&(d(10), MealSlot::Breakfast)));
        assert!(!targets.contains(&(d(11), MealSlot::Breakfast)));

        // Dinner (16:00) has not passed for today at 09:00
        assert!(!targets.contains(&(d(10), MealSlot::Dinner)));
        assert!(targets.contains(&(d(9), MealSlot::Dinner)));
    }

    #[test]
    fn sweep_targets_stable_across_reruns() {
        // Idempotence at plan level: same now, same targets; the store-level
        // locked/status filters make re-applying them no-ops.
        let policy = HostelPolicy::default();
        let now = d(10).and_time(t(14, 30));
        assert_eq!(sweep_targets(&policy, now), sweep_targets(&policy, now));
    }

    #[test]
    fn daily_run_sleep_arithmetic() {
        let before = d(10).and_time(t(11, 0));
        assert_eq!(secs_until_daily_run(before), 3900);

        let after = d(10).and_time(t(13, 5));
        assert_eq!(secs_until_daily_run(after), 86_400 - 3600);
    }

    #[test]
    fn hourly_sleep_reaches_top_of_hour() {
        let now = d(10).and_time(NaiveTime::from_hms_opt(10, 59, 30).unwrap());
        assert_eq!(secs_until_next_hour(now), 30);
    }
}
