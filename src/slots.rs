//! Period slot generation and slot-assignment checks.
//!
//! A period is a named daily band with fixed wall-clock bounds. Slots are
//! 45-minute teaching units separated by a 5-minute break, generated until
//! the band runs out. Everything here is pure so the planning rules can be
//! tested without touching storage; handlers load the row snapshot and
//! commit the mutation.

use chrono::{Duration, NaiveTime};

pub const SLOT_MINUTES: i64 = 45;
pub const BREAK_MINUTES: i64 = 5;

pub const PERIOD_MORNING: &str = "morning";
pub const PERIOD_AFTERNOON: &str = "afternoon";
pub const PERIOD_EVENING: &str = "evening";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// 1-based position within the period.
    pub index: u32,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub label: String,
}

pub fn valid_period(period: &str) -> bool {
    matches!(period, PERIOD_MORNING | PERIOD_AFTERNOON | PERIOD_EVENING)
}

pub fn period_label(period: &str) -> String {
    let (start, end) = period_bounds(period);
    let name = match period {
        PERIOD_AFTERNOON => "Afternoon",
        PERIOD_EVENING => "Evening",
        _ => "Morning",
    };
    format!(
        "{} ({}-{})",
        name,
        start.format("%H:%M"),
        end.format("%H:%M")
    )
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

/// Wall-clock bounds for a named period. Unrecognized names fall back to
/// the morning band.
pub fn period_bounds(period: &str) -> (NaiveTime, NaiveTime) {
    match period {
        PERIOD_AFTERNOON => (hm(13, 0), hm(17, 30)),
        PERIOD_EVENING => (hm(18, 0), hm(22, 30)),
        _ => (hm(7, 0), hm(12, 30)),
    }
}

/// Ordered teaching slots for a period. Generation stops without emitting
/// once a candidate slot would end past the period's end, and also once the
/// next slot's start would fall past it.
pub fn slots_for_period(period: &str) -> Vec<Slot> {
    let (start, end) = period_bounds(period);
    let mut slots = Vec::new();
    let mut t = start;
    let mut index = 1u32;

    loop {
        let t_end = t + Duration::minutes(SLOT_MINUTES);
        if t_end > end {
            break;
        }

        slots.push(Slot {
            index,
            start: t,
            end: t_end,
            label: format!(
                "T{} ({}-{})",
                index,
                t.format("%H:%M"),
                t_end.format("%H:%M")
            ),
        });

        index += 1;
        let next_start = t_end + Duration::minutes(BREAK_MINUTES);
        if next_start > end {
            break;
        }
        t = next_start;
    }

    slots
}

pub fn valid_weekday(weekday: i64) -> bool {
    (1..=5).contains(&weekday)
}

pub fn slot_in_range(slot: i64, slot_count: usize) -> bool {
    slot >= 1 && slot <= slot_count as i64
}

/// Row snapshot a handler loads before deciding a slot assignment.
#[derive(Debug, Clone)]
pub struct AssignmentContext {
    /// Number of slots the class's period generates.
    pub slot_count: usize,
    /// The pairing belongs to the class being scheduled.
    pub pairing_in_class: bool,
    /// The subject's weekly quota.
    pub weekly_slots: i64,
    /// Entries this pairing already holds in the class.
    pub used_slots: i64,
    /// The pairing's open teacher already has an entry at the same
    /// (weekday, slot) in a different class.
    pub teacher_busy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignError {
    SlotOutOfRange,
    NotInClass,
    QuotaExceeded { weekly_slots: i64 },
    TeacherBusy,
}

/// Decides whether a pairing may take a slot. Check order matches the
/// user-visible message order: range, ownership, quota, teacher conflict.
pub fn check_assignment(slot: i64, ctx: &AssignmentContext) -> Result<(), AssignError> {
    if !slot_in_range(slot, ctx.slot_count) {
        return Err(AssignError::SlotOutOfRange);
    }
    if !ctx.pairing_in_class {
        return Err(AssignError::NotInClass);
    }
    if ctx.used_slots + 1 > ctx.weekly_slots {
        return Err(AssignError::QuotaExceeded {
            weekly_slots: ctx.weekly_slots,
        });
    }
    if ctx.teacher_busy {
        return Err(AssignError::TeacherBusy);
    }
    Ok(())
}
