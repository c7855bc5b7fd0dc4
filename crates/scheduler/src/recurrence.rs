//! Next-due-date calculation for recurring audit schedules.
//!
//! Pure functions only: the same rule and reference date always produce
//! the same result, and the result is always strictly after the reference.

use chrono::{Datelike, Days, Months, NaiveDate};

use cadence_core::{Frequency, RecurrenceRule};

const DEFAULT_DAY_OF_MONTH: u32 = 1;
const DEFAULT_MONTH_OF_YEAR: u32 = 1;
/// Monday, counting from Sunday = 0.
const DEFAULT_DAY_OF_WEEK: u32 = 1;

/// Compute the next due date strictly after `reference`.
///
/// | frequency | rule |
/// |---|---|
/// | daily | `reference` + 1 day |
/// | weekly | next `day_of_week` (default Monday); the same weekday moves a full week |
/// | monthly | next month on `day_of_month` (default 1st), clamped to the month's last day |
/// | quarterly | `reference` three months on, then `day_of_month` (default 1st) in the month reached; an excess day rolls into the following month at each step |
/// | annually | next year on `month_of_year`/`day_of_month` (default Jan 1st), clamped to month end |
/// | unrecognized | monthly on the 1st |
///
/// Anchors outside their valid range are treated as unset. Returns `None`
/// only when the result would fall outside chrono's representable range.
pub fn next_due_date(rule: &RecurrenceRule, reference: NaiveDate) -> Option<NaiveDate> {
    let day = anchor(rule.day_of_month, 1, 31).unwrap_or(DEFAULT_DAY_OF_MONTH);

    match &rule.frequency {
        Frequency::Daily => reference.succ_opt(),
        Frequency::Weekly => {
            let target = anchor(rule.day_of_week, 0, 6).unwrap_or(DEFAULT_DAY_OF_WEEK);
            let current = reference.weekday().num_days_from_sunday();
            let ahead = match (target + 7 - current) % 7 {
                0 => 7,
                n => n,
            };
            reference.checked_add_days(Days::new(u64::from(ahead)))
        }
        Frequency::Monthly => clamp_to_month(month_start(reference, 1)?, day),
        Frequency::Quarterly => {
            let shifted = roll_into_month(month_start(reference, 3)?, reference.day())?;
            roll_into_month(shifted.with_day(1)?, day)
        }
        Frequency::Annually => {
            let month = anchor(rule.month_of_year, 1, 12).unwrap_or(DEFAULT_MONTH_OF_YEAR);
            let start = NaiveDate::from_ymd_opt(reference.year().checked_add(1)?, month, 1)?;
            clamp_to_month(start, day)
        }
        Frequency::Unrecognized(_) => clamp_to_month(month_start(reference, 1)?, DEFAULT_DAY_OF_MONTH),
    }
}

fn anchor(value: Option<u32>, min: u32, max: u32) -> Option<u32> {
    value.filter(|v| (min..=max).contains(v))
}

/// First day of the month `months` after the month containing `date`.
fn month_start(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.with_day(1)?.checked_add_months(Months::new(months))
}

fn days_in_month(start: NaiveDate) -> Option<u32> {
    Some(start.checked_add_months(Months::new(1))?.pred_opt()?.day())
}

/// `day` within the month starting at `start`, capped at its last day.
fn clamp_to_month(start: NaiveDate, day: u32) -> Option<NaiveDate> {
    start.with_day(day.min(days_in_month(start)?))
}

/// `day` counted from `start`; days past the month end spill into the next month.
fn roll_into_month(start: NaiveDate, day: u32) -> Option<NaiveDate> {
    start.checked_add_days(Days::new(u64::from(day - 1)))
}
