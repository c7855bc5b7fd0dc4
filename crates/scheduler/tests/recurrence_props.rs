use chrono::{Datelike, NaiveDate};
use proptest::prelude::*;

use cadence_core::{Frequency, RecurrenceRule};
use cadence_scheduler::next_due_date;

fn any_frequency() -> impl Strategy<Value = Frequency> {
    prop_oneof![
        Just(Frequency::Daily),
        Just(Frequency::Weekly),
        Just(Frequency::Monthly),
        Just(Frequency::Quarterly),
        Just(Frequency::Annually),
        "[a-z]{3,10}".prop_map(|s| Frequency::from(format!("x{s}"))),
    ]
}

fn any_rule() -> impl Strategy<Value = RecurrenceRule> {
    (
        any_frequency(),
        proptest::option::of(0u32..40),
        proptest::option::of(0u32..15),
        proptest::option::of(0u32..9),
    )
        .prop_map(|(frequency, day_of_month, month_of_year, day_of_week)| RecurrenceRule {
            frequency,
            day_of_month,
            month_of_year,
            day_of_week,
        })
}

fn any_reference() -> impl Strategy<Value = NaiveDate> {
    // 1990-01-01 .. ~2090
    (0i64..36_500).prop_map(|offset| {
        NaiveDate::from_ymd_opt(1990, 1, 1).unwrap() + chrono::Duration::days(offset)
    })
}

proptest! {
    #[test]
    fn next_due_is_strictly_later(rule in any_rule(), reference in any_reference()) {
        let next = next_due_date(&rule, reference).unwrap();
        prop_assert!(next > reference, "{next} not after {reference} for {rule:?}");
    }

    #[test]
    fn next_due_is_deterministic(rule in any_rule(), reference in any_reference()) {
        prop_assert_eq!(next_due_date(&rule, reference), next_due_date(&rule, reference));
    }

    #[test]
    fn weekly_lands_on_anchor_within_a_week(weekday in 0u32..7, reference in any_reference()) {
        let rule = RecurrenceRule::new(Frequency::Weekly).day_of_week(weekday);
        let next = next_due_date(&rule, reference).unwrap();
        let gap = (next - reference).num_days();
        prop_assert!((1..=7).contains(&gap));
        prop_assert_eq!(next.weekday().num_days_from_sunday(), weekday);
    }

    #[test]
    fn monthly_stays_in_following_month(day in 1u32..=31, reference in any_reference()) {
        let rule = RecurrenceRule::new(Frequency::Monthly).day_of_month(day);
        let next = next_due_date(&rule, reference).unwrap();
        let months = (next.year() - reference.year()) * 12 + next.month() as i32 - reference.month() as i32;
        prop_assert_eq!(months, 1);
        prop_assert!(next.day() <= day);
    }
}
