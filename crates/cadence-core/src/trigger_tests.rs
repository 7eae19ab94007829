use super::*;
use chrono::TimeZone;

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, h, m, s).unwrap()
}

#[test]
fn test_one_shot_fires_once() {
    let trigger = Trigger::once(at(9, 0, 0));
    let now = at(10, 0, 0);

    // Start time already passed: still reported so the loop can fire it.
    assert_eq!(trigger.next_fire_after(now, None, 0), Some(at(9, 0, 0)));
    assert_eq!(trigger.next_fire_after(now, Some(at(10, 0, 0)), 1), None);
}

#[test]
fn test_repeating_exhausts_after_repeat_count() {
    let trigger = Trigger::repeating(at(9, 0, 0), Duration::from_secs(1), 2);
    let now = at(8, 0, 0);

    let first = trigger.next_fire_after(now, None, 0).unwrap();
    assert_eq!(first, at(9, 0, 0));
    let second = trigger.next_fire_after(now, Some(first), 1).unwrap();
    assert_eq!(second, at(9, 0, 1));
    let third = trigger.next_fire_after(now, Some(second), 2).unwrap();
    assert_eq!(third, at(9, 0, 2));
    assert_eq!(trigger.next_fire_after(now, Some(third), 3), None);
}

#[test]
fn test_repeating_zero_repeat_count_fires_once() {
    let trigger = Trigger::repeating(at(9, 0, 0), Duration::from_secs(60), 0);
    assert_eq!(trigger.upcoming(at(8, 0, 0), 5), vec![at(9, 0, 0)]);
}

#[test]
fn test_repeat_forever_never_exhausts() {
    let trigger = Trigger::repeat_forever(at(9, 0, 0), Duration::from_secs(30));
    let next = trigger.next_fire_after(at(9, 0, 0), Some(at(12, 0, 0)), 10_000);
    assert_eq!(next, Some(at(12, 0, 30)));
}

#[test]
fn test_cron_top_of_minute() {
    let trigger = Trigger::cron("0 * * * * ?");
    let now = at(11, 59, 30);
    assert_eq!(trigger.next_fire_after(now, None, 0), Some(at(12, 0, 0)));
}

#[test]
fn test_cron_uses_latest_of_now_and_previous() {
    let trigger = Trigger::cron("0 * * * * ?");
    let next = trigger.next_fire_after(at(10, 0, 30), Some(at(10, 5, 0)), 3);
    assert_eq!(next, Some(at(10, 6, 0)));
}

#[test]
fn test_cron_five_field_expression() {
    let trigger = Trigger::cron("30 4 * * *");
    assert!(trigger.validate(at(0, 0, 0)).is_ok());
    assert_eq!(trigger.next_fire_after(at(1, 0, 0), None, 0), Some(at(4, 30, 0)));
}

#[test]
fn test_five_field_weekdays_use_unix_numbering() {
    // 2026-01-04 is a Sunday.
    let sunday = Utc.with_ymd_and_hms(2026, 1, 4, 0, 0, 0).unwrap();
    let monday_nine = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();

    let weekdays = Trigger::cron("0 9 * * 1-5");
    assert!(weekdays.validate(sunday).is_ok());
    assert_eq!(weekdays.next_fire_after(sunday, None, 0), Some(monday_nine));
    let friday_nine = Utc.with_ymd_and_hms(2026, 1, 9, 9, 0, 0).unwrap();
    assert_eq!(
        weekdays.next_fire_after(sunday, Some(friday_nine), 5),
        Some(Utc.with_ymd_and_hms(2026, 1, 12, 9, 0, 0).unwrap())
    );

    let sundays = Trigger::cron("0 9 * * 0");
    assert!(sundays.validate(sunday).is_ok());
    assert_eq!(sundays.next_fire_after(sunday, None, 0), Some(sunday + chrono::Duration::hours(9)));
    assert_eq!(
        Trigger::cron("0 9 * * 7").next_fire_after(sunday, None, 0),
        Some(sunday + chrono::Duration::hours(9))
    );
}

#[test]
fn test_five_field_day_of_week_translation() {
    assert_eq!(normalize_cron("0 9 * * 1-5"), "0 0 9 * * 2,3,4,5,6");
    assert_eq!(normalize_cron("0 9 * * 5-7"), "0 0 9 * * 1,6,7");
    assert_eq!(normalize_cron("0 9 * * 0,3"), "0 0 9 * * 1,4");
    assert_eq!(normalize_cron("0 9 * * */2"), "0 0 9 * * 1,3,5,7");
    assert_eq!(normalize_cron("0 9 * * MON-FRI"), "0 0 9 * * MON-FRI");
    assert_eq!(normalize_cron("0 9 * * *"), "0 0 9 * * *");
    // Six-field expressions already use the crate's numbering.
    assert_eq!(normalize_cron("0 0 9 * * 2-6"), "0 0 9 * * 2-6");
    assert!(Trigger::cron("0 9 * * 8").validate(Utc::now()).is_err());
}

#[test]
fn test_cron_invalid_expression_fails_validation() {
    let trigger = Trigger::cron("not a cron expression");
    let err = trigger.validate(at(0, 0, 0)).unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidTrigger(_)));
    assert_eq!(trigger.next_fire_after(at(0, 0, 0), None, 0), None);
}

#[test]
fn test_cron_empty_expression_fails_validation() {
    assert!(Trigger::cron("  ").validate(at(0, 0, 0)).is_err());
}

#[test]
fn test_repeating_zero_interval_is_invalid() {
    let trigger = Trigger::repeating(at(9, 0, 0), Duration::ZERO, 3);
    assert!(matches!(
        trigger.validate(at(0, 0, 0)),
        Err(SchedulerError::InvalidTrigger(_))
    ));
}

#[test]
fn test_repeating_negative_repeat_count_is_invalid() {
    let trigger = Trigger::repeating(at(9, 0, 0), Duration::from_secs(1), -2);
    assert!(trigger.validate(at(0, 0, 0)).is_err());
    assert!(Trigger::repeat_forever(at(9, 0, 0), Duration::from_secs(1))
        .validate(at(0, 0, 0))
        .is_ok());
}

#[test]
fn test_start_at() {
    assert_eq!(Trigger::once(at(9, 0, 0)).start_at(), Some(at(9, 0, 0)));
    assert_eq!(Trigger::cron("0 * * * * ?").start_at(), None);
}

#[test]
fn test_upcoming_cron() {
    let trigger = Trigger::cron("0 0/15 * * * ?");
    let times = trigger.upcoming(at(10, 7, 0), 3);
    assert_eq!(times, vec![at(10, 15, 0), at(10, 30, 0), at(10, 45, 0)]);
}

#[test]
fn test_trigger_serde_tagged() {
    let trigger = Trigger::repeating(at(9, 0, 0), Duration::from_secs(5), 4);
    let json = serde_json::to_value(&trigger).unwrap();
    assert_eq!(json["kind"], "repeating");
    assert_eq!(json["repeat_count"], 4);

    let parsed: Trigger = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, trigger);
}
