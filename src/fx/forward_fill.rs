use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Computes the forward-filled patch for `[from, to]` given the raw points
/// an FX source just fetched, and the carry value seeded from the last
/// watermark day (spec.md §4.3 steps 4-5).
///
/// Returns the patch to persist and the new watermark day, which only
/// advances past a day that was populated from `raw` — a carry-only day
/// never moves it (spec.md §8 property 5, "Watermark").
pub fn compute_patch(
    raw: &BTreeMap<NaiveDate, Decimal>,
    from: NaiveDate,
    to: NaiveDate,
    carry_seed: Option<Decimal>,
) -> (BTreeMap<NaiveDate, Decimal>, Option<NaiveDate>) {
    let mut patch = BTreeMap::new();
    let mut carry = carry_seed;
    let mut new_last_date = None;

    let mut d = from;
    while d <= to {
        if let Some(rate) = raw.get(&d) {
            patch.insert(d, *rate);
            carry = Some(*rate);
            new_last_date = Some(d);
        } else if let Some(c) = carry {
            patch.insert(d, c);
        }
        d = d.succ_opt().expect("date arithmetic in range");
    }

    (patch, new_last_date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    // -- forward-fill --

    #[test]
    fn carries_friday_rate_across_a_weekend_gap() {
        let mut raw = BTreeMap::new();
        raw.insert(d(2024, 1, 5), dec!(90.0)); // Friday

        let (patch, new_last_date) = compute_patch(&raw, d(2024, 1, 5), d(2024, 1, 7), None);

        assert_eq!(patch.get(&d(2024, 1, 5)), Some(&dec!(90.0)));
        assert_eq!(patch.get(&d(2024, 1, 6)), Some(&dec!(90.0))); // Saturday
        assert_eq!(patch.get(&d(2024, 1, 7)), Some(&dec!(90.0))); // Sunday
        assert_eq!(new_last_date, Some(d(2024, 1, 5)));
    }

    #[test]
    fn watermark_does_not_advance_past_a_carry_only_day() {
        let raw = BTreeMap::new(); // no raw points at all this run
        let (patch, new_last_date) = compute_patch(&raw, d(2024, 1, 6), d(2024, 1, 7), Some(dec!(90.0)));

        assert_eq!(patch.get(&d(2024, 1, 6)), Some(&dec!(90.0)));
        assert_eq!(patch.get(&d(2024, 1, 7)), Some(&dec!(90.0)));
        assert_eq!(new_last_date, None);
    }

    #[test]
    fn day_with_no_raw_and_no_carry_is_skipped() {
        let raw = BTreeMap::new();
        let (patch, new_last_date) = compute_patch(&raw, d(2024, 1, 6), d(2024, 1, 7), None);

        assert!(patch.is_empty());
        assert_eq!(new_last_date, None);
    }

    #[test]
    fn later_raw_point_overrides_carry_mid_range() {
        let mut raw = BTreeMap::new();
        raw.insert(d(2024, 1, 8), dec!(91.5)); // Monday, fresh point

        let (patch, new_last_date) = compute_patch(&raw, d(2024, 1, 6), d(2024, 1, 8), Some(dec!(90.0)));

        assert_eq!(patch.get(&d(2024, 1, 6)), Some(&dec!(90.0)));
        assert_eq!(patch.get(&d(2024, 1, 7)), Some(&dec!(90.0)));
        assert_eq!(patch.get(&d(2024, 1, 8)), Some(&dec!(91.5)));
        assert_eq!(new_last_date, Some(d(2024, 1, 8)));
    }

    #[test]
    fn empty_range_when_from_after_to_yields_empty_patch() {
        let raw = BTreeMap::new();
        let (patch, new_last_date) = compute_patch(&raw, d(2024, 1, 8), d(2024, 1, 6), Some(dec!(90.0)));
        assert!(patch.is_empty());
        assert_eq!(new_last_date, None);
    }
}
