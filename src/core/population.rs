use crate::models::PopulationCategory;
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeSet;

/// Upper age bound (inclusive) of the child band
pub const CHILD_MAX_AGE: u32 = 12;
/// Upper age bound (inclusive) of the adolescent band
pub const ADOLESCENT_MAX_AGE: u32 = 17;
/// Upper age bound (inclusive) of the adult band
pub const ADULT_MAX_AGE: u32 = 64;

/// Age in completed years on `as_of`, or `None` for a birthdate in the future
#[inline]
pub fn age_in_years(birth_date: NaiveDate, as_of: NaiveDate) -> Option<u32> {
    if birth_date > as_of {
        return None;
    }

    let mut age = as_of.year() - birth_date.year();
    if (as_of.month(), as_of.day()) < (birth_date.month(), birth_date.day()) {
        age -= 1;
    }

    u32::try_from(age).ok()
}

/// Map an age to its population band
#[inline]
pub fn category_for_age(age: u32) -> PopulationCategory {
    if age <= CHILD_MAX_AGE {
        PopulationCategory::Child
    } else if age <= ADOLESCENT_MAX_AGE {
        PopulationCategory::Adolescent
    } else if age <= ADULT_MAX_AGE {
        PopulationCategory::Adult
    } else {
        PopulationCategory::Senior
    }
}

/// Derive the population categories of a request's participants.
///
/// Pure function of the birthdates and the reference date; birthdates after
/// `as_of` are ignored.
pub fn derive_population_categories(
    birthdates: &[NaiveDate],
    as_of: NaiveDate,
) -> BTreeSet<PopulationCategory> {
    birthdates
        .iter()
        .filter_map(|birth_date| age_in_years(*birth_date, as_of))
        .map(category_for_age)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_age_before_and_after_birthday() {
        let birth = date(2000, 6, 15);
        assert_eq!(age_in_years(birth, date(2020, 6, 14)), Some(19));
        assert_eq!(age_in_years(birth, date(2020, 6, 15)), Some(20));
        assert_eq!(age_in_years(birth, date(2000, 6, 15)), Some(0));
    }

    #[test]
    fn test_future_birthdate_is_ignored() {
        assert_eq!(age_in_years(date(2030, 1, 1), date(2026, 1, 1)), None);
        let categories = derive_population_categories(&[date(2030, 1, 1)], date(2026, 1, 1));
        assert!(categories.is_empty());
    }

    #[test]
    fn test_band_boundaries() {
        assert_eq!(category_for_age(0), PopulationCategory::Child);
        assert_eq!(category_for_age(12), PopulationCategory::Child);
        assert_eq!(category_for_age(13), PopulationCategory::Adolescent);
        assert_eq!(category_for_age(17), PopulationCategory::Adolescent);
        assert_eq!(category_for_age(18), PopulationCategory::Adult);
        assert_eq!(category_for_age(64), PopulationCategory::Adult);
        assert_eq!(category_for_age(65), PopulationCategory::Senior);
    }

    #[test]
    fn test_family_request_yields_multiple_categories() {
        let as_of = date(2026, 3, 1);
        let categories = derive_population_categories(
            &[date(1985, 4, 2), date(1987, 11, 30), date(2015, 2, 1), date(2011, 1, 1)],
            as_of,
        );

        let expected: BTreeSet<_> = [
            PopulationCategory::Child,
            PopulationCategory::Adolescent,
            PopulationCategory::Adult,
        ]
        .into_iter()
        .collect();
        assert_eq!(categories, expected);
    }

    #[test]
    fn test_leap_day_birthdate() {
        let birth = date(2008, 2, 29);
        assert_eq!(age_in_years(birth, date(2026, 2, 28)), Some(17));
        assert_eq!(age_in_years(birth, date(2026, 3, 1)), Some(18));
    }
}
