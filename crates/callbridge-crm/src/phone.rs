// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Phone normalization and digit comparison.

use thiserror::Error;

/// Fewest digits a dialable number can have.
pub const MIN_DIGITS: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhoneError {
    #[error("phone number has {digits} digits; at least {MIN_DIGITS} are required")]
    TooShort { digits: usize },
}

/// A normalized phone number in the forms matching needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNumber {
    digits: String,
}

impl PhoneNumber {
    /// Strip everything but digits and apply `country_code` to bare
    /// 10-digit numbers.
    pub fn parse(raw: &str, country_code: &str) -> Result<Self, PhoneError> {
        let digits = digits_of(raw);
        if digits.len() < MIN_DIGITS {
            return Err(PhoneError::TooShort {
                digits: digits.len(),
            });
        }
        let digits = if digits.len() == 10 {
            format!("{}{digits}", digits_of(country_code))
        } else {
            digits
        };
        Ok(Self { digits })
    }

    /// `+` followed by every digit.
    pub fn canonical(&self) -> String {
        format!("+{}", self.digits)
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    /// Last ten digits, or all of them for shorter numbers.
    pub fn last10(&self) -> &str {
        last10(&self.digits)
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "+{}", self.digits)
    }
}

pub fn digits_of(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

fn last10(digits: &str) -> &str {
    // digits are ASCII so byte slicing is safe
    &digits[digits.len().saturating_sub(10)..]
}

/// Stored value matches when digits are equal or, for numbers of ten or
/// more digits, the last ten agree.
pub fn digits_match(phone: &PhoneNumber, stored: &str) -> bool {
    let stored = digits_of(stored);
    if stored.len() < MIN_DIGITS {
        return false;
    }
    if stored == phone.digits {
        return true;
    }
    stored.len() >= 10 && phone.digits.len() >= 10 && last10(&stored) == phone.last10()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn ten_digits_get_country_code() {
        let phone = PhoneNumber::parse("(555) 123-4567", "1").unwrap();
        assert_eq!(phone.canonical(), "+15551234567");
        assert_eq!(phone.digits(), "15551234567");
        assert_eq!(phone.last10(), "5551234567");
    }

    #[test]
    fn other_lengths_keep_their_digits() {
        assert_eq!(
            PhoneNumber::parse("+44 20 7946 0958", "1").unwrap().canonical(),
            "+442079460958"
        );
        assert_eq!(PhoneNumber::parse("555-1234", "1").unwrap().canonical(), "+5551234");
    }

    #[test]
    fn short_numbers_are_rejected() {
        assert_eq!(
            PhoneNumber::parse("12-34", "1"),
            Err(PhoneError::TooShort { digits: 4 })
        );
        assert_eq!(
            PhoneNumber::parse("", "1"),
            Err(PhoneError::TooShort { digits: 0 })
        );
    }

    #[test]
    fn stored_values_match_on_last_ten() {
        let phone = PhoneNumber::parse("5551234567", "1").unwrap();
        assert!(digits_match(&phone, "555.123.4567"));
        assert!(digits_match(&phone, "+1 (555) 123-4567"));
        assert!(!digits_match(&phone, "555-123-4568"));
        assert!(!digits_match(&phone, "1234567"));
        assert!(!digits_match(&phone, ""));
    }

    proptest! {
        #[test]
        fn canonical_is_plus_and_digits(raw in "[0-9 ()+.-]{0,24}") {
            match PhoneNumber::parse(&raw, "1") {
                Ok(phone) => {
                    let canonical = phone.canonical();
                    prop_assert!(canonical.starts_with('+'));
                    prop_assert!(canonical[1..].chars().all(|c| c.is_ascii_digit()));
                    prop_assert!(phone.digits().len() >= MIN_DIGITS);
                    prop_assert!(digits_match(&phone, &raw));
                }
                Err(PhoneError::TooShort { digits }) => prop_assert!(digits < MIN_DIGITS),
            }
        }

        #[test]
        fn normalization_is_idempotent(raw in "[0-9]{7,15}") {
            let once = PhoneNumber::parse(&raw, "1").unwrap();
            let twice = PhoneNumber::parse(&once.canonical(), "1").unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
