//! Phone number canonicalization.

use crate::config::PhoneConfig;

/// Canonicalize a raw phone number into its country-coded digit form.
///
/// Strips all non-digit characters, then applies the prefix rules in order
/// (first match wins): a leading `00` international prefix is dropped; a
/// 10-digit number with a single leading zero has the zero replaced by the
/// country code; a 9-digit number starting with the mobile prefix gets the
/// country code prepended. Input with no digits left after stripping
/// yields `None`.
#[must_use]
pub fn normalize(raw: Option<&str>, policy: &PhoneConfig) -> Option<String> {
    let raw = raw?;
    let mut digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    if let Some(stripped) = digits.strip_prefix("00") {
        digits = stripped.to_owned();
    }
    // A bare international prefix carries no number at all.
    if digits.is_empty() {
        return None;
    }

    if digits.len() == 10 && digits.starts_with('0') {
        digits = format!("{}{}", policy.country_code, &digits[1..]);
    } else if digits.len() == 9 && digits.starts_with(&policy.mobile_prefix) {
        digits = format!("{}{digits}", policy.country_code);
    }

    Some(digits)
}
