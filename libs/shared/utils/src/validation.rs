// =====================================================================================
// FIELD VALIDATION - CONTACT DETAILS
// =====================================================================================

use regex::Regex;
use std::sync::LazyLock;

const EMAIL_PATTERN: &str = r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$";

/// Loose international format: optional leading `+`, digits, spaces, dashes, parentheses.
const PHONE_PATTERN: &str = r"^\+?[0-9(][0-9 ()\-]{5,18}[0-9]$";

static EMAIL_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(EMAIL_PATTERN).ok());

static PHONE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(PHONE_PATTERN).ok());

pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_RE.as_ref().is_some_and(|re| re.is_match(value.trim()))
}

pub fn is_valid_phone(value: &str) -> bool {
    let value = value.trim();
    let digits = value.chars().filter(char::is_ascii_digit).count();
    PHONE_RE.as_ref().is_some_and(|re| re.is_match(value)) && (7..=15).contains(&digits)
}
