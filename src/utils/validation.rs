//! Centralized validation and helper functions.

use rust_decimal::Decimal;

/// Minimum number of characters in a trimmed description
pub const MIN_DESCRIPTION_CHARS: usize = 3;

/// Maximum number of characters in a description (DOS protection)
pub const MAX_DESCRIPTION_CHARS: usize = 1024;

/// Maximum number of characters accepted by the autocomplete path
pub const MAX_PARTIAL_QUERY_CHARS: usize = 256;

/// Length of a phone number token
pub const PHONE_DIGITS: usize = 8;

/// Input validation error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Description is empty")]
    EmptyDescription,
    #[error("Description too short: needs at least {MIN_DESCRIPTION_CHARS} characters")]
    DescriptionTooShort,
    #[error("Description too long: exceeds {MAX_DESCRIPTION_CHARS} characters")]
    DescriptionTooLong,
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),
}

/// Validate a suggestion request and return the trimmed description.
///
/// # Errors
///
/// Returns `ValidationError::EmptyDescription` for blank text,
/// `ValidationError::DescriptionTooShort` / `DescriptionTooLong` when the
/// trimmed text is outside the accepted length, and
/// `ValidationError::NonPositiveAmount` when `amount <= 0`.
pub fn validate_request(description: &str, amount: Decimal) -> Result<&str, ValidationError> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyDescription);
    }

    let chars = trimmed.chars().count();
    if chars < MIN_DESCRIPTION_CHARS {
        return Err(ValidationError::DescriptionTooShort);
    }
    if chars > MAX_DESCRIPTION_CHARS {
        return Err(ValidationError::DescriptionTooLong);
    }

    if amount <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount(amount));
    }

    Ok(trimmed)
}

/// Normalize a license plate for equality checks: keep letters and digits
/// only (Latin or Cyrillic), uppercase.
///
/// # Examples
///
/// ```
/// use loan_matcher::utils::validation::normalize_plate;
///
/// assert_eq!(normalize_plate("25-42 унг"), "2542УНГ");
/// assert_eq!(normalize_plate("abc-1234"), "ABC1234");
/// ```
#[must_use]
pub fn normalize_plate(plate: &str) -> String {
    plate
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Check whether a token looks like a local phone number (exactly 8 digits).
#[must_use]
pub fn is_phone_token(s: &str) -> bool {
    s.len() == PHONE_DIGITS && s.chars().all(|c| c.is_ascii_digit())
}

/// Compute a stable suggestion id from the engine name, the target and the
/// request it was produced for.
///
/// The id is `<engine>_` followed by the first 12 hex characters of an MD5
/// digest, so identical requests map to identical ids.
#[must_use]
pub fn compute_suggestion_id(engine: &str, target: &str, description: &str, rank: usize) -> String {
    let material = format!("{engine}|{target}|{description}|{rank}");
    let digest = format!("{:x}", md5::compute(material.as_bytes()));
    format!("{engine}_{}", &digest[..12])
}

/// Last `n` characters of a string, used to shorten loan numbers in labels.
#[must_use]
pub fn last_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    let skip = count - n;
    s.char_indices().nth(skip).map_or(s, |(idx, _)| &s[idx..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_request_accepts_and_trims() {
        assert_eq!(
            validate_request("  Office rent  ", dec!(10)).unwrap(),
            "Office rent"
        );
        // Three Cyrillic characters are three characters, not six bytes
        assert!(validate_request("абв", dec!(1)).is_ok());
    }

    #[test]
    fn test_validate_request_rejects_bad_input() {
        assert_eq!(
            validate_request("   ", dec!(10)),
            Err(ValidationError::EmptyDescription)
        );
        assert_eq!(
            validate_request("ab", dec!(10)),
            Err(ValidationError::DescriptionTooShort)
        );
        assert_eq!(
            validate_request(&"a".repeat(MAX_DESCRIPTION_CHARS + 1), dec!(10)),
            Err(ValidationError::DescriptionTooLong)
        );
        assert_eq!(
            validate_request("valid text", dec!(0)),
            Err(ValidationError::NonPositiveAmount(dec!(0)))
        );
        assert!(validate_request("valid text", dec!(-5)).is_err());
    }

    #[test]
    fn test_normalize_plate() {
        assert_eq!(normalize_plate("6045УАМ"), "6045УАМ");
        assert_eq!(normalize_plate("6045 уам"), "6045УАМ");
        assert_eq!(normalize_plate("ABC-1234"), "ABC1234");
        assert_eq!(normalize_plate("--"), "");
    }

    #[test]
    fn test_is_phone_token() {
        assert!(is_phone_token("88980800"));
        assert!(!is_phone_token("8898080"));
        assert!(!is_phone_token("889808001"));
        assert!(!is_phone_token("8898O800"));
    }

    #[test]
    fn test_compute_suggestion_id_is_stable() {
        let a = compute_suggestion_id("phone_priority", "loan:1", "text", 1);
        let b = compute_suggestion_id("phone_priority", "loan:1", "text", 1);
        let c = compute_suggestion_id("phone_priority", "loan:2", "text", 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("phone_priority_"));
        assert_eq!(a.len(), "phone_priority_".len() + 12);
    }

    #[test]
    fn test_last_chars() {
        assert_eq!(last_chars("LN-2024-000123", 6), "000123");
        assert_eq!(last_chars("123", 6), "123");
        assert_eq!(last_chars("зээл123", 4), "л123");
    }
}
