//! Location validation: structural checks run before any push.
//!
//! These catch values every platform would reject. They are deliberately
//! loose; platform-specific rules surface as adapter rejections.

use crate::error::ValidationError;
use crate::location::Location;
use crate::snapshot::Field;

/// Maximum length of any single field.
pub const MAX_FIELD_LEN: usize = 256;

/// Minimum number of digits in a non-empty phone number.
pub const MIN_PHONE_DIGITS: usize = 7;

/// Validate the canonical fields of `location`.
pub fn validate_location(location: &Location) -> Result<(), ValidationError> {
    // 1. Name is required
    if location.name.trim().is_empty() {
        return Err(ValidationError::MissingField(Field::Name));
    }

    // 2. Length limits
    for field in Field::ALL {
        if location.field(field).chars().count() > MAX_FIELD_LEN {
            return Err(ValidationError::TooLong {
                field,
                max: MAX_FIELD_LEN,
            });
        }
    }

    // 3. Website, if present
    let website = location.website.trim();
    if !website.is_empty() && !is_valid_website(website) {
        return Err(ValidationError::InvalidWebsite(location.website.clone()));
    }

    // 4. Phone, if present
    let phone = location.phone.trim();
    if !phone.is_empty() && !is_valid_phone(phone) {
        return Err(ValidationError::InvalidPhone(location.phone.clone()));
    }

    Ok(())
}

fn is_valid_website(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(host) => !host.is_empty() && !url.chars().any(char::is_whitespace),
        None => false,
    }
}

fn is_valid_phone(phone: &str) -> bool {
    let allowed = |c: char| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | ' ' | '.');
    phone.chars().all(allowed) && phone.chars().filter(char::is_ascii_digit).count() >= MIN_PHONE_DIGITS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Location {
        let mut loc = Location::new("loc-1", "ws-1", "Blue Door Cafe", 0);
        loc.phone = "+1 (217) 555-0100".into();
        loc.website = "https://bluedoor.example/menu".into();
        loc
    }

    #[test]
    fn test_valid_location() {
        assert!(validate_location(&valid()).is_ok());
    }

    #[test]
    fn test_empty_optional_fields_are_fine() {
        let mut loc = valid();
        loc.phone.clear();
        loc.website.clear();
        assert!(validate_location(&loc).is_ok());
    }

    #[test]
    fn test_missing_name() {
        let mut loc = valid();
        loc.name = "   ".into();
        assert_eq!(
            validate_location(&loc),
            Err(ValidationError::MissingField(Field::Name))
        );
    }

    #[test]
    fn test_bad_website() {
        let mut loc = valid();
        loc.website = "bluedoor.example".into();
        assert!(matches!(
            validate_location(&loc),
            Err(ValidationError::InvalidWebsite(_))
        ));

        loc.website = "https://blue door.example".into();
        assert!(matches!(
            validate_location(&loc),
            Err(ValidationError::InvalidWebsite(_))
        ));
    }

    #[test]
    fn test_bad_phone() {
        let mut loc = valid();
        loc.phone = "call us".into();
        assert!(matches!(
            validate_location(&loc),
            Err(ValidationError::InvalidPhone(_))
        ));

        loc.phone = "555".into();
        assert!(matches!(
            validate_location(&loc),
            Err(ValidationError::InvalidPhone(_))
        ));
    }

    #[test]
    fn test_too_long() {
        let mut loc = valid();
        loc.address = "x".repeat(MAX_FIELD_LEN + 1);
        assert_eq!(
            validate_location(&loc),
            Err(ValidationError::TooLong {
                field: Field::Address,
                max: MAX_FIELD_LEN,
            })
        );
    }
}
