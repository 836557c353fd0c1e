//! Display formatting for phone numbers.
//!
//! Submitted values are never rewritten; this only affects what the list shows.

use rlibphonenumber::{region_code::RegionCode, PhoneNumberFormat, PHONE_NUMBER_UTIL};

/// E.164 form of `raw` when it parses, otherwise the trimmed input.
///
/// National numbers need `default_region`; numbers with a `+` prefix parse
/// without one.
pub fn display_phone(raw: &str, default_region: Option<&str>) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let unknown = RegionCode::get_unknown();
    let region = default_region.filter(|r| !r.is_empty()).unwrap_or(unknown);
    let parsed = PHONE_NUMBER_UTIL
        .parse(trimmed, region)
        .or_else(|_| PHONE_NUMBER_UTIL.parse(trimmed, unknown));

    let Ok(number) = parsed else {
        return trimmed.to_string();
    };
    let e164 = PHONE_NUMBER_UTIL.format(&number, PhoneNumberFormat::E164);
    match number.extension() {
        "" => e164.into_owned(),
        ext => format!("{} ext. {}", e164, ext),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_international_number_needs_no_region() {
        assert_eq!(display_phone("+1 650-253-0000", None), "+16502530000");
    }

    #[test]
    fn test_national_number_uses_region() {
        assert_eq!(display_phone("(650) 253-0000", Some("US")), "+16502530000");
    }

    #[test]
    fn test_unparseable_shown_verbatim() {
        assert_eq!(display_phone("  call reception ", Some("US")), "call reception");
        assert_eq!(display_phone("", Some("US")), "");
    }

    #[test]
    fn test_extension_is_kept() {
        assert_eq!(
            display_phone("+1 650-253-0000 ext. 12", None),
            "+16502530000 ext. 12"
        );
    }
}
