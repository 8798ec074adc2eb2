//! Normalization of the loosely formatted timestamps the graph API emits.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// A timestamp string that could not be parsed even after normalization.
/// Never fatal to ingestion; the affected field simply stays unset.
#[derive(Debug, Error)]
#[error("unparseable timestamp {raw:?}")]
pub struct TimestampError {
    pub raw: String,
    #[source]
    pub source: chrono::ParseError,
}

/// Convert a graph-API timestamp string into a UTC instant.
///
/// Three shapes show up in payloads: a literal `Z` suffix, a proper RFC 3339
/// offset, and a colonless numeric offset like `+0200`. The first becomes an
/// explicit `+00:00`; the colonless form gets a colon inserted before the
/// minutes; anything else is parsed as-is.
pub fn normalize(raw: &str) -> Result<DateTime<Utc>, TimestampError> {
    let candidate = if let Some(stripped) = raw.strip_suffix('Z') {
        format!("{stripped}+00:00")
    } else if has_colonless_offset(raw) {
        let (head, minutes) = raw.split_at(raw.len() - 2);
        format!("{head}:{minutes}")
    } else {
        raw.to_owned()
    };

    DateTime::parse_from_rfc3339(&candidate)
        .map(|instant| instant.with_timezone(&Utc))
        .map_err(|source| TimestampError {
            raw: raw.to_owned(),
            source,
        })
}

/// True when the last five characters are a signed four-digit offset with no
/// colon separator (`+HHMM` / `-HHMM`).
fn has_colonless_offset(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    if bytes.len() < 5 {
        return false;
    }
    let tail = &bytes[bytes.len() - 5..];
    matches!(tail[0], b'+' | b'-') && tail[1..].iter().all(u8::is_ascii_digit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn zulu_suffix_becomes_utc_offset() {
        let instant = normalize("2025-04-01T18:00:00Z").unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2025, 4, 1, 18, 0, 0).unwrap());
    }

    #[test]
    fn colonless_offset_gets_a_colon() {
        let instant = normalize("2025-03-15T16:00:00+0200").unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2025, 3, 15, 14, 0, 0).unwrap());
    }

    #[test]
    fn colonless_utc_offset_matches_zulu() {
        assert_eq!(
            normalize("2025-04-01T18:00:00+0000").unwrap(),
            normalize("2025-04-01T18:00:00Z").unwrap()
        );
    }

    #[test]
    fn negative_colonless_offset() {
        let instant = normalize("2025-04-01T18:00:00-0430").unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2025, 4, 1, 22, 30, 0).unwrap());
    }

    #[test]
    fn proper_rfc3339_offset_is_untouched() {
        let instant = normalize("2025-03-15T16:00:00+02:00").unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2025, 3, 15, 14, 0, 0).unwrap());
    }

    #[test]
    fn garbage_carries_the_original_string() {
        let err = normalize("not a timestamp").unwrap_err();
        assert_eq!(err.raw, "not a timestamp");
    }

    #[test]
    fn out_of_range_components_fail() {
        assert!(normalize("2025-13-40T99:00:00Z").is_err());
    }

    #[test]
    fn short_strings_do_not_panic() {
        assert!(normalize("+02").is_err());
        assert!(normalize("").is_err());
    }
}
