use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};

/// Microsecond timestamp of the most recently generated tag in this process.
static LAST_ISSUED_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

const TAG_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";

/// Enforces tag naming policy within a single repository.
///
/// Explicit tags pass through unchanged when free and are rejected when
/// taken. Omitted tags are generated from the current UTC time at
/// microsecond resolution; generation is strictly monotonic within the
/// process, so two generated tags never compare equal even when the clock
/// stalls or steps backwards.
pub struct TagRegistry;

impl TagRegistry {
    pub fn reserve(existing: &HashSet<String>, requested: Option<&str>) -> Result<String> {
        match requested {
            Some(tag) => {
                validate(tag)?;
                if existing.contains(tag) {
                    return Err(Error::TagAlreadyExists {
                        tag: tag.to_string(),
                    });
                }
                Ok(tag.to_string())
            }
            None => Ok(disambiguate(&Self::generate(Utc::now()), existing)),
        }
    }

    /// Produces a timestamp tag no earlier than `now` and later than any tag
    /// previously generated in this process.
    pub fn generate(now: DateTime<Utc>) -> String {
        let wanted = now.timestamp_micros();
        let previous = LAST_ISSUED_MICROS
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(wanted.max(last.saturating_add(1)))
            })
            .unwrap_or(wanted);
        let issued = wanted.max(previous.saturating_add(1));

        let stamp = DateTime::<Utc>::from_timestamp_micros(issued).unwrap_or(now);
        stamp.format(TAG_FORMAT).to_string()
    }
}

/// Appends `-1`, `-2`, ... to `base` until the result is not in `existing`.
pub fn disambiguate(base: &str, existing: &HashSet<String>) -> String {
    if !existing.contains(base) {
        return base.to_string();
    }
    let mut suffix = 1u32;
    loop {
        let candidate = format!("{}-{}", base, suffix);
        if !existing.contains(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

/// Rejects names the backup tool cannot store as an archive name.
pub fn validate(tag: &str) -> Result<()> {
    let reason = if tag.is_empty() {
        Some("tag is empty")
    } else if tag.trim() != tag {
        Some("tag has leading or trailing whitespace")
    } else if tag.contains('/') {
        Some("tag contains '/'")
    } else if tag.contains("::") {
        Some("tag contains '::'")
    } else if tag.chars().any(char::is_control) {
        Some("tag contains control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::InvalidTag {
            tag: tag.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(tags: &[&str]) -> HashSet<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_requested_tag_passes_through() {
        let existing = set(&["v1"]);
        assert_eq!(TagRegistry::reserve(&existing, Some("v2")).unwrap(), "v2");
    }

    #[test]
    fn test_requested_tag_collision_fails() {
        let existing = set(&["v1", "v2"]);
        let err = TagRegistry::reserve(&existing, Some("v2")).unwrap_err();
        assert!(matches!(err, Error::TagAlreadyExists { tag } if tag == "v2"));
    }

    #[test]
    fn test_generated_tags_are_distinct_with_stalled_clock() {
        let now = Utc::now();
        let first = TagRegistry::generate(now);
        let second = TagRegistry::generate(now);
        assert_ne!(first, second);
        assert!(second > first);
    }

    #[test]
    fn test_consecutive_reservations_differ() {
        let mut existing = HashSet::new();
        for _ in 0..50 {
            let tag = TagRegistry::reserve(&existing, None).unwrap();
            assert!(!existing.contains(&tag));
            existing.insert(tag);
        }
        assert_eq!(existing.len(), 50);
    }

    #[test]
    fn test_disambiguate_appends_suffix() {
        let existing = set(&["20260101T000000.000000Z", "20260101T000000.000000Z-1"]);
        assert_eq!(
            disambiguate("20260101T000000.000000Z", &existing),
            "20260101T000000.000000Z-2"
        );
        assert_eq!(disambiguate("fresh", &existing), "fresh");
    }

    #[test]
    fn test_generated_format() {
        let now = DateTime::parse_from_rfc3339("2030-01-02T03:04:05.678901Z")
            .unwrap()
            .with_timezone(&Utc);
        let tag = TagRegistry::generate(now);
        // Other tests may have issued later stamps; only the shape is stable.
        assert_eq!(tag.len(), "20300102T030405.678901Z".len());
        assert!(tag.ends_with('Z'));
        assert!(validate(&tag).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        assert!(validate("").is_err());
        assert!(validate("a/b").is_err());
        assert!(validate("repo::tag").is_err());
        assert!(validate(" padded").is_err());
        assert!(validate("release-1.0").is_ok());
    }
}
