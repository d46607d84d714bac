//! RFC 3339 serde helpers for message and session timestamps.

use serde::{Deserialize, Deserializer, Serializer};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Deserialize an RFC 3339 formatted string into an OffsetDateTime
pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    OffsetDateTime::parse(&s, &Rfc3339).map_err(serde::de::Error::custom)
}

/// Serialize an OffsetDateTime into an RFC 3339 formatted string
pub fn serialize<S>(datetime: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let s = datetime
        .format(&Rfc3339)
        .map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&s)
}

/// Returns the current time truncated to whole seconds.
///
/// Timestamps are written to transcripts as RFC 3339 strings; truncating keeps
/// a reloaded transcript equal to the in-memory copy.
pub fn now() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(0).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use time::macros::datetime;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Stamped {
        #[serde(with = "crate::utils::time")]
        at: OffsetDateTime,
    }

    #[test]
    fn serializes_as_rfc3339() {
        let stamped = Stamped {
            at: datetime!(2024-05-01 12:30:00 UTC),
        };
        let json = serde_json::to_string(&stamped).unwrap();
        assert_eq!(json, r#"{"at":"2024-05-01T12:30:00Z"}"#);
        let back: Stamped = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stamped);
    }

    #[test]
    fn rejects_garbage() {
        assert!(serde_json::from_str::<Stamped>(r#"{"at":"yesterday"}"#).is_err());
    }

    #[test]
    fn now_has_no_subsecond_part() {
        assert_eq!(now().nanosecond(), 0);
    }
}
