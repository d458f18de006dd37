use crate::error::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, Time};

/// An instant as it appears in `meta.lastUpdated` and history bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FhirDateTime(pub OffsetDateTime);

impl FhirDateTime {
    pub fn new(datetime: OffsetDateTime) -> Self {
        Self(datetime)
    }

    pub fn inner(&self) -> &OffsetDateTime {
        &self.0
    }

    pub fn into_inner(self) -> OffsetDateTime {
        self.0
    }

    /// Parses a history bound: a full RFC 3339 instant, or a bare
    /// `YYYY-MM-DD` date taken as midnight UTC.
    pub fn parse_bound(s: &str) -> Result<Self> {
        if let Ok(dt) = Self::from_str(s) {
            return Ok(dt);
        }
        let date = Date::parse(s, format_description!("[year]-[month]-[day]")).map_err(|e| {
            CoreError::invalid_date_time(format!("Failed to parse bound '{s}': {e}"))
        })?;
        Ok(FhirDateTime(date.with_time(Time::MIDNIGHT).assume_utc()))
    }
}

impl fmt::Display for FhirDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = self.0.format(&Rfc3339).map_err(|_| fmt::Error)?;
        write!(f, "{formatted}")
    }
}

impl FromStr for FhirDateTime {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let datetime = OffsetDateTime::parse(s, &Rfc3339).map_err(|e| {
            CoreError::invalid_date_time(format!("Failed to parse FHIR DateTime '{s}': {e}"))
        })?;
        Ok(FhirDateTime(datetime))
    }
}

impl Serialize for FhirDateTime {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let formatted = self.0.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }
}

impl<'de> Deserialize<'de> for FhirDateTime {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FhirDateTime::from_str(&s).map_err(serde::de::Error::custom)
    }
}

pub fn now_utc() -> FhirDateTime {
    FhirDateTime(OffsetDateTime::now_utc())
}

/// Current time, but never earlier than `previous`.
///
/// Stores use this when stamping a new version so `lastUpdated` stays
/// non-decreasing along a chain even if the wall clock steps back.
pub fn now_not_before(previous: Option<FhirDateTime>) -> FhirDateTime {
    let now = now_utc();
    match previous {
        Some(prev) if prev > now => prev,
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_fhir_datetime_display() {
        let fhir_dt = FhirDateTime::new(datetime!(2023-05-15 14:30:00 UTC));
        assert_eq!(fhir_dt.to_string(), "2023-05-15T14:30:00Z");
    }

    #[test]
    fn test_fhir_datetime_from_str_with_offset() {
        let fhir_dt = FhirDateTime::from_str("2023-05-15T14:30:00+02:00").unwrap();
        assert_eq!(
            fhir_dt.0.to_offset(time::UtcOffset::UTC),
            datetime!(2023-05-15 12:30:00 UTC)
        );
    }

    #[test]
    fn test_fhir_datetime_from_str_invalid() {
        assert!(FhirDateTime::from_str("invalid-date").is_err());
        assert!(FhirDateTime::from_str("2023-13-01T00:00:00Z").is_err());
        assert!(FhirDateTime::from_str("").is_err());
    }

    #[test]
    fn parse_bound_accepts_plain_dates() {
        let bound = FhirDateTime::parse_bound("2024-02-29").unwrap();
        assert_eq!(bound.0, datetime!(2024-02-29 00:00:00 UTC));
        let instant = FhirDateTime::parse_bound("2024-02-29T10:00:00Z").unwrap();
        assert_eq!(instant.0, datetime!(2024-02-29 10:00:00 UTC));
        assert!(FhirDateTime::parse_bound("yesterday").is_err());
    }

    #[test]
    fn serde_roundtrip_keeps_subsecond_precision() {
        let dt = FhirDateTime::new(datetime!(2023-05-15 14:30:00.123456789 UTC));
        let json = serde_json::to_string(&dt).unwrap();
        let back: FhirDateTime = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dt);
    }

    #[test]
    fn now_not_before_never_steps_back() {
        let future = FhirDateTime::new(OffsetDateTime::now_utc() + time::Duration::hours(1));
        assert_eq!(now_not_before(Some(future)), future);
        let past = FhirDateTime::new(datetime!(2000-01-01 00:00:00 UTC));
        assert!(now_not_before(Some(past)) > past);
        assert!(now_not_before(None) > past);
    }
}
