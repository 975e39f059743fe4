use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeDelta, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::{KioskError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SolarEvent {
    Sunrise,
    Sunset,
}

impl SolarEvent {
    pub const ALL: [SolarEvent; 2] = [SolarEvent::Sunrise, SolarEvent::Sunset];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sunrise => "sunrise",
            Self::Sunset => "sunset",
        }
    }
}

/// Today's sunrise and sunset in local civil time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SolarTimes {
    pub sunrise: Option<DateTime<FixedOffset>>,
    pub sunset: Option<DateTime<FixedOffset>>,
}

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

impl SolarTimes {
    pub fn new(sunrise: DateTime<FixedOffset>, sunset: DateTime<FixedOffset>) -> Self {
        Self {
            sunrise: Some(sunrise),
            sunset: Some(sunset),
        }
    }

    /// Both anchors known. Nothing is scheduled against partial data.
    pub fn ready(&self) -> bool {
        self.sunrise.is_some() && self.sunset.is_some()
    }

    pub fn anchor(&self, event: SolarEvent) -> Option<DateTime<FixedOffset>> {
        match event {
            SolarEvent::Sunrise => self.sunrise,
            SolarEvent::Sunset => self.sunset,
        }
    }

    /// Both anchors, or the name of the first one missing.
    pub fn anchors(&self) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>)> {
        match (self.sunrise, self.sunset) {
            (Some(sunrise), Some(sunset)) => Ok((sunrise, sunset)),
            _ => Err(KioskError::IncompleteSolarData(
                self.missing().unwrap_or("sunrise"),
            )),
        }
    }

    /// Name of the first missing anchor, for logging.
    pub fn missing(&self) -> Option<&'static str> {
        SolarEvent::ALL
            .into_iter()
            .find(|event| self.anchor(*event).is_none())
            .map(SolarEvent::as_str)
    }

    /// Read `sunrise`/`sunset` from a weather payload in the host's local zone.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        Self::from_payload_in(payload, &Local)
    }

    pub fn from_payload_in<Tz: TimeZone>(payload: &Value, tz: &Tz) -> Result<Self> {
        Ok(Self {
            sunrise: parse_timestamp(payload.get("sunrise"), tz)?,
            sunset: parse_timestamp(payload.get("sunset"), tz)?,
        })
    }
}

/// Accepts RFC 3339, a naive local timestamp (the weather scraper writes
/// `2024-10-19T07:12`) or unix seconds. Missing and `null` map to `None`.
pub fn parse_timestamp<Tz: TimeZone>(
    raw: Option<&Value>,
    tz: &Tz,
) -> Result<Option<DateTime<FixedOffset>>> {
    let raw = match raw {
        None | Some(Value::Null) => return Ok(None),
        Some(raw) => raw,
    };

    if let Some(secs) = raw.as_i64() {
        let utc = DateTime::<Utc>::from_timestamp(secs, 0)
            .ok_or_else(|| KioskError::TimeParse(secs.to_string()))?;
        return Ok(Some(utc.with_timezone(tz).fixed_offset()));
    }

    let text = raw
        .as_str()
        .ok_or_else(|| KioskError::TimeParse(raw.to_string()))?
        .trim();
    if text.is_empty() {
        return Ok(None);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(Some(parsed.with_timezone(tz).fixed_offset()));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            let local = tz
                .from_local_datetime(&naive)
                .earliest()
                .ok_or_else(|| KioskError::TimeParse(text.to_string()))?;
            return Ok(Some(local.fixed_offset()));
        }
    }
    Err(KioskError::TimeParse(text.to_string()))
}

/// First occurrence of `anchor`'s daily instant strictly after `now`.
///
/// An anchor that already passed rolls forward by whole days rather than
/// firing immediately.
pub fn next_occurrence(anchor: DateTime<FixedOffset>, now: DateTime<Utc>) -> DateTime<FixedOffset> {
    let behind = now.signed_duration_since(anchor);
    if behind < TimeDelta::zero() {
        return anchor;
    }
    anchor + TimeDelta::days(behind.num_days() + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(raw: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(raw).unwrap()
    }

    #[test]
    fn ready_requires_both_anchors() {
        let partial = SolarTimes {
            sunrise: Some(at("2024-10-19T07:12:00+02:00")),
            sunset: None,
        };
        assert!(!partial.ready());
        assert_eq!(partial.missing(), Some("sunset"));
        assert!(SolarTimes::new(at("2024-10-19T07:12:00+02:00"), at("2024-10-19T18:01:00+02:00")).ready());
    }

    #[test]
    fn anchors_name_the_missing_event() {
        let partial = SolarTimes {
            sunrise: None,
            sunset: Some(at("2024-10-19T18:01:00+02:00")),
        };
        match partial.anchors() {
            Err(KioskError::IncompleteSolarData(missing)) => assert_eq!(missing, "sunrise"),
            other => panic!("unexpected result: {other:?}"),
        }

        let sunrise = at("2024-10-19T07:12:00+02:00");
        let sunset = at("2024-10-19T18:01:00+02:00");
        assert_eq!(SolarTimes::new(sunrise, sunset).anchors().unwrap(), (sunrise, sunset));
    }

    #[test]
    fn payload_formats_convert_to_zone() {
        let oslo = FixedOffset::east_opt(2 * 3600).unwrap();
        let payload = json!({
            "temperature": 11.2,
            "sunrise": "2024-10-19T07:12",
            "sunset": "2024-10-19T16:01:00Z"
        });
        let times = SolarTimes::from_payload_in(&payload, &oslo).unwrap();
        assert_eq!(times.sunrise, Some(at("2024-10-19T07:12:00+02:00")));
        assert_eq!(times.sunset, Some(at("2024-10-19T18:01:00+02:00")));
        assert_eq!(times.sunset.unwrap().offset(), &oslo);

        let unix = SolarTimes::from_payload_in(&json!({"sunrise": 0, "sunset": null}), &Utc).unwrap();
        assert_eq!(unix.sunrise, Some(at("1970-01-01T00:00:00+00:00")));
        assert_eq!(unix.sunset, None);
    }

    #[test]
    fn garbage_timestamps_are_errors() {
        let err = SolarTimes::from_payload_in(&json!({"sunrise": "dawn"}), &Utc).unwrap_err();
        assert!(matches!(err, KioskError::TimeParse(ref raw) if raw == "dawn"));
    }

    #[test]
    fn passed_anchor_rolls_to_tomorrow() {
        let now = at("2024-10-19T12:00:00+00:00").with_timezone(&Utc);
        let later = at("2024-10-19T12:00:05+00:00");
        let earlier = at("2024-10-19T11:59:59+00:00");
        let exact = at("2024-10-19T12:00:00+00:00");
        let stale = at("2024-10-16T13:00:00+00:00");

        assert_eq!(next_occurrence(later, now), later);
        assert_eq!(next_occurrence(earlier, now), at("2024-10-20T11:59:59+00:00"));
        assert_eq!(next_occurrence(exact, now), at("2024-10-20T12:00:00+00:00"));
        assert_eq!(next_occurrence(stale, now), at("2024-10-19T13:00:00+00:00"));
    }
}
