// SPDX-FileCopyrightText: 2026 Callbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound dialer events.
//!
//! The dialer platform has shipped several payload revisions. Every field is
//! read through an ordered alias list, and the payload may arrive flat or
//! wrapped as `{businessid, hookevent, data: {...}}`.

use chrono::{DateTime, NaiveDateTime, Offset, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use callbridge_core::lookup::{first_present, first_string, scalar_text};

const KIND: &[&str] = &["hookevent", "eventname", "event"];
const BUSINESS_ID: &[&str] = &["businessid", "businessId", "business_id"];
const DIRECTION: &[&str] = &["direction", "calltype"];
const FROM: &[&str] = &[
    "from_number",
    "fromNumber",
    "fromnumber",
    "fromnumber164",
    "from",
    "caller",
];
const TO: &[&str] = &[
    "to_number",
    "toNumber",
    "tonumber",
    "tonumber164",
    "to",
    "callee",
];
const CUSTOMER: &[&str] = &["customernumber"];
const AGENT: &[&str] = &["agent_email", "agentEmail", "userEmail", "agent", "userid"];
const DISPOSITION: &[&str] = &["disposition"];
const DURATION: &[&str] = &["duration_sec", "duration", "durationSeconds"];
const STARTED: &[&str] = &["started_at", "start_time", "startedAt", "startTime"];
const ENDED: &[&str] = &["ended_at", "end_time", "endedAt", "endTime"];
const RECORDING: &[&str] = &["recording_url", "recordingUrl", "recordingurl", "recording"];
const CALL_ID: &[&str] = &["call_id", "callId", "callid", "id"];
const NOTES: &[&str] = &["agent_notes", "agentNotes", "notes"];

/// Durations above this many seconds are taken to be milliseconds.
const MAX_PLAUSIBLE_SECS: f64 = 5.0 * 86_400.0;
/// Epoch values above this are milliseconds (year 2286 in seconds).
const EPOCH_MILLIS_THRESHOLD: i64 = 10_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("payload must be a JSON object")]
    NotAnObject,
    #[error("`{field}` is not a recognizable timestamp: {value}")]
    Timestamp { field: &'static str, value: String },
    #[error("duration is not a non-negative number: {0}")]
    Duration(String),
    #[error("call ends at {ended} before it starts at {started}")]
    EndsBeforeStart {
        started: DateTime<Utc>,
        ended: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
    Unknown,
}

impl Direction {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|d| d.trim().to_ascii_lowercase()).as_deref() {
            Some("inbound" | "incoming" | "in") => Self::Inbound,
            Some("outbound" | "outgoing" | "out") => Self::Outbound,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
            Self::Unknown => "unknown",
        })
    }
}

/// A dialer event with aliases resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DialerEvent {
    pub business_id: Option<String>,
    /// Lowercased event kind, `unknown` when absent.
    pub kind: String,
    pub direction: Direction,
    pub from_number: Option<String>,
    pub to_number: Option<String>,
    pub customer_number: Option<String>,
    pub agent: Option<String>,
    pub disposition: Option<String>,
    pub duration_secs: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub recording_url: Option<String>,
    pub call_id: Option<String>,
    pub notes: Option<String>,
}

/// Inner `data` object first, then the envelope.
struct Layers<'a> {
    inner: Option<&'a Map<String, Value>>,
    outer: &'a Map<String, Value>,
}

impl Layers<'_> {
    fn string(&self, keys: &[&str]) -> Option<String> {
        self.inner
            .and_then(|m| first_string(m, keys))
            .or_else(|| first_string(self.outer, keys))
    }

    fn value(&self, keys: &[&str]) -> Option<&Value> {
        self.inner
            .and_then(|m| first_present(m, keys))
            .or_else(|| first_present(self.outer, keys))
    }
}

impl DialerEvent {
    /// Parse with naive timestamps read as UTC.
    pub fn parse(payload: &Value) -> Result<Self, EventError> {
        Self::parse_in(payload, None)
    }

    /// Parse with naive timestamps read in `zone` (UTC when `None`).
    pub fn parse_in(payload: &Value, zone: Option<Tz>) -> Result<Self, EventError> {
        let outer = payload.as_object().ok_or(EventError::NotAnObject)?;
        let layers = Layers {
            inner: outer.get("data").and_then(Value::as_object),
            outer,
        };

        let duration_secs = layers.value(DURATION).map(parse_duration).transpose()?;
        let started_at = layers
            .value(STARTED)
            .map(|v| parse_timestamp("started_at", v, zone))
            .transpose()?;
        let ended_at = layers
            .value(ENDED)
            .map(|v| parse_timestamp("ended_at", v, zone))
            .transpose()?;
        if let (Some(started), Some(ended)) = (started_at, ended_at) {
            if ended < started {
                return Err(EventError::EndsBeforeStart { started, ended });
            }
        }

        Ok(Self {
            business_id: layers.string(BUSINESS_ID),
            kind: layers
                .string(KIND)
                .map(|k| k.to_ascii_lowercase())
                .unwrap_or_else(|| "unknown".to_string()),
            direction: Direction::parse(layers.string(DIRECTION).as_deref()),
            from_number: layers.string(FROM),
            to_number: layers.string(TO),
            customer_number: layers.string(CUSTOMER),
            agent: layers.string(AGENT),
            disposition: layers.string(DISPOSITION),
            duration_secs,
            started_at,
            ended_at,
            recording_url: layers.string(RECORDING),
            call_id: layers.string(CALL_ID),
            notes: layers.string(NOTES),
        })
    }

    /// The customer's number: the callee on outbound calls, the caller on
    /// inbound ones, then the other side, then `customernumber`.
    /// Calls of unknown direction are treated as outbound.
    pub fn target_number(&self) -> Option<&str> {
        let (primary, secondary) = match self.direction {
            Direction::Inbound => (&self.from_number, &self.to_number),
            Direction::Outbound | Direction::Unknown => (&self.to_number, &self.from_number),
        };
        primary
            .as_deref()
            .or(secondary.as_deref())
            .or(self.customer_number.as_deref())
    }

    /// Call start and end, filling gaps from the duration and `now`.
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let duration = TimeDelta::seconds(self.duration_secs.unwrap_or(0) as i64);
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => (start, end),
            (Some(start), None) => (start, start + duration),
            (None, Some(end)) => (end - duration, end),
            (None, None) => (now - duration, now),
        }
    }
}

fn parse_duration(value: &Value) -> Result<u64, EventError> {
    let secs = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite() && *n >= 0.0)
    .ok_or_else(|| EventError::Duration(value.to_string()))?;

    let secs = if secs > MAX_PLAUSIBLE_SECS {
        secs / 1000.0
    } else {
        secs
    };
    Ok(secs.round() as u64)
}

fn from_epoch(n: i64) -> Option<DateTime<Utc>> {
    if n.abs() >= EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(n)
    } else {
        DateTime::from_timestamp(n, 0)
    }
}

fn parse_timestamp(
    field: &'static str,
    value: &Value,
    zone: Option<Tz>,
) -> Result<DateTime<Utc>, EventError> {
    let invalid = || EventError::Timestamp {
        field,
        value: scalar_text(value).unwrap_or_else(|| value.to_string()),
    };
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(from_epoch)
            .ok_or_else(invalid),
        Value::String(s) => parse_timestamp_text(s.trim(), zone).ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

fn parse_timestamp_text(s: &str, zone: Option<Tz>) -> Option<DateTime<Utc>> {
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse().ok().and_then(from_epoch);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let spaced = s.replacen(' ', "T", 1);
    if let Ok(dt) = DateTime::parse_from_rfc3339(&spaced) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&spaced, fmt).ok())
        .map(|naive| localize(naive, zone))
}

fn localize(naive: NaiveDateTime, zone: Option<Tz>) -> DateTime<Utc> {
    let Some(zone) = zone else {
        return naive.and_utc();
    };
    match zone.from_local_datetime(&naive).earliest() {
        Some(local) => local.with_timezone(&Utc),
        // skipped by a DST jump: use the offset in force at that instant
        None => {
            let offset = zone.offset_from_utc_datetime(&naive).fix();
            (naive - TimeDelta::seconds(i64::from(offset.local_minus_utc()))).and_utc()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn flat_payload_with_snake_case() {
        let event = DialerEvent::parse(&json!({
            "businessid": "b-1",
            "event": "EndCall",
            "direction": "outbound",
            "from_number": "+1 555 000 1111",
            "to_number": "(555) 123-4567",
            "agent_email": "agent@example.com",
            "disposition": "Connected",
            "duration_sec": 42,
            "started_at": "2026-03-01T10:00:00Z",
            "ended_at": "2026-03-01T10:00:42Z",
            "call_id": "c-1",
        }))
        .unwrap();
        assert_eq!(event.kind, "endcall");
        assert_eq!(event.business_id.as_deref(), Some("b-1"));
        assert_eq!(event.direction, Direction::Outbound);
        assert_eq!(event.target_number(), Some("(555) 123-4567"));
        assert_eq!(event.duration_secs, Some(42));
        assert_eq!(event.started_at, Some(at(10, 0, 0)));
        assert_eq!(event.call_id.as_deref(), Some("c-1"));
    }

    #[test]
    fn wrapped_payload_reads_data_first() {
        let event = DialerEvent::parse(&json!({
            "businessid": 981,
            "hookevent": "disposition",
            "data": {
                "calltype": "incoming",
                "fromnumber164": "+15551234567",
                "tonumber": "5550001111",
                "userEmail": "a@b.c",
                "callid": 77,
                "durationSeconds": "90000000",
                "startTime": "2026-03-01 10:00:00",
            }
        }))
        .unwrap();
        assert_eq!(event.business_id.as_deref(), Some("981"));
        assert_eq!(event.kind, "disposition");
        assert_eq!(event.direction, Direction::Inbound);
        assert_eq!(event.target_number(), Some("+15551234567"));
        assert_eq!(event.call_id.as_deref(), Some("77"));
        // over five days: treated as milliseconds
        assert_eq!(event.duration_secs, Some(90_000));
        assert_eq!(event.started_at, Some(at(10, 0, 0)));
    }

    #[test]
    fn target_falls_back_to_other_side_then_customer() {
        let event = DialerEvent::parse(&json!({"direction": "outbound", "from": "5551112222"})).unwrap();
        assert_eq!(event.target_number(), Some("5551112222"));
        let event = DialerEvent::parse(&json!({"customernumber": "5553334444"})).unwrap();
        assert_eq!(event.target_number(), Some("5553334444"));
        assert_eq!(event.kind, "unknown");
    }

    #[test]
    fn timestamp_forms() {
        let expected = at(10, 0, 0);
        for raw in [
            json!("2026-03-01T10:00:00Z"),
            json!("2026-03-01T12:00:00+02:00"),
            json!("2026-03-01 10:00:00"),
            json!("2026-03-01T10:00:00.000"),
            json!(expected.timestamp()),
            json!(expected.timestamp_millis()),
            json!(expected.timestamp().to_string()),
        ] {
            assert_eq!(parse_timestamp("started_at", &raw, None), Ok(expected), "{raw}");
        }
        assert!(matches!(
            parse_timestamp("started_at", &json!("yesterday"), None),
            Err(EventError::Timestamp { field: "started_at", .. })
        ));
    }

    #[test]
    fn naive_timestamps_follow_the_given_zone() {
        let chicago: Tz = "America/Chicago".parse().unwrap();
        let payload = json!({
            "started_at": "2026-03-01 10:00:00",
            "ended_at": "2026-03-01T16:05:00Z",
            "duration": 300,
        });
        let event = DialerEvent::parse_in(&payload, Some(chicago)).unwrap();
        // CST is UTC-6 on March 1
        assert_eq!(event.started_at, Some(at(16, 0, 0)));
        // explicit offsets are not reinterpreted
        assert_eq!(event.ended_at, Some(at(16, 5, 0)));

        let utc = DialerEvent::parse(&payload).unwrap();
        assert_eq!(utc.started_at, Some(at(10, 0, 0)));
    }

    #[test]
    fn local_time_in_dst_gap_still_parses() {
        let chicago: Tz = "America/Chicago".parse().unwrap();
        // 02:30 does not exist on 2026-03-08 in Chicago
        let parsed = parse_timestamp("started_at", &json!("2026-03-08 02:30:00"), Some(chicago));
        assert!(parsed.is_ok());
    }

    #[test]
    fn end_before_start_is_rejected() {
        let err = DialerEvent::parse(&json!({
            "started_at": "2026-03-01T10:00:00Z",
            "ended_at": "2026-03-01T09:59:59Z",
        }))
        .unwrap_err();
        assert!(matches!(err, EventError::EndsBeforeStart { .. }));
    }

    #[test]
    fn bad_duration_and_non_object_are_rejected() {
        assert!(matches!(
            DialerEvent::parse(&json!({"duration": "long"})),
            Err(EventError::Duration(_))
        ));
        assert_eq!(DialerEvent::parse(&json!([1, 2])), Err(EventError::NotAnObject));
    }

    #[test]
    fn window_fills_gaps_from_duration() {
        let event = DialerEvent::parse(&json!({
            "started_at": "2026-03-01T10:00:00Z",
            "duration": 30,
        }))
        .unwrap();
        assert_eq!(event.window(at(12, 0, 0)), (at(10, 0, 0), at(10, 0, 30)));

        let event = DialerEvent::parse(&json!({"duration": 60})).unwrap();
        assert_eq!(event.window(at(12, 0, 0)), (at(11, 59, 0), at(12, 0, 0)));
    }
}
