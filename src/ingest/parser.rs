//! Line parser: one raw log line in, zero or one [`SessionRecord`] out.
//!
//! A session line looks like
//!
//! ```text
//! 2025-11-27 08:42:21.123|1.0.0.0.41787|Debug|application|TRACE-NetworkGameCreate profileStatus:
//!     'Profileid: 5eacb..., Status: Busy, Ip: 74.1.2.3, Port: 17007, Location: bigmap,
//!      Sid: DE-FRM03G002_691b_17.11.25_17-34-50, GameMode: deathmatch, shortId: ABC123'
//! ```
//!
//! Field extraction is driven by [`FIELD_RULES`]: each rule names a label and the
//! character that ends its value. Rules are applied in order against the text
//! that starts at `Profileid:`. Nothing in here returns an error; a field that
//! cannot be read is simply absent.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Cheap pre-filter: lines without this never carry a session
const IP_MARKER: &str = "Ip:";
/// Start of the key/value payload
const PAYLOAD_TOKEN: &str = "Profileid:";
const FIELD_SEPARATOR: char = '|';
const MIN_FIELDS: usize = 4;

/// A session parsed from one log line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub timestamp: Option<NaiveDateTime>,
    pub ip_address: Option<String>,
    pub map: Option<String>,
    pub raid_id: Option<String>,
    /// Datacenter number, e.g. `03`
    pub dc_code: Option<String>,
    /// Datacenter location, e.g. `DE-FRM`
    pub dc_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Ip,
    Location,
    Sid,
    ShortId,
}

#[derive(Debug)]
struct FieldRule {
    field: Field,
    label: &'static str,
    terminator: char,
}

const FIELD_RULES: &[FieldRule] = &[
    FieldRule { field: Field::Ip, label: "Ip:", terminator: ',' },
    FieldRule { field: Field::Location, label: "Location:", terminator: ',' },
    FieldRule { field: Field::Sid, label: "Sid:", terminator: ',' },
    FieldRule { field: Field::ShortId, label: "shortId:", terminator: '\'' },
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y.%m.%d %H:%M:%S%.f",
    "%d.%m.%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%d.%m.%Y"];

fn dc_regex() -> &'static Regex {
    static DC_REGEX: OnceLock<Regex> = OnceLock::new();
    DC_REGEX.get_or_init(|| Regex::new(r"^([A-Z]+-[A-Z]+)([0-9]+)").expect("Invalid regex pattern"))
}

/// Parse one log line. Returns `None` for lines that do not describe a session.
pub fn parse_line(line: &str) -> Option<SessionRecord> {
    if !line.contains(IP_MARKER) {
        return None;
    }

    let mut fields = line.split(FIELD_SEPARATOR);
    let timestamp_field = fields.next()?;
    if fields.count() + 1 < MIN_FIELDS {
        return None;
    }

    let payload = &line[line.find(PAYLOAD_TOKEN)?..];

    let mut record = SessionRecord {
        timestamp: parse_timestamp(timestamp_field),
        ..SessionRecord::default()
    };

    for rule in FIELD_RULES {
        let value = extract_value(payload, rule.label, rule.terminator);
        match rule.field {
            Field::Ip => record.ip_address = value,
            Field::Location => record.map = value,
            Field::ShortId => record.raid_id = value,
            Field::Sid => {
                if let Some((name, code)) = value.as_deref().and_then(parse_dc_info) {
                    record.dc_name = Some(name);
                    record.dc_code = Some(code);
                }
            }
        }
    }

    Some(record)
}

/// Value after `label` up to the next `terminator` (or end of text), trimmed.
/// Absent label or blank value yields `None`.
fn extract_value(content: &str, label: &str, terminator: char) -> Option<String> {
    let start = content.find(label)? + label.len();
    let rest = &content[start..];
    let end = rest.find(terminator).unwrap_or(rest.len());
    let value = rest[..end].trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Split a session id like `DE-FRM03G002_691b_17.11.25_17-34-50` into
/// `("DE-FRM", "03")`.
pub fn parse_dc_info(sid: &str) -> Option<(String, String)> {
    let prefix = sid.split('_').next()?;
    let caps = dc_regex().captures(prefix)?;
    Some((caps.get(1)?.as_str().to_string(), caps.get(2)?.as_str().to_string()))
}

/// Best-effort timestamp parse; unknown layouts yield `None`.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for format in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_local());
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const SAMPLE: &str = "2025-11-27 08:42:21.123|1.0.0.0.41787|Debug|application|TRACE-NetworkGameCreate profileStatus: 'Profileid: 5eacb6e52925b8162c347527, Status: Busy, RaidMode: Online, Ip: 74.1.2.3, Port: 17007, Location: bigmap, Sid: DE-FRM03G002_691b328afccd7c5c890fabd2_17.11.25_17-34-50, GameMode: deathmatch, shortId: ABC123'";

    #[test]
    fn test_parse_full_line() {
        let record = parse_line(SAMPLE).expect("expected a session record");
        assert_eq!(record.ip_address.as_deref(), Some("74.1.2.3"));
        assert_eq!(record.map.as_deref(), Some("bigmap"));
        assert_eq!(record.raid_id.as_deref(), Some("ABC123"));
        assert_eq!(record.dc_name.as_deref(), Some("DE-FRM"));
        assert_eq!(record.dc_code.as_deref(), Some("03"));

        let ts = record.timestamp.expect("timestamp should parse");
        assert_eq!(ts.date(), NaiveDate::from_ymd_opt(2025, 11, 27).unwrap());
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (8, 42, 21));
        assert_eq!(ts.nanosecond(), 123_000_000);
    }

    #[test]
    fn test_parse_payload_fields() {
        let line = "2025-01-01 00:00:00|a|b|c|'Profileid: X, Status: Busy, Ip: 10.0.0.5, Location: bigmap, Sid: US-NYC01G001_abc_1.1.25_1-1-1, GameMode: pvp, shortId: Z9Q2XK'";
        let record = parse_line(line).unwrap();
        assert_eq!(record.ip_address.as_deref(), Some("10.0.0.5"));
        assert_eq!(record.map.as_deref(), Some("bigmap"));
        assert_eq!(record.dc_name.as_deref(), Some("US-NYC"));
        assert_eq!(record.dc_code.as_deref(), Some("01"));
        assert_eq!(record.raid_id.as_deref(), Some("Z9Q2XK"));
    }

    #[test]
    fn test_rejects_line_without_ip_marker() {
        let line = "2025-01-01 00:00:00|a|b|c|'Profileid: X, Location: bigmap'";
        assert!(parse_line(line).is_none());
    }

    #[test]
    fn test_rejects_line_with_too_few_fields() {
        let line = "2025-01-01 00:00:00|a|'Profileid: X, Ip: 1.2.3.4, Location: bigmap'";
        assert!(parse_line(line).is_none());
    }

    #[test]
    fn test_rejects_line_without_profile_token() {
        let line = "2025-01-01 00:00:00|a|b|c|Ip: 1.2.3.4, Location: bigmap";
        assert!(parse_line(line).is_none());
    }

    #[test]
    fn test_missing_fields_are_absent() {
        let line = "2025-01-01 00:00:00|a|b|c|'Profileid: X, Ip: 1.2.3.4'";
        let record = parse_line(line).unwrap();
        assert_eq!(record.ip_address.as_deref(), Some("1.2.3.4'"));
        assert!(record.map.is_none());
        assert!(record.raid_id.is_none());
        assert!(record.dc_name.is_none());
        assert!(record.dc_code.is_none());
    }

    #[test]
    fn test_value_runs_to_end_without_terminator() {
        assert_eq!(
            extract_value("Profileid: X, shortId: QQ11", "shortId:", '\''),
            Some("QQ11".to_string())
        );
        assert_eq!(extract_value("Profileid: X, Ip: ,", "Ip:", ','), None);
        assert_eq!(extract_value("Profileid: X", "Ip:", ','), None);
    }

    #[test]
    fn test_unparsable_timestamp_keeps_record() {
        let line = "not-a-date|a|b|c|'Profileid: X, Ip: 1.2.3.4, Location: bigmap, shortId: R1'";
        let record = parse_line(line).unwrap();
        assert!(record.timestamp.is_none());
        assert_eq!(record.map.as_deref(), Some("bigmap"));
    }

    #[test]
    fn test_parse_dc_info() {
        assert_eq!(
            parse_dc_info("DE-FRM03G002_691b328a_17.11.25_17-34-50"),
            Some(("DE-FRM".to_string(), "03".to_string()))
        );
        assert_eq!(
            parse_dc_info("APAC-SG06G002"),
            Some(("APAC-SG".to_string(), "06".to_string()))
        );
        // Pattern is case-sensitive and anchored at the start
        assert_eq!(parse_dc_info("de-frm03G002_x"), None);
        assert_eq!(parse_dc_info("XDE-FRM_03"), None);
        assert_eq!(parse_dc_info(""), None);
    }

    #[test]
    fn test_non_matching_sid_leaves_dc_absent() {
        let line = "2025-01-01 00:00:00|a|b|c|'Profileid: X, Ip: 1.2.3.4, Sid: garbage_sid, shortId: R1'";
        let record = parse_line(line).unwrap();
        assert!(record.dc_name.is_none());
        assert!(record.dc_code.is_none());
        assert_eq!(record.raid_id.as_deref(), Some("R1"));
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert!(parse_timestamp("2025-11-27 08:42:21").is_some());
        assert!(parse_timestamp("2025-11-27T08:42:21.5").is_some());
        assert!(parse_timestamp("2025-11-27T08:42:21+02:00").is_some());
        assert!(parse_timestamp("27.11.2025 08:42:21").is_some());
        assert_eq!(
            parse_timestamp(" 2025-11-27 "),
            NaiveDate::from_ymd_opt(2025, 11, 27).unwrap().and_hms_opt(0, 0, 0)
        );
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_multibyte_text_does_not_panic() {
        let line = "2025-01-01 00:00:00|ä|ö|ü|'Profileid: ✓, Ip: 1.2.3.4, Location: Zürich, shortId: ß'";
        let record = parse_line(line).unwrap();
        assert_eq!(record.map.as_deref(), Some("Zürich"));
        assert_eq!(record.raid_id.as_deref(), Some("ß"));
    }
}
