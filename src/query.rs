//! Read-only aggregations over stored sessions.

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;

use crate::db::Db;
use crate::error::{RaidlogError, Result};
use crate::ingest::parse_timestamp;
use crate::mapping::{country_name, dc_display_name, map_display_name, parse_dc_name, UNKNOWN};

/// Countries shown individually in the by-country breakdown; the rest are
/// folded into "Misc"
const TOP_COUNTRIES: usize = 8;

pub const DEFAULT_TIMELINE_DAYS: u32 = 7;

/// Inclusive filter on the date part of a session timestamp. Open ends are
/// unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(RaidlogError::InvalidInput(format!(
                    "date range start {} is after end {}",
                    s, e
                )));
            }
        }
        Ok(Self { start, end })
    }

    fn sql_params(&self) -> (Option<String>, Option<String>) {
        let fmt = |d: NaiveDate| d.format("%Y-%m-%d").to_string();
        (self.start.map(fmt), self.end.map(fmt))
    }
}

const RANGE_FILTER: &str =
    "(?1 IS NULL OR date(timestamp) >= ?1) AND (?2 IS NULL OR date(timestamp) <= ?2)";

#[derive(Debug, Clone, Serialize)]
pub struct LatestSession {
    pub timestamp: Option<NaiveDateTime>,
    pub ip_address: Option<String>,
    pub map: Option<String>,
    pub map_display: String,
    pub raid_id: Option<String>,
    pub dc_code: Option<String>,
    pub dc_name: Option<String>,
}

impl LatestSession {
    /// "Last raid (RAID) on MAP at DATE played on DC (IP)"
    pub fn summary(&self) -> String {
        let or_unknown = |v: &Option<String>| v.clone().unwrap_or_else(|| UNKNOWN.to_string());
        let date = self
            .timestamp
            .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| UNKNOWN.to_string());
        format!(
            "Last raid ({}) on {} at {} played on {} ({})",
            or_unknown(&self.raid_id),
            self.map_display,
            date,
            or_unknown(&self.dc_name),
            or_unknown(&self.ip_address)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionEntry {
    pub label: String,
    pub count: i64,
    pub percentage: f64,
}

impl DistributionEntry {
    pub fn percentage_label(&self) -> String {
        format!("{:.1}%", self.percentage)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MapDistribution {
    pub entries: Vec<DistributionEntry>,
    pub total: i64,
    pub first_seen: Option<NaiveDateTime>,
    pub last_seen: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerEntry {
    pub dc_name: String,
    pub country_code: String,
    pub country_name: String,
    pub city_code: String,
    pub count: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerDistribution {
    /// One row per datacenter, most played first
    pub entries: Vec<ServerEntry>,
    /// Grouped by country name, top countries then "Misc"
    pub by_country: Vec<DistributionEntry>,
    pub total: i64,
    pub first_seen: Option<NaiveDateTime>,
    pub last_seen: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub timestamp: Option<NaiveDateTime>,
    pub map: String,
    pub dc_name: Option<String>,
    pub dc_code: Option<String>,
    pub location: String,
    pub raid_id: Option<String>,
}

/// "Date: 2025-11-27" or "Date Range: 2025-11-01 to 2025-11-27"
pub fn date_range_label(first: Option<NaiveDateTime>, last: Option<NaiveDateTime>) -> String {
    match (first, last) {
        (Some(f), Some(l)) if f.date() == l.date() => format!("Date: {}", f.format("%Y-%m-%d")),
        (Some(f), Some(l)) => format!(
            "Date Range: {} to {}",
            f.format("%Y-%m-%d"),
            l.format("%Y-%m-%d")
        ),
        _ => "Date Range: No data".to_string(),
    }
}

fn percentage(count: i64, total: i64) -> f64 {
    if total > 0 {
        count as f64 * 100.0 / total as f64
    } else {
        0.0
    }
}

fn parse_stored(raw: Option<String>) -> Option<NaiveDateTime> {
    raw.as_deref().and_then(parse_timestamp)
}

fn seen_bounds(conn: &Connection, range: DateRange) -> Result<(Option<NaiveDateTime>, Option<NaiveDateTime>)> {
    let (start, end) = range.sql_params();
    let sql = format!(
        "SELECT MIN(timestamp), MAX(timestamp) FROM sessions WHERE timestamp IS NOT NULL AND {}",
        RANGE_FILTER
    );
    let (min, max): (Option<String>, Option<String>) =
        conn.query_row(&sql, params![start, end], |r| Ok((r.get(0)?, r.get(1)?)))?;
    Ok((parse_stored(min), parse_stored(max)))
}

/// Sort by count descending, label ascending on ties
fn sort_entries(entries: &mut [DistributionEntry]) {
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
}

/// Most recent session by timestamp, if any
pub async fn latest_session(db: &Db) -> Result<Option<LatestSession>> {
    db.with_connection(|conn| {
        let row = conn
            .query_row(
                r#"
                SELECT timestamp, ip_address, map, raid_id, dc_code, dc_name
                FROM sessions
                ORDER BY timestamp IS NULL, timestamp DESC, session_id DESC
                LIMIT 1
                "#,
                [],
                |r| {
                    Ok((
                        r.get::<_, Option<String>>(0)?,
                        r.get::<_, Option<String>>(1)?,
                        r.get::<_, Option<String>>(2)?,
                        r.get::<_, Option<String>>(3)?,
                        r.get::<_, Option<String>>(4)?,
                        r.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(timestamp, ip_address, map, raid_id, dc_code, dc_name)| LatestSession {
            timestamp: parse_stored(timestamp),
            map_display: map_display_name(map.as_deref()),
            ip_address,
            map,
            raid_id,
            dc_code,
            dc_name,
        }))
    })
    .await
}

/// Session counts per display map name. Raw codes that share a display
/// name are merged.
pub async fn map_distribution(db: &Db, range: DateRange) -> Result<MapDistribution> {
    db.with_connection(move |conn| {
        let (first_seen, last_seen) = seen_bounds(conn, range)?;
        let (start, end) = range.sql_params();

        let sql = format!(
            "SELECT map, COUNT(*) FROM sessions WHERE map IS NOT NULL AND {} GROUP BY map",
            RANGE_FILTER
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![start, end])?;

        let mut merged: HashMap<String, i64> = HashMap::new();
        while let Some(row) = rows.next()? {
            let raw: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            *merged.entry(map_display_name(Some(&raw))).or_default() += count;
        }

        let total: i64 = merged.values().sum();
        let mut entries: Vec<DistributionEntry> = merged
            .into_iter()
            .map(|(label, count)| DistributionEntry {
                label,
                count,
                percentage: percentage(count, total),
            })
            .collect();
        sort_entries(&mut entries);

        Ok(MapDistribution {
            entries,
            total,
            first_seen,
            last_seen,
        })
    })
    .await
}

/// Session counts per datacenter, with a by-country rollup
pub async fn server_distribution(db: &Db, range: DateRange) -> Result<ServerDistribution> {
    db.with_connection(move |conn| {
        let (first_seen, last_seen) = seen_bounds(conn, range)?;
        let (start, end) = range.sql_params();

        let sql = format!(
            "SELECT dc_name, COUNT(*) FROM sessions \
             WHERE dc_name IS NOT NULL AND dc_name != '' AND {} \
             GROUP BY dc_name",
            RANGE_FILTER
        );
        let mut stmt = conn.prepare(&sql)?;
        let raw: Vec<(String, i64)> = stmt
            .query_map(params![start, end], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;

        let total: i64 = raw.iter().map(|(_, c)| c).sum();

        let mut entries: Vec<ServerEntry> = raw
            .into_iter()
            .map(|(dc_name, count)| {
                let (country_code, city_code) = parse_dc_name(Some(&dc_name));
                ServerEntry {
                    country_name: country_name(&country_code),
                    country_code,
                    city_code,
                    dc_name,
                    count,
                    percentage: percentage(count, total),
                }
            })
            .collect();
        entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.dc_name.cmp(&b.dc_name)));

        let mut countries: HashMap<String, i64> = HashMap::new();
        for entry in &entries {
            *countries.entry(entry.country_name.clone()).or_default() += entry.count;
        }
        let mut by_country: Vec<DistributionEntry> = countries
            .into_iter()
            .map(|(label, count)| DistributionEntry {
                label,
                count,
                percentage: percentage(count, total),
            })
            .collect();
        sort_entries(&mut by_country);

        if by_country.len() > TOP_COUNTRIES {
            let misc: i64 = by_country.drain(TOP_COUNTRIES..).map(|e| e.count).sum();
            by_country.push(DistributionEntry {
                label: "Misc".to_string(),
                count: misc,
                percentage: percentage(misc, total),
            });
        }

        Ok(ServerDistribution {
            entries,
            by_country,
            total,
            first_seen,
            last_seen,
        })
    })
    .await
}

/// Sessions from the last `days` days (date granularity), newest first
pub async fn timeline(db: &Db, days: u32) -> Result<Vec<TimelineEntry>> {
    let since = Local::now().date_naive() - Duration::days(i64::from(days));
    timeline_since(db, since).await
}

pub async fn timeline_since(db: &Db, since: NaiveDate) -> Result<Vec<TimelineEntry>> {
    let since = since.format("%Y-%m-%d").to_string();
    db.with_connection(move |conn| {
        let mut stmt = conn.prepare(
            r#"
            SELECT timestamp, map, dc_name, dc_code, raid_id
            FROM sessions
            WHERE timestamp >= ?1
            ORDER BY timestamp DESC, session_id DESC
            "#,
        )?;
        let rows = stmt.query_map(params![since], |r| {
            Ok((
                r.get::<_, Option<String>>(0)?,
                r.get::<_, Option<String>>(1)?,
                r.get::<_, Option<String>>(2)?,
                r.get::<_, Option<String>>(3)?,
                r.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (timestamp, map, dc_name, dc_code, raid_id) = row?;
            entries.push(TimelineEntry {
                timestamp: parse_stored(timestamp),
                map: map_display_name(map.as_deref()),
                location: dc_display_name(dc_name.as_deref()),
                dc_name,
                dc_code,
                raid_id,
            });
        }
        Ok(entries)
    })
    .await
}
