//! Date resolution and display formatting.
//!
//! Every connector funnels its raw date strings through this module so that
//! the same moment always resolves to the same instant. The local timezone is
//! never global state: callers pass the [`Tz`] resolved once at startup.
//!
//! Calendar values follow the iCalendar rules:
//!
//! | Raw value | Resolution |
//! |-----------|------------|
//! | `VALUE=DATE:20240105` | bare date, midnight UTC |
//! | `TZID=Europe/Brussels:20240105T090000` | wall time in the named zone |
//! | `TZID=Romance Standard Time:...` | Windows alias mapped to IANA first |
//! | `20240105T090000Z` | UTC |
//! | `20240105T090000` | floating, interpreted in the local zone |

use anyhow::Result;
use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;

use crate::error::SparkError;

/// Resolve the local timezone once, at the composition root.
///
/// Uses the configured name if any (IANA or Windows alias), otherwise the
/// system zone, otherwise UTC.
pub fn resolve_local_timezone(configured: Option<&str>) -> Result<Tz> {
    if let Some(name) = configured {
        return resolve_timezone(name).ok_or_else(|| SparkError::UnknownTimezone(name.into()).into());
    }

    let tz = iana_time_zone::get_timezone()
        .ok()
        .and_then(|name| name.parse::<Tz>().ok())
        .unwrap_or(Tz::UTC);
    Ok(tz)
}

/// Resolve a timezone name against the Windows alias table first, then the
/// IANA database.
pub fn resolve_timezone(name: &str) -> Option<Tz> {
    let name = name.trim().trim_matches('"');
    if let Some(iana) = windows_alias(name) {
        if let Ok(tz) = iana.parse::<Tz>() {
            return Some(tz);
        }
    }
    name.parse::<Tz>().ok()
}

/// Attach a zone to a wall-clock time.
///
/// Ambiguous times (DST fold) take the earlier instant; times that fall in a
/// DST gap are moved forward by an hour, like most calendar clients do.
pub fn localize(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.fixed_offset())
}

/// Start of the current day in `tz`.
pub fn start_of_today(tz: &Tz) -> DateTime<FixedOffset> {
    let today = Utc::now().with_timezone(tz).date_naive();
    midnight(tz, today)
}

fn midnight(tz: &Tz, date: NaiveDate) -> DateTime<FixedOffset> {
    let naive = date.and_time(NaiveTime::MIN);
    localize(tz, naive).unwrap_or_else(|| naive.and_utc().fixed_offset())
}

/// Midnight UTC for a bare date.
pub fn utc_midnight(date: NaiveDate) -> DateTime<FixedOffset> {
    date.and_time(NaiveTime::MIN).and_utc().fixed_offset()
}

/// Parse a user-supplied entry date (`entries add`, entries JSON files).
///
/// An empty string means "today" (start of the local day); anything else
/// goes through [`parse_human`].
pub fn parse_date(value: &str, tz: &Tz) -> Result<DateTime<FixedOffset>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(start_of_today(tz));
    }
    parse_human(value, tz)
}

/// Parse a non-empty date.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM` and `YYYY-MM-DD`; the latter two are
/// interpreted in the local zone.
pub fn parse_human(value: &str, tz: &Tz) -> Result<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M") {
        if let Some(dt) = localize(tz, naive) {
            return Ok(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(midnight(tz, date));
    }
    Err(SparkError::InvalidDate(value.to_string()).into())
}

/// A calendar date property as it appears in the raw feed: the value plus
/// its `VALUE` and `TZID` parameters.
#[derive(Debug, Clone, Default)]
pub struct RawCalendarDate {
    pub value: String,
    pub value_type: Option<String>,
    pub tzid: Option<String>,
}

impl RawCalendarDate {
    pub fn is_date_only(&self) -> bool {
        self.value_type.as_deref() == Some("DATE")
            || (self.tzid.is_none() && self.value.trim().len() == 8)
    }
}

/// Resolve a raw calendar date to an absolute instant.
///
/// A `TZID` that matches neither the Windows alias table nor the IANA
/// database is an error; the caller decides whether that is fatal.
pub fn parse_calendar_date(raw: &RawCalendarDate, local: &Tz) -> Result<DateTime<FixedOffset>> {
    let value = raw.value.trim();

    if raw.is_date_only() {
        let date = NaiveDate::parse_from_str(value, "%Y%m%d")
            .map_err(|_| SparkError::InvalidDate(value.to_string()))?;
        return Ok(utc_midnight(date));
    }

    if let Some(tzid) = &raw.tzid {
        let tz = resolve_timezone(tzid).ok_or_else(|| SparkError::UnknownTimezone(tzid.clone()))?;
        let naive = NaiveDateTime::parse_from_str(value.trim_end_matches('Z'), "%Y%m%dT%H%M%S")
            .map_err(|_| SparkError::InvalidDate(value.to_string()))?;
        return localize(&tz, naive).ok_or_else(|| SparkError::InvalidDate(value.to_string()).into());
    }

    if let Some(stripped) = value.strip_suffix('Z') {
        let naive = NaiveDateTime::parse_from_str(stripped, "%Y%m%dT%H%M%S")
            .map_err(|_| SparkError::InvalidDate(value.to_string()))?;
        return Ok(naive.and_utc().fixed_offset());
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
        .map_err(|_| SparkError::InvalidDate(value.to_string()))?;
    localize(local, naive).ok_or_else(|| SparkError::InvalidDate(value.to_string()).into())
}

/// Whether the wall-clock time, in the instant's own offset, is midnight.
///
/// Entries at midnight are treated as all-day entries.
pub fn is_all_day(date: &DateTime<FixedOffset>) -> bool {
    date.hour() == 0 && date.minute() == 0
}

/// Render a date for display: `YYYY-MM-DD` for all-day entries, otherwise
/// `YYYY-MM-DD HH:MM` in the local zone.
pub fn format_date(date: &DateTime<FixedOffset>, tz: &Tz) -> String {
    if is_all_day(date) {
        date.format("%Y-%m-%d").to_string()
    } else {
        date.with_timezone(tz).format("%Y-%m-%d %H:%M").to_string()
    }
}

/// Format the gap between two instants the way humans read it (`1h 30m`).
pub fn format_duration(start: &DateTime<FixedOffset>, end: &DateTime<FixedOffset>) -> String {
    let secs = (*end - *start).num_seconds();
    let formatted = humantime::format_duration(std::time::Duration::from_secs(secs.unsigned_abs()));
    if secs < 0 {
        format!("-{}", formatted)
    } else {
        formatted.to_string()
    }
}

/// Windows timezone names (as emitted by Exchange/Outlook calendars) mapped
/// to their canonical IANA zone.
fn windows_alias(name: &str) -> Option<&'static str> {
    let iana = match name {
        "Dateline Standard Time" => "Etc/GMT+12",
        "UTC-11" => "Etc/GMT+11",
        "Hawaiian Standard Time" => "Pacific/Honolulu",
        "Alaskan Standard Time" => "America/Anchorage",
        "Pacific Standard Time" => "America/Los_Angeles",
        "Pacific Standard Time (Mexico)" => "America/Tijuana",
        "US Mountain Standard Time" => "America/Phoenix",
        "Mountain Standard Time" => "America/Denver",
        "Central America Standard Time" => "America/Guatemala",
        "Central Standard Time" => "America/Chicago",
        "Central Standard Time (Mexico)" => "America/Mexico_City",
        "Canada Central Standard Time" => "America/Regina",
        "SA Pacific Standard Time" => "America/Bogota",
        "Eastern Standard Time" => "America/New_York",
        "US Eastern Standard Time" => "America/Indianapolis",
        "Venezuela Standard Time" => "America/Caracas",
        "Atlantic Standard Time" => "America/Halifax",
        "SA Western Standard Time" => "America/La_Paz",
        "Pacific SA Standard Time" => "America/Santiago",
        "Newfoundland Standard Time" => "America/St_Johns",
        "E. South America Standard Time" => "America/Sao_Paulo",
        "Argentina Standard Time" => "America/Buenos_Aires",
        "Greenland Standard Time" => "America/Godthab",
        "UTC-02" => "Etc/GMT+2",
        "Azores Standard Time" => "Atlantic/Azores",
        "Cape Verde Standard Time" => "Atlantic/Cape_Verde",
        "UTC" | "Coordinated Universal Time" => "Etc/UTC",
        "GMT Standard Time" => "Europe/London",
        "Greenwich Standard Time" => "Atlantic/Reykjavik",
        "Morocco Standard Time" => "Africa/Casablanca",
        "W. Europe Standard Time" => "Europe/Berlin",
        "Central Europe Standard Time" => "Europe/Budapest",
        "Romance Standard Time" => "Europe/Paris",
        "Central European Standard Time" => "Europe/Warsaw",
        "W. Central Africa Standard Time" => "Africa/Lagos",
        "GTB Standard Time" => "Europe/Bucharest",
        "E. Europe Standard Time" => "Europe/Chisinau",
        "FLE Standard Time" => "Europe/Kiev",
        "Israel Standard Time" => "Asia/Jerusalem",
        "Egypt Standard Time" => "Africa/Cairo",
        "South Africa Standard Time" => "Africa/Johannesburg",
        "Turkey Standard Time" => "Europe/Istanbul",
        "Arabic Standard Time" => "Asia/Baghdad",
        "Arab Standard Time" => "Asia/Riyadh",
        "Russian Standard Time" => "Europe/Moscow",
        "E. Africa Standard Time" => "Africa/Nairobi",
        "Iran Standard Time" => "Asia/Tehran",
        "Arabian Standard Time" => "Asia/Dubai",
        "Afghanistan Standard Time" => "Asia/Kabul",
        "Pakistan Standard Time" => "Asia/Karachi",
        "West Asia Standard Time" => "Asia/Tashkent",
        "India Standard Time" => "Asia/Calcutta",
        "Nepal Standard Time" => "Asia/Katmandu",
        "Bangladesh Standard Time" => "Asia/Dhaka",
        "SE Asia Standard Time" => "Asia/Bangkok",
        "China Standard Time" => "Asia/Shanghai",
        "Singapore Standard Time" => "Asia/Singapore",
        "Taipei Standard Time" => "Asia/Taipei",
        "W. Australia Standard Time" => "Australia/Perth",
        "Tokyo Standard Time" => "Asia/Tokyo",
        "Korea Standard Time" => "Asia/Seoul",
        "Cen. Australia Standard Time" => "Australia/Adelaide",
        "AUS Central Standard Time" => "Australia/Darwin",
        "E. Australia Standard Time" => "Australia/Brisbane",
        "AUS Eastern Standard Time" => "Australia/Sydney",
        "Tasmania Standard Time" => "Australia/Hobart",
        "West Pacific Standard Time" => "Pacific/Port_Moresby",
        "Central Pacific Standard Time" => "Pacific/Guadalcanal",
        "New Zealand Standard Time" => "Pacific/Auckland",
        "Tonga Standard Time" => "Pacific/Tongatapu",
        _ => return None,
    };
    Some(iana)
}
