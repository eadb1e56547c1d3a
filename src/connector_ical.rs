//! iCalendar connector.
//!
//! Turns the `VEVENT`s of a calendar document into entries dated at the
//! event start. Events are kept when they overlap the window; recurring
//! events (`RRULE`) are expanded into one entry per occurrence, minus
//! `EXDATE`s and instances that a `RECURRENCE-ID` component overrides.
//!
//! Metadata keys: `Collection`, `End`, `Duration`, `Location`, `Attendee`,
//! `Class`, `Comment`, `Description`, `Organizer`, `Busy`.
//!
//! An event with a missing or unresolvable start (including an unknown
//! `TZID`) is logged and skipped. A document that yields no entries at all
//! is an error.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::parser::{read_calendar, unfold, Component, Property};
use rrule::RRuleSet;
use std::collections::HashSet;

use crate::error::SparkError;
use crate::models::{dedupe_entries, Entry, Window};
use crate::timeparse::{
    format_date, format_duration, localize, parse_calendar_date, resolve_timezone,
    RawCalendarDate,
};

pub const DEFAULT_COLLECTION: &str = "calendar";

/// Upper bound on expanded occurrences per recurring event.
const MAX_OCCURRENCES: u16 = 365;

type Span = (DateTime<FixedOffset>, Option<DateTime<FixedOffset>>);

/// The fields of a `VEVENT` this connector reads.
#[derive(Debug, Default)]
struct CalendarEvent {
    uid: Option<String>,
    summary: String,
    start: Option<RawCalendarDate>,
    end: Option<RawCalendarDate>,
    rrule: Option<String>,
    exdates: Vec<RawCalendarDate>,
    recurrence_id: Option<RawCalendarDate>,
    location: Option<String>,
    class: Option<String>,
    comment: Option<String>,
    description: Option<String>,
    organizer: Option<String>,
    attendees: Vec<String>,
    transparency: Option<String>,
}

pub fn entries_from_ical(
    content: &str,
    window: &Window,
    collection: &str,
    local: &Tz,
) -> Result<Vec<Entry>> {
    let unfolded = unfold(content);
    let calendar =
        read_calendar(&unfolded).map_err(|e| anyhow!("Failed to parse calendar: {}", e))?;

    let mut components = Vec::new();
    collect_events(&calendar.components, &mut components);
    let events: Vec<CalendarEvent> = components.into_iter().map(read_event).collect();

    let overridden: HashSet<(String, i64)> = events
        .iter()
        .filter_map(|event| {
            let uid = event.uid.clone()?;
            let recurrence_id = event.recurrence_id.as_ref()?;
            let instant = parse_calendar_date(recurrence_id, local).ok()?;
            Some((uid, instant.timestamp()))
        })
        .collect();

    let mut entries = Vec::new();
    for event in &events {
        match spans(event, window, local, &overridden) {
            Ok(spans) => {
                for (start, end) in spans {
                    entries.push(to_entry(event, start, end, collection, local));
                }
            }
            Err(e) => {
                tracing::warn!(summary = %event.summary, error = %e, "skipping calendar event");
            }
        }
    }

    let entries = dedupe_entries(entries);
    if entries.is_empty() {
        return Err(SparkError::EmptyFeed("no events in the requested window".into()).into());
    }
    Ok(entries)
}

fn collect_events<'a, 'b>(components: &'b [Component<'a>], out: &mut Vec<&'b Component<'a>>) {
    for component in components {
        if component.name == "VEVENT" {
            out.push(component);
        } else {
            collect_events(&component.components, out);
        }
    }
}

fn read_event(vevent: &Component<'_>) -> CalendarEvent {
    let text = |name: &str| vevent.find_prop(name).map(|p| unescape_text(p.val.as_ref()));

    CalendarEvent {
        uid: vevent.find_prop("UID").map(|p| p.val.to_string()),
        summary: text("SUMMARY").unwrap_or_default(),
        start: vevent.find_prop("DTSTART").map(raw_date),
        end: vevent.find_prop("DTEND").map(raw_date),
        rrule: vevent.find_prop("RRULE").map(|p| p.val.to_string()),
        exdates: vevent
            .properties
            .iter()
            .filter(|p| p.name == "EXDATE")
            .flat_map(split_dates)
            .collect(),
        recurrence_id: vevent.find_prop("RECURRENCE-ID").map(raw_date),
        location: text("LOCATION"),
        class: text("CLASS"),
        comment: text("COMMENT"),
        description: text("DESCRIPTION"),
        organizer: vevent
            .find_prop("ORGANIZER")
            .and_then(|p| param(p, "CN")),
        attendees: vevent
            .properties
            .iter()
            .filter(|p| p.name == "ATTENDEE")
            .filter_map(|p| param(p, "CN"))
            .collect(),
        transparency: vevent.find_prop("TRANSP").map(|p| p.val.to_string()),
    }
}

fn param(prop: &Property<'_>, key: &str) -> Option<String> {
    prop.params
        .iter()
        .find(|p| p.key == key)
        .and_then(|p| p.val.as_ref())
        .map(|v| v.to_string().trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

fn raw_date(prop: &Property<'_>) -> RawCalendarDate {
    RawCalendarDate {
        value: prop.val.to_string(),
        value_type: param(prop, "VALUE"),
        tzid: param(prop, "TZID"),
    }
}

/// `EXDATE` may carry several comma-separated values sharing one set of
/// parameters.
fn split_dates(prop: &Property<'_>) -> Vec<RawCalendarDate> {
    let template = raw_date(prop);
    template
        .value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|value| RawCalendarDate {
            value: value.to_string(),
            ..template.clone()
        })
        .collect()
}

/// Undo iCalendar TEXT escaping (`\n`, `\,`, `\;`, `\\`).
fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(',') => out.push(','),
            Some(';') => out.push(';'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// The (start, end) pairs of an event that fall in the window.
fn spans(
    event: &CalendarEvent,
    window: &Window,
    local: &Tz,
    overridden: &HashSet<(String, i64)>,
) -> Result<Vec<Span>> {
    let raw_start = event
        .start
        .as_ref()
        .ok_or_else(|| SparkError::MissingDate(format!("event {:?} has no DTSTART", event.summary)))?;
    let start = parse_calendar_date(raw_start, local)?;
    let end = event
        .end
        .as_ref()
        .map(|raw| parse_calendar_date(raw, local))
        .transpose()?;

    let Some(rule) = &event.rrule else {
        let last = end.unwrap_or(start);
        return Ok(if window.overlaps(&start, &last) {
            vec![(start, end)]
        } else {
            Vec::new()
        });
    };

    let length = end.map(|e| e - start).unwrap_or_else(Duration::zero);
    let excluded: HashSet<i64> = event
        .exdates
        .iter()
        .filter_map(|raw| parse_calendar_date(raw, local).ok())
        .map(|dt| dt.timestamp())
        .collect();

    let mut spans = Vec::new();
    for occurrence in expand(raw_start, &start, rule, local, window, length)? {
        let ts = occurrence.timestamp();
        if excluded.contains(&ts) {
            continue;
        }
        if let Some(uid) = &event.uid {
            if overridden.contains(&(uid.clone(), ts)) {
                continue;
            }
        }
        let occurrence_end = end.map(|_| occurrence + length);
        if window.overlaps(&occurrence, &occurrence_end.unwrap_or(occurrence)) {
            spans.push((occurrence, occurrence_end));
        }
    }
    Ok(spans)
}

/// Expand an `RRULE` into occurrence starts near the window.
fn expand(
    raw_start: &RawCalendarDate,
    start: &DateTime<FixedOffset>,
    rule: &str,
    local: &Tz,
    window: &Window,
    length: Duration,
) -> Result<Vec<DateTime<FixedOffset>>> {
    let zone = recurrence_zone(raw_start, local);
    let source = format!(
        "{}\nRRULE:{}",
        dtstart_line(start, zone),
        normalize_until(rule, zone)?
    );
    let set: RRuleSet = source
        .parse()
        .map_err(|e| anyhow!("Failed to parse RRULE {:?}: {}", rule, e))?;

    // `after`/`before` are exclusive; widen by a second, and by the event
    // length so occurrences that started before the window still count.
    let tz: rrule::Tz = Utc.into();
    let after = (window.from - length - Duration::seconds(1)).with_timezone(&tz);
    let before = (window.to + Duration::seconds(1)).with_timezone(&tz);

    let result = set.after(after).before(before).all(MAX_OCCURRENCES);
    Ok(result.dates.iter().map(|dt| dt.fixed_offset()).collect())
}

/// The zone a series is expanded in. All-day and UTC starts expand in UTC
/// (`None`); zoned and floating starts keep their wall-clock time across
/// DST changes.
fn recurrence_zone(raw: &RawCalendarDate, local: &Tz) -> Option<Tz> {
    let zone = if raw.is_date_only() {
        None
    } else if let Some(tzid) = &raw.tzid {
        resolve_timezone(tzid)
    } else if raw.value.trim().ends_with('Z') {
        None
    } else {
        Some(*local)
    };
    zone.filter(|tz| *tz != Tz::UTC)
}

fn dtstart_line(start: &DateTime<FixedOffset>, zone: Option<Tz>) -> String {
    match zone {
        Some(tz) => format!(
            "DTSTART;TZID={}:{}",
            tz.name(),
            start.with_timezone(&tz).format("%Y%m%dT%H%M%S")
        ),
        None => format!(
            "DTSTART:{}",
            start.with_timezone(&Utc).format("%Y%m%dT%H%M%SZ")
        ),
    }
}

/// Rewrite a date-only or floating `UNTIL` as UTC, read in the series zone.
///
/// The recurrence engine only accepts a UTC `UNTIL` next to the `DTSTART`
/// forms built by [`dtstart_line`]. A date-only `UNTIL` covers its whole day.
fn normalize_until(rule: &str, zone: Option<Tz>) -> Result<String> {
    let parts = rule
        .split(';')
        .map(|part| {
            let Some((key, value)) = part.split_once('=') else {
                return Ok(part.to_string());
            };
            let value = value.trim();
            if !key.trim().eq_ignore_ascii_case("UNTIL") || value.ends_with(['Z', 'z']) {
                return Ok(part.to_string());
            }

            let naive = if value.len() == 8 {
                NaiveDate::parse_from_str(value, "%Y%m%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(23, 59, 59))
            } else {
                NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S").ok()
            }
            .ok_or_else(|| SparkError::InvalidDate(format!("UNTIL={}", value)))?;

            let until = match zone {
                Some(tz) => localize(&tz, naive)
                    .ok_or_else(|| SparkError::InvalidDate(format!("UNTIL={}", value)))?
                    .with_timezone(&Utc),
                None => Utc.from_utc_datetime(&naive),
            };
            Ok(format!("{}={}", key, until.format("%Y%m%dT%H%M%SZ")))
        })
        .collect::<Result<Vec<String>>>()?;
    Ok(parts.join(";"))
}

fn to_entry(
    event: &CalendarEvent,
    start: DateTime<FixedOffset>,
    end: Option<DateTime<FixedOffset>>,
    collection: &str,
    local: &Tz,
) -> Entry {
    let mut entry = Entry::new(start, event.summary.clone());
    entry.set_metadata("Collection", collection);

    if let Some(end) = end {
        entry.set_metadata("End", format_date(&end, local));
        entry.set_metadata("Duration", format_duration(&start, &end));
    }

    for (key, value) in [
        ("Location", &event.location),
        ("Class", &event.class),
        ("Comment", &event.comment),
        ("Description", &event.description),
        ("Organizer", &event.organizer),
    ] {
        if let Some(value) = value {
            entry.set_metadata_if_not_empty(key, value.as_str());
        }
    }
    entry.set_metadata_if_not_empty("Attendee", event.attendees.join(","));
    entry.set_metadata("Busy", event.transparency.as_deref() == Some("OPAQUE"));

    entry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brussels() -> Tz {
        "Europe/Brussels".parse().unwrap()
    }

    fn january() -> Window {
        Window {
            from: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            to: Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap(),
        }
    }

    fn calendar(events: &str) -> String {
        format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//EN\r\n{}END:VCALENDAR\r\n",
            events
        )
    }

    #[test]
    fn test_event_with_metadata() {
        let ics = calendar(
            "BEGIN:VEVENT\r\n\
             UID:1@test\r\n\
             SUMMARY:Planning\r\n\
             DTSTART;TZID=Europe/Brussels:20240110T090000\r\n\
             DTEND;TZID=Europe/Brussels:20240110T103000\r\n\
             LOCATION:Room 4\\, first floor\r\n\
             ORGANIZER;CN=Alice:mailto:alice@example.com\r\n\
             ATTENDEE;CN=Bob:mailto:bob@example.com\r\n\
             ATTENDEE;CN=\"Carol\":mailto:carol@example.com\r\n\
             CLASS:PUBLIC\r\n\
             DESCRIPTION:  \r\n\
             TRANSP:OPAQUE\r\n\
             END:VEVENT\r\n",
        );

        let entries = entries_from_ical(&ics, &january(), "work", &brussels()).unwrap();
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.summary, "Planning");
        assert_eq!(e.date, Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap());
        assert_eq!(e.metadata["Collection"], "work");
        assert_eq!(e.metadata["End"], "2024-01-10 10:30");
        assert_eq!(e.metadata["Duration"], "1h 30m");
        assert_eq!(e.metadata["Location"], "Room 4, first floor");
        assert_eq!(e.metadata["Organizer"], "Alice");
        assert_eq!(e.metadata["Attendee"], "Bob,Carol");
        assert_eq!(e.metadata["Class"], "PUBLIC");
        assert_eq!(e.metadata["Busy"], true);
        assert!(!e.metadata.contains_key("Description"));
        assert!(!e.metadata.contains_key("Comment"));
    }

    #[test]
    fn test_all_day_and_utc_and_windows_zone() {
        let ics = calendar(
            "BEGIN:VEVENT\r\nUID:a\r\nSUMMARY:Holiday\r\nDTSTART;VALUE=DATE:20240105\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:b\r\nSUMMARY:Call\r\nDTSTART:20240106T150000Z\r\nTRANSP:TRANSPARENT\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:c\r\nSUMMARY:Review\r\nDTSTART;TZID=Romance Standard Time:20240107T100000\r\nEND:VEVENT\r\n",
        );

        let entries = entries_from_ical(&ics, &january(), DEFAULT_COLLECTION, &brussels()).unwrap();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].date, Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap());
        assert_eq!(entries[0].formatted_date(&brussels()), "2024-01-05");
        assert_eq!(entries[0].metadata["Busy"], false);
        assert_eq!(entries[0].metadata["Collection"], "calendar");

        assert_eq!(entries[1].date, Utc.with_ymd_and_hms(2024, 1, 6, 15, 0, 0).unwrap());
        assert_eq!(entries[1].metadata["Busy"], false);

        // Paris is UTC+1 in January.
        assert_eq!(entries[2].date, Utc.with_ymd_and_hms(2024, 1, 7, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_duplicates_within_feed_collapse() {
        let ics = calendar(
            "BEGIN:VEVENT\r\nUID:1\r\nSUMMARY:Standup\r\nDTSTART:20240110T090000Z\r\nLOCATION:A\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:2\r\nSUMMARY:Standup\r\nDTSTART:20240110T090000Z\r\nLOCATION:B\r\nEND:VEVENT\r\n",
        );
        let entries = entries_from_ical(&ics, &january(), DEFAULT_COLLECTION, &Tz::UTC).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].metadata["Location"], "A");
    }

    #[test]
    fn test_unknown_timezone_skips_event() {
        let ics = calendar(
            "BEGIN:VEVENT\r\nUID:1\r\nSUMMARY:Mystery\r\nDTSTART;TZID=Mars/Olympus_Mons:20240110T090000\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:2\r\nSUMMARY:Known\r\nDTSTART:20240110T090000Z\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:3\r\nSUMMARY:Undated\r\nEND:VEVENT\r\n",
        );
        let entries = entries_from_ical(&ics, &january(), DEFAULT_COLLECTION, &Tz::UTC).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].summary, "Known");
    }

    #[test]
    fn test_events_outside_window_are_dropped() {
        let ics = calendar(
            "BEGIN:VEVENT\r\nUID:1\r\nSUMMARY:Old\r\nDTSTART:20231201T090000Z\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:2\r\nSUMMARY:Spanning\r\nDTSTART:20231231T090000Z\r\nDTEND:20240102T090000Z\r\nEND:VEVENT\r\n\
             BEGIN:VEVENT\r\nUID:3\r\nSUMMARY:Future\r\nDTSTART:20240301T090000Z\r\nEND:VEVENT\r\n",
        );
        let entries = entries_from_ical(&ics, &january(), DEFAULT_COLLECTION, &Tz::UTC).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].summary, "Spanning");
    }

    #[test]
    fn test_empty_window_is_an_error() {
        let ics = calendar(
            "BEGIN:VEVENT\r\nUID:1\r\nSUMMARY:Old\r\nDTSTART:20231201T090000Z\r\nEND:VEVENT\r\n",
        );
        let err = entries_from_ical(&ics, &january(), DEFAULT_COLLECTION, &Tz::UTC).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SparkError>(),
            Some(SparkError::EmptyFeed(_))
        ));

        assert!(entries_from_ical(&calendar(""), &january(), DEFAULT_COLLECTION, &Tz::UTC).is_err());
    }

    #[test]
    fn test_recurring_event_expands_with_exdate_and_override() {
        let ics = calendar(
            "BEGIN:VEVENT\r\n\
             UID:weekly@test\r\n\
             SUMMARY:Team sync\r\n\
             DTSTART;TZID=Europe/Brussels:20240101T090000\r\n\
             DTEND;TZID=Europe/Brussels:20240101T093000\r\n\
             RRULE:FREQ=WEEKLY;COUNT=10\r\n\
             EXDATE;TZID=Europe/Brussels:20240108T090000\r\n\
             END:VEVENT\r\n\
             BEGIN:VEVENT\r\n\
             UID:weekly@test\r\n\
             RECURRENCE-ID;TZID=Europe/Brussels:20240115T090000\r\n\
             SUMMARY:Team sync (moved)\r\n\
             DTSTART;TZID=Europe/Brussels:20240116T140000\r\n\
             DTEND;TZID=Europe/Brussels:20240116T143000\r\n\
             END:VEVENT\r\n",
        );

        let entries = entries_from_ical(&ics, &january(), DEFAULT_COLLECTION, &brussels()).unwrap();
        let dates: Vec<String> = entries
            .iter()
            .map(|e| format!("{} {}", e.formatted_date(&brussels()), e.summary))
            .collect();

        assert_eq!(
            dates,
            vec![
                "2024-01-01 09:00 Team sync",
                "2024-01-22 09:00 Team sync",
                "2024-01-29 09:00 Team sync",
                "2024-01-16 14:00 Team sync (moved)",
            ]
        );
        assert!(entries.iter().all(|e| e.metadata["Duration"] == "30m"));
    }

    #[test]
    fn test_all_day_series_with_date_until() {
        let ics = calendar(
            "BEGIN:VEVENT\r\nUID:trip@test\r\nSUMMARY:Ski trip\r\n\
             DTSTART;VALUE=DATE:20240105\r\nRRULE:FREQ=DAILY;UNTIL=20240109\r\nEND:VEVENT\r\n",
        );

        let entries = entries_from_ical(&ics, &january(), DEFAULT_COLLECTION, &brussels()).unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].date, Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap());
        assert_eq!(entries[4].date, Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap());
        assert_eq!(entries[4].formatted_date(&brussels()), "2024-01-09");
    }

    #[test]
    fn test_all_day_series_with_count() {
        let ics = calendar(
            "BEGIN:VEVENT\r\nUID:bins@test\r\nSUMMARY:Bins\r\n\
             DTSTART;VALUE=DATE:20240101\r\nRRULE:FREQ=WEEKLY;COUNT=3\r\nEND:VEVENT\r\n",
        );

        let entries = entries_from_ical(&ics, &january(), DEFAULT_COLLECTION, &Tz::UTC).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].date, Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_floating_series_with_floating_until() {
        let ics = calendar(
            "BEGIN:VEVENT\r\nUID:choir@test\r\nSUMMARY:Choir\r\n\
             DTSTART:20240102T180000\r\nRRULE:FREQ=WEEKLY;UNTIL=20240123T180000\r\nEND:VEVENT\r\n",
        );

        let entries = entries_from_ical(&ics, &january(), DEFAULT_COLLECTION, &brussels()).unwrap();
        let dates: Vec<String> = entries.iter().map(|e| e.formatted_date(&brussels())).collect();
        assert_eq!(
            dates,
            vec![
                "2024-01-02 18:00",
                "2024-01-09 18:00",
                "2024-01-16 18:00",
                "2024-01-23 18:00",
            ]
        );
    }

    #[test]
    fn test_zoned_series_with_utc_until() {
        let ics = calendar(
            "BEGIN:VEVENT\r\nUID:run@test\r\nSUMMARY:Run\r\n\
             DTSTART;TZID=Europe/Brussels:20240101T070000\r\n\
             RRULE:FREQ=DAILY;UNTIL=20240103T060000Z\r\nEND:VEVENT\r\n",
        );

        let entries = entries_from_ical(&ics, &january(), DEFAULT_COLLECTION, &brussels()).unwrap();
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn test_normalize_until() {
        assert_eq!(
            normalize_until("FREQ=DAILY;UNTIL=20240109", None).unwrap(),
            "FREQ=DAILY;UNTIL=20240109T235959Z"
        );
        assert_eq!(
            normalize_until("FREQ=WEEKLY;UNTIL=20240123T180000;BYDAY=TU", Some(brussels())).unwrap(),
            "FREQ=WEEKLY;UNTIL=20240123T170000Z;BYDAY=TU"
        );
        assert_eq!(
            normalize_until("FREQ=DAILY;UNTIL=20240103T060000Z", Some(brussels())).unwrap(),
            "FREQ=DAILY;UNTIL=20240103T060000Z"
        );
        assert_eq!(normalize_until("FREQ=DAILY;COUNT=4", None).unwrap(), "FREQ=DAILY;COUNT=4");
        assert!(normalize_until("FREQ=DAILY;UNTIL=tomorrow", None).is_err());
    }

    #[test]
    fn test_unescape_text() {
        assert_eq!(unescape_text("a\\, b\\; c\\nd\\\\e"), "a, b; c\nd\\e");
        assert_eq!(unescape_text("trailing\\"), "trailing\\");
    }
}
