//! iCalendar (RFC 5545) export and "add to calendar" links for shows.

use chrono::{DateTime, Duration, Utc};

use crate::entities::show;

const PRODUCT_ID: &str = "-//show-tracker//shows//EN";
const MAX_LINE_OCTETS: usize = 75;

/// Shows have no end time; calendars get a fixed block.
pub const DEFAULT_SHOW_LENGTH: Duration = Duration::hours(3);

/// Links used in event bodies; the share URL is public.
pub struct EventLinks<'a> {
    pub public_base_url: &'a str,
    pub host: &'a str,
}

impl EventLinks<'_> {
    pub fn share_url(&self, show: &show::Model) -> String {
        format!(
            "{}/api/public/shows/{}",
            self.public_base_url.trim_end_matches('/'),
            show.share_token
        )
    }

    fn uid(&self, show: &show::Model) -> String {
        format!("show-{}@{}", show.id, self.host)
    }
}

fn format_utc(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y%m%dT%H%M%SZ").to_string()
}

fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            ';' => escaped.push_str("\\;"),
            ',' => escaped.push_str("\\,"),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            c => escaped.push(c),
        }
    }
    escaped
}

/// Folds a content line at 75 octets without splitting a UTF-8 sequence.
fn fold_line(line: &str) -> String {
    let mut folded = String::with_capacity(line.len() + line.len() / MAX_LINE_OCTETS * 3);
    let mut line_octets = 0;
    for c in line.chars() {
        let len = c.len_utf8();
        if line_octets + len > MAX_LINE_OCTETS {
            folded.push_str("\r\n ");
            // the leading space counts toward the continuation line
            line_octets = 1;
        }
        folded.push(c);
        line_octets += len;
    }
    folded
}

struct CalendarWriter {
    out: String,
}

impl CalendarWriter {
    fn new(name: Option<&str>) -> Self {
        let mut writer = Self { out: String::new() };
        writer.line("BEGIN:VCALENDAR");
        writer.line("VERSION:2.0");
        writer.line(&format!("PRODID:{PRODUCT_ID}"));
        writer.line("CALSCALE:GREGORIAN");
        writer.line("METHOD:PUBLISH");
        if let Some(name) = name {
            writer.line(&format!("X-WR-CALNAME:{}", escape_text(name)));
        }
        writer
    }

    fn line(&mut self, line: &str) {
        self.out.push_str(&fold_line(line));
        self.out.push_str("\r\n");
    }

    fn event(&mut self, show: &show::Model, links: &EventLinks<'_>, stamp: DateTime<Utc>) {
        let share_url = links.share_url(show);
        let mut description = String::new();
        if let Some(notes) = &show.notes {
            description.push_str(notes);
            description.push_str("\n\n");
        }
        if let Some(ticket_url) = &show.ticket_url {
            description.push_str(&format!("Tickets: {ticket_url}\n"));
        }
        description.push_str(&share_url);

        self.line("BEGIN:VEVENT");
        self.line(&format!("UID:{}", links.uid(show)));
        self.line(&format!("DTSTAMP:{}", format_utc(stamp)));
        self.line(&format!("DTSTART:{}", format_utc(show.starts_at)));
        self.line(&format!(
            "DTEND:{}",
            format_utc(show.starts_at + DEFAULT_SHOW_LENGTH)
        ));
        self.line(&format!("SUMMARY:{}", escape_text(&show.title)));
        self.line(&format!(
            "LOCATION:{}",
            escape_text(&format!("{}, {}", show.venue, show.city))
        ));
        self.line(&format!("DESCRIPTION:{}", escape_text(&description)));
        self.line(&format!("URL:{share_url}"));
        self.line("END:VEVENT");
    }

    fn finish(mut self) -> String {
        self.line("END:VCALENDAR");
        self.out
    }
}

/// A calendar holding a single show.
pub fn show_calendar(show: &show::Model, links: &EventLinks<'_>, stamp: DateTime<Utc>) -> String {
    let mut writer = CalendarWriter::new(None);
    writer.event(show, links, stamp);
    writer.finish()
}

/// A subscribable calendar of shows.
pub fn feed_calendar(
    name: &str,
    shows: &[show::Model],
    links: &EventLinks<'_>,
    stamp: DateTime<Utc>,
) -> String {
    let mut writer = CalendarWriter::new(Some(name));
    for show in shows {
        writer.event(show, links, stamp);
    }
    writer.finish()
}

/// Google Calendar "create event" template link.
pub fn google_calendar_url(show: &show::Model, links: &EventLinks<'_>) -> String {
    let dates = format!(
        "{}/{}",
        format_utc(show.starts_at),
        format_utc(show.starts_at + DEFAULT_SHOW_LENGTH)
    );
    let location = format!("{}, {}", show.venue, show.city);
    let details = links.share_url(show);
    format!(
        "https://calendar.google.com/calendar/render?action=TEMPLATE&text={}&dates={}&details={}&location={}",
        urlencoding::encode(&show.title),
        dates,
        urlencoding::encode(&details),
        urlencoding::encode(&location),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_show() -> show::Model {
        let starts_at: DateTime<Utc> = "2026-10-25T00:00:00Z".parse().unwrap();
        show::Model {
            id: 7,
            community_id: 1,
            title: "Big Thief, live; with friends".into(),
            starts_at,
            venue: "Roadrunner".into(),
            city: "Boston".into(),
            ticket_url: Some("https://tickets.example.com/bt".into()),
            poster_url: None,
            notes: Some("Doors at 7\nAll ages".into()),
            share_token: "abc123".into(),
            created_by: "user-1".into(),
            created_at: starts_at,
            updated_at: starts_at,
        }
    }

    fn links() -> EventLinks<'static> {
        EventLinks {
            public_base_url: "https://shows.example.com/",
            host: "shows.example.com",
        }
    }

    #[test]
    fn test_show_calendar_structure() {
        let stamp: DateTime<Utc> = "2026-10-19T12:00:00Z".parse().unwrap();
        let ics = show_calendar(&test_show(), &links(), stamp);

        assert!(ics.starts_with("BEGIN:VCALENDAR\r\nVERSION:2.0\r\n"));
        assert!(ics.ends_with("END:VEVENT\r\nEND:VCALENDAR\r\n"));
        assert!(ics.contains("UID:show-7@shows.example.com\r\n"));
        assert!(ics.contains("DTSTAMP:20261019T120000Z\r\n"));
        assert!(ics.contains("DTSTART:20261025T000000Z\r\n"));
        assert!(ics.contains("DTEND:20261025T030000Z\r\n"));
        assert!(ics.contains("SUMMARY:Big Thief\\, live\\; with friends\r\n"));
        assert!(ics.contains("LOCATION:Roadrunner\\, Boston\r\n"));
        assert!(ics.contains("URL:https://shows.example.com/api/public/shows/abc123\r\n"));
        assert!(!ics.contains("X-WR-CALNAME"));
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a\\b;c,d\r\ne"), "a\\\\b\\;c\\,d\\ne");
    }

    #[test]
    fn test_fold_line_ascii() {
        let line = format!("DESCRIPTION:{}", "x".repeat(100));
        let folded = fold_line(&line);
        let parts: Vec<&str> = folded.split("\r\n").collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].len(), 75);
        assert!(parts[1].starts_with(' '));
        assert_eq!(folded.replace("\r\n ", ""), line);
    }

    #[test]
    fn test_fold_line_keeps_utf8_sequences_whole() {
        let line = format!("SUMMARY:{}", "é".repeat(60));
        let folded = fold_line(&line);
        for part in folded.split("\r\n") {
            assert!(part.len() <= 75);
        }
        assert_eq!(folded.replace("\r\n ", ""), line);
    }

    #[test]
    fn test_feed_calendar_lists_every_show() {
        let stamp: DateTime<Utc> = "2026-10-19T12:00:00Z".parse().unwrap();
        let mut second = test_show();
        second.id = 8;
        let ics = feed_calendar("Sam's shows", &[test_show(), second], &links(), stamp);

        assert!(ics.contains("X-WR-CALNAME:Sam's shows\r\n"));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 2);
        assert!(ics.contains("UID:show-8@shows.example.com"));
    }

    #[test]
    fn test_google_calendar_url() {
        let url = google_calendar_url(&test_show(), &links());
        assert!(url.starts_with("https://calendar.google.com/calendar/render?action=TEMPLATE"));
        assert!(url.contains("&dates=20261025T000000Z/20261025T030000Z"));
        assert!(url.contains("&location=Roadrunner%2C%20Boston"));
        assert!(url.contains("text=Big%20Thief%2C%20live%3B%20with%20friends"));
    }
}
