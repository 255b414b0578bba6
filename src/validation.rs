use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

use crate::entities::rsvp::RsvpStatus;
use crate::error::DomainError;
use crate::show_time::parse_eastern_local;

const MAX_TITLE_LEN: usize = 200;
const MAX_VENUE_LEN: usize = 200;
const MAX_CITY_LEN: usize = 100;
const MAX_NOTES_LEN: usize = 2000;
const MAX_COMMUNITY_NAME_LEN: usize = 100;
const MAX_COMMUNITY_DESCRIPTION_LEN: usize = 500;
const MAX_DISPLAY_NAME_LEN: usize = 60;

/// Show fields as submitted by the client. Date and time are Eastern wall-clock values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShowInput {
    pub community_id: Option<i64>,
    pub title: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub venue: Option<String>,
    pub city: Option<String>,
    pub ticket_url: Option<String>,
    pub poster_url: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewShow {
    pub community_id: i64,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub venue: String,
    pub city: String,
    pub ticket_url: Option<String>,
    pub poster_url: Option<String>,
    pub notes: Option<String>,
}

/// Only the fields present in the request; `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShowChanges {
    pub title: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub venue: Option<String>,
    pub city: Option<String>,
    pub ticket_url: Option<Option<String>>,
    pub poster_url: Option<Option<String>>,
    pub notes: Option<Option<String>>,
}

fn required_text(field: &str, value: Option<&str>, max_len: usize) -> Result<String, DomainError> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(DomainError::validation(format!("{field} is required")));
    }
    if value.chars().count() > max_len {
        return Err(DomainError::validation(format!(
            "{field} must be at most {max_len} characters"
        )));
    }
    Ok(value.to_string())
}

/// Empty strings count as "not provided".
fn optional_text(field: &str, value: Option<&str>, max_len: usize) -> Result<Option<String>, DomainError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) if v.chars().count() > max_len => Err(DomainError::validation(format!(
            "{field} must be at most {max_len} characters"
        ))),
        Some(v) => Ok(Some(v.to_string())),
    }
}

fn optional_url(field: &str, value: Option<&str>) -> Result<Option<String>, DomainError> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let url = Url::parse(value)
        .map_err(|_| DomainError::validation(format!("{field} must be a valid URL")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(DomainError::validation(format!(
            "{field} must be an http or https URL"
        )));
    }
    Ok(Some(url.to_string()))
}

pub fn validate_new_show(input: &ShowInput) -> Result<NewShow, DomainError> {
    let community_id = input
        .community_id
        .ok_or_else(|| DomainError::validation("community_id is required"))?;
    let title = required_text("title", input.title.as_deref(), MAX_TITLE_LEN)?;
    let date = required_text("date", input.date.as_deref(), 10)?;
    let time = required_text("time", input.time.as_deref(), 8)?;
    let starts_at = parse_eastern_local(&date, &time)?;
    let venue = required_text("venue", input.venue.as_deref(), MAX_VENUE_LEN)?;
    let city = required_text("city", input.city.as_deref(), MAX_CITY_LEN)?;

    Ok(NewShow {
        community_id,
        title,
        starts_at,
        venue,
        city,
        ticket_url: optional_url("ticket_url", input.ticket_url.as_deref())?,
        poster_url: optional_url("poster_url", input.poster_url.as_deref())?,
        notes: optional_text("notes", input.notes.as_deref(), MAX_NOTES_LEN)?,
    })
}

/// Validates a partial update. Date and time must be sent together.
pub fn validate_show_changes(input: &ShowInput) -> Result<ShowChanges, DomainError> {
    if input.community_id.is_some() {
        return Err(DomainError::validation(
            "a show cannot be moved to another community",
        ));
    }

    let starts_at = match (input.date.as_deref(), input.time.as_deref()) {
        (None, None) => None,
        (Some(date), Some(time)) => Some(parse_eastern_local(date, time)?),
        _ => {
            return Err(DomainError::validation(
                "date and time must be updated together",
            ));
        }
    };

    Ok(ShowChanges {
        title: input
            .title
            .as_deref()
            .map(|v| required_text("title", Some(v), MAX_TITLE_LEN))
            .transpose()?,
        starts_at,
        venue: input
            .venue
            .as_deref()
            .map(|v| required_text("venue", Some(v), MAX_VENUE_LEN))
            .transpose()?,
        city: input
            .city
            .as_deref()
            .map(|v| required_text("city", Some(v), MAX_CITY_LEN))
            .transpose()?,
        ticket_url: input
            .ticket_url
            .as_deref()
            .map(|v| optional_url("ticket_url", Some(v)))
            .transpose()?,
        poster_url: input
            .poster_url
            .as_deref()
            .map(|v| optional_url("poster_url", Some(v)))
            .transpose()?,
        notes: input
            .notes
            .as_deref()
            .map(|v| optional_text("notes", Some(v), MAX_NOTES_LEN))
            .transpose()?,
    })
}

pub fn parse_rsvp_status(value: Option<&str>) -> Result<RsvpStatus, DomainError> {
    let value = value.ok_or_else(|| DomainError::validation("status is required"))?;
    value
        .parse::<RsvpStatus>()
        .map_err(|err| DomainError::validation(err.to_string()))
}

pub fn validate_community_name(name: Option<&str>) -> Result<String, DomainError> {
    required_text("name", name, MAX_COMMUNITY_NAME_LEN)
}

pub fn validate_community_description(
    description: Option<&str>,
) -> Result<Option<String>, DomainError> {
    optional_text("description", description, MAX_COMMUNITY_DESCRIPTION_LEN)
}

pub fn validate_display_name(name: &str) -> Result<String, DomainError> {
    required_text("display_name", Some(name), MAX_DISPLAY_NAME_LEN)
}

pub fn validate_avatar_url(url: &str) -> Result<Option<String>, DomainError> {
    optional_url("avatar_url", Some(url))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_input() -> ShowInput {
        ShowInput {
            community_id: Some(1),
            title: Some("  Big Thief  ".into()),
            date: Some("2026-10-24".into()),
            time: Some("20:00".into()),
            venue: Some("Roadrunner".into()),
            city: Some("Boston".into()),
            ticket_url: Some("https://tickets.example.com/bt".into()),
            poster_url: None,
            notes: Some("".into()),
        }
    }

    #[test]
    fn test_validate_new_show() {
        let show = validate_new_show(&valid_input()).unwrap();
        assert_eq!(show.title, "Big Thief");
        assert_eq!(
            show.starts_at,
            "2026-10-25T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert_eq!(
            show.ticket_url.as_deref(),
            Some("https://tickets.example.com/bt")
        );
        assert_eq!(show.notes, None);
    }

    #[test]
    fn test_validate_new_show_missing_fields() {
        for field in ["title", "venue", "city", "date", "time"] {
            let mut input = valid_input();
            match field {
                "title" => input.title = Some("   ".into()),
                "venue" => input.venue = None,
                "city" => input.city = None,
                "date" => input.date = None,
                _ => input.time = None,
            }
            let err = validate_new_show(&input).unwrap_err();
            assert_eq!(
                err,
                DomainError::Validation(format!("{field} is required")),
                "field: {field}"
            );
        }
    }

    #[test]
    fn test_validate_new_show_requires_community() {
        let mut input = valid_input();
        input.community_id = None;
        assert!(matches!(
            validate_new_show(&input),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_new_show_rejects_long_title() {
        let mut input = valid_input();
        input.title = Some("x".repeat(201));
        let err = validate_new_show(&input).unwrap_err();
        assert_eq!(
            err,
            DomainError::Validation("title must be at most 200 characters".into())
        );
    }

    #[test]
    fn test_validate_new_show_rejects_bad_urls() {
        let mut input = valid_input();
        input.ticket_url = Some("not a url".into());
        assert!(validate_new_show(&input).is_err());

        let mut input = valid_input();
        input.poster_url = Some("ftp://example.com/poster.png".into());
        let err = validate_new_show(&input).unwrap_err();
        assert_eq!(
            err,
            DomainError::Validation("poster_url must be an http or https URL".into())
        );
    }

    #[test]
    fn test_validate_new_show_rejects_bad_time() {
        let mut input = valid_input();
        input.time = Some("25:00".into());
        assert!(matches!(
            validate_new_show(&input),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_show_changes_partial() {
        let input = ShowInput {
            venue: Some("The Sinclair".into()),
            ticket_url: Some("".into()),
            ..Default::default()
        };
        let changes = validate_show_changes(&input).unwrap();
        assert_eq!(changes.venue.as_deref(), Some("The Sinclair"));
        assert_eq!(changes.ticket_url, Some(None));
        assert_eq!(changes.title, None);
        assert_eq!(changes.starts_at, None);
    }

    #[test]
    fn test_validate_show_changes_date_without_time() {
        let input = ShowInput {
            date: Some("2026-10-24".into()),
            ..Default::default()
        };
        assert!(validate_show_changes(&input).is_err());
    }

    #[test]
    fn test_validate_show_changes_rejects_community_move() {
        let input = ShowInput {
            community_id: Some(2),
            ..Default::default()
        };
        assert!(validate_show_changes(&input).is_err());
    }

    #[test]
    fn test_parse_rsvp_status() {
        assert_eq!(parse_rsvp_status(Some("going")).unwrap(), RsvpStatus::Going);
        assert_eq!(parse_rsvp_status(Some("maybe")).unwrap(), RsvpStatus::Maybe);
        assert_eq!(
            parse_rsvp_status(Some("not_going")).unwrap(),
            RsvpStatus::NotGoing
        );
    }

    #[test]
    fn test_parse_rsvp_status_invalid() {
        assert_eq!(
            parse_rsvp_status(None).unwrap_err(),
            DomainError::Validation("status is required".into())
        );
        for bad in ["Going", "yes", "", "not-going"] {
            assert!(
                matches!(parse_rsvp_status(Some(bad)), Err(DomainError::Validation(_))),
                "status: {bad}"
            );
        }
    }

    #[test]
    fn test_validate_display_name() {
        assert_eq!(validate_display_name(" Sam ").unwrap(), "Sam");
        assert!(validate_display_name("").is_err());
        assert!(validate_display_name(&"a".repeat(61)).is_err());
    }
}
