use std::sync::Arc;

use chrono::{DateTime, Utc};
use color_eyre::eyre::{Result, WrapErr};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::Serialize;
use url::Url;

use crate::calendar::{EventLinks, feed_calendar, google_calendar_url, show_calendar};
use crate::database::Database;
use crate::entities;
use crate::entities::rsvp::RsvpStatus;
use crate::error::DomainError;
use crate::services::profile::ProfileService;
use crate::services::show::visible_show;

#[derive(Debug, Clone, Serialize)]
pub struct CalendarLinks {
    pub share_url: String,
    pub ics_url: String,
    pub google_calendar_url: String,
}

pub struct CalendarService {
    db: Arc<Database>,
    public_base_url: String,
    host: String,
}

impl CalendarService {
    pub fn new(db: Arc<Database>, public_base_url: &str) -> Result<Self> {
        let url = Url::parse(public_base_url).wrap_err("Invalid public_base_url")?;
        let host = url.host_str().unwrap_or("localhost").to_string();
        Ok(Self {
            db,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            host,
        })
    }

    fn links(&self) -> EventLinks<'_> {
        EventLinks {
            public_base_url: &self.public_base_url,
            host: &self.host,
        }
    }

    pub async fn show_ics(&self, user_id: &str, show_id: i64) -> Result<String> {
        let show = visible_show(&self.db.conn, user_id, show_id).await?;
        Ok(show_calendar(&show, &self.links(), Utc::now()))
    }

    pub async fn show_links(&self, user_id: &str, show_id: i64) -> Result<CalendarLinks> {
        let show = visible_show(&self.db.conn, user_id, show_id).await?;
        let links = self.links();
        Ok(CalendarLinks {
            share_url: links.share_url(&show),
            ics_url: format!("{}/api/shows/{}/calendar.ics", self.public_base_url, show.id),
            google_calendar_url: google_calendar_url(&show, &links),
        })
    }

    /// The subscribable feed URL for a calendar token.
    pub fn feed_url(&self, calendar_token: &str) -> String {
        format!("{}/api/calendar/{}", self.public_base_url, calendar_token)
    }

    pub async fn feed(&self, calendar_token: &str) -> Result<String> {
        self.feed_at(calendar_token, Utc::now()).await
    }

    /// Every show the token's owner marked going or maybe.
    pub async fn feed_at(&self, calendar_token: &str, stamp: DateTime<Utc>) -> Result<String> {
        let profile = ProfileService::new(self.db.clone())
            .find_by_calendar_token(calendar_token)
            .await?
            .ok_or(DomainError::NotFound("calendar"))?;

        // RSVPs outlive membership; shows from communities the user left stay hidden.
        let community_ids: Vec<i64> = entities::community_member::Entity::find()
            .select_only()
            .column(entities::community_member::Column::CommunityId)
            .filter(entities::community_member::Column::UserId.eq(&profile.user_id))
            .into_tuple()
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch calendar communities")?;

        let shows: Vec<entities::show::Model> = entities::rsvp::Entity::find()
            .filter(entities::rsvp::Column::UserId.eq(&profile.user_id))
            .filter(entities::rsvp::Column::Status.is_in([RsvpStatus::Going, RsvpStatus::Maybe]))
            .find_also_related(entities::show::Entity)
            .filter(entities::show::Column::CommunityId.is_in(community_ids))
            .order_by_asc(entities::show::Column::StartsAt)
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch calendar shows")?
            .into_iter()
            .filter_map(|(_, show)| show)
            .collect();

        tracing::debug!(user_id = %profile.user_id, shows = shows.len(), "Rendering calendar feed");
        let name = format!("{}'s shows", profile.display_name);
        Ok(feed_calendar(&name, &shows, &self.links(), stamp))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use sea_orm::{ActiveModelTrait, Set};

    use super::*;
    use crate::entities::community_member::MemberRole;
    use crate::error::find_domain_error;
    use crate::services::community::CommunityService;
    use crate::test_utils::{add_member, insert_community, insert_profile, insert_show, test_db};

    async fn rsvp(db: &Database, show_id: i64, user_id: &str, status: RsvpStatus) {
        let now = Utc::now();
        entities::rsvp::ActiveModel {
            show_id: Set(show_id),
            user_id: Set(user_id.into()),
            status: Set(status),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&db.conn)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_feed_contains_going_and_maybe_only() {
        let db = test_db().await;
        let profile = insert_profile(&db, "fan", "Frankie").await;
        let community = insert_community(&db, "owner", "Crew").await;
        add_member(&db, community.id, "fan", MemberRole::Member).await;
        let now = Utc::now();

        let going = insert_show(&db, community.id, "owner", "Going Show", now + Duration::days(1)).await;
        let maybe = insert_show(&db, community.id, "owner", "Maybe Show", now - Duration::days(3)).await;
        let skip = insert_show(&db, community.id, "owner", "Skipped Show", now + Duration::days(2)).await;
        insert_show(&db, community.id, "owner", "Unanswered Show", now + Duration::days(4)).await;
        rsvp(&db, going.id, "fan", RsvpStatus::Going).await;
        rsvp(&db, maybe.id, "fan", RsvpStatus::Maybe).await;
        rsvp(&db, skip.id, "fan", RsvpStatus::NotGoing).await;
        rsvp(&db, skip.id, "owner", RsvpStatus::Going).await;

        let service = CalendarService::new(db, "https://shows.example.com/").unwrap();
        let ics = service.feed(&profile.calendar_token).await.unwrap();

        assert!(ics.contains("SUMMARY:Going Show"));
        assert!(ics.contains("SUMMARY:Maybe Show"));
        assert!(!ics.contains("Skipped Show"));
        assert!(!ics.contains("Unanswered Show"));
        assert!(ics.contains("X-WR-CALNAME:Frankie's shows"));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 2);
    }

    #[tokio::test]
    async fn test_feed_drops_shows_after_leaving_community() {
        let db = test_db().await;
        let profile = insert_profile(&db, "fan", "Frankie").await;
        let crew = insert_community(&db, "owner", "Crew").await;
        let other = insert_community(&db, "owner", "Other Crew").await;
        add_member(&db, crew.id, "fan", MemberRole::Member).await;
        add_member(&db, other.id, "fan", MemberRole::Member).await;
        let now = Utc::now();

        let left = insert_show(&db, crew.id, "owner", "Left Behind", now + Duration::days(1)).await;
        let kept = insert_show(&db, other.id, "owner", "Still Here", now + Duration::days(2)).await;
        rsvp(&db, left.id, "fan", RsvpStatus::Going).await;
        rsvp(&db, kept.id, "fan", RsvpStatus::Going).await;

        CommunityService::new(db.clone()).leave("fan", crew.id).await.unwrap();

        let service = CalendarService::new(db, "https://shows.example.com").unwrap();
        let ics = service.feed(&profile.calendar_token).await.unwrap();
        assert!(!ics.contains("Left Behind"));
        assert!(ics.contains("SUMMARY:Still Here"));
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 1);
    }

    #[tokio::test]
    async fn test_feed_unknown_token() {
        let db = test_db().await;
        let service = CalendarService::new(db, "https://shows.example.com").unwrap();

        let err = service.feed("nope").await.unwrap_err();
        assert_eq!(
            find_domain_error(&err),
            Some(&DomainError::NotFound("calendar"))
        );
    }

    #[tokio::test]
    async fn test_show_links() {
        let db = test_db().await;
        let community = insert_community(&db, "owner", "Crew").await;
        let show = insert_show(&db, community.id, "owner", "Show", Utc::now() + Duration::days(1)).await;
        let service = CalendarService::new(db, "https://shows.example.com/").unwrap();

        let links = service.show_links("owner", show.id).await.unwrap();
        assert_eq!(
            links.share_url,
            format!("https://shows.example.com/api/public/shows/{}", show.share_token)
        );
        assert_eq!(
            links.ics_url,
            format!("https://shows.example.com/api/shows/{}/calendar.ics", show.id)
        );
        assert!(links.google_calendar_url.starts_with("https://calendar.google.com/"));

        let ics = service.show_ics("owner", show.id).await.unwrap();
        assert!(ics.contains(&format!("UID:show-{}@shows.example.com", show.id)));

        let err = service.show_ics("stranger", show.id).await.unwrap_err();
        assert_eq!(find_domain_error(&err), Some(&DomainError::NotFound("show")));
    }
}
