use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use color_eyre::eyre::{Result, WrapErr};
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};

use super::{Page, PaginatedResult};
use crate::database::Database;
use crate::entities;
use crate::entities::rsvp::RsvpStatus;
use crate::error::DomainError;
use crate::services::community::{find_membership, member_role};
use crate::show_time::{format_show_date, format_show_time, is_show_past_at};
use crate::validation::{ShowInput, validate_new_show, validate_show_changes};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShowScope {
    #[default]
    Upcoming,
    Past,
}

#[derive(Debug, Clone, Default)]
pub struct ShowQuery {
    pub community_id: Option<i64>,
    pub scope: ShowScope,
    pub page: Page,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RsvpCounts {
    pub going: u64,
    pub maybe: u64,
    pub not_going: u64,
}

impl RsvpCounts {
    fn add(&mut self, status: RsvpStatus) {
        match status {
            RsvpStatus::Going => self.going += 1,
            RsvpStatus::Maybe => self.maybe += 1,
            RsvpStatus::NotGoing => self.not_going += 1,
        }
    }
}

/// A show as seen by a community member.
#[derive(Debug, Clone, Serialize)]
pub struct ShowView {
    #[serde(flatten)]
    pub show: entities::show::Model,
    pub date_label: String,
    pub time_label: String,
    pub is_past: bool,
    pub rsvp_counts: RsvpCounts,
    pub my_rsvp: Option<RsvpStatus>,
}

/// What the share link reveals: the show and attendance numbers, nobody's identity.
#[derive(Debug, Clone, Serialize)]
pub struct PublicShowView {
    pub title: String,
    pub community_name: String,
    pub starts_at: DateTime<Utc>,
    pub date_label: String,
    pub time_label: String,
    pub venue: String,
    pub city: String,
    pub ticket_url: Option<String>,
    pub poster_url: Option<String>,
    pub notes: Option<String>,
    pub is_past: bool,
    pub rsvp_counts: RsvpCounts,
}

/// Loads a show the user can see. Shows in other communities look missing.
pub(crate) async fn visible_show(
    conn: &impl ConnectionTrait,
    user_id: &str,
    show_id: i64,
) -> Result<entities::show::Model> {
    let show = entities::show::Entity::find_by_id(show_id)
        .one(conn)
        .await
        .wrap_err("Failed to fetch show")?
        .ok_or(DomainError::NotFound("show"))?;

    if find_membership(conn, show.community_id, user_id)
        .await?
        .is_none()
    {
        return Err(DomainError::NotFound("show").into());
    }
    Ok(show)
}

async fn rsvp_summary(
    conn: &impl ConnectionTrait,
    show_ids: &[i64],
    user_id: Option<&str>,
) -> Result<HashMap<i64, (RsvpCounts, Option<RsvpStatus>)>> {
    if show_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rsvps = entities::rsvp::Entity::find()
        .filter(entities::rsvp::Column::ShowId.is_in(show_ids.iter().copied()))
        .all(conn)
        .await
        .wrap_err("Failed to fetch RSVPs")?;

    let mut summary: HashMap<i64, (RsvpCounts, Option<RsvpStatus>)> = HashMap::new();
    for rsvp in rsvps {
        let entry = summary.entry(rsvp.show_id).or_default();
        entry.0.add(rsvp.status);
        if user_id == Some(rsvp.user_id.as_str()) {
            entry.1 = Some(rsvp.status);
        }
    }
    Ok(summary)
}

fn show_view(
    show: entities::show::Model,
    summary: Option<&(RsvpCounts, Option<RsvpStatus>)>,
    now: DateTime<Utc>,
) -> ShowView {
    let (rsvp_counts, my_rsvp) = summary.copied().unwrap_or_default();
    ShowView {
        date_label: format_show_date(show.starts_at),
        time_label: format_show_time(show.starts_at),
        is_past: is_show_past_at(show.starts_at, now),
        rsvp_counts,
        my_rsvp,
        show,
    }
}

pub struct ShowService {
    db: Arc<Database>,
}

impl ShowService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn list(&self, user_id: &str, query: ShowQuery) -> Result<PaginatedResult<ShowView>> {
        self.list_at(user_id, query, Utc::now()).await
    }

    /// Upcoming shows soonest first, past shows most recent first.
    pub async fn list_at(
        &self,
        user_id: &str,
        query: ShowQuery,
        now: DateTime<Utc>,
    ) -> Result<PaginatedResult<ShowView>> {
        let community_ids: Vec<i64> = match query.community_id {
            Some(community_id) => {
                member_role(&self.db.conn, community_id, user_id).await?;
                vec![community_id]
            }
            None => entities::community_member::Entity::find()
                .select_only()
                .column(entities::community_member::Column::CommunityId)
                .filter(entities::community_member::Column::UserId.eq(user_id))
                .into_tuple()
                .all(&self.db.conn)
                .await
                .wrap_err("Failed to fetch memberships")?,
        };

        let select = entities::show::Entity::find()
            .filter(entities::show::Column::CommunityId.is_in(community_ids));
        let select = match query.scope {
            ShowScope::Upcoming => select
                .filter(entities::show::Column::StartsAt.gte(now))
                .order_by_asc(entities::show::Column::StartsAt),
            ShowScope::Past => select
                .filter(entities::show::Column::StartsAt.lt(now))
                .order_by_desc(entities::show::Column::StartsAt),
        }
        .order_by_asc(entities::show::Column::Id);

        let paginator = select.paginate(&self.db.conn, query.page.size);
        let counts = paginator
            .num_items_and_pages()
            .await
            .wrap_err("Failed to count shows")?;
        let shows = paginator
            .fetch_page(query.page.number - 1)
            .await
            .wrap_err("Failed to fetch shows")?;

        let show_ids: Vec<i64> = shows.iter().map(|show| show.id).collect();
        let summary = rsvp_summary(&self.db.conn, &show_ids, Some(user_id)).await?;

        Ok(PaginatedResult {
            items: shows
                .into_iter()
                .map(|show| {
                    let id = show.id;
                    show_view(show, summary.get(&id), now)
                })
                .collect(),
            page: query.page.number,
            page_size: query.page.size,
            total_items: counts.number_of_items,
            total_pages: counts.number_of_pages,
        })
    }

    pub async fn get(&self, user_id: &str, show_id: i64) -> Result<ShowView> {
        let show = visible_show(&self.db.conn, user_id, show_id).await?;
        let summary = rsvp_summary(&self.db.conn, &[show.id], Some(user_id)).await?;
        Ok(show_view(show, summary.get(&show_id), Utc::now()))
    }

    pub async fn get_public(&self, share_token: &str) -> Result<PublicShowView> {
        let (show, community) = entities::show::Entity::find()
            .filter(entities::show::Column::ShareToken.eq(share_token))
            .find_also_related(entities::community::Entity)
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to fetch shared show")?
            .ok_or(DomainError::NotFound("show"))?;

        let summary = rsvp_summary(&self.db.conn, &[show.id], None).await?;
        let rsvp_counts = summary
            .get(&show.id)
            .map(|(counts, _)| *counts)
            .unwrap_or_default();

        Ok(PublicShowView {
            community_name: community.map(|c| c.name).unwrap_or_default(),
            date_label: format_show_date(show.starts_at),
            time_label: format_show_time(show.starts_at),
            is_past: is_show_past_at(show.starts_at, Utc::now()),
            title: show.title,
            starts_at: show.starts_at,
            venue: show.venue,
            city: show.city,
            ticket_url: show.ticket_url,
            poster_url: show.poster_url,
            notes: show.notes,
            rsvp_counts,
        })
    }

    #[tracing::instrument(skip(self, input))]
    pub async fn create(&self, user_id: &str, input: ShowInput) -> Result<ShowView> {
        let new_show = validate_new_show(&input)?;
        member_role(&self.db.conn, new_show.community_id, user_id).await?;

        let show = entities::show::ActiveModel {
            community_id: Set(new_show.community_id),
            title: Set(new_show.title),
            starts_at: Set(new_show.starts_at),
            venue: Set(new_show.venue),
            city: Set(new_show.city),
            ticket_url: Set(new_show.ticket_url),
            poster_url: Set(new_show.poster_url),
            notes: Set(new_show.notes),
            created_by: Set(user_id.to_string()),
            ..entities::show::ActiveModel::new()
        }
        .insert(&self.db.conn)
        .await
        .wrap_err("Failed to create show")?;

        tracing::info!(show_id = show.id, community_id = show.community_id, "Created show");
        Ok(show_view(show, None, Utc::now()))
    }

    pub async fn update(&self, user_id: &str, show_id: i64, input: ShowInput) -> Result<ShowView> {
        let changes = validate_show_changes(&input)?;
        let show = self.editable_show(user_id, show_id).await?;
        let mut model: entities::show::ActiveModel = show.into();

        if let Some(title) = changes.title {
            model.title = Set(title);
        }
        if let Some(starts_at) = changes.starts_at {
            model.starts_at = Set(starts_at);
        }
        if let Some(venue) = changes.venue {
            model.venue = Set(venue);
        }
        if let Some(city) = changes.city {
            model.city = Set(city);
        }
        if let Some(ticket_url) = changes.ticket_url {
            model.ticket_url = Set(ticket_url);
        }
        if let Some(poster_url) = changes.poster_url {
            model.poster_url = Set(poster_url);
        }
        if let Some(notes) = changes.notes {
            model.notes = Set(notes);
        }

        let show = model
            .update(&self.db.conn)
            .await
            .wrap_err("Failed to update show")?;
        let summary = rsvp_summary(&self.db.conn, &[show.id], Some(user_id)).await?;
        Ok(show_view(show, summary.get(&show_id), Utc::now()))
    }

    pub async fn delete(&self, user_id: &str, show_id: i64) -> Result<()> {
        self.editable_show(user_id, show_id).await?;

        entities::show::Entity::delete_by_id(show_id)
            .exec(&self.db.conn)
            .await
            .wrap_err("Failed to delete show")?;

        tracing::info!(show_id, "Deleted show");
        Ok(())
    }

    /// The show's creator and community moderators can edit it.
    async fn editable_show(&self, user_id: &str, show_id: i64) -> Result<entities::show::Model> {
        let show = visible_show(&self.db.conn, user_id, show_id).await?;
        if show.created_by == user_id {
            return Ok(show);
        }

        let role = member_role(&self.db.conn, show.community_id, user_id).await?;
        if !role.can_moderate() {
            return Err(DomainError::forbidden(
                "only the show's creator or community admins can change it",
            )
            .into());
        }
        Ok(show)
    }
}
