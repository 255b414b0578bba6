use std::sync::Arc;

use chrono::{DateTime, Utc};
use color_eyre::eyre::{OptionExt, Result, WrapErr};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Serialize;

use crate::database::Database;
use crate::entities;
use crate::entities::rsvp::RsvpStatus;
use crate::services::show::visible_show;
use crate::show_time::ensure_rsvp_open;

#[derive(Debug, Clone, Serialize)]
pub struct RsvpView {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub status: RsvpStatus,
    pub updated_at: DateTime<Utc>,
}

pub struct RsvpService {
    db: Arc<Database>,
}

impl RsvpService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn set(
        &self,
        user_id: &str,
        show_id: i64,
        status: RsvpStatus,
    ) -> Result<entities::rsvp::Model> {
        self.set_at(user_id, show_id, status, Utc::now()).await
    }

    /// Creates or replaces the user's RSVP. One row per (show, user).
    #[tracing::instrument(skip(self))]
    pub async fn set_at(
        &self,
        user_id: &str,
        show_id: i64,
        status: RsvpStatus,
        now: DateTime<Utc>,
    ) -> Result<entities::rsvp::Model> {
        let show = visible_show(&self.db.conn, user_id, show_id).await?;
        ensure_rsvp_open(show.starts_at, now)?;

        let rsvp = entities::rsvp::ActiveModel {
            show_id: Set(show_id),
            user_id: Set(user_id.to_string()),
            status: Set(status),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        entities::rsvp::Entity::insert(rsvp)
            .on_conflict(
                OnConflict::columns([
                    entities::rsvp::Column::ShowId,
                    entities::rsvp::Column::UserId,
                ])
                .update_columns([
                    entities::rsvp::Column::Status,
                    entities::rsvp::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(&self.db.conn)
            .await
            .wrap_err("Failed to save RSVP")?;

        entities::rsvp::Entity::find()
            .filter(entities::rsvp::Column::ShowId.eq(show_id))
            .filter(entities::rsvp::Column::UserId.eq(user_id))
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to fetch RSVP")?
            .ok_or_eyre("RSVP missing after upsert")
    }

    pub async fn delete(&self, user_id: &str, show_id: i64) -> Result<()> {
        self.delete_at(user_id, show_id, Utc::now()).await
    }

    pub async fn delete_at(&self, user_id: &str, show_id: i64, now: DateTime<Utc>) -> Result<()> {
        let show = visible_show(&self.db.conn, user_id, show_id).await?;
        ensure_rsvp_open(show.starts_at, now)?;

        entities::rsvp::Entity::delete_many()
            .filter(entities::rsvp::Column::ShowId.eq(show_id))
            .filter(entities::rsvp::Column::UserId.eq(user_id))
            .exec(&self.db.conn)
            .await
            .wrap_err("Failed to delete RSVP")?;
        Ok(())
    }

    /// Everyone's RSVP for a show, most recent change first.
    pub async fn list(&self, user_id: &str, show_id: i64) -> Result<Vec<RsvpView>> {
        visible_show(&self.db.conn, user_id, show_id).await?;

        let rsvps = entities::rsvp::Entity::find()
            .filter(entities::rsvp::Column::ShowId.eq(show_id))
            .find_also_related(entities::profile::Entity)
            .order_by_desc(entities::rsvp::Column::UpdatedAt)
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch RSVPs")?;

        Ok(rsvps
            .into_iter()
            .map(|(rsvp, profile)| RsvpView {
                display_name: profile
                    .as_ref()
                    .map(|p| p.display_name.clone())
                    .unwrap_or_default(),
                avatar_url: profile.and_then(|p| p.avatar_url),
                user_id: rsvp.user_id,
                status: rsvp.status,
                updated_at: rsvp.updated_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::entities::community_member::MemberRole;
    use crate::error::{DomainError, find_domain_error};
    use crate::test_utils::{add_member, insert_community, insert_profile, insert_show, test_db};

    fn domain_error(err: &color_eyre::Report) -> DomainError {
        find_domain_error(err).cloned().expect("expected a domain error")
    }

    #[tokio::test]
    async fn test_set_upserts_single_row() {
        let db = test_db().await;
        let community = insert_community(&db, "owner", "Crew").await;
        let show = insert_show(&db, community.id, "owner", "Show", Utc::now() + Duration::days(1)).await;
        let service = RsvpService::new(db.clone());

        let first = service.set("owner", show.id, RsvpStatus::Maybe).await.unwrap();
        let second = service.set("owner", show.id, RsvpStatus::Going).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.status, RsvpStatus::Going);
        let rows = entities::rsvp::Entity::find().all(&db.conn).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_rsvp_closed_once_show_started() {
        let db = test_db().await;
        let community = insert_community(&db, "owner", "Crew").await;
        let starts_at = Utc.with_ymd_and_hms(2026, 3, 8, 1, 0, 0).unwrap();
        let show = insert_show(&db, community.id, "owner", "Show", starts_at).await;
        let service = RsvpService::new(db);

        service
            .set_at("owner", show.id, RsvpStatus::Going, starts_at - Duration::minutes(1))
            .await
            .unwrap();

        let err = service
            .set_at("owner", show.id, RsvpStatus::NotGoing, starts_at + Duration::minutes(1))
            .await
            .unwrap_err();
        assert!(matches!(domain_error(&err), DomainError::Conflict(_)));

        let err = service
            .delete_at("owner", show.id, starts_at + Duration::hours(5))
            .await
            .unwrap_err();
        assert!(matches!(domain_error(&err), DomainError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_rsvp_requires_membership() {
        let db = test_db().await;
        let community = insert_community(&db, "owner", "Crew").await;
        let show = insert_show(&db, community.id, "owner", "Show", Utc::now() + Duration::days(1)).await;
        let service = RsvpService::new(db);

        let err = service
            .set("stranger", show.id, RsvpStatus::Going)
            .await
            .unwrap_err();
        assert_eq!(domain_error(&err), DomainError::NotFound("show"));
    }

    #[tokio::test]
    async fn test_delete_and_list() {
        let db = test_db().await;
        insert_profile(&db, "owner", "Olive").await;
        insert_profile(&db, "fan", "Frankie").await;
        let community = insert_community(&db, "owner", "Crew").await;
        add_member(&db, community.id, "fan", MemberRole::Member).await;
        let show = insert_show(&db, community.id, "owner", "Show", Utc::now() + Duration::days(1)).await;
        let service = RsvpService::new(db);

        service.set("owner", show.id, RsvpStatus::Going).await.unwrap();
        service.set("fan", show.id, RsvpStatus::Maybe).await.unwrap();

        let rsvps = service.list("fan", show.id).await.unwrap();
        assert_eq!(rsvps.len(), 2);
        assert!(
            rsvps
                .iter()
                .any(|r| r.display_name == "Frankie" && r.status == RsvpStatus::Maybe)
        );

        service.delete("fan", show.id).await.unwrap();
        let rsvps = service.list("owner", show.id).await.unwrap();
        assert_eq!(rsvps.len(), 1);
        assert_eq!(rsvps[0].user_id, "owner");
    }
}
