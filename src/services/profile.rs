use std::sync::Arc;

use color_eyre::eyre::{OptionExt, Result, WrapErr};
use sea_orm::{ActiveModelBehavior, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::Deserialize;

use crate::database::Database;
use crate::entities;
use crate::error::DomainError;
use crate::ports::auth::AuthUser;
use crate::validation::{validate_avatar_url, validate_display_name};

#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    /// Empty string clears the avatar.
    pub avatar_url: Option<String>,
}

pub struct ProfileService {
    db: Arc<Database>,
}

impl ProfileService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Loads the profile for an authenticated user, creating it on first sight.
    pub async fn ensure(&self, user: &AuthUser) -> Result<entities::profile::Model> {
        if let Some(profile) = self.find(&user.id).await? {
            return Ok(profile);
        }

        let display_name = user
            .name
            .clone()
            .or_else(|| {
                user.email
                    .as_deref()
                    .and_then(|email| email.split('@').next())
                    .map(str::to_string)
            })
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "New member".to_string());
        let display_name: String = display_name.trim().chars().take(60).collect();

        let profile = entities::profile::ActiveModel {
            user_id: Set(user.id.clone()),
            email: Set(user.email.clone()),
            display_name: Set(display_name),
            ..entities::profile::ActiveModel::new()
        };

        // Two first requests can race; the loser keeps the winner's row.
        entities::profile::Entity::insert(profile)
            .on_conflict_do_nothing()
            .exec(&self.db.conn)
            .await
            .wrap_err("Failed to create profile")?;

        tracing::info!(user_id = %user.id, "Created profile");
        self.find(&user.id)
            .await?
            .ok_or_eyre("Profile missing after insert")
    }

    pub async fn get(&self, user_id: &str) -> Result<entities::profile::Model> {
        Ok(self
            .find(user_id)
            .await?
            .ok_or(DomainError::NotFound("profile"))?)
    }

    pub async fn update(
        &self,
        user_id: &str,
        update: ProfileUpdate,
    ) -> Result<entities::profile::Model> {
        let profile = self.get(user_id).await?;
        let mut model: entities::profile::ActiveModel = profile.into();

        if let Some(display_name) = update.display_name.as_deref() {
            model.display_name = Set(validate_display_name(display_name)?);
        }
        if let Some(avatar_url) = update.avatar_url.as_deref() {
            model.avatar_url = Set(validate_avatar_url(avatar_url)?);
        }

        model
            .update(&self.db.conn)
            .await
            .wrap_err("Failed to update profile")
    }

    /// Issues a new calendar token; the old feed URL stops working.
    pub async fn rotate_calendar_token(&self, user_id: &str) -> Result<String> {
        let profile = self.get(user_id).await?;
        let token = super::new_token();

        let mut model: entities::profile::ActiveModel = profile.into();
        model.calendar_token = Set(token.clone());
        model
            .update(&self.db.conn)
            .await
            .wrap_err("Failed to rotate calendar token")?;

        tracing::info!(user_id, "Rotated calendar token");
        Ok(token)
    }

    pub async fn find_by_calendar_token(
        &self,
        token: &str,
    ) -> Result<Option<entities::profile::Model>> {
        entities::profile::Entity::find()
            .filter(entities::profile::Column::CalendarToken.eq(token))
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to look up calendar token")
    }

    async fn find(&self, user_id: &str) -> Result<Option<entities::profile::Model>> {
        entities::profile::Entity::find_by_id(user_id.to_string())
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to fetch profile")
    }
}
