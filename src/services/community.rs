use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use color_eyre::eyre::{OptionExt, Result, WrapErr};
use sea_orm::sea_query::{Expr, ExprTrait};
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::database::Database;
use crate::entities;
use crate::entities::community_member::MemberRole;
use crate::error::DomainError;
use crate::validation::{validate_community_description, validate_community_name};

const MAX_INVITE_LIFETIME_HOURS: i64 = 24 * 30;

#[derive(Debug, Default, Deserialize)]
pub struct CommunityInput {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InviteOptions {
    pub expires_in_hours: Option<i64>,
    pub max_uses: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommunityView {
    #[serde(flatten)]
    pub community: entities::community::Model,
    pub role: MemberRole,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberView {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

pub(crate) async fn find_membership(
    conn: &impl ConnectionTrait,
    community_id: i64,
    user_id: &str,
) -> Result<Option<entities::community_member::Model>> {
    entities::community_member::Entity::find_by_id((community_id, user_id.to_string()))
        .one(conn)
        .await
        .wrap_err("Failed to fetch community membership")
}

/// The caller's role in a community. Non-members get a 404 so community ids don't leak.
pub(crate) async fn member_role(
    conn: &impl ConnectionTrait,
    community_id: i64,
    user_id: &str,
) -> Result<MemberRole> {
    let membership = find_membership(conn, community_id, user_id)
        .await?
        .ok_or(DomainError::NotFound("community"))?;
    Ok(membership.role)
}

pub(crate) async fn moderator_role(
    conn: &impl ConnectionTrait,
    community_id: i64,
    user_id: &str,
) -> Result<MemberRole> {
    let role = member_role(conn, community_id, user_id).await?;
    if !role.can_moderate() {
        return Err(DomainError::forbidden("only community owners and admins can do that").into());
    }
    Ok(role)
}

pub struct CommunityService {
    db: Arc<Database>,
}

impl CommunityService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    #[tracing::instrument(skip(self, input))]
    pub async fn create(&self, user_id: &str, input: CommunityInput) -> Result<CommunityView> {
        let name = validate_community_name(input.name.as_deref())?;
        let description = validate_community_description(input.description.as_deref())?;

        let txn = self
            .db
            .conn
            .begin()
            .await
            .wrap_err("Failed to begin transaction")?;

        let community = entities::community::ActiveModel {
            name: Set(name),
            description: Set(description),
            created_by: Set(user_id.to_string()),
            ..entities::community::ActiveModel::new()
        }
        .insert(&txn)
        .await
        .wrap_err("Failed to create community")?;

        entities::community_member::ActiveModel {
            community_id: Set(community.id),
            user_id: Set(user_id.to_string()),
            role: Set(MemberRole::Owner),
            joined_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await
        .wrap_err("Failed to add community owner")?;

        txn.commit()
            .await
            .wrap_err("Failed to commit transaction")?;

        tracing::info!(community_id = community.id, "Created community");
        Ok(CommunityView {
            community,
            role: MemberRole::Owner,
        })
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<CommunityView>> {
        let memberships = entities::community_member::Entity::find()
            .filter(entities::community_member::Column::UserId.eq(user_id))
            .find_also_related(entities::community::Entity)
            .order_by_asc(entities::community::Column::Name)
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch communities")?;

        Ok(memberships
            .into_iter()
            .filter_map(|(member, community)| {
                community.map(|community| CommunityView {
                    community,
                    role: member.role,
                })
            })
            .collect())
    }

    pub async fn get(&self, user_id: &str, community_id: i64) -> Result<CommunityView> {
        let role = member_role(&self.db.conn, community_id, user_id).await?;
        let community = self.find(community_id).await?;
        Ok(CommunityView { community, role })
    }

    pub async fn update(
        &self,
        user_id: &str,
        community_id: i64,
        input: CommunityInput,
    ) -> Result<CommunityView> {
        let role = moderator_role(&self.db.conn, community_id, user_id).await?;
        let community = self.find(community_id).await?;
        let mut model: entities::community::ActiveModel = community.into();

        if input.name.is_some() {
            model.name = Set(validate_community_name(input.name.as_deref())?);
        }
        if input.description.is_some() {
            model.description = Set(validate_community_description(input.description.as_deref())?);
        }

        let community = model
            .update(&self.db.conn)
            .await
            .wrap_err("Failed to update community")?;
        Ok(CommunityView { community, role })
    }

    pub async fn delete(&self, user_id: &str, community_id: i64) -> Result<()> {
        let role = member_role(&self.db.conn, community_id, user_id).await?;
        if role != MemberRole::Owner {
            return Err(DomainError::forbidden("only the owner can delete a community").into());
        }

        entities::community::Entity::delete_by_id(community_id)
            .exec(&self.db.conn)
            .await
            .wrap_err("Failed to delete community")?;

        tracing::info!(community_id, "Deleted community");
        Ok(())
    }

    pub async fn members(&self, user_id: &str, community_id: i64) -> Result<Vec<MemberView>> {
        member_role(&self.db.conn, community_id, user_id).await?;

        let members = entities::community_member::Entity::find()
            .filter(entities::community_member::Column::CommunityId.eq(community_id))
            .find_also_related(entities::profile::Entity)
            .order_by_asc(entities::community_member::Column::JoinedAt)
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch community members")?;

        Ok(members
            .into_iter()
            .map(|(member, profile)| MemberView {
                display_name: profile
                    .as_ref()
                    .map(|p| p.display_name.clone())
                    .unwrap_or_default(),
                avatar_url: profile.and_then(|p| p.avatar_url),
                user_id: member.user_id,
                role: member.role,
                joined_at: member.joined_at,
            })
            .collect())
    }

    /// Owners can remove anyone but themselves; admins can remove plain members.
    pub async fn remove_member(
        &self,
        user_id: &str,
        community_id: i64,
        target_user_id: &str,
    ) -> Result<()> {
        let role = moderator_role(&self.db.conn, community_id, user_id).await?;
        let target = find_membership(&self.db.conn, community_id, target_user_id)
            .await?
            .ok_or(DomainError::NotFound("member"))?;

        match (role, target.role) {
            (_, MemberRole::Owner) => {
                return Err(DomainError::forbidden("the owner cannot be removed").into());
            }
            (MemberRole::Admin, MemberRole::Admin) => {
                return Err(DomainError::forbidden("only the owner can remove admins").into());
            }
            _ => {}
        }

        target
            .delete(&self.db.conn)
            .await
            .wrap_err("Failed to remove community member")?;

        tracing::info!(community_id, target_user_id, "Removed community member");
        Ok(())
    }

    pub async fn leave(&self, user_id: &str, community_id: i64) -> Result<()> {
        let role = member_role(&self.db.conn, community_id, user_id).await?;
        if role == MemberRole::Owner {
            return Err(DomainError::conflict(
                "the owner cannot leave; delete the community instead",
            )
            .into());
        }

        entities::community_member::Entity::delete_by_id((community_id, user_id.to_string()))
            .exec(&self.db.conn)
            .await
            .wrap_err("Failed to leave community")?;
        Ok(())
    }

    pub async fn create_invite(
        &self,
        user_id: &str,
        community_id: i64,
        options: InviteOptions,
    ) -> Result<entities::community_invite::Model> {
        moderator_role(&self.db.conn, community_id, user_id).await?;

        if let Some(max_uses) = options.max_uses
            && max_uses < 1
        {
            return Err(DomainError::validation("max_uses must be at least 1").into());
        }
        let expires_at = match options.expires_in_hours {
            Some(hours) if !(1..=MAX_INVITE_LIFETIME_HOURS).contains(&hours) => {
                return Err(DomainError::validation(format!(
                    "expires_in_hours must be between 1 and {MAX_INVITE_LIFETIME_HOURS}"
                ))
                .into());
            }
            Some(hours) => Some(Utc::now() + Duration::hours(hours)),
            None => None,
        };

        let invite = entities::community_invite::ActiveModel {
            community_id: Set(community_id),
            token: Set(super::new_token()),
            created_by: Set(user_id.to_string()),
            expires_at: Set(expires_at),
            max_uses: Set(options.max_uses),
            uses: Set(0),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&self.db.conn)
        .await
        .wrap_err("Failed to create invite")?;

        Ok(invite)
    }

    pub async fn list_invites(
        &self,
        user_id: &str,
        community_id: i64,
    ) -> Result<Vec<entities::community_invite::Model>> {
        moderator_role(&self.db.conn, community_id, user_id).await?;

        entities::community_invite::Entity::find()
            .filter(entities::community_invite::Column::CommunityId.eq(community_id))
            .order_by_desc(entities::community_invite::Column::CreatedAt)
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch invites")
    }

    pub async fn revoke_invite(&self, user_id: &str, invite_id: i64) -> Result<()> {
        let invite = entities::community_invite::Entity::find_by_id(invite_id)
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to fetch invite")?
            .ok_or(DomainError::NotFound("invite"))?;

        moderator_role(&self.db.conn, invite.community_id, user_id)
            .await
            .map_err(|err| match crate::error::find_domain_error(&err) {
                Some(DomainError::NotFound(_)) => DomainError::NotFound("invite").into(),
                _ => err,
            })?;

        invite
            .delete(&self.db.conn)
            .await
            .wrap_err("Failed to revoke invite")?;
        Ok(())
    }

    /// Joins the invite's community. Accepting again as a member is a no-op.
    pub async fn accept_invite(&self, user_id: &str, token: &str) -> Result<CommunityView> {
        let invite = entities::community_invite::Entity::find()
            .filter(entities::community_invite::Column::Token.eq(token))
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to fetch invite")?
            .ok_or(DomainError::NotFound("invite"))?;

        if let Some(membership) = find_membership(&self.db.conn, invite.community_id, user_id).await? {
            let community = self.find(invite.community_id).await?;
            return Ok(CommunityView {
                community,
                role: membership.role,
            });
        }

        if invite.is_expired_at(Utc::now()) {
            return Err(DomainError::conflict("this invite has expired").into());
        }
        if invite.is_exhausted() {
            return Err(DomainError::conflict("this invite has been used up").into());
        }

        let txn = self
            .db
            .conn
            .begin()
            .await
            .wrap_err("Failed to begin transaction")?;

        // Guarded increment so concurrent accepts can't exceed max_uses.
        let mut claim = entities::community_invite::Entity::update_many()
            .col_expr(
                entities::community_invite::Column::Uses,
                Expr::col(entities::community_invite::Column::Uses).add(1),
            )
            .filter(entities::community_invite::Column::Id.eq(invite.id));
        if let Some(max_uses) = invite.max_uses {
            claim = claim.filter(entities::community_invite::Column::Uses.lt(max_uses));
        }
        let claimed = claim
            .exec(&txn)
            .await
            .wrap_err("Failed to claim invite")?;
        if claimed.rows_affected == 0 {
            return Err(DomainError::conflict("this invite has been used up").into());
        }

        entities::community_member::ActiveModel {
            community_id: Set(invite.community_id),
            user_id: Set(user_id.to_string()),
            role: Set(MemberRole::Member),
            joined_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await
        .wrap_err("Failed to join community")?;

        txn.commit()
            .await
            .wrap_err("Failed to commit transaction")?;

        tracing::info!(community_id = invite.community_id, user_id, "Accepted invite");
        let community = self.find(invite.community_id).await?;
        Ok(CommunityView {
            community,
            role: MemberRole::Member,
        })
    }

    async fn find(&self, community_id: i64) -> Result<entities::community::Model> {
        entities::community::Entity::find_by_id(community_id)
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to fetch community")?
            .ok_or_eyre("Community disappeared while loading it")
    }
}
