use std::sync::Arc;

use sea_orm::{ActiveModelBehavior, ActiveModelTrait, Set};

use crate::database::Database;
use crate::entities;
use crate::entities::community_member::MemberRole;

pub async fn test_db() -> Arc<Database> {
    // One connection: every new in-memory SQLite connection is a fresh database.
    let db = Database::connect("sqlite::memory:", 1).await.unwrap();
    Arc::new(db)
}

pub async fn insert_profile(db: &Database, user_id: &str, name: &str) -> entities::profile::Model {
    let profile = entities::profile::ActiveModel {
        user_id: Set(user_id.into()),
        email: Set(Some(format!("{user_id}@example.com"))),
        display_name: Set(name.into()),
        ..entities::profile::ActiveModel::new()
    };
    profile.insert(&db.conn).await.unwrap()
}

pub async fn insert_community(db: &Database, owner: &str, name: &str) -> entities::community::Model {
    let community = entities::community::ActiveModel {
        name: Set(name.into()),
        created_by: Set(owner.into()),
        ..entities::community::ActiveModel::new()
    };
    let community = community.insert(&db.conn).await.unwrap();
    add_member(db, community.id, owner, MemberRole::Owner).await;
    community
}

pub async fn add_member(db: &Database, community_id: i64, user_id: &str, role: MemberRole) {
    entities::community_member::ActiveModel {
        community_id: Set(community_id),
        user_id: Set(user_id.into()),
        role: Set(role),
        joined_at: Set(chrono::Utc::now()),
    }
    .insert(&db.conn)
    .await
    .unwrap();
}

pub async fn insert_show(
    db: &Database,
    community_id: i64,
    created_by: &str,
    title: &str,
    starts_at: chrono::DateTime<chrono::Utc>,
) -> entities::show::Model {
    let show = entities::show::ActiveModel {
        community_id: Set(community_id),
        title: Set(title.into()),
        starts_at: Set(starts_at),
        venue: Set("Paradise Rock Club".into()),
        city: Set("Boston".into()),
        created_by: Set(created_by.into()),
        ..entities::show::ActiveModel::new()
    };
    show.insert(&db.conn).await.unwrap()
}
