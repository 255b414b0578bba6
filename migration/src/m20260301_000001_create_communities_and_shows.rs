use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Profiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Profiles::UserId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Profiles::Email).string())
                    .col(ColumnDef::new(Profiles::DisplayName).string().not_null())
                    .col(ColumnDef::new(Profiles::AvatarUrl).string())
                    .col(
                        ColumnDef::new(Profiles::CalendarToken)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Profiles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Profiles::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Communities::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Communities::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Communities::Name).string().not_null())
                    .col(ColumnDef::new(Communities::Description).text())
                    .col(ColumnDef::new(Communities::CreatedBy).string().not_null())
                    .col(
                        ColumnDef::new(Communities::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Communities::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CommunityMembers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CommunityMembers::CommunityId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CommunityMembers::UserId).string().not_null())
                    .col(ColumnDef::new(CommunityMembers::Role).string().not_null())
                    .col(
                        ColumnDef::new(CommunityMembers::JoinedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(CommunityMembers::CommunityId)
                            .col(CommunityMembers::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_community_members_community_id")
                            .from(CommunityMembers::Table, CommunityMembers::CommunityId)
                            .to(Communities::Table, Communities::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CommunityInvites::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CommunityInvites::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CommunityInvites::CommunityId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CommunityInvites::Token)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(CommunityInvites::CreatedBy)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CommunityInvites::ExpiresAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(CommunityInvites::MaxUses).integer())
                    .col(
                        ColumnDef::new(CommunityInvites::Uses)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CommunityInvites::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_community_invites_community_id")
                            .from(CommunityInvites::Table, CommunityInvites::CommunityId)
                            .to(Communities::Table, Communities::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Shows::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Shows::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Shows::CommunityId).big_integer().not_null())
                    .col(ColumnDef::new(Shows::Title).string().not_null())
                    .col(
                        ColumnDef::new(Shows::StartsAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Shows::Venue).string().not_null())
                    .col(ColumnDef::new(Shows::City).string().not_null())
                    .col(ColumnDef::new(Shows::TicketUrl).string())
                    .col(ColumnDef::new(Shows::PosterUrl).string())
                    .col(ColumnDef::new(Shows::Notes).text())
                    .col(
                        ColumnDef::new(Shows::ShareToken)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Shows::CreatedBy).string().not_null())
                    .col(
                        ColumnDef::new(Shows::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Shows::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_shows_community_id")
                            .from(Shows::Table, Shows::CommunityId)
                            .to(Communities::Table, Communities::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Rsvps::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Rsvps::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Rsvps::ShowId).big_integer().not_null())
                    .col(ColumnDef::new(Rsvps::UserId).string().not_null())
                    .col(ColumnDef::new(Rsvps::Status).string().not_null())
                    .col(
                        ColumnDef::new(Rsvps::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Rsvps::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_rsvps_show_id")
                            .from(Rsvps::Table, Rsvps::ShowId)
                            .to(Shows::Table, Shows::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One RSVP per show per user; the upsert relies on this index.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_rsvps_show_id_user_id")
                    .table(Rsvps::Table)
                    .col(Rsvps::ShowId)
                    .col(Rsvps::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_shows_community_id_starts_at")
                    .table(Shows::Table)
                    .col(Shows::CommunityId)
                    .col(Shows::StartsAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_community_members_user_id")
                    .table(CommunityMembers::Table)
                    .col(CommunityMembers::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Rsvps::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Shows::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CommunityInvites::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CommunityMembers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Communities::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Profiles::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Profiles {
    Table,
    UserId,
    Email,
    DisplayName,
    AvatarUrl,
    CalendarToken,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Communities {
    Table,
    Id,
    Name,
    Description,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CommunityMembers {
    Table,
    CommunityId,
    UserId,
    Role,
    JoinedAt,
}

#[derive(DeriveIden)]
enum CommunityInvites {
    Table,
    Id,
    CommunityId,
    Token,
    CreatedBy,
    ExpiresAt,
    MaxUses,
    Uses,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Shows {
    Table,
    Id,
    CommunityId,
    Title,
    StartsAt,
    Venue,
    City,
    TicketUrl,
    PosterUrl,
    Notes,
    ShareToken,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Rsvps {
    Table,
    Id,
    ShowId,
    UserId,
    Status,
    CreatedAt,
    UpdatedAt,
}
