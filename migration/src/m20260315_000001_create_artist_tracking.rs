use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Artists::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Artists::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Artists::UserId).string().not_null())
                    .col(ColumnDef::new(Artists::SpotifyId).string().not_null())
                    .col(ColumnDef::new(Artists::Name).string().not_null())
                    .col(ColumnDef::new(Artists::ImageUrl).string())
                    .col(ColumnDef::new(Artists::Genres).text().not_null())
                    .col(ColumnDef::new(Artists::SpotifyUrl).string())
                    .col(ColumnDef::new(Artists::LastCheckedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Artists::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Artists::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_artists_user_id_spotify_id")
                    .table(Artists::Table)
                    .col(Artists::UserId)
                    .col(Artists::SpotifyId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Releases::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Releases::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Releases::ArtistId).big_integer().not_null())
                    .col(ColumnDef::new(Releases::SpotifyId).string().not_null())
                    .col(ColumnDef::new(Releases::Name).string().not_null())
                    .col(ColumnDef::new(Releases::ReleaseType).string().not_null())
                    .col(ColumnDef::new(Releases::ReleaseDate).date().not_null())
                    .col(
                        ColumnDef::new(Releases::ReleaseDatePrecision)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Releases::TotalTracks).integer().not_null())
                    .col(ColumnDef::new(Releases::ImageUrl).string())
                    .col(ColumnDef::new(Releases::SpotifyUrl).string())
                    .col(
                        ColumnDef::new(Releases::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_releases_artist_id")
                            .from(Releases::Table, Releases::ArtistId)
                            .to(Artists::Table, Artists::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_releases_artist_id_spotify_id")
                    .table(Releases::Table)
                    .col(Releases::ArtistId)
                    .col(Releases::SpotifyId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_releases_release_date")
                    .table(Releases::Table)
                    .col(Releases::ReleaseDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Releases::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Artists::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Artists {
    Table,
    Id,
    UserId,
    SpotifyId,
    Name,
    ImageUrl,
    Genres,
    SpotifyUrl,
    LastCheckedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Releases {
    Table,
    Id,
    ArtistId,
    SpotifyId,
    Name,
    ReleaseType,
    ReleaseDate,
    ReleaseDatePrecision,
    TotalTracks,
    ImageUrl,
    SpotifyUrl,
    CreatedAt,
}
