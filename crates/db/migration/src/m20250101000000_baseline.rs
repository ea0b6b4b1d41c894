use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(Users::Table)
                    .col(uuid_pk_col(Users::Id))
                    .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                    .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                    .col(ColumnDef::new(Users::FirstName).string())
                    .col(ColumnDef::new(Users::LastName).string())
                    .col(timestamp_col(Users::CreatedAt))
                    .col(timestamp_col(Users::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(ChatSessions::Table)
                    .col(uuid_pk_col(ChatSessions::Id))
                    .col(ColumnDef::new(ChatSessions::UserId).uuid().not_null())
                    .col(ColumnDef::new(ChatSessions::Title).text())
                    .col(timestamp_col(ChatSessions::CreatedAt))
                    .col(timestamp_col(ChatSessions::UpdatedAt))
                    .col(
                        ColumnDef::new(ChatSessions::IsActive)
                            .boolean()
                            .not_null()
                            .default(Expr::val(true)),
                    )
                    .col(metadata_col(ChatSessions::Metadata))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_chat_sessions_user_id")
                            .from(ChatSessions::Table, ChatSessions::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_chat_sessions_user_id_updated_at")
                    .table(ChatSessions::Table)
                    .col(ChatSessions::UserId)
                    .col(ChatSessions::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(ChatMessages::Table)
                    .col(uuid_pk_col(ChatMessages::Id))
                    .col(ColumnDef::new(ChatMessages::SessionId).uuid().not_null())
                    .col(
                        ColumnDef::new(ChatMessages::Role)
                            .string_len(16)
                            .not_null()
                            .check(Expr::col(ChatMessages::Role).is_in([
                                "user",
                                "assistant",
                                "system",
                            ])),
                    )
                    .col(ColumnDef::new(ChatMessages::Content).text().not_null())
                    .col(timestamp_col(ChatMessages::Timestamp))
                    .col(metadata_col(ChatMessages::Metadata))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_chat_messages_session_id")
                            .from(ChatMessages::Table, ChatMessages::SessionId)
                            .to(ChatSessions::Table, ChatSessions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_chat_messages_session_id_timestamp")
                    .table(ChatMessages::Table)
                    .col(ChatMessages::SessionId)
                    .col(ChatMessages::Timestamp)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChatMessages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ChatSessions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}

fn uuid_pk_col<T: Iden>(col: T) -> ColumnDef {
    ColumnDef::new(col).uuid().not_null().primary_key().to_owned()
}

fn timestamp_col<T: Iden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .timestamp_with_time_zone()
        .not_null()
        .default(Expr::current_timestamp())
        .to_owned()
}

fn metadata_col<T: Iden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .json_binary()
        .not_null()
        .default(Expr::val("{}"))
        .to_owned()
}

#[derive(Iden)]
enum Users {
    Table,
    Id,
    Email,
    PasswordHash,
    FirstName,
    LastName,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum ChatSessions {
    Table,
    Id,
    UserId,
    Title,
    CreatedAt,
    UpdatedAt,
    IsActive,
    Metadata,
}

#[derive(Iden)]
enum ChatMessages {
    Table,
    Id,
    SessionId,
    Role,
    Content,
    Timestamp,
    Metadata,
}
