use sea_orm_migration::{prelude::*, sea_orm::DatabaseBackend};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// The caller is identified by the transaction-local `app.current_user_id`
/// setting, never by the row itself.
const UP_STATEMENTS: &[&str] = &[
    "CREATE OR REPLACE FUNCTION app_current_user_id() RETURNS uuid \
     LANGUAGE sql STABLE AS \
     $$ SELECT NULLIF(current_setting('app.current_user_id', true), '')::uuid $$",
    "CREATE OR REPLACE FUNCTION set_chat_sessions_updated_at() RETURNS trigger \
     LANGUAGE plpgsql AS \
     $$ BEGIN NEW.updated_at = now(); RETURN NEW; END; $$",
    "DROP TRIGGER IF EXISTS trg_chat_sessions_updated_at ON chat_sessions",
    "CREATE TRIGGER trg_chat_sessions_updated_at BEFORE UPDATE ON chat_sessions \
     FOR EACH ROW EXECUTE FUNCTION set_chat_sessions_updated_at()",
    "ALTER TABLE chat_sessions ENABLE ROW LEVEL SECURITY",
    "ALTER TABLE chat_sessions FORCE ROW LEVEL SECURITY",
    "CREATE POLICY chat_sessions_select ON chat_sessions FOR SELECT \
     USING (user_id = app_current_user_id())",
    "CREATE POLICY chat_sessions_insert ON chat_sessions FOR INSERT \
     WITH CHECK (user_id = app_current_user_id())",
    "CREATE POLICY chat_sessions_update ON chat_sessions FOR UPDATE \
     USING (user_id = app_current_user_id()) \
     WITH CHECK (user_id = app_current_user_id())",
    "CREATE POLICY chat_sessions_delete ON chat_sessions FOR DELETE \
     USING (user_id = app_current_user_id())",
    "ALTER TABLE chat_messages ENABLE ROW LEVEL SECURITY",
    "ALTER TABLE chat_messages FORCE ROW LEVEL SECURITY",
    "CREATE POLICY chat_messages_select ON chat_messages FOR SELECT \
     USING (EXISTS (SELECT 1 FROM chat_sessions s \
     WHERE s.id = chat_messages.session_id AND s.user_id = app_current_user_id()))",
    "CREATE POLICY chat_messages_insert ON chat_messages FOR INSERT \
     WITH CHECK (EXISTS (SELECT 1 FROM chat_sessions s \
     WHERE s.id = chat_messages.session_id AND s.user_id = app_current_user_id()))",
    "CREATE POLICY chat_messages_update ON chat_messages FOR UPDATE \
     USING (EXISTS (SELECT 1 FROM chat_sessions s \
     WHERE s.id = chat_messages.session_id AND s.user_id = app_current_user_id())) \
     WITH CHECK (EXISTS (SELECT 1 FROM chat_sessions s \
     WHERE s.id = chat_messages.session_id AND s.user_id = app_current_user_id()))",
    "CREATE POLICY chat_messages_delete ON chat_messages FOR DELETE \
     USING (EXISTS (SELECT 1 FROM chat_sessions s \
     WHERE s.id = chat_messages.session_id AND s.user_id = app_current_user_id()))",
];

const DOWN_STATEMENTS: &[&str] = &[
    "DROP POLICY IF EXISTS chat_messages_delete ON chat_messages",
    "DROP POLICY IF EXISTS chat_messages_update ON chat_messages",
    "DROP POLICY IF EXISTS chat_messages_insert ON chat_messages",
    "DROP POLICY IF EXISTS chat_messages_select ON chat_messages",
    "ALTER TABLE chat_messages NO FORCE ROW LEVEL SECURITY",
    "ALTER TABLE chat_messages DISABLE ROW LEVEL SECURITY",
    "DROP POLICY IF EXISTS chat_sessions_delete ON chat_sessions",
    "DROP POLICY IF EXISTS chat_sessions_update ON chat_sessions",
    "DROP POLICY IF EXISTS chat_sessions_insert ON chat_sessions",
    "DROP POLICY IF EXISTS chat_sessions_select ON chat_sessions",
    "ALTER TABLE chat_sessions NO FORCE ROW LEVEL SECURITY",
    "ALTER TABLE chat_sessions DISABLE ROW LEVEL SECURITY",
    "DROP TRIGGER IF EXISTS trg_chat_sessions_updated_at ON chat_sessions",
    "DROP FUNCTION IF EXISTS set_chat_sessions_updated_at()",
    "DROP FUNCTION IF EXISTS app_current_user_id()",
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // SQLite has neither policies nor plpgsql; the application-level
        // owner filters are the only guard there.
        if manager.get_database_backend() != DatabaseBackend::Postgres {
            return Ok(());
        }

        let conn = manager.get_connection();
        for statement in UP_STATEMENTS {
            conn.execute_unprepared(statement).await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        if manager.get_database_backend() != DatabaseBackend::Postgres {
            return Ok(());
        }

        let conn = manager.get_connection();
        for statement in DOWN_STATEMENTS {
            conn.execute_unprepared(statement).await?;
        }
        Ok(())
    }
}
