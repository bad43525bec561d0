use async_trait::async_trait;
use authnz_core::{
    AuthnzError, AuthnzResult, AuthnzStore, Change, ExternalToken, LocalUser, PendingChanges,
    UserId,
};
use chrono::{DateTime, Utc};
use sqlx::Database;
use uuid::Uuid;

type UserRow = (String, String, String, String);

type TokenRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
);

const TOKEN_COLUMNS: &str = "id, user_id, external_user_id, provider, access_token, id_token, \
     refresh_token, raw_token, expiration_time, refresh_expiration_time";

fn parse_uuid(value: &str) -> AuthnzResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| AuthnzError::Store(format!("Invalid id '{value}': {e}")))
}

fn user_from_row((id, email, username, password): UserRow) -> AuthnzResult<LocalUser> {
    Ok(LocalUser {
        id: UserId(parse_uuid(&id)?),
        email,
        username,
        password,
    })
}

fn token_from_row(row: TokenRow) -> AuthnzResult<ExternalToken> {
    let (
        id,
        user_id,
        external_user_id,
        provider,
        access_token,
        id_token,
        refresh_token,
        raw_token,
        expiration_time,
        refresh_expiration_time,
    ) = row;
    let raw_token = serde_json::from_str(&raw_token)
        .map_err(|e| AuthnzError::Store(format!("Raw token deserialization error: {e}")))?;

    Ok(ExternalToken {
        id: parse_uuid(&id)?,
        user_id: UserId(parse_uuid(&user_id)?),
        external_user_id,
        provider,
        access_token,
        id_token,
        refresh_token,
        raw_token,
        expiration_time,
        refresh_expiration_time,
    })
}

/// A store backed by a SQL database through `sqlx`.
///
/// Staged changes are written in a single transaction on flush.
#[derive(Debug)]
pub struct SqlStore<DB: Database> {
    pool: sqlx::Pool<DB>,
    users_table: String,
    tokens_table: String,
    pending: PendingChanges,
}

impl<DB: Database> Clone for SqlStore<DB> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            users_table: self.users_table.clone(),
            tokens_table: self.tokens_table.clone(),
            pending: PendingChanges::default(),
        }
    }
}

impl<DB: Database> SqlStore<DB> {
    /// Use the default `authnz_users` and `authnz_tokens` tables.
    pub fn new(pool: sqlx::Pool<DB>) -> Self {
        Self::with_table_names(pool, "authnz_users", "authnz_tokens")
    }

    /// Use custom table names.
    pub fn with_table_names(
        pool: sqlx::Pool<DB>,
        users_table: impl Into<String>,
        tokens_table: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            users_table: users_table.into(),
            tokens_table: tokens_table.into(),
            pending: PendingChanges::default(),
        }
    }
}

// Backends differ only in bind placeholder syntax and timestamp column type.
macro_rules! impl_sql_store {
    ($db:ty, $label:literal, $p:literal, $timestamp:literal) => {
        impl SqlStore<$db> {
            /// Create the users and tokens tables if they do not exist yet.
            pub async fn create_tables(&self) -> AuthnzResult<()> {
                let users = format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                     id TEXT PRIMARY KEY,
                     email TEXT NOT NULL,
                     username TEXT NOT NULL,
                     password TEXT NOT NULL)",
                    self.users_table
                );
                let tokens = format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                     id TEXT PRIMARY KEY,
                     user_id TEXT NOT NULL REFERENCES {}(id),
                     external_user_id TEXT NOT NULL,
                     provider TEXT NOT NULL,
                     access_token TEXT NOT NULL,
                     id_token TEXT NOT NULL,
                     refresh_token TEXT,
                     raw_token TEXT NOT NULL,
                     expiration_time {ts},
                     refresh_expiration_time {ts})",
                    self.tokens_table,
                    self.users_table,
                    ts = $timestamp
                );

                for statement in [users, tokens] {
                    sqlx::query(&statement)
                        .execute(&self.pool)
                        .await
                        .map_err(|e| {
                            AuthnzError::Store(format!(concat!($label, " create_tables error: {}"), e))
                        })?;
                }
                Ok(())
            }
        }

        #[async_trait]
        impl AuthnzStore for SqlStore<$db> {
            async fn find_token(
                &self,
                external_user_id: &str,
                provider: &str,
            ) -> AuthnzResult<Option<ExternalToken>> {
                let query = format!(
                    "SELECT {} FROM {} WHERE external_user_id = {p}1 AND provider = {p}2",
                    TOKEN_COLUMNS,
                    self.tokens_table,
                    p = $p
                );
                let rows: Vec<TokenRow> = sqlx::query_as(&query)
                    .bind(external_user_id)
                    .bind(provider)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| {
                        AuthnzError::Store(format!(concat!($label, " find_token error: {}"), e))
                    })?;

                if rows.len() > 1 {
                    return Err(AuthnzError::Store(format!(
                        "More than one token record for '{external_user_id}' with provider '{provider}'"
                    )));
                }
                rows.into_iter().next().map(token_from_row).transpose()
            }

            async fn load_user(&self, id: UserId) -> AuthnzResult<Option<LocalUser>> {
                let query = format!(
                    "SELECT id, email, username, password FROM {} WHERE id = {p}1",
                    self.users_table,
                    p = $p
                );
                let row: Option<UserRow> = sqlx::query_as(&query)
                    .bind(id.to_string())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| {
                        AuthnzError::Store(format!(concat!($label, " load_user error: {}"), e))
                    })?;
                row.map(user_from_row).transpose()
            }

            async fn user_tokens(&self, user_id: UserId) -> AuthnzResult<Vec<ExternalToken>> {
                let query = format!(
                    "SELECT {} FROM {} WHERE user_id = {p}1",
                    TOKEN_COLUMNS,
                    self.tokens_table,
                    p = $p
                );
                let rows: Vec<TokenRow> = sqlx::query_as(&query)
                    .bind(user_id.to_string())
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| {
                        AuthnzError::Store(format!(concat!($label, " user_tokens error: {}"), e))
                    })?;
                rows.into_iter().map(token_from_row).collect()
            }

            fn add_user(&mut self, user: LocalUser) {
                self.pending.push(Change::AddUser(user));
            }

            fn add_token(&mut self, token: ExternalToken) {
                self.pending.push(Change::PutToken(token));
            }

            fn delete_token(&mut self, token: &ExternalToken) {
                self.pending.push(Change::DeleteToken(token.id));
            }

            async fn flush(&mut self) -> AuthnzResult<()> {
                let changes = self.pending.drain();
                if changes.is_empty() {
                    return Ok(());
                }
                let store_err =
                    |e: sqlx::Error| AuthnzError::Store(format!(concat!($label, " flush error: {}"), e));

                let insert_user = format!(
                    "INSERT INTO {} (id, email, username, password) VALUES ({p}1, {p}2, {p}3, {p}4)",
                    self.users_table,
                    p = $p
                );
                let upsert_token = format!(
                    "INSERT INTO {} ({})
                     VALUES ({p}1, {p}2, {p}3, {p}4, {p}5, {p}6, {p}7, {p}8, {p}9, {p}10)
                     ON CONFLICT(id) DO UPDATE SET
                     user_id = {p}2, external_user_id = {p}3, provider = {p}4,
                     access_token = {p}5, id_token = {p}6, refresh_token = {p}7,
                     raw_token = {p}8, expiration_time = {p}9, refresh_expiration_time = {p}10",
                    self.tokens_table,
                    TOKEN_COLUMNS,
                    p = $p
                );
                let delete_token = format!(
                    "DELETE FROM {} WHERE id = {p}1",
                    self.tokens_table,
                    p = $p
                );

                let mut tx = self.pool.begin().await.map_err(store_err)?;
                for change in changes {
                    match change {
                        Change::AddUser(user) => {
                            sqlx::query(&insert_user)
                                .bind(user.id.to_string())
                                .bind(user.email)
                                .bind(user.username)
                                .bind(user.password)
                                .execute(&mut *tx)
                                .await
                                .map_err(store_err)?;
                        }
                        Change::PutToken(token) => {
                            let raw_token = serde_json::to_string(&token.raw_token).map_err(|e| {
                                AuthnzError::Store(format!("Raw token serialization error: {e}"))
                            })?;
                            sqlx::query(&upsert_token)
                                .bind(token.id.to_string())
                                .bind(token.user_id.to_string())
                                .bind(token.external_user_id)
                                .bind(token.provider)
                                .bind(token.access_token)
                                .bind(token.id_token)
                                .bind(token.refresh_token)
                                .bind(raw_token)
                                .bind(token.expiration_time)
                                .bind(token.refresh_expiration_time)
                                .execute(&mut *tx)
                                .await
                                .map_err(store_err)?;
                        }
                        Change::DeleteToken(id) => {
                            sqlx::query(&delete_token)
                                .bind(id.to_string())
                                .execute(&mut *tx)
                                .await
                                .map_err(store_err)?;
                        }
                    }
                }
                tx.commit().await.map_err(store_err)?;
                log::debug!(concat!("Committed ", $label, " unit of work"));
                Ok(())
            }
        }
    };
}

#[cfg(feature = "postgres")]
impl_sql_store!(sqlx::Postgres, "Postgres", "$", "TIMESTAMPTZ");

#[cfg(feature = "sqlite")]
impl_sql_store!(sqlx::Sqlite, "Sqlite", "?", "TIMESTAMP");

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqlStore<sqlx::Sqlite> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqlStore::new(pool);
        store.create_tables().await.unwrap();
        store
    }

    fn token_for(user: &LocalUser) -> ExternalToken {
        ExternalToken {
            id: Uuid::new_v4(),
            user_id: user.id,
            external_user_id: "sub-1".to_string(),
            provider: "google".to_string(),
            access_token: "at".to_string(),
            id_token: "it".to_string(),
            refresh_token: Some("rt".to_string()),
            raw_token: json!({ "access_token": "at", "expires_in": 30 }),
            expiration_time: Some(Utc::now() + Duration::seconds(30)),
            refresh_expiration_time: None,
        }
    }

    #[tokio::test]
    async fn test_sqlite_roundtrip_and_upsert() {
        let mut store = store().await;
        let user = LocalUser::new("alice@example.com", "alice");
        let mut token = token_for(&user);

        store.add_user(user.clone());
        store.add_token(token.clone());
        store.flush().await.unwrap();

        assert_eq!(store.load_user(user.id).await.unwrap(), Some(user.clone()));
        let found = store.find_token("sub-1", "google").await.unwrap().unwrap();
        assert_eq!(found.id, token.id);
        assert_eq!(found.raw_token, token.raw_token);

        token.access_token = "fresh".to_string();
        store.add_token(token.clone());
        store.flush().await.unwrap();

        let tokens = store.user_tokens(user.id).await.unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].access_token, "fresh");

        store.delete_token(&token);
        store.flush().await.unwrap();
        assert!(store.user_tokens(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unflushed_changes_are_not_written() {
        let store = store().await;
        let user = LocalUser::new("bob@example.com", "bob");
        {
            let mut unit = store.clone();
            unit.add_user(user.clone());
        }
        assert!(store.load_user(user.id).await.unwrap().is_none());
    }
}
