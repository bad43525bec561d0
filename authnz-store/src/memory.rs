use async_trait::async_trait;
use authnz_core::{
    AuthnzError, AuthnzResult, AuthnzStore, Change, ExternalToken, LocalUser, PendingChanges,
    UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, LocalUser>,
    tokens: Vec<ExternalToken>,
    journal: Vec<Change>,
    flushes: usize,
}

impl Tables {
    fn apply(&mut self, change: Change) {
        match &change {
            Change::AddUser(user) => {
                self.users.insert(user.id, user.clone());
            }
            Change::PutToken(token) => {
                match self.tokens.iter_mut().find(|t| t.id == token.id) {
                    Some(existing) => *existing = token.clone(),
                    None => self.tokens.push(token.clone()),
                }
            }
            Change::DeleteToken(id) => self.tokens.retain(|t| t.id != *id),
        }
        self.journal.push(change);
    }
}

/// An in-memory store.
///
/// Clones share the committed tables but each clone stages its own changes,
/// so a clone behaves like a separate unit of work on the same database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: Arc<RwLock<Tables>>,
    pending: PendingChanges,
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            committed: self.committed.clone(),
            pending: PendingChanges::default(),
        }
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user directly into the committed tables.
    pub async fn seed_user(&self, user: LocalUser) {
        self.committed.write().await.users.insert(user.id, user);
    }

    /// Insert a token record directly into the committed tables.
    pub async fn seed_token(&self, token: ExternalToken) {
        self.committed.write().await.tokens.push(token);
    }

    /// Every committed user.
    pub async fn users(&self) -> Vec<LocalUser> {
        self.committed.read().await.users.values().cloned().collect()
    }

    /// Every committed token record.
    pub async fn tokens(&self) -> Vec<ExternalToken> {
        self.committed.read().await.tokens.clone()
    }

    /// Every change committed through [`flush`](AuthnzStore::flush), in commit order.
    pub async fn journal(&self) -> Vec<Change> {
        self.committed.read().await.journal.clone()
    }

    /// Number of successful flushes that committed at least one change.
    pub async fn flush_count(&self) -> usize {
        self.committed.read().await.flushes
    }

    /// Changes staged on this handle and not yet flushed.
    pub fn pending(&self) -> &[Change] {
        self.pending.changes()
    }
}

#[async_trait]
impl AuthnzStore for MemoryStore {
    async fn find_token(
        &self,
        external_user_id: &str,
        provider: &str,
    ) -> AuthnzResult<Option<ExternalToken>> {
        let tables = self.committed.read().await;
        let mut matches = tables
            .tokens
            .iter()
            .filter(|t| t.external_user_id == external_user_id && t.provider == provider);

        let first = matches.next().cloned();
        if matches.next().is_some() {
            return Err(AuthnzError::Store(format!(
                "More than one token record for '{external_user_id}' with provider '{provider}'"
            )));
        }
        Ok(first)
    }

    async fn load_user(&self, id: UserId) -> AuthnzResult<Option<LocalUser>> {
        Ok(self.committed.read().await.users.get(&id).cloned())
    }

    async fn user_tokens(&self, user_id: UserId) -> AuthnzResult<Vec<ExternalToken>> {
        Ok(self
            .committed
            .read()
            .await
            .tokens
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
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
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut tables = self.committed.write().await;
        for change in self.pending.drain() {
            tables.apply(change);
        }
        tables.flushes += 1;
        log::debug!("Committed in-memory unit of work #{}", tables.flushes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn token_for(user: &LocalUser, sub: &str, provider: &str) -> ExternalToken {
        ExternalToken {
            id: Uuid::new_v4(),
            user_id: user.id,
            external_user_id: sub.to_string(),
            provider: provider.to_string(),
            access_token: "at".to_string(),
            id_token: "it".to_string(),
            refresh_token: None,
            raw_token: json!({ "access_token": "at" }),
            expiration_time: Some(Utc::now()),
            refresh_expiration_time: None,
        }
    }

    #[tokio::test]
    async fn test_staged_changes_are_invisible_until_flush() {
        let mut store = MemoryStore::new();
        let user = LocalUser::new("alice@example.com", "alice");
        let token = token_for(&user, "sub-1", "google");

        store.add_user(user.clone());
        store.add_token(token.clone());
        assert_eq!(store.pending().len(), 2);
        assert!(store.find_token("sub-1", "google").await.unwrap().is_none());
        assert!(store.load_user(user.id).await.unwrap().is_none());

        store.flush().await.unwrap();
        assert!(store.pending().is_empty());
        assert_eq!(store.find_token("sub-1", "google").await.unwrap(), Some(token));
        assert_eq!(store.load_user(user.id).await.unwrap(), Some(user));
        assert_eq!(store.flush_count().await, 1);
    }

    #[tokio::test]
    async fn test_dropped_handle_discards_staged_changes() {
        let store = MemoryStore::new();
        {
            let mut unit = store.clone();
            unit.add_user(LocalUser::new("bob@example.com", "bob"));
        }
        assert!(store.users().await.is_empty());
        assert_eq!(store.flush_count().await, 0);
    }

    #[tokio::test]
    async fn test_put_token_updates_in_place() {
        let mut store = MemoryStore::new();
        let user = LocalUser::new("alice@example.com", "alice");
        let mut token = token_for(&user, "sub-1", "google");
        store.seed_token(token.clone()).await;

        token.access_token = "fresh".to_string();
        store.add_token(token.clone());
        store.flush().await.unwrap();

        let tokens = store.tokens().await;
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].id, token.id);
        assert_eq!(tokens[0].access_token, "fresh");
    }

    #[tokio::test]
    async fn test_delete_and_user_tokens() {
        let mut store = MemoryStore::new();
        let user = LocalUser::new("alice@example.com", "alice");
        let google = token_for(&user, "sub-1", "google");
        let okta = token_for(&user, "sub-2", "okta");
        store.seed_user(user.clone()).await;
        store.seed_token(google.clone()).await;
        store.seed_token(okta.clone()).await;

        assert_eq!(store.user_tokens(user.id).await.unwrap().len(), 2);

        store.delete_token(&google);
        store.flush().await.unwrap();
        assert_eq!(store.user_tokens(user.id).await.unwrap(), vec![okta]);
        assert_eq!(store.journal().await, vec![Change::DeleteToken(google.id)]);
    }

    #[tokio::test]
    async fn test_find_token_rejects_duplicates() {
        let store = MemoryStore::new();
        let user = LocalUser::new("alice@example.com", "alice");
        store.seed_token(token_for(&user, "sub-1", "google")).await;
        store.seed_token(token_for(&user, "sub-1", "google")).await;

        assert!(matches!(
            store.find_token("sub-1", "google").await,
            Err(AuthnzError::Store(_))
        ));
    }
}
