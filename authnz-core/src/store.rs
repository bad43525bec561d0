use crate::error::AuthnzResult;
use crate::state::{ExternalToken, LocalUser, UserId};
use async_trait::async_trait;
use uuid::Uuid;

/// Persistence capability for local users and external token records.
///
/// Writes are staged with [`add_user`](AuthnzStore::add_user),
/// [`add_token`](AuthnzStore::add_token) and
/// [`delete_token`](AuthnzStore::delete_token) and only become visible once
/// [`flush`](AuthnzStore::flush) succeeds. Nothing staged survives a failed
/// or skipped flush.
#[async_trait]
pub trait AuthnzStore: Send + Sync {
    /// Look up the record for an external identity.
    ///
    /// Returns an error if more than one record matches.
    async fn find_token(
        &self,
        external_user_id: &str,
        provider: &str,
    ) -> AuthnzResult<Option<ExternalToken>>;

    /// Load a user by id.
    async fn load_user(&self, id: UserId) -> AuthnzResult<Option<LocalUser>>;

    /// All external token records owned by a user.
    async fn user_tokens(&self, user_id: UserId) -> AuthnzResult<Vec<ExternalToken>>;

    /// Stage a new user.
    fn add_user(&mut self, user: LocalUser);

    /// Stage a token record. A record whose id already exists is updated in place.
    fn add_token(&mut self, token: ExternalToken);

    /// Stage the deletion of a token record.
    fn delete_token(&mut self, token: &ExternalToken);

    /// Commit every staged change atomically.
    async fn flush(&mut self) -> AuthnzResult<()>;
}

/// A single staged change, in the order it was staged.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A new user.
    AddUser(LocalUser),
    /// A new or updated token record.
    PutToken(ExternalToken),
    /// Removal of the token record with this id.
    DeleteToken(Uuid),
}

/// Unit-of-work buffer shared by store implementations.
#[derive(Debug, Clone, Default)]
pub struct PendingChanges {
    changes: Vec<Change>,
}

impl PendingChanges {
    /// Stage a change.
    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    /// Whether anything is staged.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// The staged changes, oldest first.
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Take every staged change, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.changes)
    }
}
