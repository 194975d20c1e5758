// Identity collaborator: current user and sign-out, passed around as context

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// An external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The user of the persisted session, if any.
    async fn current_user(&self) -> Result<Option<User>>;

    async fn sign_out(&self) -> Result<()>;
}

/// Auth state changes pushed by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(User),
    SignedOut,
    TokenRefreshed(User),
}

/// Process-wide session state.
///
/// Created empty, filled by [`SessionContext::init`], updated through
/// [`SessionContext::apply`]. Consumers hold a [`watch::Receiver`] from
/// [`SessionContext::subscribe`]; dropping it unsubscribes.
#[derive(Clone)]
pub struct SessionContext {
    provider: Arc<dyn IdentityProvider>,
    tx: Arc<watch::Sender<Option<User>>>,
}

impl SessionContext {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (tx, _rx) = watch::channel(None);
        SessionContext {
            provider,
            tx: Arc::new(tx),
        }
    }

    /// Load the persisted session from the provider.
    pub async fn init(&self) -> Result<Option<User>> {
        let user = self.provider.current_user().await?;
        match &user {
            Some(u) => log::info!("Session restored for user {}", u.id),
            None => log::debug!("No persisted session"),
        }
        self.tx.send_replace(user.clone());
        Ok(user)
    }

    pub fn apply(&self, event: AuthEvent) {
        let user = match event {
            AuthEvent::SignedIn(user) | AuthEvent::TokenRefreshed(user) => Some(user),
            AuthEvent::SignedOut => None,
        };
        self.tx.send_replace(user);
    }

    pub fn current_user(&self) -> Option<User> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.tx.subscribe()
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.provider.sign_out().await?;
        self.apply(AuthEvent::SignedOut);
        Ok(())
    }
}

/// A provider with a fixed user, for the CLI and tests.
pub struct StaticIdentity {
    user: Option<User>,
}

impl StaticIdentity {
    pub fn new(user: Option<User>) -> Self {
        StaticIdentity { user }
    }

    pub fn user(id: &str) -> Self {
        Self::new(Some(User {
            id: id.to_string(),
            email: None,
        }))
    }

    pub fn anonymous() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self) -> Result<Option<User>> {
        Ok(self.user.clone())
    }

    async fn sign_out(&self) -> Result<()> {
        Ok(())
    }
}
