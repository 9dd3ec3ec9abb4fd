use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A local account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: u64,
    pub login: String,
    pub email: String,
}

/// An authenticated session established for a [User].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub user: User,
}

/// Account and session management of the application users log in to.
#[async_trait]
pub trait IdentityProvider: Debug {
    /// Look up an account by its identity key.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Provision an account. `secret` is credential material the user never sees.
    async fn create_user(&self, login: &str, secret: &str, email: &str) -> Result<User>;

    /// Replace any current session with one for `user`.
    async fn establish_session(&self, user: &User) -> Result<Session>;
}

/// A local in-memory identity provider. Not for production use!
///
/// # Warning
/// Accounts and sessions live only as long as the process and are not shared between
/// instances.
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentityProvider {
    inner: Arc<Mutex<Accounts>>,
}

#[derive(Debug, Default)]
struct Accounts {
    users: BTreeMap<String, (User, String)>,
    sessions: BTreeMap<Uuid, Session>,
    next_id: u64,
}

impl MemoryIdentityProvider {
    pub async fn users(&self) -> Vec<User> {
        self.inner
            .lock()
            .await
            .users
            .values()
            .map(|(user, _)| user.clone())
            .collect()
    }

    pub async fn sessions(&self) -> Vec<Session> {
        self.inner.lock().await.sessions.values().cloned().collect()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .inner
            .lock()
            .await
            .users
            .get(email)
            .map(|(user, _)| user.clone()))
    }

    async fn create_user(&self, login: &str, secret: &str, email: &str) -> Result<User> {
        let mut accounts = self.inner.lock().await;
        if accounts.users.contains_key(email) {
            bail!("account {email} already exists")
        }
        if accounts.users.values().any(|(user, _)| user.login == login) {
            bail!("login {login} is taken")
        }

        accounts.next_id += 1;
        let user = User {
            id: accounts.next_id,
            login: login.to_owned(),
            email: email.to_owned(),
        };
        accounts
            .users
            .insert(email.to_owned(), (user.clone(), secret.to_owned()));
        Ok(user)
    }

    async fn establish_session(&self, user: &User) -> Result<Session> {
        let mut accounts = self.inner.lock().await;
        accounts.sessions.retain(|_, session| session.user.id != user.id);

        let session = Session {
            id: Uuid::new_v4(),
            user: user.clone(),
        };
        accounts.sessions.insert(session.id, session.clone());
        Ok(session)
    }
}
