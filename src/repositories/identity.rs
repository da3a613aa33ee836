use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use uuid::Uuid;

const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Account is disabled")]
    UserDisabled,
    #[error("No account for this email address")]
    UserNotFound,
    #[error("Wrong password")]
    WrongPassword,
    #[error("Email address already in use")]
    EmailInUse,
    #[error("Password must be at least 6 characters")]
    WeakPassword,
    #[error("Identity provider error: {0}")]
    Unknown(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account and sign it in; returns the new user id.
    async fn create_account(&self, email: &str, password: &str) -> Result<String, AuthError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<String, AuthError>;
    async fn sign_out(&self) -> Result<(), AuthError>;
    /// Watch the signed-in user id.
    fn current_user(&self) -> watch::Receiver<Option<String>>;
}

struct Account {
    user_id: String,
    salt: String,
    password_hash: String,
    disabled: bool,
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

/// Accounts keyed by lower-cased email, held in process memory.
pub struct MemoryIdentity {
    accounts: DashMap<String, Account>,
    current: watch::Sender<Option<String>>,
}

impl MemoryIdentity {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);

        Self {
            accounts: DashMap::new(),
            current,
        }
    }

    pub fn disable_account(&self, email: &str) -> Result<(), AuthError> {
        let mut account = self
            .accounts
            .get_mut(&email.trim().to_lowercase())
            .ok_or(AuthError::UserNotFound)?;
        account.disabled = true;

        Ok(())
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

impl Default for MemoryIdentity {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn create_account(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let email = email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::WeakPassword);
        }

        let user_id = match self.accounts.entry(email) {
            Entry::Occupied(_) => return Err(AuthError::EmailInUse),
            Entry::Vacant(entry) => {
                let salt = Uuid::new_v4().simple().to_string();
                let account = Account {
                    user_id: Uuid::new_v4().simple().to_string(),
                    password_hash: hash_password(&salt, password),
                    salt,
                    disabled: false,
                };
                let user_id = account.user_id.clone();
                entry.insert(account);
                user_id
            }
        };

        self.current.send_replace(Some(user_id.clone()));
        log::debug!("Created account {}.", user_id);

        Ok(user_id)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let email = email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(AuthError::InvalidEmail);
        }

        let user_id = {
            let account = self.accounts.get(&email).ok_or(AuthError::UserNotFound)?;
            if account.disabled {
                return Err(AuthError::UserDisabled);
            }
            if hash_password(&account.salt, password) != account.password_hash {
                return Err(AuthError::WrongPassword);
            }
            account.user_id.clone()
        };

        self.current.send_replace(Some(user_id.clone()));

        Ok(user_id)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.current.send_replace(None);
        Ok(())
    }

    fn current_user(&self) -> watch::Receiver<Option<String>> {
        self.current.subscribe()
    }
}
