use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{RequestHandler, Service, ServiceError};
use crate::models::users::{Credentials, NewUser, Session, SignUp, User};
use crate::repositories::{identity::IdentityProvider, referrals::ReferralRepository};

pub enum UserRequest {
    SignUp {
        new_user: NewUser,
        response: oneshot::Sender<Result<SignUp, ServiceError>>,
    },
    SignIn {
        credentials: Credentials,
        response: oneshot::Sender<Result<Session, ServiceError>>,
    },
    SignOut {
        response: oneshot::Sender<Result<(), ServiceError>>,
    },
    GetUser {
        id: String,
        response: oneshot::Sender<Result<Option<User>, ServiceError>>,
    },
}

#[derive(Clone)]
pub struct UserRequestHandler {
    identity: Arc<dyn IdentityProvider>,
    repository: ReferralRepository,
}

impl UserRequestHandler {
    pub fn new(identity: Arc<dyn IdentityProvider>, repository: ReferralRepository) -> Self {
        UserRequestHandler {
            identity,
            repository,
        }
    }

    /// Validate, resolve the sponsor, and only then create the account, so that a bad referral
    /// code never leaves an account behind.
    pub async fn sign_up(&self, new_user: NewUser) -> Result<SignUp, ServiceError> {
        if let Some(field) = new_user.missing_field() {
            return Err(ServiceError::InvalidInput(format!("{field} is required")));
        }

        let sponsor = match new_user.sponsor_code() {
            Some(code) => Some(self.repository.resolve_sponsor(code).await?),
            None => None,
        };

        let user_id = self
            .identity
            .create_account(&new_user.profile.email, &new_user.password)
            .await?;

        let user = self
            .repository
            .attach(&user_id, &new_user.profile, sponsor.as_deref())
            .await?;

        log::info!(
            "Signed up {} with referral code {} (sponsor: {:?}).",
            user.id,
            user.referral_code,
            sponsor
        );

        Ok(SignUp {
            user_id: user.id,
            referral_code: user.referral_code,
        })
    }

    pub async fn sign_in(&self, credentials: Credentials) -> Result<Session, ServiceError> {
        if credentials.email.trim().is_empty() || credentials.password.is_empty() {
            return Err(ServiceError::InvalidInput(
                "email and password are required".to_string(),
            ));
        }

        let user_id = self
            .identity
            .sign_in(&credentials.email, &credentials.password)
            .await?;

        Ok(Session { user_id })
    }

    pub async fn sign_out(&self) -> Result<(), ServiceError> {
        self.identity.sign_out().await?;
        Ok(())
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>, ServiceError> {
        self.repository
            .get_user(id)
            .await
            .map_err(|e| ServiceError::store("Users", e))
    }
}

#[async_trait]
impl RequestHandler<UserRequest> for UserRequestHandler {
    async fn handle_request(&self, request: UserRequest) {
        match request {
            UserRequest::SignUp { new_user, response } => {
                let result = self.sign_up(new_user).await;
                let _ = response.send(result);
            }
            UserRequest::SignIn {
                credentials,
                response,
            } => {
                let session = self.sign_in(credentials).await;
                let _ = response.send(session);
            }
            UserRequest::SignOut { response } => {
                let result = self.sign_out().await;
                let _ = response.send(result);
            }
            UserRequest::GetUser { id, response } => {
                let user = self.get_user(&id).await;
                let _ = response.send(user);
            }
        }
    }
}

pub struct UserService;

impl UserService {
    pub fn new() -> Self {
        UserService {}
    }
}

impl Default for UserService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Service<UserRequest, UserRequestHandler> for UserService {}
