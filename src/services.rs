use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::repositories::{
    identity::{AuthError, IdentityProvider},
    referrals::{ReferralError, ReferralRepository},
    store::{Store, StoreError},
};
use crate::settings::Settings;

pub mod export;
pub mod http;
pub mod referrals;
pub mod users;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid referral code: {0}")]
    InvalidReferralCode(String),
    #[error("Account creation failed: {0}")]
    AccountCreationFailed(String),
    #[error("Authentication error: {0}")]
    Identity(#[from] AuthError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Repository error: {0} - {1}")]
    Repository(String, String),
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
}

impl ServiceError {
    fn store(service: &str, e: StoreError) -> Self {
        ServiceError::Repository(service.to_string(), e.to_string())
    }
}

impl From<ReferralError> for ServiceError {
    fn from(e: ReferralError) -> Self {
        match e {
            ReferralError::InvalidReferralCode(code) => ServiceError::InvalidReferralCode(code),
            ReferralError::AccountCreationFailed(e) => {
                ServiceError::AccountCreationFailed(e.to_string())
            }
            ReferralError::Store(e) => ServiceError::store("Referrals", e),
        }
    }
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }
    }
}

/// Send a request built around a fresh reply channel and wait for the answer.
pub async fn call<T, R>(
    channel: &mpsc::Sender<T>,
    service: &str,
    request: impl FnOnce(oneshot::Sender<Result<R, ServiceError>>) -> T,
) -> Result<R, ServiceError> {
    let (response_tx, response_rx) = oneshot::channel();

    channel
        .send(request(response_tx))
        .await
        .map_err(|e| ServiceError::Communication(service.to_string(), e.to_string()))?;

    response_rx
        .await
        .map_err(|e| ServiceError::Communication(service.to_string(), e.to_string()))?
}

/// Channels into the running services.
#[derive(Clone)]
pub struct Channels {
    pub users: mpsc::Sender<users::UserRequest>,
    pub referrals: mpsc::Sender<referrals::ReferralRequest>,
}

pub fn spawn_services(
    store: Arc<dyn Store>,
    identity: Arc<dyn IdentityProvider>,
    settings: &Settings,
) -> Channels {
    let (user_tx, mut user_rx) = mpsc::channel(512);
    let (referral_tx, mut referral_rx) = mpsc::channel(512);

    let repository = ReferralRepository::new(store).with_limits(
        settings.referrals.max_chain_depth,
        settings.referrals.code_attempts,
    );

    log::info!("Starting user service.");
    let mut user_service = users::UserService::new();
    let user_handler = users::UserRequestHandler::new(identity, repository.clone());
    tokio::spawn(async move {
        user_service.run(user_handler, &mut user_rx).await;
    });

    log::info!("Starting referral service.");
    let mut referral_service = referrals::ReferralService::new();
    let referral_handler = referrals::ReferralRequestHandler::new(repository);
    tokio::spawn(async move {
        referral_service.run(referral_handler, &mut referral_rx).await;
    });

    Channels {
        users: user_tx,
        referrals: referral_tx,
    }
}

pub async fn start_services(
    store: Arc<dyn Store>,
    identity: Arc<dyn IdentityProvider>,
    settings: Settings,
) -> Result<(), anyhow::Error> {
    let channels = spawn_services(store, identity, &settings);

    log::info!("Starting HTTP server.");
    http::start_http_server(&settings.server.listen, channels, &settings.referrals).await
}
