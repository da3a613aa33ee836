use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{export, RequestHandler, Service, ServiceError};
use crate::models::referrals::{LevelFilter, NetworkStats, Referral, ReferralNode};
use crate::repositories::referrals::ReferralRepository;

pub enum ReferralRequest {
    GetNetwork {
        user_id: String,
        response: oneshot::Sender<Result<Vec<Referral>, ServiceError>>,
    },
    Search {
        user_id: String,
        term: String,
        level: LevelFilter,
        response: oneshot::Sender<Result<Vec<Referral>, ServiceError>>,
    },
    GetSubtree {
        user_id: String,
        max_depth: u32,
        response: oneshot::Sender<Result<ReferralNode, ServiceError>>,
    },
    GetStats {
        user_id: String,
        response: oneshot::Sender<Result<NetworkStats, ServiceError>>,
    },
    Export {
        user_id: String,
        term: String,
        level: LevelFilter,
        response: oneshot::Sender<Result<String, ServiceError>>,
    },
}

/// Keep the edges at `level` whose ids, name or email contain `term`. Order is preserved.
pub fn filter_referrals(referrals: Vec<Referral>, term: &str, level: LevelFilter) -> Vec<Referral> {
    referrals
        .into_iter()
        .filter(|referral| level.accepts(referral.level) && referral.matches(term))
        .collect()
}

#[derive(Clone)]
pub struct ReferralRequestHandler {
    repository: ReferralRepository,
}

impl ReferralRequestHandler {
    pub fn new(repository: ReferralRepository) -> Self {
        ReferralRequestHandler { repository }
    }

    pub async fn get_network(&self, user_id: &str) -> Result<Vec<Referral>, ServiceError> {
        self.repository
            .get_referrals(user_id)
            .await
            .map_err(|e| ServiceError::store("Referrals", e))
    }

    pub async fn search(
        &self,
        user_id: &str,
        term: &str,
        level: LevelFilter,
    ) -> Result<Vec<Referral>, ServiceError> {
        let referrals = self.get_network(user_id).await?;
        Ok(filter_referrals(referrals, term, level))
    }

    pub async fn get_subtree(
        &self,
        user_id: &str,
        max_depth: u32,
    ) -> Result<ReferralNode, ServiceError> {
        self.repository
            .get_subtree(user_id, max_depth)
            .await
            .map_err(|e| ServiceError::store("Referrals", e))?
            .ok_or_else(|| ServiceError::NotFound(format!("user {user_id}")))
    }

    pub async fn get_stats(&self, user_id: &str) -> Result<NetworkStats, ServiceError> {
        let referrals = self.get_network(user_id).await?;
        Ok(NetworkStats::from_referrals(&referrals))
    }

    /// CSV of the filtered listing. A user record that cannot be read is exported as unavailable
    /// rather than failing the whole export.
    pub async fn export(
        &self,
        user_id: &str,
        term: &str,
        level: LevelFilter,
    ) -> Result<String, ServiceError> {
        let referrals = self.search(user_id, term, level).await?;

        let mut rows = Vec::with_capacity(referrals.len());
        for referral in referrals {
            let user = match self.repository.get_user(&referral.referred_user_id).await {
                Ok(user) => user,
                Err(e) => {
                    log::warn!(
                        "Exporting {} without user details: {}",
                        referral.referred_user_id,
                        e
                    );
                    None
                }
            };
            rows.push((referral, user));
        }

        Ok(export::to_csv(&rows))
    }
}

#[async_trait]
impl RequestHandler<ReferralRequest> for ReferralRequestHandler {
    async fn handle_request(&self, request: ReferralRequest) {
        match request {
            ReferralRequest::GetNetwork { user_id, response } => {
                let referrals = self.get_network(&user_id).await;
                let _ = response.send(referrals);
            }
            ReferralRequest::Search {
                user_id,
                term,
                level,
                response,
            } => {
                let referrals = self.search(&user_id, &term, level).await;
                let _ = response.send(referrals);
            }
            ReferralRequest::GetSubtree {
                user_id,
                max_depth,
                response,
            } => {
                let tree = self.get_subtree(&user_id, max_depth).await;
                let _ = response.send(tree);
            }
            ReferralRequest::GetStats { user_id, response } => {
                let stats = self.get_stats(&user_id).await;
                let _ = response.send(stats);
            }
            ReferralRequest::Export {
                user_id,
                term,
                level,
                response,
            } => {
                let csv = self.export(&user_id, &term, level).await;
                let _ = response.send(csv);
            }
        }
    }
}

pub struct ReferralService;

impl ReferralService {
    pub fn new() -> Self {
        ReferralService {}
    }
}

impl Default for ReferralService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Service<ReferralRequest, ReferralRequestHandler> for ReferralService {}
