//! Referral graph maintenance and queries.
//!
//! Every user owns the edges of their whole downstream network under
//! `userReferrals/{owner}/{referred}`: one edge per ancestor of the referred user, at the
//! distance between the two. Edges are written once, when the referred user signs up, by walking
//! the `referredBy` chain upward from the sponsor.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};

use super::store::{self, Store, StoreError};
use super::users::UserRepository;
use crate::codes::generate_referral_code;
use crate::models::referrals::{Referral, ReferralNode};
use crate::models::users::{Profile, User};

const USER_REFERRALS: &str = "userReferrals";

pub const DEFAULT_MAX_CHAIN_DEPTH: u32 = 64;
pub const DEFAULT_CODE_ATTEMPTS: u32 = 5;

pub fn referrals_path(owner_id: &str) -> String {
    format!("{USER_REFERRALS}/{owner_id}")
}

pub fn referral_path(owner_id: &str, referred_user_id: &str) -> String {
    format!("{USER_REFERRALS}/{owner_id}/{referred_user_id}")
}

#[derive(Debug, thiserror::Error)]
pub enum ReferralError {
    #[error("Invalid referral code: {0}")]
    InvalidReferralCode(String),
    #[error("Could not persist user record: {0}")]
    AccountCreationFailed(#[source] StoreError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct ReferralRepository {
    store: Arc<dyn Store>,
    users: UserRepository,
    max_chain_depth: u32,
    code_attempts: u32,
}

impl ReferralRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let users = UserRepository::new(store.clone());

        Self {
            store,
            users,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            code_attempts: DEFAULT_CODE_ATTEMPTS,
        }
    }

    pub fn with_limits(mut self, max_chain_depth: u32, code_attempts: u32) -> Self {
        self.max_chain_depth = max_chain_depth.max(1);
        self.code_attempts = code_attempts.max(1);
        self
    }

    pub fn users(&self) -> &UserRepository {
        &self.users
    }

    /// Resolve a human-entered code to the sponsor's user id. Nothing is written.
    pub async fn resolve_sponsor(&self, code: &str) -> Result<String, ReferralError> {
        if code.is_empty() || code.contains('/') {
            return Err(ReferralError::InvalidReferralCode(code.to_string()));
        }

        self.users
            .get_user_id_by_referral_code(code)
            .await?
            .ok_or_else(|| ReferralError::InvalidReferralCode(code.to_string()))
    }

    /// Persist a freshly created account and hang it under `sponsor_id`.
    ///
    /// Only the user record write is mandatory. The code index entry, the sponsor's counter and
    /// every edge are secondary: their failures are logged and the sign-up still succeeds.
    pub async fn attach(
        &self,
        user_id: &str,
        profile: &Profile,
        sponsor_id: Option<&str>,
    ) -> Result<User, ReferralError> {
        let referral_code = self.mint_referral_code(user_id).await;
        let user = User::new(user_id, profile, referral_code, sponsor_id);

        self.users
            .insert_user(&user)
            .await
            .map_err(ReferralError::AccountCreationFailed)?;

        match self
            .users
            .insert_referral_code(&user.referral_code, &user.id)
            .await
        {
            Ok(true) => {}
            Ok(false) => log::warn!(
                "Referral code {} of {} is already indexed to another user.",
                user.referral_code,
                user.id
            ),
            Err(e) => log::error!("Error saving referral code {}: {}", user.referral_code, e),
        }

        if let Some(sponsor_id) = sponsor_id {
            self.record_direct_referral(sponsor_id, &user).await;
            let written = self.propagate(sponsor_id, &user).await;
            log::info!(
                "Attached {} under {} with {} indirect edges.",
                user.id,
                sponsor_id,
                written
            );
        }

        Ok(user)
    }

    async fn mint_referral_code(&self, user_id: &str) -> String {
        let mut code = generate_referral_code(user_id);

        for attempt in 1..=self.code_attempts {
            match self.users.get_user_id_by_referral_code(&code).await {
                Ok(None) => break,
                Ok(Some(_)) if attempt < self.code_attempts => {
                    code = generate_referral_code(user_id);
                }
                Ok(Some(owner)) => {
                    log::warn!("Referral code {} is shared with {}.", code, owner);
                }
                Err(e) => {
                    log::warn!("Could not check referral code {} for collisions: {}", code, e);
                    break;
                }
            }
        }

        code
    }

    async fn record_direct_referral(&self, sponsor_id: &str, user: &User) {
        if let Err(e) = self.insert_referral(sponsor_id, &Referral::new(user, 1)).await {
            log::error!("Error saving direct referral {} -> {}: {}", sponsor_id, user.id, e);
        }

        match self.users.increment_referral_count(sponsor_id).await {
            Ok(Some(count)) => log::debug!("Referral count of {} is now {}.", sponsor_id, count),
            Ok(None) => log::warn!("Sponsor {} has no user record to count on.", sponsor_id),
            Err(e) => log::error!("Error updating referral count of {}: {}", sponsor_id, e),
        }
    }

    /// Walk `referredBy` upward from `sponsor_id`, giving every further ancestor an indirect edge
    /// to `user`. Stops at a root, at a missing record, at a failed read, or after
    /// `max_chain_depth` ancestors. Returns the number of edges written.
    pub async fn propagate(&self, sponsor_id: &str, user: &User) -> usize {
        let mut current = sponsor_id.to_string();
        let mut level = 1;
        let mut written = 0;

        for _ in 0..self.max_chain_depth {
            let ancestor = match self.users.get_user_by_id(&current).await {
                Ok(Some(record)) => match record.referred_by {
                    Some(ancestor) => ancestor,
                    None => return written,
                },
                Ok(None) => {
                    log::debug!("Chain for {} ends at missing record {}.", user.id, current);
                    return written;
                }
                Err(e) => {
                    log::error!("Error reading {} while propagating {}: {}", current, user.id, e);
                    return written;
                }
            };

            level += 1;
            match self.insert_referral(&ancestor, &Referral::new(user, level)).await {
                Ok(()) => written += 1,
                Err(e) => log::error!(
                    "Error saving level {} referral {} -> {}: {}",
                    level,
                    ancestor,
                    user.id,
                    e
                ),
            }
            current = ancestor;
        }

        log::warn!(
            "Stopped propagating {} after {} ancestors; the sponsor chain may contain a cycle.",
            user.id,
            self.max_chain_depth
        );
        written
    }

    pub async fn insert_referral(
        &self,
        owner_id: &str,
        referral: &Referral,
    ) -> Result<(), StoreError> {
        let path = referral_path(owner_id, &referral.referred_user_id);
        store::write_document(self.store.as_ref(), &path, referral).await
    }

    /// All edges owned by `owner_id`, direct and indirect, in store order. Malformed edge
    /// documents are logged and skipped.
    pub async fn get_referrals(&self, owner_id: &str) -> Result<Vec<Referral>, StoreError> {
        let path = referrals_path(owner_id);

        let referrals = self
            .store
            .children(&path)
            .await?
            .into_iter()
            .filter_map(|(key, value)| {
                match store::decode::<Referral>(&format!("{path}/{key}"), value) {
                    Ok(mut referral) => {
                        referral.id = key;
                        Some(referral)
                    }
                    Err(e) => {
                        log::warn!("Skipping edge: {}", e);
                        None
                    }
                }
            })
            .collect();

        Ok(referrals)
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        self.users.get_user_by_id(user_id).await
    }

    /// Materialize the network below `root_id`, `max_depth` levels deep. `None` if the root user
    /// does not exist.
    pub async fn get_subtree(
        &self,
        root_id: &str,
        max_depth: u32,
    ) -> Result<Option<ReferralNode>, StoreError> {
        let Some(root) = self.users.get_user_by_id(root_id).await? else {
            return Ok(None);
        };

        let children = self.subtree_children(root_id, 1, max_depth).await;

        Ok(Some(ReferralNode {
            user_id: root_id.to_string(),
            user: Some(root),
            level: 0,
            children,
        }))
    }

    /// Children of `parent_id` at `level`, built through its direct edges only; indirect edges
    /// are reached by recursing. A node whose edges or record cannot be read is kept with what
    /// could be read.
    ///
    /// Every owned edge of a node is read to find its level-1 ones, so the cost grows with the
    /// whole downstream network of each visited node rather than with the subtree alone.
    fn subtree_children<'a>(
        &'a self,
        parent_id: &'a str,
        level: u32,
        max_depth: u32,
    ) -> BoxFuture<'a, BTreeMap<String, ReferralNode>> {
        async move {
            let mut children = BTreeMap::new();
            if level > max_depth {
                return children;
            }

            let referrals = match self.get_referrals(parent_id).await {
                Ok(referrals) => referrals,
                Err(e) => {
                    log::error!("Error reading referrals of {}: {}", parent_id, e);
                    return children;
                }
            };

            for referral in referrals.into_iter().filter(|referral| referral.level == 1) {
                let child_id = referral.referred_user_id;
                let user = match self.users.get_user_by_id(&child_id).await {
                    Ok(user) => user,
                    Err(e) => {
                        log::error!("Error reading {} for the subtree: {}", child_id, e);
                        None
                    }
                };
                let grandchildren = self.subtree_children(&child_id, level + 1, max_depth).await;

                children.insert(
                    child_id.clone(),
                    ReferralNode {
                        user_id: child_id,
                        user,
                        level,
                        children: grandchildren,
                    },
                );
            }

            children
        }
        .boxed()
    }
}
