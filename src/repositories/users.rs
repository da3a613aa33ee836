use std::sync::Arc;

use serde_json::Value;

use super::store::{self, Store, StoreError};
use crate::models::users;

const USERS: &str = "users";
const REFERRAL_CODES: &str = "referralCodes";

pub fn user_path(user_id: &str) -> String {
    format!("{USERS}/{user_id}")
}

pub fn referral_code_path(code: &str) -> String {
    format!("{REFERRAL_CODES}/{code}")
}

#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn Store>,
}

impl UserRepository {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn insert_user(&self, user: &users::User) -> Result<(), StoreError> {
        store::write_document(self.store.as_ref(), &user_path(&user.id), user).await
    }

    pub async fn get_user_by_id(&self, user_id: &str) -> Result<Option<users::User>, StoreError> {
        store::read_document(self.store.as_ref(), &user_path(user_id)).await
    }

    /// Index `code` for `user_id` unless another user already owns it. Returns whether the
    /// entry now points at `user_id`; an existing entry is never overwritten.
    pub async fn insert_referral_code(&self, code: &str, user_id: &str) -> Result<bool, StoreError> {
        let path = referral_code_path(code);
        if let Some(owner) = store::read_document::<String>(self.store.as_ref(), &path).await? {
            return Ok(owner == user_id);
        }

        self.store
            .write(&path, Value::String(user_id.to_string()))
            .await?;

        Ok(true)
    }

    /// Resolve a referral code to its owner: the code index first, then the `referralCode` field
    /// of the user records for owners that never got an index entry.
    pub async fn get_user_id_by_referral_code(
        &self,
        code: &str,
    ) -> Result<Option<String>, StoreError> {
        let path = referral_code_path(code);
        if let Some(user_id) = store::read_document::<String>(self.store.as_ref(), &path).await? {
            return Ok(Some(user_id));
        }

        let owner = self
            .store
            .find_by_field(USERS, "referralCode", code)
            .await?
            .into_iter()
            .next()
            .map(|(user_id, _)| user_id);

        Ok(owner)
    }

    /// Bump the denormalized referral count of `user_id`.
    ///
    /// A plain read-modify-write: concurrent increments for the same user can lose updates.
    /// Returns the new count, or `None` when the user does not exist (nothing is written then).
    pub async fn increment_referral_count(&self, user_id: &str) -> Result<Option<u64>, StoreError> {
        let Some(mut user) = self.get_user_by_id(user_id).await? else {
            return Ok(None);
        };

        user.referral_count += 1;
        self.insert_user(&user).await?;

        Ok(Some(user.referral_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::models::users::{Profile, User};
    use crate::repositories::store::MemoryStore;

    fn user(id: &str, code: &str) -> User {
        let profile = Profile {
            name: format!("User {id}"),
            email: format!("{id}@example.com"),
            phone: "0500000000".to_string(),
            address: String::new(),
        };
        User::new(id, &profile, code.to_string(), None)
    }

    fn repository() -> (MemoryStore, UserRepository) {
        let store = MemoryStore::new();
        let repository = UserRepository::new(Arc::new(store.clone()));
        (store, repository)
    }

    #[tokio::test]
    async fn users_round_trip() {
        let (_, repository) = repository();
        let amal = user("amal", "AAAAAAAM");

        repository.insert_user(&amal).await.unwrap();

        let first = repository.get_user_by_id("amal").await.unwrap();
        let second = repository.get_user_by_id("amal").await.unwrap();
        assert_eq!(first, Some(amal));
        assert_eq!(first, second);
        assert_eq!(repository.get_user_by_id("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn codes_resolve_through_the_index() {
        let (_, repository) = repository();
        assert!(repository.insert_referral_code("AAAAAAAM", "amal").await.unwrap());
        assert!(repository.insert_referral_code("AAAAAAAM", "amal").await.unwrap());
        assert!(!repository.insert_referral_code("AAAAAAAM", "omar").await.unwrap());

        assert_eq!(
            repository.get_user_id_by_referral_code("AAAAAAAM").await.unwrap(),
            Some("amal".to_string())
        );
        assert_eq!(
            repository.get_user_id_by_referral_code("ZZZZZZZZ").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn codes_without_index_entries_fall_back_to_user_records() {
        let (_, repository) = repository();
        repository.insert_user(&user("omar", "OOOOOOOM")).await.unwrap();

        assert_eq!(
            repository.get_user_id_by_referral_code("OOOOOOOM").await.unwrap(),
            Some("omar".to_string())
        );
    }

    #[tokio::test]
    async fn increments_bump_existing_users_only() {
        let (store, repository) = repository();
        repository.insert_user(&user("amal", "AAAAAAAM")).await.unwrap();

        assert_eq!(repository.increment_referral_count("amal").await.unwrap(), Some(1));
        assert_eq!(repository.increment_referral_count("amal").await.unwrap(), Some(2));

        assert_eq!(repository.increment_referral_count("ghost").await.unwrap(), None);
        assert_eq!(store.read("users/ghost").await.unwrap(), None);
    }
}
