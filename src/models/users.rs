use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user record as kept under `users/{id}`.
///
/// `referral_count` is denormalized and best effort: it is only ever bumped by the counter
/// maintainer and is never recomputed from the edges.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    pub join_date: DateTime<Utc>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub referral_count: u64,
    pub referral_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referred_by: Option<String>,
}

impl User {
    pub fn new(id: &str, profile: &Profile, referral_code: String, referred_by: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            name: profile.name.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
            address: profile.address.clone(),
            join_date: Utc::now(),
            is_admin: false,
            referral_count: 0,
            referral_code,
            referred_by: referred_by.map(str::to_string),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[serde(flatten)]
    pub profile: Profile,
    pub password: String,
    pub referral_code: Option<String>,
}

impl NewUser {
    /// Name of the first mandatory field left blank, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("name", &self.profile.name),
            ("phone", &self.profile.phone),
            ("email", &self.profile.email),
            ("password", &self.password),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
    }

    /// The trimmed referral code, or `None` when blank.
    pub fn sponsor_code(&self) -> Option<&str> {
        self.referral_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUp {
    pub user_id: String,
    pub referral_code: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Explicit per-request identity, handed to callers in place of ambient "current user" state.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
}
