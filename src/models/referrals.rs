use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::users::User;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferralStatus {
    Completed,
    Indirect,
}

impl ReferralStatus {
    pub fn for_level(level: u32) -> Self {
        if level <= 1 {
            ReferralStatus::Completed
        } else {
            ReferralStatus::Indirect
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferralStatus::Completed => "completed",
            ReferralStatus::Indirect => "indirect",
        }
    }
}

/// One edge of an owner's downstream network, kept under
/// `userReferrals/{owner}/{referred_user_id}`. Written once, never updated.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
    #[serde(default)]
    pub id: String,
    pub referred_user_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub level: u32,
    pub status: ReferralStatus,
}

impl Referral {
    pub fn new(referred: &User, level: u32) -> Self {
        Self {
            id: referred.id.clone(),
            referred_user_id: referred.id.clone(),
            name: Some(referred.name.clone()),
            email: Some(referred.email.clone()),
            timestamp: Utc::now(),
            level,
            status: ReferralStatus::for_level(level),
        }
    }

    /// Case-sensitive substring match over the edge id, the referred user id and the
    /// denormalized name and email. An empty term matches everything.
    pub fn matches(&self, term: &str) -> bool {
        term.is_empty()
            || self.id.contains(term)
            || self.referred_user_id.contains(term)
            || self.name.as_deref().is_some_and(|name| name.contains(term))
            || self.email.as_deref().is_some_and(|email| email.contains(term))
    }
}

/// Human-readable tier. Levels 2 to 4 count from the first indirect tier; deeper levels are
/// shown by their distance.
pub fn level_label(level: u32) -> String {
    match level {
        0 | 1 => "Direct".to_string(),
        2..=4 => format!("Level {}", level - 1),
        n => format!("Level {n}"),
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LevelFilter {
    #[default]
    All,
    Level(u32),
}

impl LevelFilter {
    pub fn accepts(&self, level: u32) -> bool {
        match self {
            LevelFilter::All => true,
            LevelFilter::Level(wanted) => *wanted == level,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Invalid level filter: {0}")]
pub struct InvalidLevelFilter(String);

impl FromStr for LevelFilter {
    type Err = InvalidLevelFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(LevelFilter::All);
        }

        s.parse::<u32>()
            .map(LevelFilter::Level)
            .map_err(|_| InvalidLevelFilter(s.to_string()))
    }
}

/// Depth-bounded view of a user's downstream network. Built fresh per request.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralNode {
    pub user_id: String,
    pub user: Option<User>,
    pub level: u32,
    pub children: BTreeMap<String, ReferralNode>,
}

impl ReferralNode {
    /// Number of nodes below this one.
    pub fn descendants(&self) -> usize {
        self.children
            .values()
            .map(|child| 1 + child.descendants())
            .sum()
    }

    pub fn depth(&self) -> u32 {
        self.children
            .values()
            .map(|child| 1 + child.depth())
            .max()
            .unwrap_or(0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStats {
    pub total: usize,
    pub direct: usize,
    pub second_level: usize,
    pub by_level: BTreeMap<u32, usize>,
}

impl NetworkStats {
    pub fn from_referrals(referrals: &[Referral]) -> Self {
        let mut by_level = BTreeMap::new();
        for referral in referrals {
            *by_level.entry(referral.level).or_insert(0) += 1;
        }

        Self {
            total: referrals.len(),
            direct: by_level.get(&1).copied().unwrap_or(0),
            second_level: by_level.get(&2).copied().unwrap_or(0),
            by_level,
        }
    }
}

/// A 1-indexed window over a result list.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn from_items(items: Vec<T>, page: usize, per_page: usize) -> Self {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let total = items.len();

        let items = items
            .into_iter()
            .skip((page - 1).saturating_mul(per_page))
            .take(per_page)
            .collect();

        Self {
            page,
            per_page,
            total,
            total_pages: total.div_ceil(per_page),
            items,
        }
    }
}
