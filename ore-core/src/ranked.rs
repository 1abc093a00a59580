//! Ranked-info enrichment
//!
//! Optional per-user rating data. Nothing in the engine depends on it; a
//! missing profile degrades to [`RankedProfile::default`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_RATING: f32 = 1500.0;
pub const DEFAULT_REPUTATION: f32 = 70.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankedProfile {
    pub user_id: i32,
    pub rating: f32,
    pub reputation: f32,
    pub races_completed: u32,
}

impl Default for RankedProfile {
    fn default() -> Self {
        Self {
            user_id: -1,
            rating: DEFAULT_RATING,
            reputation: DEFAULT_REPUTATION,
            races_completed: 0,
        }
    }
}

pub trait RankedInfoProvider: Send + Sync {
    fn ranked_info(&self, user_id: i32) -> Option<RankedProfile>;
}

/// Profile for `user_id`, or the default profile carrying that id
pub fn profile_or_default(provider: Option<&dyn RankedInfoProvider>, user_id: Option<i32>) -> RankedProfile {
    let Some(user_id) = user_id else {
        return RankedProfile::default();
    };
    provider
        .and_then(|p| p.ranked_info(user_id))
        .unwrap_or(RankedProfile {
            user_id,
            ..Default::default()
        })
}

/// In-memory provider, loadable from a JSON list of profiles
#[derive(Debug, Clone, Default)]
pub struct RankingTable {
    profiles: HashMap<i32, RankedProfile>,
}

impl RankingTable {
    pub fn from_profiles(profiles: impl IntoIterator<Item = RankedProfile>) -> Self {
        Self {
            profiles: profiles.into_iter().map(|p| (p.user_id, p)).collect(),
        }
    }

    pub fn from_json(json: &[u8]) -> Result<Self, serde_json::Error> {
        let profiles: Vec<RankedProfile> = serde_json::from_slice(json)?;
        Ok(Self::from_profiles(profiles))
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl RankedInfoProvider for RankingTable {
    fn ranked_info(&self, user_id: i32) -> Option<RankedProfile> {
        self.profiles.get(&user_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_user_from_json() {
        let table = RankingTable::from_json(
            br#"[{"user_id": 42, "rating": 2100.5, "reputation": 88.0, "races_completed": 130}]"#,
        )
        .unwrap();
        let profile = profile_or_default(Some(&table), Some(42));
        assert_eq!(profile.rating, 2100.5);
        assert_eq!(profile.races_completed, 130);
    }

    #[test]
    fn test_unknown_user_gets_default() {
        let table = RankingTable::from_profiles([]);
        let profile = profile_or_default(Some(&table), Some(7));
        assert_eq!(profile.user_id, 7);
        assert_eq!(profile.rating, DEFAULT_RATING);
        assert_eq!(profile.reputation, DEFAULT_REPUTATION);
        assert_eq!(profile.races_completed, 0);
    }

    #[test]
    fn test_no_provider_or_no_user() {
        assert_eq!(profile_or_default(None, Some(3)).rating, DEFAULT_RATING);
        assert_eq!(profile_or_default(None, None), RankedProfile::default());
    }

    #[test]
    fn test_partial_profile_fills_defaults() {
        let table = RankingTable::from_json(br#"[{"user_id": 5}]"#).unwrap();
        let profile = table.ranked_info(5).unwrap();
        assert_eq!(profile.reputation, DEFAULT_REPUTATION);
    }
}
