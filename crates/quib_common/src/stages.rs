//! Evolution stage sequence with its requirement and reward tables.
//!
//! The stage ladder is a single ordered enum; requirements, XP bonuses,
//! token rewards and display strings are all keyed off it so no literal
//! list is duplicated anywhere else.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One position in the fixed evolution ladder, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvolutionStage {
    Egg,
    Hatchling,
    Juvenile,
    Ascended,
    Celestial,
}

/// The full ladder in order. Progression only ever walks this forward.
pub const STAGE_ORDER: [EvolutionStage; 5] = [
    EvolutionStage::Egg,
    EvolutionStage::Hatchling,
    EvolutionStage::Juvenile,
    EvolutionStage::Ascended,
    EvolutionStage::Celestial,
];

/// Thresholds a creature must meet to *enter* a stage.
///
/// A zero field imposes no gate; the mood floor is optional entirely.
/// All comparisons against these are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageRequirements {
    pub daily_challenges: i64,
    pub chat_interactions: i64,
    pub account_age_hours: i64,
    pub mood_score: Option<f64>,
}

impl EvolutionStage {
    /// Position in the ladder, 0-based.
    pub fn index(self) -> usize {
        STAGE_ORDER.iter().position(|s| *s == self).unwrap_or(0)
    }

    /// Successor stage, or None at the top of the ladder.
    pub fn next(self) -> Option<EvolutionStage> {
        STAGE_ORDER.get(self.index() + 1).copied()
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }

    /// Requirements to enter this stage. The two lowest stages are
    /// trivially satisfied: Egg is the notional origin and Hatchling is
    /// what every creature is created as.
    pub fn requirements(self) -> StageRequirements {
        match self {
            EvolutionStage::Egg | EvolutionStage::Hatchling => StageRequirements {
                daily_challenges: 0,
                chat_interactions: 0,
                account_age_hours: 0,
                mood_score: None,
            },
            EvolutionStage::Juvenile => StageRequirements {
                daily_challenges: 3,
                chat_interactions: 15,
                account_age_hours: 48,
                mood_score: None,
            },
            EvolutionStage::Ascended => StageRequirements {
                daily_challenges: 7,
                chat_interactions: 0,
                account_age_hours: 168,
                mood_score: Some(75.0),
            },
            EvolutionStage::Celestial => StageRequirements {
                daily_challenges: 15,
                chat_interactions: 50,
                account_age_hours: 720,
                mood_score: Some(90.0),
            },
        }
    }

    /// XP granted when a creature reaches this stage.
    pub fn xp_bonus(self) -> i64 {
        match self {
            EvolutionStage::Egg => 0,
            EvolutionStage::Hatchling => 100,
            EvolutionStage::Juvenile => 500,
            EvolutionStage::Ascended => 2000,
            EvolutionStage::Celestial => 10000,
        }
    }

    /// Token reward granted when a creature reaches this stage.
    /// Zero means no claim record is created.
    pub fn token_reward(self) -> u64 {
        match self {
            EvolutionStage::Egg => 0,
            EvolutionStage::Hatchling => 100,
            EvolutionStage::Juvenile => 500,
            EvolutionStage::Ascended => 2000,
            EvolutionStage::Celestial => 10000,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            EvolutionStage::Egg => "Mystical Egg",
            EvolutionStage::Hatchling => "Curious Hatchling",
            EvolutionStage::Juvenile => "Growing Juvenile",
            EvolutionStage::Ascended => "Wise Ascended",
            EvolutionStage::Celestial => "Transcendent Celestial",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            EvolutionStage::Egg => "A mysterious egg pulsing with potential energy.",
            EvolutionStage::Hatchling => {
                "A young, energetic creature just beginning to explore the world."
            }
            EvolutionStage::Juvenile => {
                "A growing creature developing intelligence and wisdom."
            }
            EvolutionStage::Ascended => "A wise, evolved being with deep understanding.",
            EvolutionStage::Celestial => {
                "A transcendent entity of cosmic power and wisdom."
            }
        }
    }

    /// Wire/storage form, e.g. "HATCHLING".
    pub fn as_str(self) -> &'static str {
        match self {
            EvolutionStage::Egg => "EGG",
            EvolutionStage::Hatchling => "HATCHLING",
            EvolutionStage::Juvenile => "JUVENILE",
            EvolutionStage::Ascended => "ASCENDED",
            EvolutionStage::Celestial => "CELESTIAL",
        }
    }
}

impl fmt::Display for EvolutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvolutionStage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "EGG" => Ok(EvolutionStage::Egg),
            "HATCHLING" => Ok(EvolutionStage::Hatchling),
            "JUVENILE" => Ok(EvolutionStage::Juvenile),
            "ASCENDED" => Ok(EvolutionStage::Ascended),
            "CELESTIAL" => Ok(EvolutionStage::Celestial),
            other => Err(format!("unknown evolution stage: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_is_strictly_ordered() {
        for pair in STAGE_ORDER.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].next(), Some(pair[1]));
        }
        assert!(EvolutionStage::Celestial.is_terminal());
        assert_eq!(EvolutionStage::Celestial.next(), None);
    }

    #[test]
    fn lowest_stages_have_trivial_requirements() {
        for stage in [EvolutionStage::Egg, EvolutionStage::Hatchling] {
            let req = stage.requirements();
            assert_eq!(req.daily_challenges, 0);
            assert_eq!(req.chat_interactions, 0);
            assert_eq!(req.account_age_hours, 0);
            assert!(req.mood_score.is_none());
        }
    }

    #[test]
    fn requirement_tables_match_ladder() {
        let juvenile = EvolutionStage::Juvenile.requirements();
        assert_eq!(juvenile.daily_challenges, 3);
        assert_eq!(juvenile.chat_interactions, 15);
        assert_eq!(juvenile.account_age_hours, 48);
        assert!(juvenile.mood_score.is_none());

        let celestial = EvolutionStage::Celestial.requirements();
        assert_eq!(celestial.mood_score, Some(90.0));
        assert_eq!(celestial.account_age_hours, 720);
    }

    #[test]
    fn wire_format_round_trips() {
        for stage in STAGE_ORDER {
            assert_eq!(stage.as_str().parse::<EvolutionStage>().unwrap(), stage);
        }
        assert!("DRAGON".parse::<EvolutionStage>().is_err());

        let json = serde_json::to_string(&EvolutionStage::Hatchling).unwrap();
        assert_eq!(json, "\"HATCHLING\"");
    }

    #[test]
    fn egg_grants_nothing() {
        assert_eq!(EvolutionStage::Egg.token_reward(), 0);
        assert_eq!(EvolutionStage::Egg.xp_bonus(), 0);
        assert!(EvolutionStage::Hatchling.token_reward() > 0);
    }
}
