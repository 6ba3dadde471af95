//! Creature personality and visual trait types.
//!
//! Profiles are generated by the AI client at signup and refined over
//! time; the fallbacks here are what a creature gets when the generation
//! call fails or returns garbage.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalityProfile {
    #[serde(default = "default_energy")]
    pub energy: String,
    #[serde(default = "default_tone")]
    pub tone: String,
    #[serde(default = "default_bond_type")]
    pub bond_type: String,
    #[serde(default)]
    pub favorite_words: Vec<String>,
    #[serde(default)]
    pub user_keywords: Vec<String>,
    #[serde(default = "default_path_variant")]
    pub evolution_path_variant: String,
    #[serde(default = "default_mood_state")]
    pub mood_state: String,
    #[serde(default)]
    pub quirks: Vec<String>,
    #[serde(default = "default_communication_style")]
    pub communication_style: String,
}

fn default_energy() -> String {
    "medium".to_string()
}

fn default_tone() -> String {
    "playful".to_string()
}

fn default_bond_type() -> String {
    "loyal guardian".to_string()
}

fn default_path_variant() -> String {
    "A".to_string()
}

fn default_mood_state() -> String {
    "happy".to_string()
}

fn default_communication_style() -> String {
    "enthusiastic and curious".to_string()
}

impl Default for PersonalityProfile {
    fn default() -> Self {
        Self {
            energy: default_energy(),
            tone: default_tone(),
            bond_type: default_bond_type(),
            favorite_words: vec![
                "amazing".to_string(),
                "wonderful".to_string(),
                "fantastic".to_string(),
            ],
            user_keywords: Vec::new(),
            evolution_path_variant: default_path_variant(),
            mood_state: default_mood_state(),
            quirks: vec![
                "loves to ask questions".to_string(),
                "gets excited about new things".to_string(),
            ],
            communication_style: default_communication_style(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualTraits {
    pub horn_type: String,
    pub fur_color: String,
    pub eye_style: String,
    pub tail_type: String,
    pub aura_effect: String,
    pub accessory: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_markings: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl Default for VisualTraits {
    fn default() -> Self {
        Self {
            horn_type: "curved".to_string(),
            fur_color: "galactic blue".to_string(),
            eye_style: "starry swirl".to_string(),
            tail_type: "twist puff".to_string(),
            aura_effect: "fireflies".to_string(),
            accessory: "mini crown".to_string(),
            special_markings: None,
            size: None,
        }
    }
}

const HORN_TYPES: &[&str] = &["curved", "spiral", "crystal", "twisted", "crown-like", "antler-style"];
const FUR_COLORS: &[&str] = &[
    "galactic blue",
    "cosmic purple",
    "starlight silver",
    "nebula pink",
    "aurora green",
    "sunset orange",
];
const EYE_STYLES: &[&str] = &[
    "starry swirl",
    "galaxy deep",
    "crystal clear",
    "mystic glow",
    "cosmic sparkle",
    "ethereal shine",
];
const TAIL_TYPES: &[&str] = &[
    "twist puff",
    "fluffy cloud",
    "crystal tip",
    "sparkle trail",
    "nebula swirl",
    "cosmic wave",
];
const AURA_EFFECTS: &[&str] = &[
    "fireflies",
    "stardust",
    "rainbow shimmer",
    "cosmic mist",
    "energy waves",
    "mystic glow",
];
const ACCESSORIES: &[&str] = &[
    "mini crown",
    "crystal pendant",
    "star earring",
    "cosmic bracelet",
    "mystic amulet",
    "galaxy ring",
];

fn pick(rng: &mut impl Rng, options: &[&str]) -> String {
    options
        .choose(rng)
        .copied()
        .unwrap_or(options[0])
        .to_string()
}

/// Roll a fresh set of visual traits for a newborn creature.
pub fn random_visual_traits() -> VisualTraits {
    let mut rng = rand::thread_rng();
    VisualTraits {
        horn_type: pick(&mut rng, HORN_TYPES),
        fur_color: pick(&mut rng, FUR_COLORS),
        eye_style: pick(&mut rng, EYE_STYLES),
        tail_type: pick(&mut rng, TAIL_TYPES),
        aura_effect: pick(&mut rng, AURA_EFFECTS),
        accessory: pick(&mut rng, ACCESSORIES),
        special_markings: rng
            .gen_bool(0.5)
            .then(|| "constellation patterns".to_string()),
        size: Some(
            match rng.gen_range(0..10) {
                0..=2 => "tiny",
                3..=6 => "medium",
                _ => "large",
            }
            .to_string(),
        ),
    }
}

/// Map a 0..100 mood score to the creature's felt state.
pub fn mood_state(mood_score: f64) -> &'static str {
    if mood_score >= 80.0 {
        "excited"
    } else if mood_score >= 60.0 {
        "happy"
    } else if mood_score >= 40.0 {
        "calm"
    } else if mood_score >= 20.0 {
        "curious"
    } else {
        "grumpy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_traits_come_from_the_tables() {
        for _ in 0..20 {
            let traits = random_visual_traits();
            assert!(HORN_TYPES.contains(&traits.horn_type.as_str()));
            assert!(FUR_COLORS.contains(&traits.fur_color.as_str()));
            assert!(ACCESSORIES.contains(&traits.accessory.as_str()));
            assert!(traits.size.is_some());
        }
    }

    #[test]
    fn partial_profile_json_fills_defaults() {
        let profile: PersonalityProfile =
            serde_json::from_str(r#"{"tone": "mystical", "quirks": ["hums"]}"#).unwrap();
        assert_eq!(profile.tone, "mystical");
        assert_eq!(profile.energy, "medium");
        assert_eq!(profile.quirks, vec!["hums".to_string()]);
        assert!(profile.user_keywords.is_empty());
    }

    #[test]
    fn mood_state_bands() {
        assert_eq!(mood_state(95.0), "excited");
        assert_eq!(mood_state(80.0), "excited");
        assert_eq!(mood_state(60.0), "happy");
        assert_eq!(mood_state(40.0), "calm");
        assert_eq!(mood_state(20.0), "curious");
        assert_eq!(mood_state(0.0), "grumpy");
    }
}
