//! OpenAI-compatible chat client for creature replies, sentiment and
//! short generations.
//!
//! Sentiment and text generation are enrichments: every call here has a
//! neutral fallback and a failed upstream never aborts the request that
//! triggered it.

use quib_common::personality::{self, PersonalityProfile};
use quib_common::types::ConversationRecord;
use quib_common::{EvolutionStage, QuibError, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

const FALLBACK_REPLY: &str = "I'm here with you!";
const FALLBACK_CHALLENGE: &str = "Complete a small act of kindness today.";
const FALLBACK_EVOLUTION_MESSAGE: &str =
    "Congratulations! Your creature has evolved and grown stronger!";

/// What a chat turn produces: the reply plus the sentiment and keywords
/// mined from the user's message.
#[derive(Debug, Clone)]
pub struct CreatureReply {
    pub response: String,
    pub sentiment_score: f64,
    pub keywords: Vec<String>,
}

#[derive(Clone)]
pub struct AiClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    chat_model: String,
    light_model: String,
}

impl AiClient {
    pub fn new(
        api_url: String,
        api_key: String,
        chat_model: String,
        light_model: String,
        timeout_secs: u64,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| QuibError::Upstream(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            api_url,
            api_key,
            chat_model,
            light_model,
        })
    }

    pub fn enabled(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// One chat-completions round trip; returns the first choice's text.
    async fn complete(
        &self,
        model: &str,
        messages: Value,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<String> {
        if !self.enabled() {
            return Err(QuibError::Upstream("AI disabled: no API key".to_string()));
        }

        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| QuibError::Upstream(format!("chat completion request: {}", e)))?;

        if !response.status().is_success() {
            return Err(QuibError::Upstream(format!(
                "chat completion failed: {}",
                response.status()
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| QuibError::Upstream(format!("chat completion body: {}", e)))?;

        let text = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();
        Ok(text)
    }

    /// Generate the creature's reply to a chat message, along with the
    /// message's sentiment and extracted keywords. Falls back to a warm
    /// canned reply and neutral sentiment on any upstream failure.
    pub async fn creature_reply(
        &self,
        message: &str,
        personality: &PersonalityProfile,
        stage: EvolutionStage,
        mood_score: f64,
        history: &[ConversationRecord],
    ) -> CreatureReply {
        let sentiment_score = self.analyze_sentiment(message).await;
        let keywords = self.extract_keywords(message).await;

        let context = build_chat_context(personality, stage, mood_score, history);
        let messages = serde_json::json!([
            { "role": "system", "content": context },
            { "role": "user", "content": message },
        ]);

        let response = match self.complete(&self.chat_model, messages, 250, 0.8).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => FALLBACK_REPLY.to_string(),
            Err(e) => {
                warn!("Creature reply generation failed: {}", e);
                FALLBACK_REPLY.to_string()
            }
        };

        CreatureReply {
            response,
            sentiment_score,
            keywords,
        }
    }

    /// Sentiment of a message in [-1, 1]; 0 (neutral) on any failure.
    pub async fn analyze_sentiment(&self, message: &str) -> f64 {
        let messages = serde_json::json!([
            {
                "role": "system",
                "content": "Analyze the sentiment of the following message and return only a \
                            number between -1 (very negative) and 1 (very positive). Return 0 \
                            for neutral. Do not include any other text."
            },
            { "role": "user", "content": message },
        ]);

        match self.complete(&self.light_model, messages, 10, 0.1).await {
            Ok(text) => text.parse::<f64>().unwrap_or(0.0).clamp(-1.0, 1.0),
            Err(e) => {
                warn!("Sentiment analysis failed: {}", e);
                0.0
            }
        }
    }

    /// Topics of interest mentioned in a message; empty on failure.
    pub async fn extract_keywords(&self, message: &str) -> Vec<String> {
        let prompt = format!(
            "Extract 2-3 key topics or interests from this user message. \
             Return as a JSON array of strings, no other text.\n\nMessage: \"{}\"",
            message
        );
        let messages = serde_json::json!([{ "role": "user", "content": prompt }]);

        match self.complete(&self.light_model, messages, 100, 0.3).await {
            Ok(text) => serde_json::from_str::<Vec<String>>(&text).unwrap_or_default(),
            Err(e) => {
                warn!("Keyword extraction failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Generate a stage-appropriate daily challenge.
    pub async fn daily_challenge(&self, stage: EvolutionStage) -> String {
        let theme = match stage {
            EvolutionStage::Egg => "simple awareness and connection tasks",
            EvolutionStage::Hatchling => "basic interaction and exploration tasks",
            EvolutionStage::Juvenile => "learning and growth-oriented challenges",
            EvolutionStage::Ascended => "wisdom and guidance-based tasks",
            EvolutionStage::Celestial => "transcendent and cosmic challenges",
        };
        let prompt = format!(
            "Generate a creative daily challenge for a {} creature companion. \
             The challenge should involve {}. Make it engaging, achievable, and \
             related to personal growth or creativity. Return only the challenge \
             description, no additional text.",
            stage.display_name(),
            theme
        );
        let messages = serde_json::json!([{ "role": "user", "content": prompt }]);

        match self.complete(&self.light_model, messages, 100, 0.8).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => FALLBACK_CHALLENGE.to_string(),
            Err(e) => {
                warn!("Daily challenge generation failed: {}", e);
                FALLBACK_CHALLENGE.to_string()
            }
        }
    }

    /// Short celebration message for a completed evolution.
    pub async fn evolution_message(&self, from: EvolutionStage, to: EvolutionStage) -> String {
        let prompt = format!(
            "Generate a celebratory message for a creature evolving from {} to {}. \
             The message should be inspiring, mystical, and acknowledge the growth. \
             Keep it to 1-2 sentences. Return only the message.",
            from.display_name(),
            to.display_name()
        );
        let messages = serde_json::json!([{ "role": "user", "content": prompt }]);

        match self.complete(&self.light_model, messages, 80, 0.9).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => FALLBACK_EVOLUTION_MESSAGE.to_string(),
            Err(e) => {
                warn!("Evolution message generation failed: {}", e);
                FALLBACK_EVOLUTION_MESSAGE.to_string()
            }
        }
    }

    /// Reflect on recent conversations and propose a refined personality
    /// that mirrors how the user actually talks. Needs at least three
    /// conversations to have anything to reflect on; returns None when
    /// history is too thin or the generation fails, leaving the current
    /// profile untouched.
    pub async fn reflect_personality(
        &self,
        current: &PersonalityProfile,
        history: &[ConversationRecord],
    ) -> Option<PersonalityProfile> {
        if history.len() < 3 {
            return None;
        }

        let context = history
            .iter()
            .rev()
            .map(|conv| format!("User: {}\nQuib: {}", conv.message, conv.response))
            .collect::<Vec<_>>()
            .join("\n\n");
        let current_json = serde_json::to_string_pretty(current).ok()?;

        let prompt = format!(
            "Based on these recent conversations, analyze the user's communication style \
             and interests, then suggest updates to the Quib's personality to better \
             connect with them.\n\nRecent conversations:\n{}\n\nCurrent personality:\n{}\n\n\
             Respond with a JSON object containing updated personality traits. Focus on:\n\
             - Adjusting tone and energy based on the user's communication style\n\
             - Adding user-specific keywords they mention frequently\n\
             - Refining quirks and communication style\n\
             - Updating mood state based on recent interactions\n\n\
             Keep the core personality but make it more personalized to this user. \
             Return only the JSON object.",
            context, current_json
        );
        let messages = serde_json::json!([{ "role": "user", "content": prompt }]);

        match self.complete(&self.light_model, messages, 600, 0.7).await {
            Ok(text) => match serde_json::from_str::<PersonalityProfile>(&text) {
                Ok(profile) => {
                    info!("Personality reflection produced an update");
                    Some(profile)
                }
                Err(e) => {
                    warn!("Personality reflection returned invalid JSON: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("Personality reflection failed: {}", e);
                None
            }
        }
    }

    /// Generate an initial personality for a newborn creature. The
    /// default profile stands in whenever generation fails or returns
    /// something unparseable.
    pub async fn initial_personality(&self) -> PersonalityProfile {
        let prompt = "Generate a unique personality profile for a digital creature companion. \
                      Respond with a JSON object containing: energy (\"high\", \"medium\" or \
                      \"low\"), tone (\"playful\", \"calm\", \"mystical\" or \"goofy\"), \
                      bond_type (\"loyal guardian\", \"chaotic sidekick\" or \"curious \
                      spirit\"), favorite_words (3-5 strings), user_keywords (empty array), \
                      evolution_path_variant (\"A\", \"B\" or \"C\"), mood_state, quirks \
                      (2-3 strings) and communication_style. Return only the JSON object.";
        let messages = serde_json::json!([{ "role": "user", "content": prompt }]);

        match self.complete(&self.light_model, messages, 500, 0.9).await {
            Ok(text) => match serde_json::from_str::<PersonalityProfile>(&text) {
                Ok(profile) => {
                    info!("Generated initial personality ({})", profile.tone);
                    profile
                }
                Err(e) => {
                    warn!("Personality generation returned invalid JSON: {}", e);
                    PersonalityProfile::default()
                }
            },
            Err(e) => {
                warn!("Personality generation failed: {}", e);
                PersonalityProfile::default()
            }
        }
    }
}

/// System prompt for a chat turn: stage voice, personality, mood and a
/// short tail of conversation context.
fn build_chat_context(
    personality: &PersonalityProfile,
    stage: EvolutionStage,
    mood_score: f64,
    history: &[ConversationRecord],
) -> String {
    let stage_voice = match stage {
        EvolutionStage::Egg => {
            "You are a mysterious egg, just beginning to form consciousness. You communicate \
             in simple, curious sounds and feelings."
        }
        EvolutionStage::Hatchling => {
            "You are a young, energetic creature just hatched from an egg. You are curious, \
             playful, and learning about the world. You speak in simple, excited sentences."
        }
        EvolutionStage::Juvenile => {
            "You are a growing creature with developing intelligence. You are more articulate \
             but still playful and curious. You ask questions and show interest in learning."
        }
        EvolutionStage::Ascended => {
            "You are a wise, evolved creature with deep understanding. You speak thoughtfully \
             and offer guidance while maintaining a mystical presence."
        }
        EvolutionStage::Celestial => {
            "You are a transcendent being of great wisdom and power. You speak with profound \
             insight and cosmic understanding, yet remain approachable."
        }
    };

    let mut context = format!(
        "{}\n\nYou are Quib, the user's digital companion. Your tone is {}, your energy is \
         {}, and you are their {}. Your current mood is {} (mood score: {:.0}).\n\
         Communication style: {}.\n",
        stage_voice,
        personality.tone,
        personality.energy,
        personality.bond_type,
        personality::mood_state(mood_score),
        mood_score,
        personality.communication_style,
    );

    if !personality.favorite_words.is_empty() {
        context.push_str(&format!(
            "Your favorite words include: {}.\n",
            personality.favorite_words.join(", ")
        ));
    }
    if !personality.user_keywords.is_empty() {
        context.push_str(&format!(
            "You remember they often talk about: {}.\n",
            personality.user_keywords.join(", ")
        ));
    }
    if !personality.quirks.is_empty() {
        context.push_str(&format!("Quirks: {}.\n", personality.quirks.join(", ")));
    }

    context.push_str(
        "Respond naturally, warmly and adaptively; mirror the user's tone and energy. \
         Stay universally relatable regardless of culture, gender, or age.\n",
    );

    if !history.is_empty() {
        context.push_str("\nRecent conversation context:\n");
        // History arrives newest first; replay oldest first.
        for conv in history.iter().rev().take(5) {
            context.push_str(&format!("User: {}\nYou: {}\n", conv.message, conv.response));
        }
    }

    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn client(api_key: &str) -> AiClient {
        AiClient::new(
            "http://127.0.0.1:1".to_string(),
            api_key.to_string(),
            "gpt-4".to_string(),
            "gpt-3.5-turbo".to_string(),
            1,
        )
        .unwrap()
    }

    #[test]
    fn disabled_without_api_key() {
        assert!(!client("").enabled());
        assert!(client("sk-test").enabled());
    }

    #[tokio::test]
    async fn disabled_client_degrades_to_defaults() {
        let client = client("");
        assert_eq!(client.analyze_sentiment("great day!").await, 0.0);
        assert!(client.extract_keywords("great day!").await.is_empty());
        assert_eq!(
            client.daily_challenge(EvolutionStage::Hatchling).await,
            FALLBACK_CHALLENGE
        );
        assert_eq!(
            client
                .evolution_message(EvolutionStage::Hatchling, EvolutionStage::Juvenile)
                .await,
            FALLBACK_EVOLUTION_MESSAGE
        );
        assert_eq!(client.initial_personality().await, PersonalityProfile::default());
    }

    #[tokio::test]
    async fn unreachable_endpoint_degrades_to_fallback_reply() {
        // Key set but nothing listening: every call errs and falls back.
        let client = client("sk-test");
        let reply = client
            .creature_reply(
                "hello",
                &PersonalityProfile::default(),
                EvolutionStage::Hatchling,
                50.0,
                &[],
            )
            .await;
        assert_eq!(reply.response, FALLBACK_REPLY);
        assert_eq!(reply.sentiment_score, 0.0);
        assert!(reply.keywords.is_empty());
    }

    fn history_of(n: usize) -> Vec<ConversationRecord> {
        (0..n)
            .map(|i| ConversationRecord {
                id: format!("c{}", i),
                user_id: "u1".to_string(),
                message: format!("message {}", i),
                response: "reply".to_string(),
                sentiment_score: Some(0.2),
                timestamp: Utc::now(),
            })
            .collect()
    }

    #[tokio::test]
    async fn reflection_needs_enough_history() {
        let client = client("sk-test");
        let profile = PersonalityProfile::default();
        assert!(client.reflect_personality(&profile, &[]).await.is_none());
        assert!(client
            .reflect_personality(&profile, &history_of(2))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn failed_reflection_leaves_profile_alone() {
        // Enough history, but nothing listening upstream.
        let client = client("sk-test");
        let profile = PersonalityProfile::default();
        assert!(client
            .reflect_personality(&profile, &history_of(5))
            .await
            .is_none());
    }

    #[test]
    fn chat_context_mentions_stage_and_memory() {
        let mut profile = PersonalityProfile::default();
        profile.user_keywords = vec!["astronomy".to_string()];
        let history = vec![ConversationRecord {
            id: "c1".to_string(),
            user_id: "u1".to_string(),
            message: "hi there".to_string(),
            response: "hello!".to_string(),
            sentiment_score: Some(0.4),
            timestamp: Utc::now(),
        }];

        let context =
            build_chat_context(&profile, EvolutionStage::Ascended, 85.0, &history);
        assert!(context.contains("wise, evolved creature"));
        assert!(context.contains("astronomy"));
        assert!(context.contains("hi there"));
        assert!(context.contains("excited"));
    }
}
