//! Progression engine: decides when a creature may evolve, performs the
//! transition, and keeps mood and engagement metrics current.
//!
//! Reads are side-effect free and freely retryable. The transition itself
//! goes through `Store::apply_transition`, which conditions the write on
//! the stage read here; a lost race surfaces as `ConcurrentModification`
//! and the caller re-evaluates from fresh state instead of retrying blind.

use crate::error::{QuibError, Result};
use crate::stages::{EvolutionStage, StageRequirements};
use crate::store::Store;
use crate::types::{
    clamp_mood, sentiment_to_mood, CreatureState, EngagementLevel, ProgressSnapshot, TaskType,
    MOOD_NEUTRAL,
};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::info;

/// How many recent conversations feed the mood average.
const RECENT_SENTIMENT_WINDOW: u32 = 50;

#[derive(Clone)]
pub struct ProgressionEngine {
    store: Arc<Store>,
}

impl ProgressionEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Point-in-time aggregate of the activity that gates evolution.
    /// No side effects.
    pub fn progress_snapshot(
        &self,
        user_id: &str,
        account_age_hours: i64,
    ) -> Result<ProgressSnapshot> {
        let daily_challenges = self
            .store
            .count_completed_tasks(user_id, TaskType::DailyChallenge)?;
        let chat_interactions = self.store.count_conversations(user_id)?;
        let mood_score = self
            .store
            .average_recent_sentiment(user_id, RECENT_SENTIMENT_WINDOW)?
            .map(sentiment_to_mood)
            .unwrap_or(MOOD_NEUTRAL);

        Ok(ProgressSnapshot {
            daily_challenges,
            chat_interactions,
            account_age_hours,
            mood_score,
        })
    }

    /// Whether the creature clears every gate of the *next* stage.
    /// Always false at the top of the ladder.
    pub fn can_advance(
        &self,
        user_id: &str,
        current_stage: EvolutionStage,
        account_age_hours: i64,
    ) -> Result<bool> {
        let next = match current_stage.next() {
            Some(stage) => stage,
            None => return Ok(false),
        };
        let snapshot = self.progress_snapshot(user_id, account_age_hours)?;
        Ok(meets_requirements(&snapshot, &next.requirements()))
    }

    /// Advance the creature one stage.
    ///
    /// Fails with `AlreadyMaxStage` at the terminal stage (override
    /// included), `RequirementsNotMet` when gates fail without override,
    /// and `ConcurrentModification` when another request advanced the
    /// creature between our read and write. On any failure nothing is
    /// mutated.
    pub fn advance(&self, user_id: &str, override_gates: bool) -> Result<CreatureState> {
        let creature = self.store.get_creature(user_id)?;
        let current = creature.current_stage;
        let next = current.next().ok_or(QuibError::AlreadyMaxStage)?;

        if !override_gates {
            let age = creature.account_age_hours(Utc::now());
            if !self.can_advance(user_id, current, age)? {
                return Err(QuibError::RequirementsNotMet);
            }
        }

        let reason = if override_gates { "override" } else { "natural" };
        self.store.apply_transition(
            user_id,
            current,
            next,
            next.xp_bonus(),
            reason,
            next.token_reward(),
        )?;

        info!(
            "Creature evolved: user {} from {} to {} ({})",
            user_id, current, next, reason
        );
        self.creature_state(user_id)
    }

    /// Run a progression check after an XP-granting action and advance if
    /// the gates clear. A lost race or freshly failed gate is not an
    /// error here; the creature simply stays put.
    pub fn try_natural_advance(&self, user_id: &str) -> Result<Option<CreatureState>> {
        match self.advance(user_id, false) {
            Ok(state) => Ok(Some(state)),
            Err(QuibError::RequirementsNotMet)
            | Err(QuibError::AlreadyMaxStage)
            | Err(QuibError::ConcurrentModification) => Ok(None),
            Err(other) => Err(other),
        }
    }

    /// Shift mood by sentiment * 10, clamped to the mood bounds.
    /// Returns the persisted mood.
    pub fn apply_interaction_mood(&self, user_id: &str, sentiment_score: f64) -> Result<f64> {
        let sentiment = sentiment_score.clamp(-1.0, 1.0);
        let creature = self.store.get_creature(user_id)?;
        let new_mood = clamp_mood(creature.mood_score + sentiment * 10.0);
        self.store.set_mood(user_id, new_mood)?;
        Ok(new_mood)
    }

    /// Grant XP. Unbounded upward; negative amounts are rejected, the
    /// administrative reset is the only path that lowers XP.
    pub fn grant_xp(&self, user_id: &str, amount: i64) -> Result<()> {
        if amount < 0 {
            return Err(QuibError::InvalidInput(
                "XP grant must be non-negative".to_string(),
            ));
        }
        self.store.add_xp(user_id, amount)
    }

    /// Roll the engagement counters forward for one interaction.
    pub fn update_engagement(&self, user_id: &str) -> Result<EngagementLevel> {
        self.update_engagement_on(user_id, Utc::now().date_naive())
    }

    /// Day-parameterized engagement update. Same calendar day increments
    /// the daily count; a new day restarts it at 1 and books `gap - 1`
    /// missed days when more than one day elapsed. The stored last-chat
    /// day never moves backwards, so a clock regression cannot seed
    /// phantom gaps later.
    pub fn update_engagement_on(&self, user_id: &str, today: NaiveDate) -> Result<EngagementLevel> {
        let creature = self.store.get_creature(user_id)?;

        let (daily, missed, last_day) = match creature.last_chat_date {
            Some(last) if last >= today => {
                (creature.daily_chat_count + 1, creature.missed_days, last)
            }
            Some(last) => {
                let gap = (today - last).num_days();
                let missed = if gap > 1 {
                    creature.missed_days + (gap - 1)
                } else {
                    creature.missed_days
                };
                (1, missed, today)
            }
            None => (1, creature.missed_days, today),
        };

        let level = EngagementLevel::classify(daily, missed);
        self.store.update_engagement(
            user_id,
            daily,
            creature.total_chats + 1,
            missed,
            last_day,
            level,
        )?;
        Ok(level)
    }

    /// Creature row plus derived evolution readiness, as callers see it.
    pub fn creature_state(&self, user_id: &str) -> Result<CreatureState> {
        let creature = self.store.get_creature(user_id)?;
        let age = creature.account_age_hours(Utc::now());
        let can_evolve = self.can_advance(user_id, creature.current_stage, age)?;
        let next_stage = creature.current_stage.next();

        Ok(CreatureState {
            id: creature.id,
            current_stage: creature.current_stage,
            stage_name: creature.current_stage.display_name(),
            mood_score: creature.mood_score,
            xp: creature.xp,
            last_evolution: creature.last_evolution,
            engagement_level: creature.engagement_level,
            can_evolve,
            next_stage,
            next_stage_requirements: next_stage.map(EvolutionStage::requirements),
        })
    }
}

/// All four gates, inclusive comparisons. Zero/absent thresholds never
/// gate.
fn meets_requirements(snapshot: &ProgressSnapshot, req: &StageRequirements) -> bool {
    if snapshot.daily_challenges < req.daily_challenges {
        return false;
    }
    if snapshot.chat_interactions < req.chat_interactions {
        return false;
    }
    if snapshot.account_age_hours < req.account_age_hours {
        return false;
    }
    if let Some(floor) = req.mood_score {
        if snapshot.mood_score < floor {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::personality::{self, PersonalityProfile};
    use chrono::Duration;

    fn engine_with_user() -> (ProgressionEngine, Arc<Store>, String) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let user = store
            .create_user(Some("t@example.com"), Some("tester"), Some("hash"), None)
            .unwrap();
        store
            .create_creature(
                &user.id,
                &PersonalityProfile::default(),
                &personality::random_visual_traits(),
            )
            .unwrap();
        (ProgressionEngine::new(store.clone()), store, user.id)
    }

    fn add_challenges(store: &Store, user_id: &str, n: usize) {
        for i in 0..n {
            store
                .create_task(user_id, TaskType::DailyChallenge, &format!("c{}", i), None)
                .unwrap();
        }
    }

    fn add_chats(store: &Store, user_id: &str, n: usize, sentiment: f64) {
        for i in 0..n {
            store
                .create_conversation(user_id, &format!("m{}", i), "r", Some(sentiment))
                .unwrap();
        }
    }

    #[test]
    fn snapshot_defaults_to_neutral_mood() {
        let (engine, _, user_id) = engine_with_user();
        let snap = engine.progress_snapshot(&user_id, 12).unwrap();
        assert_eq!(snap.daily_challenges, 0);
        assert_eq!(snap.chat_interactions, 0);
        assert_eq!(snap.account_age_hours, 12);
        assert_eq!(snap.mood_score, 50.0);
    }

    #[test]
    fn snapshot_maps_sentiment_onto_mood_range() {
        let (engine, store, user_id) = engine_with_user();
        add_chats(&store, &user_id, 4, 0.6);
        let snap = engine.progress_snapshot(&user_id, 0).unwrap();
        assert_eq!(snap.chat_interactions, 4);
        assert!((snap.mood_score - 80.0).abs() < 1e-9);
    }

    #[test]
    fn terminal_stage_never_advances() {
        let (engine, _, user_id) = engine_with_user();
        assert!(!engine
            .can_advance(&user_id, EvolutionStage::Celestial, 10_000)
            .unwrap());
    }

    #[test]
    fn each_unmet_gate_blocks_alone() {
        let (engine, store, user_id) = engine_with_user();
        // Juvenile needs 3 challenges, 15 chats, 48 hours.
        add_challenges(&store, &user_id, 3);
        add_chats(&store, &user_id, 15, 0.0);
        assert!(engine
            .can_advance(&user_id, EvolutionStage::Hatchling, 48)
            .unwrap());

        // Age just short.
        assert!(!engine
            .can_advance(&user_id, EvolutionStage::Hatchling, 47)
            .unwrap());

        // Fresh user missing challenges.
        let (engine2, store2, user2) = engine_with_user();
        add_chats(&store2, &user2, 15, 0.0);
        assert!(!engine2
            .can_advance(&user2, EvolutionStage::Hatchling, 72)
            .unwrap());

        // Fresh user missing chats.
        let (engine3, store3, user3) = engine_with_user();
        add_challenges(&store3, &user3, 3);
        assert!(!engine3
            .can_advance(&user3, EvolutionStage::Hatchling, 72)
            .unwrap());
    }

    #[test]
    fn mood_gate_is_inclusive() {
        let (engine, store, user_id) = engine_with_user();
        // Ascended: 7 challenges, 168 hours, mood >= 75.
        add_challenges(&store, &user_id, 7);
        // Sentiment 0.5 maps to mood exactly 75.
        add_chats(&store, &user_id, 10, 0.5);
        assert!(engine
            .can_advance(&user_id, EvolutionStage::Juvenile, 168)
            .unwrap());

        // Just below the floor fails.
        let (engine2, store2, user2) = engine_with_user();
        add_challenges(&store2, &user2, 7);
        add_chats(&store2, &user2, 10, 0.49);
        assert!(!engine2
            .can_advance(&user2, EvolutionStage::Juvenile, 168)
            .unwrap());
    }

    #[test]
    fn advance_without_override_fails_and_mutates_nothing() {
        let (engine, store, user_id) = engine_with_user();
        let err = engine.advance(&user_id, false).unwrap_err();
        assert!(matches!(err, QuibError::RequirementsNotMet));

        let creature = store.get_creature(&user_id).unwrap();
        assert_eq!(creature.current_stage, EvolutionStage::Hatchling);
        assert_eq!(creature.xp, 0);
        let (_, total) = store.list_evolution_log(&user_id, 1, 10).unwrap();
        assert_eq!(total, 0);
    }

    #[test]
    fn override_advances_regardless_of_gates() {
        let (engine, store, user_id) = engine_with_user();
        let state = engine.advance(&user_id, true).unwrap();
        assert_eq!(state.current_stage, EvolutionStage::Juvenile);
        assert_eq!(state.xp, EvolutionStage::Juvenile.xp_bonus());

        let (log, total) = store.list_evolution_log(&user_id, 1, 10).unwrap();
        assert_eq!(total, 1);
        assert_eq!(log[0].reason, "override");
        assert_eq!(log[0].from_stage, EvolutionStage::Hatchling);
        assert_eq!(log[0].to_stage, EvolutionStage::Juvenile);
    }

    #[test]
    fn no_stage_skipping_and_rewards_follow_the_table() {
        let (engine, store, user_id) = engine_with_user();
        // Walk the whole ladder by override.
        let mut expected_xp = 0;
        for target in [
            EvolutionStage::Juvenile,
            EvolutionStage::Ascended,
            EvolutionStage::Celestial,
        ] {
            let state = engine.advance(&user_id, true).unwrap();
            expected_xp += target.xp_bonus();
            assert_eq!(state.current_stage, target);
            assert_eq!(state.xp, expected_xp);
        }

        let claims = store.claim_history(&user_id).unwrap();
        let mut amounts: Vec<u64> = claims.iter().map(|c| c.amount).collect();
        amounts.sort_unstable();
        assert_eq!(amounts, vec![500, 2000, 10000]);

        // Terminal: no further advancement, override included.
        assert!(matches!(
            engine.advance(&user_id, false).unwrap_err(),
            QuibError::AlreadyMaxStage
        ));
        assert!(matches!(
            engine.advance(&user_id, true).unwrap_err(),
            QuibError::AlreadyMaxStage
        ));
        let (_, total) = store.list_evolution_log(&user_id, 1, 10).unwrap();
        assert_eq!(total, 3);
    }

    #[test]
    fn mood_delta_compounds_and_clamps() {
        let (engine, _, user_id) = engine_with_user();
        assert_eq!(engine.apply_interaction_mood(&user_id, 1.0).unwrap(), 60.0);
        assert_eq!(engine.apply_interaction_mood(&user_id, 1.0).unwrap(), 70.0);

        for _ in 0..10 {
            engine.apply_interaction_mood(&user_id, 1.0).unwrap();
        }
        assert_eq!(engine.apply_interaction_mood(&user_id, 1.0).unwrap(), 100.0);

        for _ in 0..20 {
            engine.apply_interaction_mood(&user_id, -1.0).unwrap();
        }
        assert_eq!(engine.apply_interaction_mood(&user_id, -1.0).unwrap(), 0.0);

        // Out-of-range sentiment is clamped before applying.
        assert_eq!(engine.apply_interaction_mood(&user_id, 25.0).unwrap(), 10.0);
    }

    #[test]
    fn xp_is_monotonic_under_grants() {
        let (engine, store, user_id) = engine_with_user();
        engine.grant_xp(&user_id, 50).unwrap();
        engine.grant_xp(&user_id, 0).unwrap();
        engine.grant_xp(&user_id, 10).unwrap();
        assert_eq!(store.get_creature(&user_id).unwrap().xp, 60);

        assert!(matches!(
            engine.grant_xp(&user_id, -5).unwrap_err(),
            QuibError::InvalidInput(_)
        ));
        assert_eq!(store.get_creature(&user_id).unwrap().xp, 60);
    }

    #[test]
    fn engagement_same_day_increments_daily_count() {
        let (engine, store, user_id) = engine_with_user();
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();

        engine.update_engagement_on(&user_id, today).unwrap();
        engine.update_engagement_on(&user_id, today).unwrap();

        let creature = store.get_creature(&user_id).unwrap();
        assert_eq!(creature.daily_chat_count, 2);
        assert_eq!(creature.total_chats, 2);
        assert_eq!(creature.missed_days, 0);
        assert_eq!(creature.last_chat_date, Some(today));
    }

    #[test]
    fn engagement_gap_books_missed_days_and_resets_daily() {
        let (engine, store, user_id) = engine_with_user();
        let day1 = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let day4 = day1 + Duration::days(3);

        for _ in 0..5 {
            engine.update_engagement_on(&user_id, day1).unwrap();
        }
        assert_eq!(
            store.get_creature(&user_id).unwrap().engagement_level,
            EngagementLevel::High
        );

        engine.update_engagement_on(&user_id, day4).unwrap();
        let creature = store.get_creature(&user_id).unwrap();
        assert_eq!(creature.daily_chat_count, 1);
        assert_eq!(creature.missed_days, 2);
        assert_eq!(creature.total_chats, 6);
        assert_eq!(creature.engagement_level, EngagementLevel::Low);
    }

    #[test]
    fn engagement_next_day_has_no_missed_days() {
        let (engine, store, user_id) = engine_with_user();
        let day1 = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let day2 = day1 + Duration::days(1);

        engine.update_engagement_on(&user_id, day1).unwrap();
        engine.update_engagement_on(&user_id, day2).unwrap();

        let creature = store.get_creature(&user_id).unwrap();
        assert_eq!(creature.daily_chat_count, 1);
        assert_eq!(creature.missed_days, 0);
    }

    #[test]
    fn engagement_last_day_never_moves_backwards() {
        let (engine, store, user_id) = engine_with_user();
        let day1 = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let day2 = day1 + Duration::days(1);
        let day3 = day1 + Duration::days(2);

        engine.update_engagement_on(&user_id, day2).unwrap();
        // Clock regression: an update dated before the stored day counts
        // as same-day activity and keeps the stored day at day2.
        engine.update_engagement_on(&user_id, day1).unwrap();

        let creature = store.get_creature(&user_id).unwrap();
        assert_eq!(creature.last_chat_date, Some(day2));
        assert_eq!(creature.daily_chat_count, 2);
        assert_eq!(creature.missed_days, 0);

        // The next real day is one step from day2, not from the
        // regressed date, so no phantom missed days appear.
        engine.update_engagement_on(&user_id, day3).unwrap();
        let creature = store.get_creature(&user_id).unwrap();
        assert_eq!(creature.missed_days, 0);
        assert_eq!(creature.daily_chat_count, 1);
        assert_eq!(creature.last_chat_date, Some(day3));
    }

    #[test]
    fn try_natural_advance_swallows_unmet_gates() {
        let (engine, store, user_id) = engine_with_user();
        assert!(engine.try_natural_advance(&user_id).unwrap().is_none());
        assert_eq!(
            store.get_creature(&user_id).unwrap().current_stage,
            EvolutionStage::Hatchling
        );
    }

    #[test]
    fn creature_state_exposes_next_gate() {
        let (engine, _, user_id) = engine_with_user();
        let state = engine.creature_state(&user_id).unwrap();
        assert_eq!(state.current_stage, EvolutionStage::Hatchling);
        assert_eq!(state.next_stage, Some(EvolutionStage::Juvenile));
        let req = state.next_stage_requirements.unwrap();
        assert_eq!(req.daily_challenges, 3);
        assert!(!state.can_evolve);
    }
}
