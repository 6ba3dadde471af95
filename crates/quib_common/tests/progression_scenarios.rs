//! End-to-end progression scenarios against a real (in-memory) store.

use chrono::{Duration, Utc};
use quib_common::personality::{self, PersonalityProfile};
use quib_common::types::TaskType;
use quib_common::{EvolutionStage, ProgressionEngine, QuibError, Store};
use std::sync::Arc;

fn setup(account_age_hours: i64) -> (ProgressionEngine, Arc<Store>, String) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let user = store
        .create_user(Some("player@example.com"), Some("player"), Some("hash"), None)
        .unwrap();
    store
        .set_user_created_at(&user.id, Utc::now() - Duration::hours(account_age_hours))
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

/// A Hatchling with 5 challenges, 20 chats, a 72-hour-old account and a
/// good mood clears the Juvenile gates (3 challenges, 15 chats, 48h) and
/// evolves naturally, collecting the Juvenile XP bonus and token claim.
#[test]
fn hatchling_ready_for_juvenile_evolves_naturally() {
    let (engine, store, user_id) = setup(72);

    for i in 0..5 {
        store
            .create_task(&user_id, TaskType::DailyChallenge, &format!("c{}", i), None)
            .unwrap();
    }
    for i in 0..20 {
        store
            .create_conversation(&user_id, &format!("m{}", i), "r", Some(0.6))
            .unwrap();
    }

    let creature = store.get_creature(&user_id).unwrap();
    let age = creature.account_age_hours(Utc::now());
    assert!(age >= 48);
    assert!(engine
        .can_advance(&user_id, EvolutionStage::Hatchling, age)
        .unwrap());

    let state = engine.advance(&user_id, false).unwrap();
    assert_eq!(state.current_stage, EvolutionStage::Juvenile);
    assert_eq!(state.xp, EvolutionStage::Juvenile.xp_bonus());

    let (log, total) = store.list_evolution_log(&user_id, 1, 10).unwrap();
    assert_eq!(total, 1);
    assert_eq!(log[0].reason, "natural");

    let claims = store.pending_claims(&user_id).unwrap();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].amount, EvolutionStage::Juvenile.token_reward());
}

/// At the terminal stage advancement always fails, with or without
/// override, leaving zero mutations behind.
#[test]
fn celestial_creature_never_advances() {
    let (engine, store, user_id) = setup(10_000);

    // Walk to the top via override.
    for _ in 0..3 {
        engine.advance(&user_id, true).unwrap();
    }
    assert_eq!(
        store.get_creature(&user_id).unwrap().current_stage,
        EvolutionStage::Celestial
    );
    let xp_before = store.get_creature(&user_id).unwrap().xp;

    for override_gates in [false, true] {
        let err = engine.advance(&user_id, override_gates).unwrap_err();
        assert!(matches!(err, QuibError::AlreadyMaxStage));
    }

    let creature = store.get_creature(&user_id).unwrap();
    assert_eq!(creature.xp, xp_before);
    let (_, total) = store.list_evolution_log(&user_id, 1, 10).unwrap();
    assert_eq!(total, 3);
}

/// Loosening one requirement dimension can only flip the answer from
/// false to true, never the other way.
#[test]
fn can_advance_is_monotonic_in_each_dimension() {
    // Base case: everything exactly at the Juvenile thresholds.
    let (engine, store, user_id) = setup(48);
    for i in 0..3 {
        store
            .create_task(&user_id, TaskType::DailyChallenge, &format!("c{}", i), None)
            .unwrap();
    }
    for i in 0..15 {
        store
            .create_conversation(&user_id, &format!("m{}", i), "r", Some(0.0))
            .unwrap();
    }
    assert!(engine
        .can_advance(&user_id, EvolutionStage::Hatchling, 48)
        .unwrap());

    // More of anything keeps the answer true.
    store
        .create_task(&user_id, TaskType::DailyChallenge, "extra", None)
        .unwrap();
    store
        .create_conversation(&user_id, "extra", "r", Some(1.0))
        .unwrap();
    assert!(engine
        .can_advance(&user_id, EvolutionStage::Hatchling, 500)
        .unwrap());
}

/// Task submissions and chats both feed the same gates; the full flow a
/// route handler runs (record, grant XP, engagement, check) holds the
/// invariants together.
#[test]
fn mixed_activity_flow_keeps_invariants() {
    let (engine, store, user_id) = setup(72);

    for day in 0..3 {
        let today = Utc::now().date_naive() + Duration::days(day);
        for i in 0..5 {
            store
                .create_conversation(&user_id, &format!("d{}m{}", day, i), "r", Some(0.4))
                .unwrap();
            engine.apply_interaction_mood(&user_id, 0.4).unwrap();
            engine.update_engagement_on(&user_id, today).unwrap();
            engine.grant_xp(&user_id, 10).unwrap();
        }
        store
            .create_task(&user_id, TaskType::DailyChallenge, &format!("day {}", day), None)
            .unwrap();
        engine.grant_xp(&user_id, 50).unwrap();
    }

    let creature = store.get_creature(&user_id).unwrap();
    assert!(creature.mood_score <= 100.0 && creature.mood_score >= 0.0);
    assert_eq!(creature.xp, 3 * 5 * 10 + 3 * 50);
    assert_eq!(creature.total_chats, 15);
    assert_eq!(creature.missed_days, 0);

    // 3 challenges, 15 chats, 72h: the Juvenile gates are now clear.
    let state = engine.try_natural_advance(&user_id).unwrap().unwrap();
    assert_eq!(state.current_stage, EvolutionStage::Juvenile);
}
