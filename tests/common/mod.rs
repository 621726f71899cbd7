//! Shared fixtures for engine integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use questline::config::Config;
use questline::store::{DocumentStore, InMemoryStore, collections, encode, fetch};
use questline::{Engine, Quest, QuestRequirement, UserId};

/// Engine over a SQLite store in a temporary directory
pub fn sqlite_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let engine = Engine::open(sqlite_config(&temp_dir)).expect("Failed to open store");
    (temp_dir, engine)
}

pub fn sqlite_config(temp_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.store.path = Some(temp_dir.path().join("store.db"));
    config
}

/// Engine over an in-memory store, with the store kept for failure injection
pub fn memory_engine() -> (Arc<InMemoryStore>, Engine) {
    memory_engine_with(Config::default())
}

pub fn memory_engine_with(config: Config) -> (Arc<InMemoryStore>, Engine) {
    let store = Arc::new(InMemoryStore::new());
    let engine = Engine::new(store.clone(), config);
    (store, engine)
}

/// Create and welcome a user (50 points)
pub async fn new_user(engine: &Engine, id: &str) -> UserId {
    let user = UserId::new(id);
    engine
        .ledger
        .setup_initial_points(&user)
        .await
        .expect("Failed to set up user");
    user
}

/// Publish a quest that is active for a day either side of now
pub async fn publish_quest(
    store: &dyn DocumentStore,
    id: &str,
    points: i64,
    requirement: QuestRequirement,
) {
    let now = Utc::now();
    let quest = Quest::new(
        id,
        id,
        points,
        requirement,
        now - Duration::days(1),
        now + Duration::days(1),
    );
    store
        .create(collections::QUESTS, id, encode(&quest).unwrap())
        .await
        .expect("Failed to publish quest");
}

pub async fn load_quest(store: &dyn DocumentStore, id: &str) -> Quest {
    fetch::<Quest>(store, collections::QUESTS, id)
        .await
        .expect("Failed to load quest")
        .0
}

/// Number of history entries carrying `reference`
pub async fn references(engine: &Engine, user: &UserId, reference: &str) -> usize {
    engine
        .ledger
        .account(user)
        .await
        .expect("Failed to load account")
        .points_history
        .iter()
        .filter(|t| t.reference.as_deref() == Some(reference))
        .count()
}
