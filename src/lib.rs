//! Questline - points, quests and achievements for community apps
//!
//! Questline keeps the gamification state of a community app consistent over a
//! plain document store:
//!
//! - [`ledger::Ledger`]: a non-negative points balance per user with an
//!   append-only transaction history
//! - [`progress::QuestProgress`]: turns quiz answers, event participation,
//!   unlocks and earned points into quest progress, completion and rewards
//! - [`achievements::Achievements`]: at-most-once unlock of collectibles per user
//!
//! ## Consistency
//!
//! The store only offers per-document writes. Every engine write is a
//! read-modify-write guarded by the document version
//! ([`store::DocumentStore::update_if`]) and serialized in-process per document.
//! Replays are absorbed by idempotency keys (see [`domain::Source`]): a quiz,
//! event or collectible counts once per quest, and a quest reward is credited
//! once per user.

pub mod achievements;
pub mod activity;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod locks;
pub mod progress;
pub mod store;

pub use domain::*;
pub use engine::Engine;
