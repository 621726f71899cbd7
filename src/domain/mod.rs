//! Core domain types for questline
//!
//! These are the persisted shapes of the `users`, `quests`, `achievements`,
//! `quizzes` and `events` collections. Field names are camelCase on disk.

mod activity;
mod collectible;
mod quest;
mod source;
mod user;

pub use activity::{Event, Quiz};
pub use collectible::{Collectible, Unlock};
pub use quest::{ProgressChange, Quest, QuestRequirement, QuestState, RequirementKind};
pub use source::Source;
pub use user::{Transaction, TransactionType, User, UserId};
