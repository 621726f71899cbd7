use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::UserId;

/// What a quest asks of a user. Persisted as `{ "type": ..., "value": ... }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum QuestRequirement {
    /// Answer N different quizzes correctly
    QuizCompletion(i64),
    /// Take part in N events
    EventParticipation(i64),
    /// Collect N achievements
    AchievementCollection(i64),
    /// Earn N points in total (cumulative amount, not a count)
    PointsEarned(i64),
}

/// Requirement discriminant, used to select the quests a game event feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequirementKind {
    QuizCompletion,
    EventParticipation,
    AchievementCollection,
    PointsEarned,
}

impl RequirementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuizCompletion => "quizCompletion",
            Self::EventParticipation => "eventParticipation",
            Self::AchievementCollection => "achievementCollection",
            Self::PointsEarned => "pointsEarned",
        }
    }
}

impl QuestRequirement {
    pub fn kind(&self) -> RequirementKind {
        match self {
            Self::QuizCompletion(_) => RequirementKind::QuizCompletion,
            Self::EventParticipation(_) => RequirementKind::EventParticipation,
            Self::AchievementCollection(_) => RequirementKind::AchievementCollection,
            Self::PointsEarned(_) => RequirementKind::PointsEarned,
        }
    }

    /// Completion threshold. `None` for a non-positive value: such a quest never completes.
    pub fn total_required(&self) -> Option<i64> {
        let value = match *self {
            Self::QuizCompletion(n)
            | Self::EventParticipation(n)
            | Self::AchievementCollection(n)
            | Self::PointsEarned(n) => n,
        };
        (value > 0).then_some(value)
    }

    pub fn describe(&self) -> String {
        match self {
            Self::QuizCompletion(n) => format!("Complete {n} different quizzes"),
            Self::EventParticipation(n) => format!("Participate in {n} events"),
            Self::AchievementCollection(n) => format!("Collect {n} country achievements"),
            Self::PointsEarned(n) => format!("Earn {n} points"),
        }
    }
}

/// Per (quest, user) lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestState {
    NotStarted,
    InProgress(i64),
    Completed,
}

/// Result of applying a progress change to a quest in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressChange {
    /// User already completed the quest. Terminal, nothing changed.
    AlreadyCompleted,
    /// The source was already counted for this user
    AlreadyCounted,
    /// Nothing to remove (source never counted, or progress already zero)
    NotCounted,
    /// Recomputed value equals the stored one
    Unchanged,
    Advanced { progress: i64 },
    Retreated { progress: i64 },
    /// Threshold crossed on this change; progress is pinned to the threshold
    Completed { progress: i64 },
}

impl ProgressChange {
    /// Whether the quest document must be written back
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Advanced { .. } | Self::Retreated { .. } | Self::Completed { .. }
        )
    }
}

/// The `quests/{id}` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Reward credited once on completion
    pub points: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub requirement: QuestRequirement,
    #[serde(default)]
    pub participants: Vec<UserId>,
    /// Grows monotonically
    #[serde(default)]
    pub completed_by: Vec<UserId>,
    /// Denormalized sum of `user_progress`, display only
    #[serde(default)]
    pub progress: i64,
    #[serde(default)]
    pub user_progress: BTreeMap<UserId, i64>,
    /// Real-world units already counted per user (`quiz:<id>`, `event:<id>`, ...)
    #[serde(default)]
    pub user_sources: BTreeMap<UserId, Vec<String>>,
}

impl Quest {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        points: i64,
        requirement: QuestRequirement,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: requirement.describe(),
            points,
            start_date,
            end_date,
            requirement,
            participants: Vec::new(),
            completed_by: Vec::new(),
            progress: 0,
            user_progress: BTreeMap::new(),
            user_sources: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && now <= self.end_date
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }

    pub fn has_ended_at(&self, now: DateTime<Utc>) -> bool {
        now > self.end_date
    }

    pub fn has_ended(&self) -> bool {
        self.has_ended_at(Utc::now())
    }

    pub fn is_completed_by(&self, user: &UserId) -> bool {
        self.completed_by.contains(user)
    }

    pub fn progress_for(&self, user: &UserId) -> i64 {
        self.user_progress.get(user).copied().unwrap_or(0)
    }

    pub fn sources_for(&self, user: &UserId) -> &[String] {
        self.user_sources.get(user).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn state_for(&self, user: &UserId) -> QuestState {
        if self.is_completed_by(user) {
            return QuestState::Completed;
        }
        match self.progress_for(user) {
            0 => QuestState::NotStarted,
            n => QuestState::InProgress(n),
        }
    }

    /// Share of the threshold reached, clamped to 0.0..=1.0
    pub fn progress_fraction(&self, user: &UserId) -> f64 {
        if self.is_completed_by(user) {
            return 1.0;
        }
        match self.requirement.total_required() {
            Some(total) => (self.progress_for(user) as f64 / total as f64).clamp(0.0, 1.0),
            None => 0.0,
        }
    }

    /// Add `amount` for `user`, counting `source` at most once
    pub fn apply_increment(
        &mut self,
        user: &UserId,
        amount: i64,
        source: Option<&str>,
    ) -> ProgressChange {
        if self.is_completed_by(user) {
            return ProgressChange::AlreadyCompleted;
        }
        if amount <= 0 {
            return ProgressChange::Unchanged;
        }
        if let Some(source) = source {
            let sources = self.user_sources.entry(user.clone()).or_default();
            if sources.iter().any(|s| s == source) {
                return ProgressChange::AlreadyCounted;
            }
            sources.push(source.to_string());
        }

        let next = self.progress_for(user) + amount;
        self.user_progress.insert(user.clone(), next);
        self.add_participant(user);
        self.settle(user, next, ProgressChange::Advanced { progress: next })
    }

    /// Take back one unit for `user`, never going below zero
    pub fn apply_decrement(&mut self, user: &UserId, source: Option<&str>) -> ProgressChange {
        if self.is_completed_by(user) {
            return ProgressChange::AlreadyCompleted;
        }
        if let Some(source) = source {
            let Some(sources) = self.user_sources.get_mut(user) else {
                return ProgressChange::NotCounted;
            };
            let before = sources.len();
            sources.retain(|s| s != source);
            if sources.len() == before {
                return ProgressChange::NotCounted;
            }
        }

        let current = self.progress_for(user);
        if current <= 0 {
            return ProgressChange::NotCounted;
        }
        let next = current - 1;
        self.user_progress.insert(user.clone(), next);
        self.recompute_progress();
        ProgressChange::Retreated { progress: next }
    }

    /// Replace the user's progress with a value derived from history
    pub fn apply_recompute(
        &mut self,
        user: &UserId,
        value: i64,
        mut sources: Vec<String>,
    ) -> ProgressChange {
        if self.is_completed_by(user) {
            return ProgressChange::AlreadyCompleted;
        }
        let value = value.max(0);
        sources.sort();
        sources.dedup();

        let current = self.progress_for(user);
        let mut stored = self.sources_for(user).to_vec();
        stored.sort();
        if value == current && sources == stored {
            return ProgressChange::Unchanged;
        }

        self.user_progress.insert(user.clone(), value);
        if sources.is_empty() {
            self.user_sources.remove(user);
        } else {
            self.user_sources.insert(user.clone(), sources);
        }
        if value > 0 {
            self.add_participant(user);
        }
        let change = if value >= current {
            ProgressChange::Advanced { progress: value }
        } else {
            ProgressChange::Retreated { progress: value }
        };
        self.settle(user, value, change)
    }

    /// Recompute the denormalized `progress` sum
    pub fn recompute_progress(&mut self) {
        self.progress = self.user_progress.values().sum();
    }

    fn add_participant(&mut self, user: &UserId) {
        if !self.participants.contains(user) {
            self.participants.push(user.clone());
        }
    }

    fn settle(&mut self, user: &UserId, value: i64, otherwise: ProgressChange) -> ProgressChange {
        match self.requirement.total_required() {
            Some(total) if value >= total => {
                self.completed_by.push(user.clone());
                self.user_progress.insert(user.clone(), total);
                self.recompute_progress();
                ProgressChange::Completed { progress: total }
            }
            _ => {
                self.recompute_progress();
                otherwise
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn quest(requirement: QuestRequirement) -> Quest {
        let now = Utc::now();
        Quest::new(
            "q1",
            "Quick Learner",
            75,
            requirement,
            now - Duration::days(1),
            now + Duration::days(1),
        )
    }

    #[test]
    fn test_requirement_wire_format() {
        let value = serde_json::to_value(QuestRequirement::PointsEarned(1000)).unwrap();
        assert_eq!(value, json!({ "type": "pointsEarned", "value": 1000 }));

        let parsed: QuestRequirement =
            serde_json::from_value(json!({ "type": "quizCompletion", "value": 5 })).unwrap();
        assert_eq!(parsed, QuestRequirement::QuizCompletion(5));
    }

    #[test]
    fn test_increment_until_completion() {
        let user = UserId::new("u1");
        let mut q = quest(QuestRequirement::QuizCompletion(5));

        for i in 1..=4 {
            let source = format!("quiz:{i}");
            assert_eq!(
                q.apply_increment(&user, 1, Some(&source)),
                ProgressChange::Advanced { progress: i }
            );
        }
        assert_eq!(q.state_for(&user), QuestState::InProgress(4));
        assert!(!q.is_completed_by(&user));

        assert_eq!(
            q.apply_increment(&user, 1, Some("quiz:5")),
            ProgressChange::Completed { progress: 5 }
        );
        assert_eq!(q.state_for(&user), QuestState::Completed);
        assert_eq!(q.progress, 5);
        assert_eq!(q.participants, vec![user]);
    }

    #[test]
    fn test_overshoot_is_pinned_to_threshold() {
        let user = UserId::new("u1");
        let mut q = quest(QuestRequirement::PointsEarned(1000));

        assert_eq!(
            q.apply_increment(&user, 999, None),
            ProgressChange::Advanced { progress: 999 }
        );
        assert_eq!(
            q.apply_increment(&user, 50, None),
            ProgressChange::Completed { progress: 1000 }
        );
        assert_eq!(q.progress_for(&user), 1000);
    }

    #[test]
    fn test_completed_is_terminal_under_replay() {
        let user = UserId::new("u1");
        let mut q = quest(QuestRequirement::EventParticipation(1));
        q.apply_increment(&user, 1, Some("event:a"));

        assert_eq!(
            q.apply_increment(&user, 1, Some("event:b")),
            ProgressChange::AlreadyCompleted
        );
        assert_eq!(
            q.apply_decrement(&user, Some("event:a")),
            ProgressChange::AlreadyCompleted
        );
        assert_eq!(
            q.apply_recompute(&user, 0, vec![]),
            ProgressChange::AlreadyCompleted
        );
        assert_eq!(q.progress_for(&user), 1);
        assert_eq!(q.completed_by.len(), 1);
    }

    #[test]
    fn test_same_source_counts_once() {
        let user = UserId::new("u1");
        let mut q = quest(QuestRequirement::QuizCompletion(5));

        q.apply_increment(&user, 1, Some("quiz:a"));
        assert_eq!(
            q.apply_increment(&user, 1, Some("quiz:a")),
            ProgressChange::AlreadyCounted
        );
        assert_eq!(q.progress_for(&user), 1);
    }

    #[test]
    fn test_join_leave_join_restores_progress() {
        let user = UserId::new("u1");
        let mut q = quest(QuestRequirement::EventParticipation(5));

        q.apply_increment(&user, 1, Some("event:x"));
        q.apply_increment(&user, 1, Some("event:a"));
        let after_join = q.progress_for(&user);

        assert_eq!(
            q.apply_decrement(&user, Some("event:a")),
            ProgressChange::Retreated { progress: 1 }
        );
        q.apply_increment(&user, 1, Some("event:a"));
        assert_eq!(q.progress_for(&user), after_join);
    }

    #[test]
    fn test_decrement_never_goes_below_zero() {
        let user = UserId::new("u1");
        let mut q = quest(QuestRequirement::EventParticipation(5));

        assert_eq!(q.apply_decrement(&user, None), ProgressChange::NotCounted);
        assert_eq!(
            q.apply_decrement(&user, Some("event:never-joined")),
            ProgressChange::NotCounted
        );
        assert_eq!(q.progress_for(&user), 0);
    }

    #[test]
    fn test_recompute_sets_rather_than_adds() {
        let user = UserId::new("u1");
        let mut q = quest(QuestRequirement::QuizCompletion(10));
        q.apply_increment(&user, 1, Some("quiz:a"));

        let sources = vec!["quiz:a".to_string(), "quiz:b".to_string()];
        assert_eq!(
            q.apply_recompute(&user, 2, sources.clone()),
            ProgressChange::Advanced { progress: 2 }
        );
        assert_eq!(q.apply_recompute(&user, 2, sources), ProgressChange::Unchanged);
        assert_eq!(q.progress_for(&user), 2);

        // A live replay of an already-recomputed unit is not counted again
        assert_eq!(
            q.apply_increment(&user, 1, Some("quiz:b")),
            ProgressChange::AlreadyCounted
        );
    }

    #[test]
    fn test_progress_sum_tracks_all_users() {
        let a = UserId::new("a");
        let b = UserId::new("b");
        let mut q = quest(QuestRequirement::QuizCompletion(3));

        q.apply_increment(&a, 1, None);
        q.apply_increment(&b, 2, None);
        assert_eq!(q.progress, 3);
        assert_eq!(q.progress_fraction(&b), 2.0 / 3.0);
    }

    #[test]
    fn test_zero_threshold_never_completes() {
        let user = UserId::new("u1");
        let mut q = quest(QuestRequirement::QuizCompletion(0));

        assert_eq!(
            q.apply_increment(&user, 3, None),
            ProgressChange::Advanced { progress: 3 }
        );
        assert!(!q.is_completed_by(&user));
        assert_eq!(q.progress_fraction(&user), 0.0);
    }

    #[test]
    fn test_activity_window() {
        let q = quest(QuestRequirement::QuizCompletion(1));
        assert!(q.is_active());
        assert!(!q.is_active_at(q.end_date + Duration::seconds(1)));
        assert!(q.is_active_at(q.start_date));

        // Not yet open is inactive but not ended
        let before = q.start_date - Duration::seconds(1);
        assert!(!q.is_active_at(before));
        assert!(!q.has_ended_at(before));
        assert!(!q.has_ended());
        assert!(q.has_ended_at(q.end_date + Duration::seconds(1)));
    }
}
