//! Side effects requested by the reasoning service alongside a reply.
//!
//! Every known kind maps to exactly one idempotent store call. Calls are
//! spawned and never awaited by the turn cycle; unknown kinds are ignored.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// `{ "type": "...", ...fields }` as returned by the reasoning service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl ActionEnvelope {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Map::new(),
        }
    }

    pub fn action_kind(&self) -> ActionKind {
        ActionKind::parse(&self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    TaskCreated,
    QuestCreated,
    QuestUpdated,
    RoutineCreated,
    BlockApps,
    UnblockApps,
    Unknown(String),
}

impl ActionKind {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "task_created" => ActionKind::TaskCreated,
            "quest_created" => ActionKind::QuestCreated,
            "quest_updated" => ActionKind::QuestUpdated,
            "routine_created" => ActionKind::RoutineCreated,
            "block_apps" => ActionKind::BlockApps,
            "unblock_apps" => ActionKind::UnblockApps,
            other => ActionKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::TaskCreated => "task_created",
            ActionKind::QuestCreated => "quest_created",
            ActionKind::QuestUpdated => "quest_updated",
            ActionKind::RoutineCreated => "routine_created",
            ActionKind::BlockApps => "block_apps",
            ActionKind::UnblockApps => "unblock_apps",
            ActionKind::Unknown(tag) => tag,
        }
    }
}

/// Application stores the dispatcher may poke. Each call must be idempotent.
#[async_trait]
pub trait DomainStores: Send + Sync {
    async fn refresh_quests(&self);
    async fn refresh_routines(&self);
    async fn notify_tasks_refreshed(&self);
    async fn start_app_blocking(&self);
    async fn stop_app_blocking(&self);

    /// Feature flag: is app blocking available to this user?
    fn app_blocking_enabled(&self) -> bool;

    /// Is blocking currently active? Sent with every request.
    fn apps_blocked(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Applied(ActionKind),
    /// Known kind whose precondition did not hold (e.g. feature flag off).
    Skipped(ActionKind),
    Ignored(String),
}

#[derive(Clone)]
pub struct ActionDispatcher {
    stores: Arc<dyn DomainStores>,
}

impl ActionDispatcher {
    pub fn new(stores: Arc<dyn DomainStores>) -> Self {
        Self { stores }
    }

    /// Fire-and-continue: returns as soon as the store call is scheduled.
    /// Must be called from within a tokio runtime.
    pub fn apply(&self, envelope: &ActionEnvelope) -> DispatchOutcome {
        let kind = envelope.action_kind();

        if kind == ActionKind::BlockApps && !self.stores.app_blocking_enabled() {
            debug!("block_apps skipped: feature disabled");
            return DispatchOutcome::Skipped(kind);
        }
        if let ActionKind::Unknown(tag) = &kind {
            debug!(tag = %tag, "ignoring unknown action");
            return DispatchOutcome::Ignored(tag.clone());
        }

        info!(kind = kind.as_str(), "applying action");
        let stores = Arc::clone(&self.stores);
        let task_kind = kind.clone();
        tokio::spawn(async move {
            match task_kind {
                ActionKind::TaskCreated => stores.notify_tasks_refreshed().await,
                ActionKind::QuestCreated | ActionKind::QuestUpdated => stores.refresh_quests().await,
                ActionKind::RoutineCreated => stores.refresh_routines().await,
                ActionKind::BlockApps => stores.start_app_blocking().await,
                ActionKind::UnblockApps => stores.stop_app_blocking().await,
                ActionKind::Unknown(_) => {}
            }
        });

        DispatchOutcome::Applied(kind)
    }

    pub fn apps_blocked(&self) -> bool {
        self.stores.apps_blocked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingStores {
        calls: Mutex<Vec<&'static str>>,
        blocking_enabled: bool,
        hang: bool,
    }

    impl RecordingStores {
        async fn record(&self, name: &'static str) {
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.calls.lock().unwrap().push(name);
        }
    }

    #[async_trait]
    impl DomainStores for RecordingStores {
        async fn refresh_quests(&self) {
            self.record("quests").await
        }
        async fn refresh_routines(&self) {
            self.record("routines").await
        }
        async fn notify_tasks_refreshed(&self) {
            self.record("tasks").await
        }
        async fn start_app_blocking(&self) {
            self.record("block").await
        }
        async fn stop_app_blocking(&self) {
            self.record("unblock").await
        }
        fn app_blocking_enabled(&self) -> bool {
            self.blocking_enabled
        }
        fn apps_blocked(&self) -> bool {
            false
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn known_kinds_map_to_one_store_call() {
        let stores = Arc::new(RecordingStores {
            blocking_enabled: true,
            ..Default::default()
        });
        let dispatcher = ActionDispatcher::new(stores.clone());

        for tag in ["task_created", "quest_created", "quest_updated", "routine_created", "block_apps", "unblock_apps"] {
            assert!(matches!(dispatcher.apply(&ActionEnvelope::new(tag)), DispatchOutcome::Applied(_)));
        }
        settle().await;

        let mut calls = stores.calls.lock().unwrap().clone();
        calls.sort();
        assert_eq!(calls, vec!["block", "quests", "quests", "routines", "tasks", "unblock"]);
    }

    #[tokio::test]
    async fn unknown_kind_is_ignored() {
        let stores = Arc::new(RecordingStores::default());
        let dispatcher = ActionDispatcher::new(stores.clone());

        let outcome = dispatcher.apply(&ActionEnvelope::new("habit_streak_party"));
        settle().await;

        assert_eq!(outcome, DispatchOutcome::Ignored("habit_streak_party".into()));
        assert!(stores.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn block_apps_requires_feature_flag() {
        let stores = Arc::new(RecordingStores::default());
        let dispatcher = ActionDispatcher::new(stores.clone());

        let outcome = dispatcher.apply(&ActionEnvelope::new("block_apps"));
        settle().await;

        assert_eq!(outcome, DispatchOutcome::Skipped(ActionKind::BlockApps));
        assert!(stores.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn apply_does_not_wait_for_the_store() {
        let stores = Arc::new(RecordingStores {
            hang: true,
            ..Default::default()
        });
        let dispatcher = ActionDispatcher::new(stores);

        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            async { dispatcher.apply(&ActionEnvelope::new("quest_updated")) },
        )
        .await;
        assert!(matches!(outcome, Ok(DispatchOutcome::Applied(ActionKind::QuestUpdated))));
    }
}
