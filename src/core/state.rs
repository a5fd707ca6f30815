//! Run-scoped state store with exclusive edit access.

use tokio::sync::{Mutex, MutexGuard};

use crate::domain::RunState;

/// Store for the state of one run.
///
/// Created empty when the run starts and dropped with it. Steps run one at a
/// time today, but writers still go through an exclusive guard so the store
/// stays correct if steps are ever parallelized.
#[derive(Debug, Default)]
pub struct StateStore {
    inner: Mutex<RunState>,
}

/// Exclusive write access to the run state, released on drop
pub type StateGuard<'a> = MutexGuard<'a, RunState>;

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire exclusive write access for the lifetime of the guard
    pub async fn edit(&self) -> StateGuard<'_> {
        self.inner.lock().await
    }

    /// Snapshot of the current state
    pub async fn read(&self) -> RunState {
        self.inner.lock().await.clone()
    }

    /// Consume the store, returning the final state
    pub fn into_inner(self) -> RunState {
        self.inner.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChatMessage;

    #[tokio::test]
    async fn test_edit_is_visible_to_later_reads() {
        let store = StateStore::new();
        {
            let mut state = store.edit().await;
            state.file_id = Some("f1".to_string());
        }

        assert_eq!(store.read().await.file_id.as_deref(), Some("f1"));
    }

    #[tokio::test]
    async fn test_snapshot_is_detached() {
        let store = StateStore::new();
        let before = store.read().await;

        store
            .edit()
            .await
            .chat_history
            .push(ChatMessage::user("hello"));

        assert!(before.chat_history.is_empty());
        assert_eq!(store.read().await.chat_history.len(), 1);
    }

    #[tokio::test]
    async fn test_guard_released_on_error_path() {
        let store = StateStore::new();

        async fn failing_edit(store: &StateStore) -> Result<(), String> {
            let mut state = store.edit().await;
            state.sheet_job_id = Some("job".to_string());
            Err("step failed".to_string())
        }

        assert!(failing_edit(&store).await.is_err());

        // Would deadlock if the guard leaked
        let state = store.edit().await;
        assert_eq!(state.sheet_job_id.as_deref(), Some("job"));
    }
}
