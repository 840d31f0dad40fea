use dashmap::DashMap;
use std::future::Future;
use tracing::warn;

/// Last-caller-wins coordination for concurrent async validations.
///
/// Every call under the same key bumps that key's generation counter before
/// awaiting its task. When the task resolves, its result is committed only if
/// the generation is still the one the call started with; a later call under
/// the same key supersedes it and the stale result is discarded.
#[derive(Debug, Default)]
pub struct DebounceManager {
    generations: DashMap<String, u64>,
}

impl DebounceManager {
    /// Create an empty debounce manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` under `key`, returning its output if this call is still the
    /// latest for the key when the task resolves, or `fallback()` if a newer
    /// call superseded it mid-flight.
    pub async fn debounce<T, F>(&self, key: &str, task: F, fallback: impl FnOnce() -> T) -> T
    where
        F: Future<Output = T>,
    {
        let generation = {
            let mut entry = self.generations.entry(key.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        let result = task.await;

        let current = self.generations.get(key).map(|entry| *entry);
        if current == Some(generation) {
            result
        } else {
            warn!(key, generation, "discarding superseded result");
            fallback()
        }
    }

    /// Drop the generation counter for a key, typically after the keyed
    /// subject is removed
    pub fn forget(&self, key: &str) {
        self.generations.remove(key);
    }
}
