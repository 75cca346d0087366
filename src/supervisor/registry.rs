use crate::service::{ProcessHandle, ProcessInfo, ProcessState};

/// Running services keyed by id, kept in start order.
///
/// At most one handle per id. Iteration order is the order in which services
/// were inserted, so stopping in reverse order undoes a start-all.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<ProcessHandle>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `handle`. A handle already tracked under the same id is returned
    /// to the caller, which is responsible for ending it.
    pub fn insert(&mut self, handle: ProcessHandle) -> Option<ProcessHandle> {
        let replaced = self.remove(handle.service_id());
        self.entries.push(handle);
        replaced
    }

    pub fn remove(&mut self, service_id: &str) -> Option<ProcessHandle> {
        let index = self
            .entries
            .iter()
            .position(|h| h.service_id() == service_id)?;
        Some(self.entries.remove(index))
    }

    pub fn contains(&self, service_id: &str) -> bool {
        self.get(service_id).is_some()
    }

    pub fn get(&self, service_id: &str) -> Option<&ProcessHandle> {
        self.entries.iter().find(|h| h.service_id() == service_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tracked ids in start order.
    pub fn ids(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|h| h.service_id().to_string())
            .collect()
    }

    pub fn snapshot(&self) -> Vec<ProcessInfo> {
        self.entries.iter().map(ProcessHandle::info).collect()
    }

    /// Drop every handle whose process has ended on its own and return what
    /// was removed.
    pub fn reap_exited(&mut self) -> Vec<(String, ProcessState)> {
        let mut reaped = Vec::new();
        self.entries.retain_mut(|handle| match handle.poll() {
            Ok(state) if state.is_terminal() => {
                reaped.push((handle.service_id().to_string(), state));
                false
            }
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(
                    "Failed to poll process of '{}': {}",
                    handle.service_id(),
                    e
                );
                true
            }
        });
        reaped
    }
}
