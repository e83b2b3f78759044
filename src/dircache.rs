use std::collections::HashSet;
use std::sync::Mutex;

use crate::cancel::{CancelToken, Cancelled};

/// Remote directories known to exist during this run, shared by all workers.
///
/// The lookup and the insert are separate critical sections with the remote
/// create call in between, so two workers may both create the same prefix.
/// Every backend's directory creation must therefore accept "already exists".
#[derive(Debug, Default)]
pub struct DirCache {
    known: Mutex<HashSet<String>>,
}

impl DirCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `dir` and each missing ancestor through `create`, remembering what succeeded.
    ///
    /// Prefixes are built from the `/`-separated segments: `a`, `a/b`, `a/b/c`.
    /// Leading, trailing and repeated slashes are ignored. Stops with
    /// [`Cancelled`] before the next create once `cancel` is set.
    pub fn ensure<E, F>(&self, dir: &str, cancel: &CancelToken, mut create: F) -> Result<(), E>
    where
        E: From<Cancelled>,
        F: FnMut(&str) -> Result<(), E>,
    {
        let mut prefix = String::with_capacity(dir.len());
        for seg in dir.split('/').filter(|s| !s.is_empty()) {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(seg);

            if self.contains(&prefix) {
                continue;
            }
            if cancel.is_cancelled() {
                return Err(Cancelled.into());
            }
            create(&prefix)?;
            self.lock().insert(prefix.clone());
        }
        Ok(())
    }

    pub fn contains(&self, dir: &str) -> bool {
        self.lock().contains(dir)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        // The set is only ever inserted into, so a poisoned guard still holds valid data.
        self.known.lock().unwrap_or_else(|e| e.into_inner())
    }
}
