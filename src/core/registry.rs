//! # Registry of supervision entries.
//!
//! Maps each supervised channel to its running supervisor task and cancellation token.
//!
//! ## Architecture
//! ```text
//! Orchestrator::start(name) ──► admit(name, spawn)       ──► Admission::Spawned | Present | Closed
//! Orchestrator::stop(name)  ──► begin_stop(name)         ──► Option<Handle>  (entry stays, marked stopping)
//!                           ──► cancel + join / abort
//!                           ──► finish_stop(name, id)    ──► entry removed
//! supervisor exits on its own ──► release(name, id)      ──► removes only its own running entry
//! Orchestrator::shutdown()  ──► close()                  ──► later admissions → Closed
//! ```
//!
//! ## Rules
//! - At most one entry per channel name, whether running or stopping.
//! - A stopping entry still counts as present: `admit` returns `Present` until
//!   `finish_stop` removes it, so a new supervisor never overlaps the old one.
//! - The admission check, the spawn and the insert happen under one write lock,
//!   so concurrent `start`s cannot both spawn and a `start` racing `shutdown`
//!   either lands before the drain or is refused.
//! - Entries carry a generation id; a supervisor that exits late never removes
//!   the entry of a newer supervision of the same channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::ChannelName;
use crate::core::supervisor::SupervisorExit;

/// Supervisor of one channel, claimed by the caller that stops it.
pub(crate) struct Handle {
    pub id: u64,
    pub join: JoinHandle<SupervisorExit>,
    pub cancel: CancellationToken,
}

struct Entry {
    id: u64,
    cancel: CancellationToken,
    /// `None` once a stopper has claimed the task.
    join: Option<JoinHandle<SupervisorExit>>,
}

/// Result of [`Registry::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Spawned,
    Present,
    Closed,
}

pub(crate) struct Registry {
    entries: RwLock<HashMap<ChannelName, Entry>>,
    runtime_token: CancellationToken,
    accepting: AtomicBool,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new(runtime_token: CancellationToken) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            runtime_token,
            accepting: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
        }
    }

    /// Spawns a supervisor for `name` unless one is registered or the registry is closed.
    ///
    /// `spawn` receives the entry's child token and generation id.
    pub async fn admit<F>(&self, name: &ChannelName, spawn: F) -> Admission
    where
        F: FnOnce(CancellationToken, u64) -> JoinHandle<SupervisorExit>,
    {
        let mut entries = self.entries.write().await;
        if !self.accepting.load(Ordering::Acquire) {
            return Admission::Closed;
        }
        if entries.contains_key(name) {
            return Admission::Present;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = self.runtime_token.child_token();
        let join = spawn(cancel.clone(), id);
        entries.insert(
            name.clone(),
            Entry {
                id,
                cancel,
                join: Some(join),
            },
        );
        Admission::Spawned
    }

    /// Marks the entry for `name` as stopping and hands its task to the caller.
    ///
    /// The entry stays registered until [`Registry::finish_stop`]. Returns `None`
    /// if `name` is not supervised or another caller is already stopping it.
    pub async fn begin_stop(&self, name: &ChannelName) -> Option<Handle> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(name)?;
        let join = entry.join.take()?;
        Some(Handle {
            id: entry.id,
            join,
            cancel: entry.cancel.clone(),
        })
    }

    /// Removes the stopping entry of generation `id`.
    pub async fn finish_stop(&self, name: &ChannelName, id: u64) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(name) {
            Some(e) if e.id == id => {
                entries.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Removes the entry for `name` if it belongs to generation `id` and nobody is stopping it.
    pub async fn release(&self, name: &ChannelName, id: u64) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(name) {
            Some(e) if e.id == id && e.join.is_some() => {
                entries.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Refuses all later admissions. Returns `false` if already closed.
    pub fn close(&self) -> bool {
        self.accepting.swap(false, Ordering::AcqRel)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub async fn contains(&self, name: &ChannelName) -> bool {
        self.entries.read().await.contains_key(name)
    }

    /// Sorted names of every supervised channel.
    pub async fn names(&self) -> Vec<ChannelName> {
        let entries = self.entries.read().await;
        let mut names: Vec<ChannelName> = entries.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ChannelName {
        ChannelName::new(s).unwrap()
    }

    fn parked(token: CancellationToken) -> JoinHandle<SupervisorExit> {
        tokio::spawn(async move {
            token.cancelled().await;
            SupervisorExit::Cancelled
        })
    }

    #[tokio::test]
    async fn test_second_admission_is_present() {
        let reg = Registry::new(CancellationToken::new());
        let a = name("a");
        assert_eq!(reg.admit(&a, |t, _| parked(t)).await, Admission::Spawned);
        assert_eq!(reg.admit(&a, |t, _| parked(t)).await, Admission::Present);
        assert_eq!(reg.names().await, vec![a]);
    }

    #[tokio::test]
    async fn test_release_ignores_other_generations() {
        let reg = Registry::new(CancellationToken::new());
        let a = name("a");
        let mut first = 0;
        reg.admit(&a, |t, id| {
            first = id;
            parked(t)
        })
        .await;
        let old = reg.begin_stop(&a).await.unwrap();
        old.cancel.cancel();
        old.join.await.unwrap();
        assert!(reg.finish_stop(&a, first).await);

        reg.admit(&a, |t, _| parked(t)).await;
        assert!(!reg.release(&a, first).await);
        assert!(!reg.finish_stop(&a, first).await);
        assert!(reg.contains(&a).await);
    }

    #[tokio::test]
    async fn test_stopping_entry_is_still_present() {
        let reg = Registry::new(CancellationToken::new());
        let a = name("a");
        reg.admit(&a, |t, _| parked(t)).await;

        let handle = reg.begin_stop(&a).await.unwrap();
        assert!(reg.begin_stop(&a).await.is_none());
        assert_eq!(reg.admit(&a, |t, _| parked(t)).await, Admission::Present);
        assert!(!reg.release(&a, handle.id).await);
        assert_eq!(reg.names().await, vec![a.clone()]);

        handle.cancel.cancel();
        assert_eq!(handle.join.await.unwrap(), SupervisorExit::Cancelled);
        assert!(reg.finish_stop(&a, handle.id).await);
        assert!(!reg.contains(&a).await);
        assert_eq!(reg.admit(&a, |t, _| parked(t)).await, Admission::Spawned);
    }

    #[tokio::test]
    async fn test_closed_registry_refuses() {
        let reg = Registry::new(CancellationToken::new());
        assert!(reg.close());
        assert!(!reg.close());
        assert_eq!(reg.admit(&name("a"), |t, _| parked(t)).await, Admission::Closed);
        assert!(reg.names().await.is_empty());
    }

    #[tokio::test]
    async fn test_runtime_token_reaches_entries() {
        let root = CancellationToken::new();
        let reg = Registry::new(root.clone());
        reg.admit(&name("a"), |t, _| parked(t)).await;
        root.cancel();
        let h = reg.begin_stop(&name("a")).await.unwrap();
        assert!(h.cancel.is_cancelled());
        assert_eq!(h.join.await.unwrap(), SupervisorExit::Cancelled);
    }
}
