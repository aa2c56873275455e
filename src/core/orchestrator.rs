//! # Orchestrator: owns every channel supervision and the lifecycle event pipeline.
//!
//! ## Architecture
//! ```text
//!                  ┌──────────────── Orchestrator ────────────────┐
//! start(name) ───► │ Registry ── admit ──► tokio::spawn(ChannelSupervisor::run)
//! stop(name)  ───► │          ── begin_stop ──► cancel → grace → abort → abort grace ── finish_stop
//! shutdown()  ───► │          ── close ──► stop every entry
//! resume_all()───► │ Storage::get_active_channels ──► start each
//!                  │                                               │
//!                  │ Bus ──► listener ──► SubscriberSet ──► StatusTracker, LogWriter, user subs
//!                  └───────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - Operations are idempotent: "already in the desired state" is an outcome, not an error.
//! - Errors only come from collaborators (storage, lookup) or from `start` after `shutdown`.
//! - `stop` keeps the entry registered while it waits, so a `start` arriving
//!   meanwhile reports `AlreadySupervised` instead of opening a second session.
//! - `stop` always removes the entry at the end, whatever its outcome.
//! - A supervisor that exhausts its retry budget removes its own entry.
//! - Must be created inside a tokio runtime.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::channel::ChannelName;
use crate::config::Config;
use crate::core::registry::{Admission, Handle, Registry};
use crate::core::session::SessionContext;
use crate::core::supervisor::ChannelSupervisor;
use crate::error::OrchestratorError;
use crate::events::{Bus, Event, EventKind};
use crate::lookup::ChannelLookup;
use crate::storage::{ChannelRecord, ChannelStats, Storage};
use crate::subscribers::{ChannelStatus, LogWriter, StatusTracker, Subscribe, SubscriberSet};
use crate::transport::Connector;

/// Result of [`Orchestrator::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadySupervised,
}

/// Result of [`Orchestrator::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was running, or another `stop` already owns the shutdown.
    NotSupervised,
    /// The supervisor exited within the stop grace.
    Stopped,
    /// The supervisor had to be aborted and terminated within the abort grace.
    Forced,
    /// The aborted supervisor did not terminate within the abort grace.
    TimedOut,
}

impl StopOutcome {
    pub fn as_label(&self) -> &'static str {
        match self {
            StopOutcome::NotSupervised => "not_supervised",
            StopOutcome::Stopped => "stopped",
            StopOutcome::Forced => "forced",
            StopOutcome::TimedOut => "timed_out",
        }
    }
}

/// Result of [`Orchestrator::add_channel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Verified, stored and started.
    Added,
    /// Already stored; nothing changed.
    AlreadyTracked,
}

/// Per-channel results of a bulk start.
#[derive(Debug, Default)]
pub struct ResumeSummary {
    pub started: Vec<ChannelName>,
    pub already_supervised: Vec<ChannelName>,
    pub failed: Vec<(ChannelName, OrchestratorError)>,
}

/// A stored channel joined with its live supervision state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelListing {
    pub record: ChannelRecord,
    /// A supervision entry exists right now.
    pub supervised: bool,
    pub status: ChannelStatus,
}

/// Supervises any number of channels.
pub struct Orchestrator {
    cfg: Arc<Config>,
    bus: Bus,
    registry: Arc<Registry>,
    ctx: Arc<SessionContext>,
    storage: Arc<dyn Storage>,
    lookup: Arc<dyn ChannelLookup>,
    status: Arc<StatusTracker>,
    runtime_token: CancellationToken,
    listener: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Creates an orchestrator with no supervised channels.
    ///
    /// The built-in [`StatusTracker`] and [`LogWriter`] are always subscribed;
    /// `subscribers` are added after them.
    pub fn new(
        cfg: Config,
        storage: Arc<dyn Storage>,
        lookup: Arc<dyn ChannelLookup>,
        connector: Arc<dyn Connector>,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Self {
        let cfg = Arc::new(cfg);
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let runtime_token = CancellationToken::new();
        let status = Arc::new(StatusTracker::new());

        let mut subs: Vec<Arc<dyn Subscribe>> = vec![status.clone(), Arc::new(LogWriter::new())];
        subs.extend(subscribers);
        let listener = spawn_listener(&bus, SubscriberSet::new(subs, bus.clone()));

        let ctx = Arc::new(SessionContext::new(
            Arc::clone(&cfg),
            Arc::clone(&lookup),
            connector,
            Arc::clone(&storage),
            bus.clone(),
        ));

        Self {
            cfg,
            registry: Arc::new(Registry::new(runtime_token.clone())),
            bus,
            ctx,
            storage,
            lookup,
            status,
            runtime_token,
            listener: parking_lot::Mutex::new(Some(listener)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Receiver of every lifecycle event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Starts supervising `raw` unless it already is.
    ///
    /// Returns once the supervisor is scheduled, not once it has connected.
    pub async fn start(&self, raw: &str) -> Result<StartOutcome, OrchestratorError> {
        self.start_channel(&parse(raw)?).await
    }

    async fn start_channel(&self, name: &ChannelName) -> Result<StartOutcome, OrchestratorError> {
        let ctx = Arc::clone(&self.ctx);
        let registry = Arc::clone(&self.registry);
        let bus = self.bus.clone();
        let owned = name.clone();

        let admission = self
            .registry
            .admit(name, move |token, id| {
                bus.publish(Event::new(EventKind::ChannelStarted).with_channel(&owned));
                tokio::spawn(async move {
                    let exit = ChannelSupervisor::new(ctx, owned.clone()).run(token).await;
                    if registry.release(&owned, id).await {
                        info!(channel = %owned, reason = exit.as_label(), "supervision ended");
                        bus.publish(
                            Event::new(EventKind::ChannelStopped)
                                .with_channel(&owned)
                                .with_reason(exit.as_label()),
                        );
                    }
                    exit
                })
            })
            .await;

        match admission {
            Admission::Spawned => {
                info!(channel = %name, "started supervision");
                Ok(StartOutcome::Started)
            }
            Admission::Present => {
                warn!(channel = %name, "channel is already supervised");
                Ok(StartOutcome::AlreadySupervised)
            }
            Admission::Closed => Err(OrchestratorError::ShuttingDown),
        }
    }

    /// Stops supervising `raw`.
    pub async fn stop(&self, raw: &str) -> Result<StopOutcome, OrchestratorError> {
        Ok(self.stop_channel(&parse(raw)?).await)
    }

    async fn stop_channel(&self, name: &ChannelName) -> StopOutcome {
        let Some(Handle {
            id,
            mut join,
            cancel,
        }) = self.registry.begin_stop(name).await
        else {
            warn!(channel = %name, "channel is not supervised or already stopping");
            return StopOutcome::NotSupervised;
        };
        cancel.cancel();

        let outcome = match time::timeout(self.cfg.stop_grace, &mut join).await {
            Ok(res) => {
                if let Err(e) = res {
                    error!(channel = %name, error = %e, "supervisor task failed");
                }
                StopOutcome::Stopped
            }
            Err(_) => {
                warn!(
                    channel = %name,
                    grace_ms = self.cfg.stop_grace.as_millis() as u64,
                    "supervisor ignored cancellation, aborting"
                );
                join.abort();
                self.bus
                    .publish(Event::new(EventKind::StopForced).with_channel(name));
                match time::timeout(self.cfg.abort_grace, &mut join).await {
                    Ok(_) => StopOutcome::Forced,
                    Err(_) => {
                        error!(channel = %name, "aborted supervisor did not terminate");
                        self.bus
                            .publish(Event::new(EventKind::StopTimedOut).with_channel(name));
                        StopOutcome::TimedOut
                    }
                }
            }
        };

        self.registry.finish_stop(name, id).await;
        info!(channel = %name, outcome = outcome.as_label(), "stopped supervision");
        self.bus.publish(
            Event::new(EventKind::ChannelStopped)
                .with_channel(name)
                .with_reason(outcome.as_label()),
        );
        outcome
    }

    /// Refuses new work, stops every supervised channel and drains the subscribers.
    ///
    /// Later calls return immediately.
    pub async fn shutdown(&self) {
        if !self.registry.close() {
            return;
        }
        info!("shutting down");
        self.bus.publish(Event::new(EventKind::ShutdownRequested));

        let names = self.registry.names().await;
        join_all(names.iter().map(|n| self.stop_channel(n))).await;
        self.runtime_token.cancel();

        info!(channels = names.len(), "all supervision stopped");
        self.bus.publish(Event::new(EventKind::ShutdownComplete));

        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            let _ = listener.await;
        }
    }

    /// Starts every stored channel that is not paused.
    ///
    /// Failures for individual channels are collected, never fatal.
    pub async fn resume_all(&self) -> Result<ResumeSummary, OrchestratorError> {
        let active = self.storage.get_active_channels().await?;
        if active.is_empty() {
            info!("no active channels to resume");
        } else {
            info!(count = active.len(), "resuming active channels");
        }
        Ok(self.start_many(active).await)
    }

    async fn start_many(&self, names: Vec<ChannelName>) -> ResumeSummary {
        let mut summary = ResumeSummary::default();
        for name in names {
            match self.start_channel(&name).await {
                Ok(StartOutcome::Started) => summary.started.push(name),
                Ok(StartOutcome::AlreadySupervised) => summary.already_supervised.push(name),
                Err(e) => {
                    warn!(channel = %name, error = %e, "failed to start channel");
                    summary.failed.push((name, e));
                }
            }
        }
        summary
    }

    /// Verifies `raw` upstream, stores it and starts it.
    pub async fn add_channel(&self, raw: &str) -> Result<AddOutcome, OrchestratorError> {
        let name = parse(raw)?;
        if !self.registry.is_accepting() {
            return Err(OrchestratorError::ShuttingDown);
        }
        if self.storage.channel_exists(&name).await? {
            warn!(channel = %name, "channel already stored");
            return Ok(AddOutcome::AlreadyTracked);
        }

        let resolved = self.lookup.resolve(&name).await.inspect_err(|e| {
            error!(channel = %name, error = %e, "channel lookup failed");
        })?;
        info!(channel = %name, session_id = %resolved.session_id, "channel verified");

        if !self.storage.add_channel(&name).await? {
            warn!(channel = %name, "channel stored concurrently");
        }
        self.start_channel(&name).await?;
        Ok(AddOutcome::Added)
    }

    /// Stops `raw` and marks it paused. Returns `false` if it is not stored.
    pub async fn pause_channel(&self, raw: &str) -> Result<bool, OrchestratorError> {
        let name = parse(raw)?;
        self.stop_channel(&name).await;
        let paused = self.storage.pause_channel(&name).await?;
        if paused {
            info!(channel = %name, "channel paused");
            self.bus
                .publish(Event::new(EventKind::ChannelPaused).with_channel(&name));
        }
        Ok(paused)
    }

    /// Clears the paused mark of `raw` and starts it. Returns `false` if it is not stored.
    pub async fn resume_channel(&self, raw: &str) -> Result<bool, OrchestratorError> {
        let name = parse(raw)?;
        if !self.storage.resume_channel(&name).await? {
            return Ok(false);
        }
        self.start_channel(&name).await?;
        info!(channel = %name, "channel resumed");
        self.bus
            .publish(Event::new(EventKind::ChannelResumed).with_channel(&name));
        Ok(true)
    }

    /// Resumes every paused channel.
    pub async fn resume_paused(&self) -> Result<ResumeSummary, OrchestratorError> {
        let paused = self.storage.get_paused_channels().await?;
        let mut resumed = Vec::with_capacity(paused.len());
        for name in paused {
            if self.storage.resume_channel(&name).await? {
                self.bus
                    .publish(Event::new(EventKind::ChannelResumed).with_channel(&name));
                resumed.push(name);
            }
        }
        Ok(self.start_many(resumed).await)
    }

    /// Every stored channel with its supervision state, sorted by name.
    pub async fn list_channels(&self) -> Result<Vec<ChannelListing>, OrchestratorError> {
        let records = self.storage.list_channels().await?;
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let supervised = self.registry.contains(&record.name).await;
            let status = self.status.status(record.name.as_str()).await;
            out.push(ChannelListing {
                record,
                supervised,
                status,
            });
        }
        Ok(out)
    }

    /// Aggregates over the stored events of `raw`.
    pub async fn channel_stats(&self, raw: &str) -> Result<ChannelStats, OrchestratorError> {
        let name = parse(raw)?;
        Ok(self.storage.channel_stats(&name).await?)
    }

    /// Sorted names of every supervised channel.
    pub async fn supervised(&self) -> Vec<ChannelName> {
        self.registry.names().await
    }

    /// Live status of `raw` as seen by the status tracker.
    pub async fn status(&self, raw: &str) -> Result<ChannelStatus, OrchestratorError> {
        let name = parse(raw)?;
        Ok(self.status.status(name.as_str()).await)
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.runtime_token.cancel();
    }
}

fn parse(raw: &str) -> Result<ChannelName, OrchestratorError> {
    ChannelName::new(raw).ok_or_else(|| OrchestratorError::InvalidName {
        raw: raw.to_string(),
    })
}

/// Forwards bus events to the subscriber set until `ShutdownComplete`, then drains it.
fn spawn_listener(bus: &Bus, set: SubscriberSet) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    let last = ev.kind == EventKind::ShutdownComplete;
                    set.emit(ev);
                    if last {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        set.shutdown().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::error::{LookupError, StoreError};
    use crate::protocol::StructuredEvent;
    use crate::storage::MemoryStorage;
    use crate::testutil::{Dial, ScriptedConnector, ScriptedLookup, Step, chat_frame};

    struct Harness {
        orch: Orchestrator,
        storage: Arc<MemoryStorage>,
        lookup: Arc<ScriptedLookup>,
        connector: Arc<ScriptedConnector>,
        _dir: tempfile::TempDir,
    }

    fn harness_with(storage: Arc<dyn Storage>, mem: Arc<MemoryStorage>, fallback: Dial) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.overflow_log = dir.path().join("unhandled.txt");
        let lookup = ScriptedLookup::new();
        let connector = ScriptedConnector::with_fallback(vec![], fallback);
        let orch = Orchestrator::new(cfg, storage, lookup.clone(), connector.clone(), vec![]);
        Harness {
            orch,
            storage: mem,
            lookup,
            connector,
            _dir: dir,
        }
    }

    fn harness(fallback: Dial) -> Harness {
        let mem = Arc::new(MemoryStorage::new());
        harness_with(mem.clone(), mem, fallback)
    }

    fn idle() -> Dial {
        Dial::open(vec![Step::Hang])
    }

    /// Lets spawned tasks and subscriber workers catch up.
    async fn settle() {
        time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_keeps_one_entry() {
        let h = harness(idle());
        assert_eq!(h.orch.start("xqc").await.unwrap(), StartOutcome::Started);
        assert_eq!(
            h.orch.start("XQC").await.unwrap(),
            StartOutcome::AlreadySupervised
        );
        assert_eq!(h.orch.supervised().await.len(), 1);

        settle().await;
        assert_eq!(h.connector.connects(), 1);
        h.orch.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_unsupervised_has_no_side_effects() {
        let h = harness(idle());
        let mut events = h.orch.subscribe();
        assert_eq!(h.orch.stop("ghost").await.unwrap(), StopOutcome::NotSupervised);
        assert!(h.orch.supervised().await.is_empty());
        assert!(events.try_recv().is_err());
        assert!(h.storage.get_all_channels().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_cooperative() {
        let h = harness(idle());
        h.orch.start("xqc").await.unwrap();
        settle().await;

        let before = time::Instant::now();
        assert_eq!(h.orch.stop("xqc").await.unwrap(), StopOutcome::Stopped);
        assert!(before.elapsed() <= Duration::from_secs(1));
        assert!(h.orch.supervised().await.is_empty());
        assert_eq!(h.connector.closes(), 1);

        settle().await;
        assert_eq!(h.orch.status("xqc").await.unwrap(), ChannelStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_channel_leaves_registry() {
        let h = harness(Dial::open(vec![Step::Close(1000)]));
        let mut events = h.orch.subscribe();
        h.orch.start("xqc").await.unwrap();

        loop {
            let ev = events.recv().await.unwrap();
            if ev.kind == EventKind::ChannelStopped {
                assert_eq!(ev.reason.as_deref(), Some("retry_exhausted"));
                break;
            }
        }
        assert!(h.orch.supervised().await.is_empty());
        assert_eq!(h.connector.connects(), 11);

        settle().await;
        assert_eq!(h.orch.status("xqc").await.unwrap(), ChannelStatus::Exhausted);

        // A later start begins a fresh supervision lifetime.
        assert_eq!(h.orch.start("xqc").await.unwrap(), StartOutcome::Started);
        h.orch.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_and_refuses() {
        let h = harness(idle());
        for ch in ["a", "b", "c"] {
            h.orch.start(ch).await.unwrap();
        }
        settle().await;

        h.orch.shutdown().await;
        assert!(h.orch.supervised().await.is_empty());
        assert_eq!(h.connector.closes(), 3);
        assert!(matches!(
            h.orch.start("d").await,
            Err(OrchestratorError::ShuttingDown)
        ));
        h.orch.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_all_starts_only_active() {
        let h = harness(idle());
        for ch in ["a", "b", "c"] {
            h.storage.add_channel(&ChannelName::new(ch).unwrap()).await.unwrap();
        }
        h.storage.pause_channel(&ChannelName::new("b").unwrap()).await.unwrap();
        h.orch.start("c").await.unwrap();

        let summary = h.orch.resume_all().await.unwrap();
        let names = |v: &[ChannelName]| v.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        assert_eq!(names(&summary.started), vec!["a"]);
        assert_eq!(names(&summary.already_supervised), vec!["c"]);
        assert!(summary.failed.is_empty());
        assert_eq!(names(&h.orch.supervised().await), vec!["a", "c"]);
        h.orch.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_all_restarts_exhausted_channel() {
        let h = harness(Dial::open(vec![Step::Close(1000)]));
        let xqc = ChannelName::new("xqc").unwrap();
        h.storage.add_channel(&xqc).await.unwrap();
        let mut events = h.orch.subscribe();
        h.orch.start("xqc").await.unwrap();

        while events.recv().await.unwrap().kind != EventKind::ChannelStopped {}
        assert!(h.orch.supervised().await.is_empty());
        assert_eq!(h.connector.connects(), 11);

        // Still stored and not paused, so a bare resume brings it back.
        let summary = h.orch.resume_all().await.unwrap();
        assert_eq!(summary.started, vec![xqc.clone()]);
        assert!(summary.already_supervised.is_empty());
        assert_eq!(h.orch.supervised().await, vec![xqc]);

        settle().await;
        assert_eq!(h.connector.connects(), 12);
        h.orch.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_channel_sanitizes_and_stores() {
        let h = harness(Dial::open(vec![
            Step::Text(chat_frame(7, "hey")),
            Step::Hang,
        ]));
        assert_eq!(h.orch.add_channel("Foo_Bar").await.unwrap(), AddOutcome::Added);
        assert_eq!(
            h.orch.add_channel("foo_bar").await.unwrap(),
            AddOutcome::AlreadyTracked
        );
        settle().await;

        let stored = h.storage.get_all_channels().await.unwrap();
        assert_eq!(stored.len(), 1);
        let key = stored[0].as_str();
        assert_eq!(key, "foo_bar");
        assert!(
            stored[0]
                .table_name()
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        );

        let stats = h.orch.channel_stats("FOO_BAR").await.unwrap();
        assert_eq!(stats.total_events, 1);
        h.orch.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_channel_rejected_by_lookup() {
        let h = harness(idle());
        h.lookup.fail(
            "ghost",
            LookupError::NotFound {
                channel: "ghost".into(),
            },
        );
        assert!(matches!(
            h.orch.add_channel("ghost").await,
            Err(OrchestratorError::Lookup(LookupError::NotFound { .. }))
        ));
        assert!(h.storage.get_all_channels().await.unwrap().is_empty());
        assert!(h.orch.supervised().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_and_resume() {
        let h = harness(idle());
        h.orch.add_channel("xqc").await.unwrap();
        settle().await;

        assert!(h.orch.pause_channel("xqc").await.unwrap());
        assert!(h.orch.supervised().await.is_empty());
        let listing = h.orch.list_channels().await.unwrap();
        assert!(listing[0].record.paused);
        assert!(!listing[0].supervised);

        assert!(h.orch.resume_channel("xqc").await.unwrap());
        let listing = h.orch.list_channels().await.unwrap();
        assert!(!listing[0].record.paused);
        assert!(listing[0].supervised);

        assert!(!h.orch.pause_channel("ghost").await.unwrap());
        assert!(!h.orch.resume_channel("ghost").await.unwrap());
        h.orch.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_paused() {
        let h = harness(idle());
        for ch in ["a", "b"] {
            let name = ChannelName::new(ch).unwrap();
            h.storage.add_channel(&name).await.unwrap();
            h.storage.pause_channel(&name).await.unwrap();
        }
        let summary = h.orch.resume_paused().await.unwrap();
        assert_eq!(summary.started.len(), 2);
        assert!(h.storage.get_paused_channels().await.unwrap().is_empty());
        h.orch.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_name() {
        let h = harness(idle());
        assert!(matches!(
            h.orch.start("   ").await,
            Err(OrchestratorError::InvalidName { .. })
        ));
    }

    /// Storage whose writes never complete.
    struct StuckStorage(Arc<MemoryStorage>);

    #[async_trait]
    impl Storage for StuckStorage {
        async fn store_event(
            &self,
            _channel: &ChannelName,
            _event: &StructuredEvent,
        ) -> Result<bool, StoreError> {
            std::future::pending().await
        }
        async fn channel_exists(&self, c: &ChannelName) -> Result<bool, StoreError> {
            self.0.channel_exists(c).await
        }
        async fn add_channel(&self, c: &ChannelName) -> Result<bool, StoreError> {
            self.0.add_channel(c).await
        }
        async fn pause_channel(&self, c: &ChannelName) -> Result<bool, StoreError> {
            self.0.pause_channel(c).await
        }
        async fn resume_channel(&self, c: &ChannelName) -> Result<bool, StoreError> {
            self.0.resume_channel(c).await
        }
        async fn get_active_channels(&self) -> Result<Vec<ChannelName>, StoreError> {
            self.0.get_active_channels().await
        }
        async fn get_paused_channels(&self) -> Result<Vec<ChannelName>, StoreError> {
            self.0.get_paused_channels().await
        }
        async fn get_all_channels(&self) -> Result<Vec<ChannelName>, StoreError> {
            self.0.get_all_channels().await
        }
        async fn list_channels(&self) -> Result<Vec<ChannelRecord>, StoreError> {
            self.0.list_channels().await
        }
        async fn channel_stats(&self, c: &ChannelName) -> Result<ChannelStats, StoreError> {
            self.0.channel_stats(c).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_during_stop_waits_for_old_supervisor() {
        let mem = Arc::new(MemoryStorage::new());
        let h = Arc::new(harness_with(
            Arc::new(StuckStorage(mem.clone())),
            mem,
            Dial::open(vec![Step::Text(chat_frame(1, "stall")), Step::Hang]),
        ));
        h.orch.start("xqc").await.unwrap();
        settle().await;

        let stopping = {
            let h = Arc::clone(&h);
            tokio::spawn(async move { h.orch.stop("xqc").await })
        };
        time::sleep(Duration::from_millis(100)).await;
        assert!(!stopping.is_finished());

        assert_eq!(
            h.orch.start("xqc").await.unwrap(),
            StartOutcome::AlreadySupervised
        );
        assert_eq!(h.orch.stop("xqc").await.unwrap(), StopOutcome::NotSupervised);
        assert_eq!(h.orch.supervised().await.len(), 1);
        assert_eq!(h.connector.connects(), 1);

        assert_eq!(stopping.await.unwrap().unwrap(), StopOutcome::Forced);
        assert!(h.orch.supervised().await.is_empty());

        assert_eq!(h.orch.start("xqc").await.unwrap(), StartOutcome::Started);
        settle().await;
        assert_eq!(h.connector.connects(), 2);
        h.orch.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_supervisor_is_aborted() {
        let mem = Arc::new(MemoryStorage::new());
        let h = harness_with(
            Arc::new(StuckStorage(mem.clone())),
            mem,
            Dial::open(vec![Step::Text(chat_frame(1, "stall")), Step::Hang]),
        );
        let mut events = h.orch.subscribe();
        h.orch.start("xqc").await.unwrap();
        settle().await;

        let before = time::Instant::now();
        assert_eq!(h.orch.stop("xqc").await.unwrap(), StopOutcome::Forced);
        let waited = before.elapsed();
        assert!(waited >= h.orch.config().stop_grace);
        assert!(waited < h.orch.config().stop_grace + h.orch.config().abort_grace);
        assert!(h.orch.supervised().await.is_empty());

        let mut kinds = Vec::new();
        while let Ok(ev) = events.try_recv() {
            kinds.push(ev.kind);
        }
        assert!(kinds.contains(&EventKind::StopForced));
        assert_eq!(kinds.last(), Some(&EventKind::ChannelStopped));
    }
}
