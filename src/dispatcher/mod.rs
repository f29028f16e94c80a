//! Dispatcher - single-flight scheduling of conversation runs
//!
//! Every poll tick the dispatcher reaps finished runs, asks the queue for
//! ready batches and spawns one run per conversation that is not already
//! working. A conversation with an active run keeps accumulating messages in
//! the queue; they are picked up by the first tick after the run ends.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, Instrument};

use crate::bus::{ConversationId, InboundMessage};
use crate::config::DispatcherConfig;
use crate::error::{MurmurError, Result};
use crate::history::HistoryStore;
use crate::queue::{ChatQueue, PendingBatch};

/// Whatever processes a ready batch.
#[async_trait]
pub trait ConversationRunner: Send + Sync {
    /// Process one batch. Its messages are already in history.
    async fn run(&self, batch: PendingBatch) -> Result<()>;
}

type WorkingSet = Arc<Mutex<HashSet<ConversationId>>>;

fn lock_set(set: &WorkingSet) -> MutexGuard<'_, HashSet<ConversationId>> {
    set.lock().unwrap_or_else(|e| e.into_inner())
}

/// Clears a conversation's working flag when the run ends, however it ends.
struct WorkingGuard {
    working: WorkingSet,
    id: ConversationId,
}

impl Drop for WorkingGuard {
    fn drop(&mut self) {
        lock_set(&self.working).remove(&self.id);
    }
}

pub struct Dispatcher {
    queue: Arc<ChatQueue>,
    history: Arc<dyn HistoryStore>,
    runner: Arc<dyn ConversationRunner>,
    config: DispatcherConfig,
    idle_ttl: Duration,
    working: WorkingSet,
    runs: Mutex<JoinSet<()>>,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<ChatQueue>,
        history: Arc<dyn HistoryStore>,
        runner: Arc<dyn ConversationRunner>,
        config: DispatcherConfig,
        idle_ttl: Duration,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            queue,
            history,
            runner,
            config,
            idle_ttl,
            working: Arc::new(Mutex::new(HashSet::new())),
            runs: Mutex::new(JoinSet::new()),
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    fn runs(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether `id` has a run in flight.
    pub fn is_working(&self, id: &ConversationId) -> bool {
        lock_set(&self.working).contains(id)
    }

    /// Number of runs in flight.
    pub fn active_runs(&self) -> usize {
        lock_set(&self.working).len()
    }

    /// One poll tick. Returns the number of runs spawned.
    ///
    /// Must be called from within a tokio runtime.
    pub fn poll_once(&self) -> usize {
        let mut runs = self.runs();
        while let Some(finished) = runs.try_join_next() {
            log_join_error(finished);
        }

        let mut spawned = 0;
        for batch in self.queue.fetch_ready() {
            let id = batch.conversation_id.clone();
            if !lock_set(&self.working).insert(id.clone()) {
                debug!(conversation = %id, "Run in flight; batch stays queued");
                continue;
            }
            let guard = WorkingGuard {
                working: Arc::clone(&self.working),
                id: id.clone(),
            };
            self.queue.commit(&batch);

            let span = info_span!(
                "run",
                conversation = %id,
                kind = %batch.kind,
                messages = batch.messages.len()
            );
            let history = Arc::clone(&self.history);
            let runner = Arc::clone(&self.runner);
            runs.spawn(
                async move {
                    let _guard = guard;
                    execute_run(history, runner, batch).await;
                }
                .instrument(span),
            );
            spawned += 1;
        }
        spawned
    }

    /// Poll until [`stop`](Self::stop) is called. Runs are not drained here;
    /// see [`shutdown`](Self::shutdown).
    ///
    /// # Errors
    /// Returns an error if the dispatcher is already running.
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(MurmurError::Config("Dispatcher already running".into()));
        }
        info!(
            poll_ms = self.config.poll_interval_ms,
            sweep_secs = self.config.sweep_interval_secs,
            "Starting dispatcher"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let _ = *shutdown_rx.borrow_and_update();

        let mut poll = tokio::time::interval(self.config.poll_interval());
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut sweep = tokio::time::interval(self.config.sweep_interval());
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Received shutdown signal");
                        break;
                    }
                }
                _ = poll.tick() => {
                    let spawned = self.poll_once();
                    if spawned > 0 {
                        debug!(spawned, active = self.active_runs(), "Spawned runs");
                    }
                }
                _ = sweep.tick() => {
                    let evicted = self.queue.sweep(self.idle_ttl);
                    if evicted > 0 {
                        debug!(evicted, "Swept idle queue entries");
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Dispatcher stopped");
        Ok(())
    }

    /// Signal the poll loop to stop.
    pub fn stop(&self) {
        info!("Stopping dispatcher");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for every in-flight run to finish.
    pub async fn drain(&self) {
        loop {
            let mut runs = std::mem::take(&mut *self.runs());
            if runs.is_empty() {
                break;
            }
            while let Some(finished) = runs.join_next().await {
                log_join_error(finished);
            }
        }
    }

    /// Stop polling and drain in-flight runs.
    pub async fn shutdown(&self) {
        self.stop();
        let active = self.active_runs();
        if active > 0 {
            info!(active, "Draining in-flight runs");
        }
        self.drain().await;
    }
}

async fn execute_run(
    history: Arc<dyn HistoryStore>,
    runner: Arc<dyn ConversationRunner>,
    batch: PendingBatch,
) {
    let id = batch.conversation_id.clone();
    let messages = batch
        .messages
        .iter()
        .map(InboundMessage::to_history_message)
        .collect();
    if let Err(e) = history.append_messages(&id, messages).await {
        error!(error = %e, "Failed to persist batch; run skipped");
        return;
    }

    let start = std::time::Instant::now();
    match runner.run(batch).await {
        Ok(()) => info!(duration_ms = start.elapsed().as_millis() as u64, "Run completed"),
        Err(e) => error!(
            duration_ms = start.elapsed().as_millis() as u64,
            error = %e,
            "Run failed"
        ),
    }
}

fn log_join_error(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("Run panicked");
        } else {
            error!(error = %e, "Run aborted");
        }
    }
}
