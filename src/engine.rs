//! Engine - wires the bus, queue, dispatcher and conversation processor
//!
//! ```text
//! MessageBus ──inbound──> ChatQueue <──poll── Dispatcher ──spawn──> ChatProcessor
//!     ^                                                                  │
//!     └───────────────────────── BusSink (outbound) <────────────────────┘
//! ```
//!
//! Collaborators not supplied to the [`EngineBuilder`] fall back to the
//! in-memory implementations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::agent::{ChatProcessor, CompletionLoop};
use crate::attention::AttentionMachine;
use crate::bus::{BusSink, InboundMessage, MessageBus, OutboundSink};
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::{MurmurError, Result};
use crate::history::{HistoryStore, MemoryHistoryStore, ProviderSummarizer};
use crate::limits::{AdmissionController, MemorySupportDirectory, SupportDirectory};
use crate::memory::{KeywordMemory, MemoryService};
use crate::providers::CompletionProvider;
use crate::queue::ChatQueue;
use crate::state::{LimitStore, MemoryStore, StateStore};
use crate::tools::{builtin_tools, ToolRegistry};

/// Assembles an [`Engine`].
pub struct EngineBuilder {
    config: Config,
    provider: Arc<dyn CompletionProvider>,
    bus: Option<Arc<MessageBus>>,
    history: Option<Arc<dyn HistoryStore>>,
    states: Option<Arc<dyn StateStore>>,
    limits: Option<Arc<dyn LimitStore>>,
    support: Option<Arc<dyn SupportDirectory>>,
    memory: Option<Arc<dyn MemoryService>>,
    outbound: Option<Arc<dyn OutboundSink>>,
}

impl EngineBuilder {
    pub fn new(config: Config, provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            config,
            provider,
            bus: None,
            history: None,
            states: None,
            limits: None,
            support: None,
            memory: None,
            outbound: None,
        }
    }

    pub fn bus(mut self, bus: Arc<MessageBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn state_store(mut self, states: Arc<dyn StateStore>) -> Self {
        self.states = Some(states);
        self
    }

    pub fn limit_store(mut self, limits: Arc<dyn LimitStore>) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn support(mut self, support: Arc<dyn SupportDirectory>) -> Self {
        self.support = Some(support);
        self
    }

    pub fn memory(mut self, memory: Arc<dyn MemoryService>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Send side effects somewhere other than the bus.
    pub fn outbound(mut self, outbound: Arc<dyn OutboundSink>) -> Self {
        self.outbound = Some(outbound);
        self
    }

    /// Build the engine.
    ///
    /// # Errors
    /// Fails if the configuration is out of range or declares a tool that
    /// has no implementation.
    pub fn build(self) -> Result<Engine> {
        let config = self.config;
        config.check()?;

        let provider = self.provider;
        let bus = self.bus.unwrap_or_else(|| Arc::new(MessageBus::new()));
        let history = self.history.unwrap_or_else(|| {
            let summarizer = ProviderSummarizer::new(
                Arc::clone(&provider),
                &config.completion.private_model,
                &config.prompts.summary_instruction,
            );
            Arc::new(MemoryHistoryStore::new(Arc::new(summarizer)))
        });
        let (states, limits): (Arc<dyn StateStore>, Arc<dyn LimitStore>) =
            match (self.states, self.limits) {
                (Some(s), Some(l)) => (s, l),
                (s, l) => {
                    let store = Arc::new(MemoryStore::new());
                    (
                        s.unwrap_or_else(|| store.clone()),
                        l.unwrap_or_else(|| store.clone()),
                    )
                }
            };
        let support = self
            .support
            .unwrap_or_else(|| Arc::new(MemorySupportDirectory::new()));
        let memory = self.memory.unwrap_or_else(|| Arc::new(KeywordMemory::new()));
        let outbound = self
            .outbound
            .unwrap_or_else(|| Arc::new(BusSink::new(Arc::clone(&bus))));

        let mut tools = ToolRegistry::build(builtin_tools(
            Arc::clone(&states),
            memory,
            &config.attention,
            &config.prompts,
        ))?;
        tools.validate_catalog(&config.completion.tool_catalog)?;
        tools.retain(&config.completion.tool_catalog);

        let admission = Arc::new(AdmissionController::new(
            limits,
            support,
            config.limits.clone(),
        ));
        let attention = AttentionMachine::new(
            Arc::clone(&states),
            Arc::clone(&admission),
            Arc::clone(&outbound),
            config.attention.clone(),
            &config.prompts,
        );
        let completion = CompletionLoop::new(
            provider,
            Arc::clone(&history),
            states,
            Arc::new(tools),
            outbound,
            config.completion.clone(),
            config.prompts.clone(),
            config.attention.ignoring_streak_limit,
        );
        let processor = Arc::new(ChatProcessor::new(
            attention,
            admission,
            completion,
            config.prompts.clone(),
        ));

        let queue = Arc::new(ChatQueue::new(&config.queue));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&queue),
            history,
            processor.clone(),
            config.dispatcher.clone(),
            config.queue.idle_ttl(),
        ));

        let (shutdown_tx, _) = watch::channel(false);
        Ok(Engine {
            bus,
            queue,
            dispatcher,
            processor,
            running: AtomicBool::new(false),
            shutdown_tx,
        })
    }
}

/// The running system.
pub struct Engine {
    bus: Arc<MessageBus>,
    queue: Arc<ChatQueue>,
    dispatcher: Arc<Dispatcher>,
    processor: Arc<ChatProcessor>,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl Engine {
    pub fn builder(config: Config, provider: Arc<dyn CompletionProvider>) -> EngineBuilder {
        EngineBuilder::new(config, provider)
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn queue(&self) -> &Arc<ChatQueue> {
        &self.queue
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn processor(&self) -> &Arc<ChatProcessor> {
        &self.processor
    }

    /// Add one inbound message to the queue.
    pub fn ingest(&self, msg: InboundMessage) {
        let id = msg.conversation_id.clone();
        let kind = msg.kind;
        debug!(conversation = %id, sender = %msg.sender_id, "Message queued");
        self.queue.add(&id, kind, vec![msg]);
    }

    /// Consume the bus and run the dispatcher until [`stop`](Self::stop).
    ///
    /// # Errors
    /// Returns an error if the engine is already running.
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(MurmurError::Config("Engine already running".into()));
        }
        info!("Starting engine");

        let result = futures::future::try_join(self.consume_inbound(), self.dispatcher.start()).await;

        self.running.store(false, Ordering::SeqCst);
        info!("Engine stopped");
        result.map(|_| ())
    }

    async fn consume_inbound(&self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let _ = *shutdown_rx.borrow_and_update();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                msg = self.bus.consume_inbound() => {
                    match msg {
                        Some(msg) => self.ingest(msg),
                        None => {
                            info!("Inbound channel closed");
                            self.dispatcher.stop();
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Signal both loops to stop. In-flight runs keep going.
    pub fn stop(&self) {
        info!("Stopping engine");
        let _ = self.shutdown_tx.send(true);
        self.dispatcher.stop();
    }

    /// Stop and wait for in-flight runs to finish.
    pub async fn shutdown(&self) {
        self.stop();
        self.dispatcher.shutdown().await;
    }
}
