//! # Message Pump
//!
//! Owns the pool of concurrent receive loops for one input queue. Each loop
//! is independent: it opens its own connection, claims and processes
//! messages until the queue is observed empty, backs off through the
//! queue-empty strategy, and cycles the connection. The loops share nothing
//! but the failure cache and two circuit breakers watching for sustained
//! database failures.

use crate::address::QueueAddressTranslator;
use crate::config::TransportConfig;
use crate::error::Result;
use crate::queue::{
    ProgressiveDelayQueueEmpty, ProgressiveDelayQueueFull, QueueEmptyHandling,
    QueueEmptyHandlingFactory, QueueFullHandling, QueueFullHandlingFactory, TableQueue,
    TableQueueFactory,
};
use crate::receiving::contract::MessageHandler;
use crate::receiving::failure_cache::FailureCache;
use crate::receiving::strategy::{NativeTransactionReceiver, ReceiveOutcome};
use crate::resilience::RepeatedFailureCircuitBreaker;
use crate::shutdown::ShutdownSignal;
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// The queues one pump serves.
#[derive(Debug, Clone)]
pub struct PumpSettings {
    /// Logical input queue address
    pub input_queue: String,
    /// Logical error (dead-letter) queue address
    pub error_queue: String,
}

pub struct MessagePump {
    inner: Arc<PumpInner>,
    receive_tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

struct PumpInner {
    pool: PgPool,
    translator: Arc<dyn QueueAddressTranslator>,
    receiver: NativeTransactionReceiver,
    settings: PumpSettings,
    config: TransportConfig,
    full_handling_factory: QueueFullHandlingFactory,
    empty_handling_factory: QueueEmptyHandlingFactory,
    receive_breaker: RepeatedFailureCircuitBreaker,
    loop_breaker: RepeatedFailureCircuitBreaker,
    shutdown: ShutdownSignal,
}

impl MessagePump {
    /// Build a pump with the production backpressure strategies.
    pub fn new(
        pool: PgPool,
        translator: Arc<dyn QueueAddressTranslator>,
        handler: Arc<dyn MessageHandler>,
        config: TransportConfig,
        settings: PumpSettings,
    ) -> Self {
        let full_config = config.queue_full.clone();
        let full_handling_factory: QueueFullHandlingFactory = Arc::new(move || {
            Arc::new(ProgressiveDelayQueueFull::new(&full_config)) as Arc<dyn QueueFullHandling>
        });
        let empty_config = config.queue_empty.clone();
        let empty_handling_factory: QueueEmptyHandlingFactory = Arc::new(move || {
            Box::new(ProgressiveDelayQueueEmpty::new(&empty_config)) as Box<dyn QueueEmptyHandling>
        });

        Self::with_backpressure(
            pool,
            translator,
            handler,
            config,
            settings,
            full_handling_factory,
            empty_handling_factory,
        )
    }

    /// Build a pump with caller-supplied backpressure strategy factories.
    #[allow(clippy::too_many_arguments)]
    pub fn with_backpressure(
        pool: PgPool,
        translator: Arc<dyn QueueAddressTranslator>,
        handler: Arc<dyn MessageHandler>,
        config: TransportConfig,
        settings: PumpSettings,
        full_handling_factory: QueueFullHandlingFactory,
        empty_handling_factory: QueueEmptyHandlingFactory,
    ) -> Self {
        let failure_cache = Arc::new(FailureCache::new(config.failure_cache_capacity));
        let receiver = NativeTransactionReceiver::new(
            Arc::clone(&handler),
            failure_cache,
            config.isolation_level,
            config.receive_only_transactions,
        );

        let receive_breaker = {
            let handler = Arc::clone(&handler);
            let reason = format!("Failed to receive from {}", settings.input_queue);
            RepeatedFailureCircuitBreaker::new(
                "receive",
                config.circuit_breaker_wait(),
                Box::new(move |err| handler.on_critical_error(&reason, &anyhow::anyhow!("{err}"))),
            )
        };
        let loop_breaker = {
            let handler = Arc::clone(&handler);
            let reason = format!("Failed to run receive loop for {}", settings.input_queue);
            RepeatedFailureCircuitBreaker::new(
                "receive-loop",
                config.circuit_breaker_wait(),
                Box::new(move |err| handler.on_critical_error(&reason, &anyhow::anyhow!("{err}"))),
            )
        };

        Self {
            inner: Arc::new(PumpInner {
                pool,
                translator,
                receiver,
                settings,
                config,
                full_handling_factory,
                empty_handling_factory,
                receive_breaker,
                loop_breaker,
                shutdown: ShutdownSignal::new(),
            }),
            receive_tasks: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Purge the input queue if configured, then spin up the receive loops.
    pub async fn start(&self) -> Result<()> {
        if self.inner.config.purge_on_startup {
            self.inner.purge_input_queue().await;
        }

        let mut tasks = self.receive_tasks.lock();
        for worker in 0..self.inner.config.max_concurrency {
            let inner = Arc::clone(&self.inner);
            tasks.push(tokio::spawn(async move {
                inner.process_messages(worker).await;
            }));
        }
        info!(
            input_queue = %self.inner.settings.input_queue,
            concurrency = self.inner.config.max_concurrency,
            "message pump started"
        );
        Ok(())
    }

    /// Signal shutdown and wait for the loops to exit cooperatively.
    /// Overrunning the timeout is logged, never raised; stopping must not
    /// hang the host.
    pub async fn stop(&self) {
        self.inner.shutdown.cancel();
        let handles: Vec<JoinHandle<()>> = self.receive_tasks.lock().drain(..).collect();
        if tokio::time::timeout(STOP_TIMEOUT, futures::future::join_all(handles))
            .await
            .is_err()
        {
            error!(
                timeout_secs = STOP_TIMEOUT.as_secs(),
                "the message pump failed to stop within the time allowed"
            );
        } else {
            info!(input_queue = %self.inner.settings.input_queue, "message pump stopped");
        }
    }
}

enum InnerReceive {
    Received,
    QueueEmpty,
    Failed,
}

impl PumpInner {
    async fn purge_input_queue(&self) {
        let result: Result<u64> = async {
            let factory = TableQueueFactory::new((self.full_handling_factory)());
            let address = self.translator.translate(&self.settings.input_queue);
            let queue = factory.get(&address.qualified_table(), &address.name);
            let mut conn = self.pool.acquire().await?;
            queue.purge(&mut conn).await
        }
        .await;

        match result {
            Ok(purged) => {
                info!(
                    queue = %self.settings.input_queue,
                    purged,
                    "messages purged from queue on startup"
                );
            }
            Err(err) => {
                warn!(error = %err, "failed to purge input queue on startup");
            }
        }
    }

    /// Outer loop of one receive worker: one fresh queue-handle registry
    /// and empty-handling strategy per connection cycle.
    async fn process_messages(&self, worker: usize) {
        while !self.shutdown.is_cancelled() {
            let factory = TableQueueFactory::new((self.full_handling_factory)());
            let input_address = self.translator.translate(&self.settings.input_queue);
            let error_address = self.translator.translate(&self.settings.error_queue);
            let input_queue = factory.get(&input_address.qualified_table(), &input_address.name);
            let error_queue = factory.get(&error_address.qualified_table(), &error_address.name);

            match self.inner_process_messages(&input_queue, &error_queue).await {
                Ok(()) => self.loop_breaker.success(),
                Err(err) if self.shutdown.is_cancelled() => {
                    debug!(worker, error = %err, "error thrown during shutdown");
                }
                Err(err) => {
                    error!(worker, error = %err, "message pump receive loop failed");
                    self.loop_breaker.failure(&err).await;
                }
            }
        }
        debug!(worker, "receive loop exited");
    }

    async fn inner_process_messages(
        &self,
        input_queue: &TableQueue,
        error_queue: &TableQueue,
    ) -> Result<()> {
        let empty_handling = (self.empty_handling_factory)();
        while !self.shutdown.is_cancelled() {
            {
                let mut conn = self.pool.acquire().await?;
                loop {
                    match self.inner_receive(&mut conn, input_queue, error_queue).await {
                        InnerReceive::QueueEmpty => break,
                        InnerReceive::Received => empty_handling.on_queue_non_empty(),
                        InnerReceive::Failed => {
                            if self.shutdown.is_cancelled() {
                                break;
                            }
                        }
                    }
                }
            }
            empty_handling.handle_queue_empty(&self.shutdown).await;
        }
        Ok(())
    }

    async fn inner_receive(
        &self,
        conn: &mut PgConnection,
        input_queue: &TableQueue,
        error_queue: &TableQueue,
    ) -> InnerReceive {
        match self
            .receiver
            .receive_message(input_queue, error_queue, conn)
            .await
        {
            Ok(ReceiveOutcome::Received) => {
                self.receive_breaker.success();
                InnerReceive::Received
            }
            Ok(ReceiveOutcome::QueueEmpty) => {
                self.receive_breaker.success();
                InnerReceive::QueueEmpty
            }
            Err(err) if err.is_deadlock() => {
                // The claim lost a deadlock resolution; the row stays for
                // another receiver.
                warn!(error = %err, "receive operation was chosen as deadlock victim");
                InnerReceive::Failed
            }
            Err(err) => {
                warn!(error = %err, "receive operation failed");
                self.receive_breaker.failure(&err).await;
                InnerReceive::Failed
            }
        }
    }
}
