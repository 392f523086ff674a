// Pipeline orchestrator: builds the inter-stage queues, spawns every stage's
// worker pool and owns the shared resources the stages need. Producers and
// consumers only ever see the inbound sender, the outbound receiver and the
// error channel.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::aggregation::aggregation_worker;
use crate::booking::{booking_worker, BookingGateway};
use crate::config::PipelineConfig;
use crate::context::{BookingOutcome, PipelineContext};
use crate::error::{ConfigError, PipelineClosed, StageError};
use crate::filter::filter_worker;
use crate::registry::BookingRegistry;
use crate::source::OfferSource;

/// Inbound end of a stage: several workers in a pool drain one queue, so the
/// receiver sits behind a lock. Items are handed FIFO to whichever worker
/// grabs the lock next; completion order across contexts is not guaranteed.
pub(crate) type SharedReceiver<T> = Arc<Mutex<mpsc::Receiver<PipelineContext<T>>>>;

pub(crate) async fn recv_next<T>(inbound: &SharedReceiver<T>) -> Option<PipelineContext<T>> {
    inbound.lock().await.recv().await
}

/// Send downstream unless shutdown wins the race. Returns false when the
/// worker should stop.
pub(crate) async fn forward<T>(
    outbound: &mpsc::Sender<PipelineContext<T>>,
    ctx: PipelineContext<T>,
    shutdown: &CancellationToken,
) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        result = outbound.send(ctx) => result.is_ok(),
    }
}

/// Handle to a running pipeline.
///
/// Dropping every cloned inbound sender and then draining the outbound queue
/// shuts the stages down naturally; `shutdown` does it explicitly by
/// cancelling the workers and awaiting their termination.
pub struct Pipeline {
    inbound: mpsc::Sender<PipelineContext<Vec<String>>>,
    outbound: mpsc::Receiver<PipelineContext<BookingOutcome>>,
    errors: mpsc::UnboundedReceiver<StageError>,
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Spawn all three stages against freshly wired queues. The registry and
    /// the source-query permit pool are injected into the stages that need
    /// them; nothing else is shared.
    pub fn start(
        config: PipelineConfig,
        source: Arc<dyn OfferSource>,
        gateway: Arc<dyn BookingGateway>,
        registry: Arc<BookingRegistry>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let (inbound_tx, inbound_rx) = mpsc::channel(config.queue_capacity);
        let (aggregated_tx, aggregated_rx) = mpsc::channel(config.queue_capacity);
        let (filtered_tx, filtered_rx) = mpsc::channel(config.queue_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(config.queue_capacity);
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();

        let shutdown = CancellationToken::new();
        let permits = Arc::new(Semaphore::new(config.max_parallel_source_queries));
        let mut workers = Vec::with_capacity(
            config.aggregation_workers + config.filter_workers + config.booking_workers,
        );

        let inbound_shared: SharedReceiver<Vec<String>> = Arc::new(Mutex::new(inbound_rx));
        for _ in 0..config.aggregation_workers {
            workers.push(tokio::spawn(aggregation_worker(
                source.clone(),
                permits.clone(),
                inbound_shared.clone(),
                aggregated_tx.clone(),
                errors_tx.clone(),
                shutdown.clone(),
            )));
        }
        // Each stage's workers hold the only sender clones for the next
        // queue; dropping the originals here lets the stages drain to
        // completion once the upstream pool exits.
        drop(aggregated_tx);

        let aggregated_shared: SharedReceiver<_> = Arc::new(Mutex::new(aggregated_rx));
        for _ in 0..config.filter_workers {
            workers.push(tokio::spawn(filter_worker(
                config.filter.clone(),
                aggregated_shared.clone(),
                filtered_tx.clone(),
                shutdown.clone(),
            )));
        }
        drop(filtered_tx);

        let filtered_shared: SharedReceiver<_> = Arc::new(Mutex::new(filtered_rx));
        for _ in 0..config.booking_workers {
            workers.push(tokio::spawn(booking_worker(
                gateway.clone(),
                registry.clone(),
                filtered_shared.clone(),
                outbound_tx.clone(),
                errors_tx.clone(),
                shutdown.clone(),
            )));
        }
        drop(outbound_tx);

        debug!(workers = workers.len(), "pipeline started");
        Ok(Self {
            inbound: inbound_tx,
            outbound: outbound_rx,
            errors: errors_rx,
            shutdown,
            workers,
        })
    }

    /// Clone of the inbound sender, for producers that outlive this handle.
    pub fn sender(&self) -> mpsc::Sender<PipelineContext<Vec<String>>> {
        self.inbound.clone()
    }

    /// Submit one user request: the ordered list of sources to aggregate.
    pub async fn submit(&self, user_id: u64, sources: Vec<String>) -> Result<(), PipelineClosed> {
        self.inbound
            .send(PipelineContext::new(user_id, sources))
            .await
            .map_err(|_| PipelineClosed)
    }

    /// Next completed context, or `None` once every worker has stopped.
    pub async fn recv_outcome(&mut self) -> Option<PipelineContext<BookingOutcome>> {
        self.outbound.recv().await
    }

    /// Next stage failure from the error channel.
    pub async fn recv_error(&mut self) -> Option<StageError> {
        self.errors.recv().await
    }

    pub fn try_recv_error(&mut self) -> Option<StageError> {
        self.errors.try_recv().ok()
    }

    /// Signal every worker to stop and await termination. A context already
    /// being processed finishes its current stage first, so shutdown never
    /// leaks a registry hold.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        for worker in self.workers.drain(..) {
            if let Err(err) = worker.await {
                warn!(error = %err, "pipeline worker did not stop cleanly");
            }
        }
        debug!("pipeline stopped");
    }
}
