// Aggregation stage: fan out one source query per requested service and
// merge the results in source order, under a process-wide concurrency cap.

use std::sync::Arc;

use futures::future::try_join_all;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::{Offer, PipelineContext};
use crate::error::{SourceError, StageError};
use crate::pipeline::{forward, recv_next, SharedReceiver};
use crate::source::OfferSource;

/// Query every requested source concurrently and concatenate the results in
/// input order (source A's offers before source B's, no de-duplication).
///
/// Each individual query holds one permit from the shared pool, so the
/// number of outstanding source-client queries system-wide never exceeds the
/// pool size, no matter how many workers or contexts are in flight. Any
/// failed query fails the whole aggregation; sibling queries still pending
/// are abandoned.
pub async fn aggregate(
    source: &dyn OfferSource,
    permits: &Semaphore,
    sources: &[String],
) -> Result<Vec<Offer>, SourceError> {
    let queries = sources.iter().map(|name| async move {
        // The pool lives as long as the pipeline; a closed pool is an
        // invariant violation, not a recoverable failure.
        let _permit = permits
            .acquire()
            .await
            .expect("source query permit pool closed");
        source.query(name).await
    });

    let per_source = try_join_all(queries).await?;
    Ok(per_source.into_iter().flatten().collect())
}

pub(crate) async fn aggregation_worker(
    source: Arc<dyn OfferSource>,
    permits: Arc<Semaphore>,
    inbound: SharedReceiver<Vec<String>>,
    outbound: mpsc::Sender<PipelineContext<Vec<Offer>>>,
    errors: mpsc::UnboundedSender<StageError>,
    shutdown: CancellationToken,
) {
    loop {
        let ctx = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = recv_next(&inbound) => match next {
                Some(ctx) => ctx,
                None => break,
            },
        };

        let user_id = ctx.user_id;
        match aggregate(source.as_ref(), &permits, &ctx.payload).await {
            Ok(offers) => {
                debug!(user_id, offers = offers.len(), "offers aggregated");
                let ctx = PipelineContext::new(user_id, offers);
                if !forward(&outbound, ctx, &shutdown).await {
                    break;
                }
            }
            Err(err) => {
                // The context is dropped whole; the worker moves on.
                warn!(user_id, error = %err, "aggregation failed, dropping context");
                let _ = errors.send(StageError::Aggregation {
                    user_id,
                    source: err,
                });
            }
        }
    }
    debug!("aggregation worker stopped");
}
