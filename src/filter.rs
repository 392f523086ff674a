// Filter stage: stateless reduction of an offer list by brand and price
// predicates.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::context::{Offer, PipelineContext};
use crate::pipeline::{forward, recv_next, SharedReceiver};

/// Offer predicates. Absent fields impose no constraint; present fields
/// apply as a conjunction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    /// Keep an offer iff its brand equals this one.
    pub brand: Option<String>,
    /// Keep an offer iff its price does not exceed this.
    pub max_price: Option<u64>,
}

impl FilterCriteria {
    pub fn matches(&self, offer: &Offer) -> bool {
        self.brand.as_ref().map_or(true, |brand| &offer.brand == brand)
            && self.max_price.map_or(true, |price| offer.price <= price)
    }

    /// Retain matching offers, preserving input order. Nothing is added,
    /// duplicated or reordered, so applying the same criteria twice is a
    /// no-op.
    pub fn apply(&self, offers: Vec<Offer>) -> Vec<Offer> {
        offers.into_iter().filter(|o| self.matches(o)).collect()
    }
}

pub(crate) async fn filter_worker(
    criteria: FilterCriteria,
    inbound: SharedReceiver<Vec<Offer>>,
    outbound: mpsc::Sender<PipelineContext<Vec<Offer>>>,
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
        let kept = criteria.apply(ctx.payload);
        debug!(user_id, kept = kept.len(), "offers filtered");

        let ctx = PipelineContext::new(user_id, kept);
        if !forward(&outbound, ctx, &shutdown).await {
            break;
        }
    }
    debug!("filter worker stopped");
}
