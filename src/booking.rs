// Booking stage: race one attempt per candidate offer, keep the first
// success, cancel the rest and compensate their holds.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::{BookingOutcome, Offer, PipelineContext};
use crate::error::{BookingError, StageError};
use crate::pipeline::{forward, recv_next, SharedReceiver};
use crate::registry::BookingRegistry;

#[async_trait]
pub trait BookingGateway: Send + Sync + 'static {
    /// Attempt to book one offer for a user. Takes the gateway's own latency
    /// and may fail; it does not touch the registry.
    async fn book(&self, user_id: u64, offer: &Offer) -> Result<(), BookingError>;
}

/// Simulated gateway with a fixed latency, per-URL latency overrides and
/// per-URL failure injection.
pub struct SimulatedBookingGateway {
    latency: Duration,
    latency_overrides: Mutex<HashMap<String, Duration>>,
    failing: Mutex<HashSet<String>>,
}

impl SimulatedBookingGateway {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            latency_overrides: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Override the booking latency for one offer URL.
    pub fn set_latency(&self, url: &str, latency: Duration) {
        self.latency_overrides
            .lock()
            .insert(url.to_string(), latency);
    }

    /// Make attempts for `url` fail after their latency elapses.
    pub fn fail_url(&self, url: &str) {
        self.failing.lock().insert(url.to_string());
    }
}

#[async_trait]
impl BookingGateway for SimulatedBookingGateway {
    async fn book(&self, _user_id: u64, offer: &Offer) -> Result<(), BookingError> {
        let latency = self
            .latency_overrides
            .lock()
            .get(&offer.url)
            .copied()
            .unwrap_or(self.latency);
        tokio::time::sleep(latency).await;

        if self.failing.lock().contains(&offer.url) {
            return Err(BookingError::AttemptFailed {
                url: offer.url.clone(),
                reason: "gateway rejected booking".to_string(),
            });
        }
        Ok(())
    }
}

/// One booking attempt. The hold is recorded up front; on cancellation or
/// gateway failure the attempt releases it before reporting back, so a
/// losing attempt never leaves its hold behind.
async fn booking_attempt(
    gateway: Arc<dyn BookingGateway>,
    registry: Arc<BookingRegistry>,
    user_id: u64,
    offer: Offer,
    cancel: CancellationToken,
) -> Result<Offer, BookingError> {
    registry.hold(user_id, &offer.url);

    tokio::select! {
        _ = cancel.cancelled() => {
            registry.release(user_id, &offer.url);
            Err(BookingError::Cancelled { url: offer.url })
        }
        result = gateway.book(user_id, &offer) => match result {
            Ok(()) => Ok(offer),
            Err(err) => {
                registry.release(user_id, &offer.url);
                Err(err)
            }
        }
    }
}

/// Race all candidates for one context: first successful attempt wins, the
/// rest are cancelled and compensated. Returns `None` when the candidate
/// list is empty or every attempt failed. On return the registry holds at
/// most the winner's URL for this context.
pub(crate) async fn book_first_winner(
    gateway: &Arc<dyn BookingGateway>,
    registry: &Arc<BookingRegistry>,
    user_id: u64,
    offers: Vec<Offer>,
) -> Option<Offer> {
    if offers.is_empty() {
        return None;
    }

    let cancel = CancellationToken::new();
    let mut attempts = JoinSet::new();
    for offer in offers {
        attempts.spawn(booking_attempt(
            gateway.clone(),
            registry.clone(),
            user_id,
            offer,
            cancel.clone(),
        ));
    }

    // The JoinSet is drained completely before the context is considered
    // finished: no attempt outlives the race and no compensation is skipped.
    let mut winner: Option<Offer> = None;
    while let Some(joined) = attempts.join_next().await {
        let result = match joined {
            Ok(result) => result,
            Err(err) => {
                warn!(user_id, error = %err, "booking attempt task failed");
                continue;
            }
        };
        match result {
            Ok(offer) if winner.is_none() => {
                cancel.cancel();
                winner = Some(offer);
            }
            // Completed after the winner was chosen: un-book it the same way
            // a held-only loser is compensated.
            Ok(offer) => {
                registry.release(user_id, &offer.url);
            }
            // Cancelled and failed attempts have already released their hold.
            Err(BookingError::Cancelled { .. }) => {}
            Err(err) => {
                debug!(user_id, error = %err, "booking attempt failed");
            }
        }
    }
    winner
}

pub(crate) async fn booking_worker(
    gateway: Arc<dyn BookingGateway>,
    registry: Arc<BookingRegistry>,
    inbound: SharedReceiver<Vec<Offer>>,
    outbound: mpsc::Sender<PipelineContext<BookingOutcome>>,
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

        let PipelineContext { user_id, payload } = ctx;
        let had_candidates = !payload.is_empty();

        let outcome = match book_first_winner(&gateway, &registry, user_id, payload).await {
            Some(offer) => {
                debug!(user_id, url = %offer.url, "offer booked");
                BookingOutcome::Booked(offer)
            }
            None => {
                if had_candidates {
                    let _ = errors.send(StageError::AllBookingsFailed { user_id });
                }
                BookingOutcome::NotBooked
            }
        };

        let ctx = PipelineContext::new(user_id, outcome);
        if !forward(&outbound, ctx, &shutdown).await {
            break;
        }
    }
    debug!("booking worker stopped");
}
