// Error taxonomy for the pipeline.
//
// Stage-internal failures (a source query or a booking attempt going wrong)
// are recovered per item: the owning worker reports them and keeps draining
// its queue. Only invariant violations (e.g. a closed permit pool) are fatal
// to a stage.

use thiserror::Error;

/// A sourcing service could not be queried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("source {service} unavailable")]
    Unavailable { service: String },
}

/// Outcome of a single booking attempt that did not win.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    #[error("booking attempt for {url} failed: {reason}")]
    AttemptFailed { url: String, reason: String },

    #[error("booking attempt for {url} cancelled")]
    Cancelled { url: String },
}

/// Failures surfaced on the orchestrator's error channel, distinct from the
/// data path. A context that produced one of these never forwards a partial
/// result downstream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("aggregation failed for user {user_id}: {source}")]
    Aggregation {
        user_id: u64,
        #[source]
        source: SourceError,
    },

    #[error("no booking attempt succeeded for user {user_id}")]
    AllBookingsFailed { user_id: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },
}

/// Returned by `Pipeline::submit` once the pipeline has been shut down.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("pipeline is shut down")]
pub struct PipelineClosed;
