// Offer sourcing boundary. The pipeline only depends on the `OfferSource`
// contract; a production implementation would perform a real remote call.

use async_trait::async_trait;

use crate::context::Offer;
use crate::error::SourceError;

#[async_trait]
pub trait OfferSource: Send + Sync + 'static {
    /// Query one sourcing service for its current offers. The returned order
    /// is the service's own and is preserved by the pipeline.
    async fn query(&self, source: &str) -> Result<Vec<Offer>, SourceError>;
}

pub mod mock {
    //! In-process source used by tests and benches. Returns a fixed catalog
    //! after a configurable latency, with per-source failure injection and
    //! in-flight gauges so tests can observe the concurrency cap.

    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;
    use rand::Rng;

    use super::{async_trait, Offer, OfferSource, SourceError};

    /// The five-offer catalog every mock source carries.
    pub fn catalog(source: &str) -> Vec<Offer> {
        const CARS: [(&str, u64); 5] = [
            ("LADA", 1_000),
            ("MITSUBISHI", 5_000),
            ("KIA", 3_000),
            ("DAEWOO", 2_000),
            ("PORSCHE", 10_000),
        ];
        CARS.iter()
            .enumerate()
            .map(|(i, (brand, price))| Offer {
                url: format!("http://{source}/car?id={}", i + 1),
                price: *price,
                brand: (*brand).to_string(),
            })
            .collect()
    }

    pub struct MockOfferSource {
        latency: Duration,
        jitter_ms: u64,
        failing: Mutex<HashSet<String>>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
        total_queries: AtomicUsize,
    }

    impl MockOfferSource {
        pub fn new(latency: Duration) -> Self {
            Self {
                latency,
                jitter_ms: 0,
                failing: Mutex::new(HashSet::new()),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
                total_queries: AtomicUsize::new(0),
            }
        }

        pub fn with_jitter(mut self, jitter_ms: u64) -> Self {
            self.jitter_ms = jitter_ms;
            self
        }

        /// Make queries for `source` report `SourceError::Unavailable`.
        pub fn fail_source(&self, source: &str) {
            self.failing.lock().insert(source.to_string());
        }

        pub fn restore_source(&self, source: &str) {
            self.failing.lock().remove(source);
        }

        /// Highest number of queries observed in flight at the same instant.
        pub fn peak_in_flight(&self) -> usize {
            self.peak_in_flight.load(Ordering::SeqCst)
        }

        pub fn total_queries(&self) -> usize {
            self.total_queries.load(Ordering::SeqCst)
        }
    }

    // Keeps the gauge accurate even when a query future is dropped
    // mid-flight (aggregation abandons sibling queries on first failure).
    struct InFlightGuard<'a>(&'a AtomicUsize);

    impl Drop for InFlightGuard<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl OfferSource for MockOfferSource {
        async fn query(&self, source: &str) -> Result<Vec<Offer>, SourceError> {
            self.total_queries.fetch_add(1, Ordering::SeqCst);
            let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
            let _guard = InFlightGuard(&self.in_flight);

            let jitter = if self.jitter_ms > 0 {
                rand::thread_rng().gen_range(0..self.jitter_ms)
            } else {
                0
            };
            tokio::time::sleep(self.latency + Duration::from_millis(jitter)).await;

            if self.failing.lock().contains(source) {
                return Err(SourceError::Unavailable {
                    service: source.to_string(),
                });
            }
            Ok(catalog(source))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::mock::{catalog, MockOfferSource};
    use super::*;

    #[test]
    fn catalog_is_five_offers_in_fixed_order() {
        let offers = catalog("svcA");
        assert_eq!(offers.len(), 5);
        let brands: Vec<&str> = offers.iter().map(|o| o.brand.as_str()).collect();
        assert_eq!(
            brands,
            vec!["LADA", "MITSUBISHI", "KIA", "DAEWOO", "PORSCHE"]
        );
        assert_eq!(offers[0].url, "http://svcA/car?id=1");
        assert_eq!(offers[4].price, 10_000);
    }

    #[tokio::test(start_paused = true)]
    async fn jittered_latency_still_returns_the_catalog() {
        let source = MockOfferSource::new(Duration::from_millis(10)).with_jitter(20);
        let offers = source.query("svcA").await.unwrap();
        assert_eq!(offers.len(), 5);
        assert_eq!(source.peak_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_source_reports_unavailable() {
        let source = MockOfferSource::new(Duration::from_millis(10));
        source.fail_source("svcB");

        assert!(source.query("svcA").await.is_ok());
        assert_eq!(
            source.query("svcB").await,
            Err(SourceError::Unavailable {
                service: "svcB".to_string()
            })
        );

        source.restore_source("svcB");
        assert!(source.query("svcB").await.is_ok());
        assert_eq!(source.total_queries(), 3);
    }
}
