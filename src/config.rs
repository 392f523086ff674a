// Process-wide pipeline configuration, fixed at startup.

use crate::error::ConfigError;
use crate::filter::FilterCriteria;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Global cap on concurrently outstanding source-client queries,
    /// enforced by a single shared permit pool.
    pub max_parallel_source_queries: usize,
    pub aggregation_workers: usize,
    pub filter_workers: usize,
    pub booking_workers: usize,
    /// Capacity of each inter-stage queue.
    pub queue_capacity: usize,
    pub filter: FilterCriteria,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_parallel_source_queries: 5,
            aggregation_workers: 4,
            filter_workers: 1,
            booking_workers: 4,
            queue_capacity: 64,
            filter: FilterCriteria::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("max_parallel_source_queries", self.max_parallel_source_queries),
            ("aggregation_workers", self.aggregation_workers),
            ("filter_workers", self.filter_workers),
            ("booking_workers", self.booking_workers),
            ("queue_capacity", self.queue_capacity),
        ];
        for (field, value) in fields {
            if value == 0 {
                return Err(ConfigError::ZeroValue { field });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_workers_rejected() {
        let config = PipelineConfig {
            booking_workers: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroValue {
                field: "booking_workers"
            })
        );
    }

    #[test]
    fn zero_permit_pool_rejected() {
        let config = PipelineConfig {
            max_parallel_source_queries: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
