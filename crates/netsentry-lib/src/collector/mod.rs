//! Metrics collection from the metrics store
//!
//! The collector issues the four interface rate queries through a
//! [`MetricsQuery`] implementation and hands back the raw samples. Any
//! failed query fails the whole collection pass.

mod prometheus_http;

pub use prometheus_http::PrometheusClient;

use crate::error::CollectionResult;
use crate::models::{RawMetrics, RawSample};
use std::sync::Arc;
use tracing::debug;

pub use async_trait::async_trait;

/// Default range vector window for the rate queries
pub const DEFAULT_RATE_WINDOW: &str = "5m";

/// Instant-query access to a metrics store
#[async_trait]
pub trait MetricsQuery: Send + Sync {
    /// Run `query` and return one sample per resulting series
    async fn query(&self, query: &str) -> CollectionResult<Vec<RawSample>>;
}

/// The four rate queries issued per collection pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkQueries {
    pub receive: String,
    pub transmit: String,
    pub rx_errors: String,
    pub tx_errors: String,
}

impl NetworkQueries {
    /// Node-exporter interface counters rated over `window` (e.g. `5m`)
    pub fn with_window(window: &str) -> Self {
        let rate = |counter: &str| format!("rate({}[{}])", counter, window);
        Self {
            receive: rate("node_network_receive_bytes_total"),
            transmit: rate("node_network_transmit_bytes_total"),
            rx_errors: rate("node_network_receive_errs_total"),
            tx_errors: rate("node_network_transmit_errs_total"),
        }
    }
}

impl Default for NetworkQueries {
    fn default() -> Self {
        Self::with_window(DEFAULT_RATE_WINDOW)
    }
}

/// Gathers raw interface samples for one iteration
#[derive(Clone)]
pub struct SampleCollector {
    source: Arc<dyn MetricsQuery>,
    queries: NetworkQueries,
}

impl SampleCollector {
    pub fn new(source: Arc<dyn MetricsQuery>) -> Self {
        Self {
            source,
            queries: NetworkQueries::default(),
        }
    }

    pub fn with_queries(mut self, queries: NetworkQueries) -> Self {
        self.queries = queries;
        self
    }

    pub fn queries(&self) -> &NetworkQueries {
        &self.queries
    }

    /// Run all four queries
    pub async fn collect(&self) -> CollectionResult<RawMetrics> {
        let metrics = RawMetrics {
            receive: self.source.query(&self.queries.receive).await?,
            transmit: self.source.query(&self.queries.transmit).await?,
            rx_errors: self.source.query(&self.queries.rx_errors).await?,
            tx_errors: self.source.query(&self.queries.tx_errors).await?,
        };

        debug!(samples = metrics.sample_count(), "Collected interface samples");
        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectionError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Records queries and answers from a fixed table
    struct TableSource {
        answers: HashMap<String, Vec<RawSample>>,
        fail_on: Option<String>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MetricsQuery for TableSource {
        async fn query(&self, query: &str) -> CollectionResult<Vec<RawSample>> {
            self.seen.lock().unwrap().push(query.to_string());
            if self.fail_on.as_deref() == Some(query) {
                return Err(CollectionError::Status {
                    query: query.to_string(),
                    status: 503,
                });
            }
            Ok(self.answers.get(query).cloned().unwrap_or_default())
        }
    }

    fn sample(metric: &str, value: f64) -> RawSample {
        let mut labels = HashMap::new();
        labels.insert("instance".to_string(), "host".to_string());
        labels.insert("device".to_string(), "eth0".to_string());
        RawSample::new(metric, labels, Some((0.0, value)))
    }

    #[test]
    fn test_queries_use_window() {
        let queries = NetworkQueries::with_window("1m");
        assert_eq!(queries.receive, "rate(node_network_receive_bytes_total[1m])");
        assert_eq!(queries.tx_errors, "rate(node_network_transmit_errs_total[1m])");
        assert_eq!(
            NetworkQueries::default().transmit,
            "rate(node_network_transmit_bytes_total[5m])"
        );
    }

    #[tokio::test]
    async fn test_collect_routes_each_query() {
        let queries = NetworkQueries::default();
        let mut answers = HashMap::new();
        answers.insert(queries.receive.clone(), vec![sample("rx", 10.0)]);
        answers.insert(queries.tx_errors.clone(), vec![sample("txe", 1.0)]);

        let source = Arc::new(TableSource {
            answers,
            fail_on: None,
            seen: Mutex::new(Vec::new()),
        });
        let collector = SampleCollector::new(source.clone());

        let metrics = collector.collect().await.unwrap();
        assert_eq!(metrics.receive.len(), 1);
        assert!(metrics.transmit.is_empty());
        assert!(metrics.rx_errors.is_empty());
        assert_eq!(metrics.tx_errors[0].metric_name, "txe");
        assert_eq!(source.seen.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_any_failed_query_fails_collection() {
        let queries = NetworkQueries::default();
        let source = Arc::new(TableSource {
            answers: HashMap::new(),
            fail_on: Some(queries.transmit.clone()),
            seen: Mutex::new(Vec::new()),
        });

        let result = SampleCollector::new(source).collect().await;
        assert!(matches!(
            result,
            Err(CollectionError::Status { status: 503, .. })
        ));
    }
}
