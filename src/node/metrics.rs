//! Rate metrics derived from the daemon's cumulative network counters.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{NodeError, Result};
use crate::http::NodeApi;

pub const DEFAULT_WINDOW: u64 = 100;

pub const SENT_BYTES: &str = "algod_network_sent_bytes_total";
pub const RECEIVED_BYTES: &str = "algod_network_received_bytes_total";
pub const P2P_SENT_BYTES: &str = "algod_network_p2p_sent_bytes_total";
pub const P2P_RECEIVED_BYTES: &str = "algod_network_p2p_received_bytes_total";

/// Parsed metrics endpoint: metric key (name plus labels) to integer value.
pub type MetricsResponse = HashMap<String, u64>;

/// Parses Prometheus-style text. Lines whose value is not a plain unsigned
/// integer are skipped.
pub fn parse_metrics_content(content: &str) -> Result<MetricsResponse> {
    if !content.starts_with('#') {
        return Err(NodeError::validation(
            "invalid metrics content: content must start with #",
        ));
    }

    let mut result = MetricsResponse::new();
    for line in content.lines() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.rsplit_once(char::is_whitespace) else {
            continue;
        };
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        let parsed = value.parse::<u64>().map_err(|e| {
            NodeError::validation(format!("failed to parse value '{value}' for metric '{key}': {e}"))
        })?;
        result.insert(key.trim().to_string(), parsed);
    }
    Ok(result)
}

/// One scrape of the four cumulative byte counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSample {
    pub sent: u64,
    pub received: u64,
    pub p2p_sent: u64,
    pub p2p_received: u64,
    pub timestamp: SystemTime,
}

impl Default for MetricsSample {
    fn default() -> Self {
        Self {
            sent: 0,
            received: 0,
            p2p_sent: 0,
            p2p_received: 0,
            timestamp: UNIX_EPOCH,
        }
    }
}

impl MetricsSample {
    /// Absent counters read as zero.
    pub fn from_response(content: &MetricsResponse, timestamp: SystemTime) -> Self {
        let get = |key: &str| content.get(key).copied().unwrap_or(0);
        Self {
            sent: get(SENT_BYTES),
            received: get(RECEIVED_BYTES),
            p2p_sent: get(P2P_SENT_BYTES),
            p2p_received: get(P2P_RECEIVED_BYTES),
            timestamp,
        }
    }
}

/// Block header fields needed for windowed statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct BlockHeader {
    /// Seconds since the Unix epoch.
    #[serde(rename = "ts", default)]
    pub timestamp: i64,
    /// Transactions committed up to and including this block.
    #[serde(rename = "tc", default)]
    pub txn_counter: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BlockMetrics {
    pub tps: f64,
    pub avg_time: Duration,
}

impl BlockMetrics {
    pub fn between(first: &BlockHeader, last: &BlockHeader, rounds: u64) -> Self {
        let elapsed = last.timestamp.saturating_sub(first.timestamp);
        if elapsed <= 0 || rounds == 0 {
            return Self::default();
        }
        let txns = last.txn_counter.saturating_sub(first.txn_counter);
        Self {
            tps: txns as f64 / elapsed as f64,
            avg_time: Duration::from_secs_f64(elapsed as f64 / rounds as f64),
        }
    }
}

fn rate(current: u64, previous: u64, elapsed_secs: f64) -> u64 {
    if elapsed_secs <= 0.0 {
        return 0;
    }
    (current.saturating_sub(previous) as f64 / elapsed_secs) as u64
}

/// Smoothed telemetry. Start from [`RateMetrics::default`] and call
/// [`RateMetrics::refresh`] on every poll.
#[derive(Debug, Clone, PartialEq)]
pub struct RateMetrics {
    /// False after a failed scrape; stale rates must not be shown as live.
    pub enabled: bool,
    pub window: u64,
    pub round_time: Duration,
    pub tps: f64,
    /// Bytes per second.
    pub tx: u64,
    pub rx: u64,
    pub tx_p2p: u64,
    pub rx_p2p: u64,
    pub last: MetricsSample,
}

impl Default for RateMetrics {
    fn default() -> Self {
        Self {
            enabled: false,
            window: DEFAULT_WINDOW,
            round_time: Duration::ZERO,
            tps: 0.0,
            tx: 0,
            rx: 0,
            tx_p2p: 0,
            rx_p2p: 0,
            last: MetricsSample::default(),
        }
    }
}

impl RateMetrics {
    pub fn with_window(window: u64) -> Self {
        Self {
            window,
            ..Self::default()
        }
    }

    /// Rates against the previous sample, which `sample` then replaces.
    pub fn advance(&mut self, sample: MetricsSample) {
        let elapsed = sample
            .timestamp
            .duration_since(self.last.timestamp)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        self.tx = rate(sample.sent, self.last.sent, elapsed);
        self.rx = rate(sample.received, self.last.received, elapsed);
        self.tx_p2p = rate(sample.p2p_sent, self.last.p2p_sent, elapsed);
        self.rx_p2p = rate(sample.p2p_received, self.last.p2p_received, elapsed);
        self.last = sample;
    }

    pub fn apply_block_metrics(&mut self, block: BlockMetrics) {
        self.tps = block.tps;
        self.round_time = block.avg_time;
    }

    /// Scrapes counters and, past the first `window` rounds, block statistics.
    pub async fn refresh(&mut self, api: &dyn NodeApi, current_round: u64) -> Result<()> {
        self.refresh_at(api, current_round, SystemTime::now()).await
    }

    pub async fn refresh_at(
        &mut self,
        api: &dyn NodeApi,
        current_round: u64,
        now: SystemTime,
    ) -> Result<()> {
        let content = match api
            .metrics_text()
            .await
            .and_then(|text| parse_metrics_content(&text))
        {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "Metrics scrape failed, disabling");
                self.enabled = false;
                return Err(e);
            }
        };

        self.enabled = true;
        self.advance(MetricsSample::from_response(&content, now));

        if current_round > self.window {
            let block = api
                .block_metrics(current_round - self.window, current_round)
                .await?;
            self.apply_block_metrics(block);
        }
        debug!(tx = self.tx, rx = self.rx, tps = self.tps, "Metrics refreshed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const SAMPLE: &str = "# HELP algod_network_sent_bytes_total Bytes sent\n\
# TYPE algod_network_sent_bytes_total counter\n\
algod_network_sent_bytes_total 2000\n\
algod_network_received_bytes_total 4000\n\
algod_network_p2p_sent_bytes_total 0\n\
algod_network_p2p_received_bytes_total 10\n\
algod_ledger_round{kind=\"latest\"} 42\n\
go_gc_duration_seconds 0.000125\n";

    struct FakeApi {
        text: Mutex<Result<String>>,
        block: BlockMetrics,
        block_calls: Mutex<Vec<(u64, u64)>>,
    }

    impl FakeApi {
        fn new(text: &str) -> Self {
            Self {
                text: Mutex::new(Ok(text.to_string())),
                block: BlockMetrics {
                    tps: 12.5,
                    avg_time: Duration::from_millis(2800),
                },
                block_calls: Mutex::new(Vec::new()),
            }
        }

        fn set_text(&self, text: Result<String>) {
            *self.text.lock().unwrap() = text;
        }
    }

    #[async_trait]
    impl NodeApi for FakeApi {
        async fn metrics_text(&self) -> Result<String> {
            match &*self.text.lock().unwrap() {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(NodeError::Status {
                    code: 500,
                    body: String::new(),
                }),
            }
        }

        async fn block_metrics(&self, first: u64, last: u64) -> Result<BlockMetrics> {
            self.block_calls.lock().unwrap().push((first, last));
            Ok(self.block)
        }

        async fn last_round(&self) -> Result<u64> {
            Ok(0)
        }
    }

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
    }

    fn sample(sent: u64, received: u64, secs: u64) -> MetricsSample {
        MetricsSample {
            sent,
            received,
            p2p_sent: 0,
            p2p_received: 0,
            timestamp: at(secs),
        }
    }

    #[test]
    fn test_parse_metrics_content() {
        let parsed = parse_metrics_content(SAMPLE).unwrap();
        assert_eq!(parsed[SENT_BYTES], 2000);
        assert_eq!(parsed[P2P_RECEIVED_BYTES], 10);
        assert_eq!(parsed["algod_ledger_round{kind=\"latest\"}"], 42);
        assert!(!parsed.contains_key("go_gc_duration_seconds"));
    }

    #[test]
    fn test_parse_rejects_content_without_header() {
        assert!(parse_metrics_content("").is_err());
        assert!(parse_metrics_content("algod_network_sent_bytes_total 1").is_err());
    }

    #[test]
    fn test_rates_from_deltas() {
        let mut metrics = RateMetrics::default();
        metrics.advance(sample(1000, 500, 0));
        metrics.advance(sample(3000, 1500, 2));
        assert_eq!(metrics.tx, 1000);
        assert_eq!(metrics.rx, 500);
        assert_eq!(metrics.last, sample(3000, 1500, 2));
    }

    #[test]
    fn test_counter_reset_never_goes_negative() {
        let mut metrics = RateMetrics::default();
        metrics.advance(sample(1_000_000, 1_000_000, 0));
        metrics.advance(sample(10, 0, 5));
        assert_eq!(metrics.tx, 0);
        assert_eq!(metrics.rx, 0);

        metrics.advance(sample(510, 100, 10));
        assert_eq!(metrics.tx, 100);
        assert_eq!(metrics.rx, 20);
    }

    #[test]
    fn test_zero_or_backwards_elapsed_yields_zero() {
        let mut metrics = RateMetrics::default();
        metrics.advance(sample(0, 0, 10));
        metrics.advance(sample(500, 500, 10));
        assert_eq!(metrics.tx, 0);
        metrics.advance(sample(900, 900, 5));
        assert_eq!(metrics.tx, 0);
    }

    #[test]
    fn test_block_metrics_between() {
        let first = BlockHeader {
            timestamp: 1000,
            txn_counter: 5000,
        };
        let last = BlockHeader {
            timestamp: 1300,
            txn_counter: 8000,
        };
        let stats = BlockMetrics::between(&first, &last, 100);
        assert_eq!(stats.tps, 10.0);
        assert_eq!(stats.avg_time, Duration::from_secs(3));
        assert_eq!(BlockMetrics::between(&last, &first, 100), BlockMetrics::default());
    }

    #[tokio::test]
    async fn test_window_gating() {
        let api = FakeApi::new(SAMPLE);
        let mut metrics = RateMetrics::default();
        metrics.tps = 1.0;
        metrics.round_time = Duration::from_secs(3);

        metrics.refresh_at(&api, 100, at(0)).await.unwrap();
        assert!(api.block_calls.lock().unwrap().is_empty());
        assert_eq!(metrics.tps, 1.0);
        assert_eq!(metrics.round_time, Duration::from_secs(3));

        metrics.refresh_at(&api, 101, at(1)).await.unwrap();
        assert_eq!(*api.block_calls.lock().unwrap(), vec![(1, 101)]);
        assert_eq!(metrics.tps, 12.5);
        assert_eq!(metrics.round_time, Duration::from_millis(2800));
    }

    #[tokio::test]
    async fn test_failed_scrape_disables_until_next_success() {
        let api = FakeApi::new(SAMPLE);
        let mut metrics = RateMetrics::default();

        metrics.refresh_at(&api, 1, at(0)).await.unwrap();
        assert!(metrics.enabled);

        api.set_text(Err(NodeError::Unauthorized));
        assert!(metrics.refresh_at(&api, 2, at(1)).await.is_err());
        assert!(!metrics.enabled);

        api.set_text(Ok("garbage".into()));
        assert!(metrics.refresh_at(&api, 3, at(2)).await.is_err());
        assert!(!metrics.enabled);

        api.set_text(Ok(SAMPLE.into()));
        metrics.refresh_at(&api, 4, at(3)).await.unwrap();
        assert!(metrics.enabled);
    }
}
