use std::time::Duration;

use nodekit::http::{AlgodClient, NodeApi};
use nodekit::node::metrics::RateMetrics;
use tracing::warn;

fn kib(bytes_per_sec: u64) -> f64 {
    bytes_per_sec as f64 / 1024.0
}

/// Refreshes `metrics` once and renders the line to print. A failed scrape
/// leaves the metrics disabled until a later poll succeeds.
async fn poll(api: &dyn NodeApi, metrics: &mut RateMetrics) -> String {
    let had_baseline = metrics.enabled;
    let refreshed = match api.last_round().await {
        Ok(round) => metrics.refresh(api, round).await.map(|_| round),
        Err(e) => {
            metrics.enabled = false;
            Err(e)
        }
    };

    let round = match refreshed {
        Ok(round) => round,
        Err(e) => {
            warn!(error = %e, "Metrics poll failed");
            return format!("Metrics disabled: {e}");
        }
    };

    if !had_baseline {
        return format!("Round {round}: collecting baseline");
    }
    format!(
        "Round {round}: tx {:.1} KiB/s rx {:.1} KiB/s p2p tx {:.1} KiB/s p2p rx {:.1} KiB/s tps {:.2} round time {:.2}s",
        kib(metrics.tx),
        kib(metrics.rx),
        kib(metrics.tx_p2p),
        kib(metrics.rx_p2p),
        metrics.tps,
        metrics.round_time.as_secs_f64(),
    )
}

pub(crate) async fn cmd_metrics(interval: u64, count: u64) -> anyhow::Result<()> {
    let api = AlgodClient::from_env()?;
    let mut metrics = RateMetrics::default();
    let mut polls = 0u64;

    loop {
        println!("{}", poll(&api, &mut metrics).await);
        polls += 1;

        if count != 0 && polls >= count {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_secs(interval)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nodekit::node::metrics::BlockMetrics;
    use nodekit::{NodeError, Result};
    use std::sync::Mutex;

    const SAMPLE: &str = "# HELP algod_network_sent_bytes_total Bytes sent\n\
algod_network_sent_bytes_total 2000\n\
algod_network_received_bytes_total 4000\n";

    /// Serves queued scrape results in order.
    struct ScriptedApi {
        scrapes: Mutex<Vec<Result<String>>>,
    }

    #[async_trait]
    impl NodeApi for ScriptedApi {
        async fn metrics_text(&self) -> Result<String> {
            self.scrapes.lock().unwrap().remove(0)
        }

        async fn block_metrics(&self, _first: u64, _last: u64) -> Result<BlockMetrics> {
            Err(NodeError::not_found("block headers"))
        }

        async fn last_round(&self) -> Result<u64> {
            Ok(10)
        }
    }

    #[tokio::test]
    async fn test_failed_scrape_keeps_polling() {
        let api = ScriptedApi {
            scrapes: Mutex::new(vec![
                Ok(SAMPLE.to_string()),
                Err(NodeError::Unauthorized),
                Ok(SAMPLE.to_string()),
                Ok(SAMPLE.to_string()),
            ]),
        };
        let mut metrics = RateMetrics::default();

        assert_eq!(poll(&api, &mut metrics).await, "Round 10: collecting baseline");
        assert!(metrics.enabled);

        assert!(poll(&api, &mut metrics).await.starts_with("Metrics disabled"));
        assert!(!metrics.enabled);

        assert_eq!(poll(&api, &mut metrics).await, "Round 10: collecting baseline");
        assert!(metrics.enabled);
        assert!(poll(&api, &mut metrics).await.starts_with("Round 10: tx "));
    }
}
