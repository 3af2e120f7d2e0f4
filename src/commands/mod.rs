pub(crate) mod configure;
pub(crate) mod debug;
pub(crate) mod hash;
pub(crate) mod lifecycle;
pub(crate) mod metrics;

use std::future::Future;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use nodekit::Result;

fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Runs `step` behind a spinner and reports how it went.
pub(crate) async fn with_progress<T, F>(message: &str, done: &str, step: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let pb = create_progress_bar(message);
    let result = step.await;
    pb.finish_with_message(match &result {
        Ok(_) => done.to_string(),
        Err(e) => format!("Failed: {}", e),
    });
    result
}
