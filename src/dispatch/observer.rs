//! Side channel for human-readable dispatch reports.

use tracing::info;

/// Receives one message per interesting dispatch event
pub trait DispatchObserver: Send + Sync {
    fn observe(&self, source: &str, message: &str);
}

/// Logs each observation as a dashed banner at `info` level
#[derive(Debug, Default, Clone, Copy)]
pub struct BannerLogObserver;

impl DispatchObserver for BannerLogObserver {
    fn observe(&self, source: &str, message: &str) {
        info!("{}", banner(source, message));
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl DispatchObserver for NoopObserver {
    fn observe(&self, _source: &str, _message: &str) {}
}

const RULE_WIDTH: usize = 40;

/// `source : message` framed by dashed rules
pub fn banner(source: &str, message: &str) -> String {
    let rule = "-".repeat(RULE_WIDTH);
    format!("\n{rule}\n{source} : {message}\n{rule}")
}
