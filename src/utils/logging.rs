//! Logging Module
//!
//! Structured logging on top of the `tracing` crate, plus small progress
//! loggers for the long-running pipeline stages.

use std::time::Instant;

use tracing_subscriber::EnvFilter;

/// Subscriber settings for the CLI
///
/// `RUST_LOG` wins over `default_directive` when set.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is unset, e.g. `"info"`
    pub default_directive: String,
    /// Show module paths and thread ids
    pub detailed: bool,
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_directive: "info".to_string(),
            detailed: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Debug output for this crate, info for dependencies
    pub fn verbose() -> Self {
        Self {
            default_directive: "info,pneumonia_cnn=debug".to_string(),
            detailed: true,
            ansi_colors: true,
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))
    }
}

/// Install the global `tracing` subscriber
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(config.filter())
        .with_ansi(config.ansi_colors)
        .with_target(config.detailed)
        .with_thread_ids(config.detailed)
        .compact()
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {}", e))
}

/// Progress logger for per-file stages (hashing, copying, loading)
pub struct ProgressLogger {
    operation: String,
    total: usize,
    current: usize,
    log_interval: usize,
    start_time: Instant,
}

impl ProgressLogger {
    /// Create a new progress logger that reports roughly every 10%
    pub fn new(operation: &str, total: usize) -> Self {
        Self {
            operation: operation.to_string(),
            total,
            current: 0,
            log_interval: (total / 10).max(1),
            start_time: Instant::now(),
        }
    }

    /// Increment progress by 1
    pub fn increment(&mut self) {
        self.current += 1;

        if self.current % self.log_interval == 0 || self.current == self.total {
            let percentage = 100.0 * self.current as f64 / self.total.max(1) as f64;
            let items_per_sec = self.current as f64 / self.start_time.elapsed().as_secs_f64();

            tracing::debug!(
                "{}: {}/{} ({:.1}%) - {:.1} items/s",
                self.operation,
                self.current,
                self.total,
                percentage,
                items_per_sec
            );
        }
    }

    /// Log completion
    pub fn finish(&self) {
        let elapsed = self.start_time.elapsed();

        tracing::info!(
            "{}: processed {} items in {:.2}s",
            self.operation,
            self.current,
            elapsed.as_secs_f64()
        );
    }
}

/// Per-epoch training logger
pub struct TrainingLogger {
    epoch: usize,
    total_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    pub fn new(total_epochs: usize) -> Self {
        Self {
            epoch: 0,
            total_epochs,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    /// Log start of an epoch
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();

        tracing::info!("Epoch {}/{} started", epoch + 1, self.total_epochs);
    }

    /// Log end of an epoch with metrics
    pub fn end_epoch(&self, train_loss: f64, train_accuracy: f64, val_loss: f64, val_accuracy: f64) {
        let epoch_time = self.epoch_start.elapsed();
        let total_time = self.training_start.elapsed();

        let epochs_remaining = self.total_epochs.saturating_sub(self.epoch + 1);
        let avg_epoch_time = total_time.as_secs_f64() / (self.epoch + 1) as f64;
        let eta_secs = epochs_remaining as f64 * avg_epoch_time;

        tracing::info!(
            "Epoch {}/{} completed in {:.1}s | Loss: {:.4} | Acc: {:.2}% | Val Loss: {:.4} | Val Acc: {:.2}% | ETA: {:.0}s",
            self.epoch + 1,
            self.total_epochs,
            epoch_time.as_secs_f64(),
            train_loss,
            train_accuracy * 100.0,
            val_loss,
            val_accuracy * 100.0,
            eta_secs
        );
    }

    /// Log training completion
    pub fn log_complete(&self, best_val_accuracy: f64) {
        tracing::info!(
            "Training complete! {} epochs in {:.1}s | Best val accuracy: {:.2}%",
            self.total_epochs,
            self.training_start.elapsed().as_secs_f64(),
            best_val_accuracy * 100.0
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_presets() {
        assert_eq!(LogConfig::default().default_directive, "info");
        let verbose = LogConfig::verbose();
        assert!(verbose.detailed);
        assert!(verbose.default_directive.contains("pneumonia_cnn=debug"));
    }

    #[test]
    fn test_progress_logger() {
        let mut logger = ProgressLogger::new("Hashing", 20);
        for _ in 0..5 {
            logger.increment();
        }
        assert_eq!(logger.current, 5);
        assert_eq!(logger.log_interval, 2);
    }
}
