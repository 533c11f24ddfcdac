//! Logging Module
//!
//! Structured logging utilities using the `tracing` crate, plus the optional
//! activation summaries emitted by the network layers.

use burn::tensor::{backend::Backend, ElementConversion, Tensor};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Create a verbose logging config for debugging
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            ansi_colors: true,
        }
    }

    /// Activation summaries are only computed at this level
    pub fn with_activation_summaries() -> Self {
        Self {
            level: LogLevel::Trace,
            include_target: true,
            ansi_colors: true,
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Initialize logging with the given configuration
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Emit the sparsity (fraction of exact zeros) of an activation tensor.
///
/// The reduction forces a device sync, so nothing is computed unless TRACE
/// events for this module are enabled.
pub fn activation_summary<B: Backend, const D: usize>(name: &str, activations: &Tensor<B, D>) {
    if !tracing::enabled!(Level::TRACE) {
        return;
    }

    let total = activations.shape().num_elements();
    if total == 0 {
        return;
    }

    let zeros: i64 = activations
        .clone()
        .equal_elem(0.0)
        .int()
        .sum()
        .into_scalar()
        .elem();
    let mean: f64 = activations.clone().mean().into_scalar().elem();

    tracing::trace!(
        layer = name,
        sparsity = zeros as f64 / total as f64,
        mean,
        "activation summary"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(LogLevel::Trace.to_tracing_level(), Level::TRACE);
        assert_eq!(LogLevel::Warn.to_tracing_level(), Level::WARN);
    }

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(LogConfig::with_activation_summaries().level, LogLevel::Trace);
    }

    #[test]
    fn test_activation_summary_without_subscriber_is_noop() {
        let device = Default::default();
        let x = Tensor::<NdArray, 2>::zeros([2, 3], &device);
        activation_summary("noop", &x);
    }
}
