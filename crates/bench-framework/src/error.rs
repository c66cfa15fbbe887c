//! Error types for the benchmark framework.

use bench_container::LifecycleError;
use bench_core::HandlerError;
use thiserror::Error;

/// Why a handler was abandoned before or during its queries.
#[derive(Error, Debug)]
pub enum BenchmarkError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl BenchmarkError {
    pub fn kind(&self) -> &'static str {
        match self {
            BenchmarkError::Lifecycle(LifecycleError::Startup { .. }) => "ContainerStartupError",
            BenchmarkError::Lifecycle(LifecycleError::ReadinessTimeout { .. }) => {
                "ReadinessTimeoutError"
            }
            BenchmarkError::Lifecycle(_) => "LifecycleError",
            BenchmarkError::Handler(e) => e.kind(),
        }
    }
}

/// Errors writing or reading the CSV report.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unexpected report header: {0}")]
    Header(String),
}
