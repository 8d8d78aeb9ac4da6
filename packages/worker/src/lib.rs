pub mod builder;
pub mod config;
pub mod database;
pub mod entity;
pub mod error;
pub mod executor;
pub mod pool;
pub mod service;
pub mod source;
pub mod store;
pub mod sweeper;

#[cfg(test)]
mod test_helpers;

pub use builder::ReportBuilder;
pub use config::{RedeliveryPolicy, WorkerAppConfig, WorkerConfig};
pub use error::{BuildError, ErrorKind, Result, WorkerError};
pub use executor::JobExecutor;
pub use pool::{PoolSettings, WorkerPool};
pub use service::{ReportService, ServiceError};
pub use store::{ReportStore, SeaOrmReportStore, StoreError};
pub use sweeper::StaleReportSweeper;
