pub mod config;
pub mod report;
pub mod report_job;
pub mod storage;

pub use report::{MONSTERS_REPORT_TYPE, Report, ReportStatus};
pub use report_job::{JobParseError, ReportJob};
