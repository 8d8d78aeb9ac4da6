//! In-memory collaborators shared by the builder, pool, service and sweeper tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Report;
use common::storage::{BlobStore, PresignedUrl, StorageError};
use dashmap::DashMap;
use uuid::Uuid;

use crate::source::{ArtifactSource, Monster, SourceError};
use crate::store::{ReportStore, StoreError};

#[derive(Default)]
pub struct MemoryReportStore {
    reports: DashMap<Uuid, Report>,
    update_calls: AtomicUsize,
    updates: AtomicUsize,
    failing_calls: Mutex<Vec<usize>>,
}

impl MemoryReportStore {
    pub fn insert(&self, report: Report) {
        self.reports.insert(report.id, report);
    }

    pub fn get(&self, report_id: Uuid) -> Option<Report> {
        self.reports.get(&report_id).map(|r| r.value().clone())
    }

    /// Number of successful `update` calls.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Make the given `update` calls (1-based, counted from now) fail with a database error.
    pub fn fail_update_calls(&self, calls: &[usize]) {
        let base = self.update_calls.load(Ordering::SeqCst);
        *self.failing_calls.lock().unwrap() = calls.iter().map(|c| base + c).collect();
    }
}

#[async_trait]
impl ReportStore for MemoryReportStore {
    async fn create(&self, user_id: Uuid, report_type: &str) -> Result<Report, StoreError> {
        let report = Report::new(user_id, report_type);
        self.reports.insert(report.id, report.clone());
        Ok(report)
    }

    async fn update(&self, report: &Report) -> Result<Report, StoreError> {
        let call = self.update_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_calls.lock().unwrap().contains(&call) {
            return Err(StoreError::Database(sea_orm::DbErr::Custom(
                "connection reset".into(),
            )));
        }

        let mut entry = self
            .reports
            .get_mut(&report.id)
            .filter(|stored| stored.user_id == report.user_id)
            .ok_or(StoreError::NotFound {
                user_id: report.user_id,
                report_id: report.id,
            })?;

        let mut stored = report.clone();
        stored.created_at = entry.created_at;
        stored.report_type = entry.report_type.clone();
        stored.updated_at = Utc::now();
        *entry = stored.clone();
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn get_by_key(&self, user_id: Uuid, report_id: Uuid) -> Result<Report, StoreError> {
        self.reports
            .get(&report_id)
            .filter(|r| r.user_id == user_id)
            .map(|r| r.value().clone())
            .ok_or(StoreError::NotFound { user_id, report_id })
    }

    async fn find_stale_processing(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Report>, StoreError> {
        Ok(self
            .reports
            .iter()
            .filter(|r| {
                r.status() == common::ReportStatus::Processing
                    && r.started_at.is_some_and(|t| t < cutoff)
            })
            .map(|r| r.value().clone())
            .collect())
    }

    async fn mark_stale(
        &self,
        user_id: Uuid,
        report_id: Uuid,
        started_at: DateTime<Utc>,
        message: &str,
    ) -> Result<bool, StoreError> {
        let Some(mut entry) = self
            .reports
            .get_mut(&report_id)
            .filter(|stored| stored.user_id == user_id)
        else {
            return Ok(false);
        };
        if entry.status() != common::ReportStatus::Processing
            || entry.started_at != Some(started_at)
        {
            return Ok(false);
        }

        let now = Utc::now();
        entry.fail(message, now);
        entry.updated_at = now;
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

pub enum SourceBehavior {
    Rows(Vec<Monster>),
    Status(u16),
    /// Never resolves; used to exercise cancellation.
    Hang,
}

pub struct StubSource {
    behavior: Mutex<SourceBehavior>,
    delay: Duration,
    calls: AtomicUsize,
}

impl StubSource {
    pub fn new(behavior: SourceBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_rows(n: usize) -> Self {
        Self::new(SourceBehavior::Rows(sample_monsters(n)))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_behavior(&self, behavior: SourceBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactSource for StubSource {
    async fn fetch_rows(&self) -> Result<Vec<Monster>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let outcome = match &*self.behavior.lock().unwrap() {
            SourceBehavior::Rows(rows) => Some(Ok(rows.clone())),
            SourceBehavior::Status(code) => Some(Err(SourceError::Status(*code))),
            SourceBehavior::Hang => None,
        };
        match outcome {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}

pub fn sample_monsters(n: usize) -> Vec<Monster> {
    (1..=n as i64)
        .map(|id| Monster {
            id,
            name: format!("monster-{id}"),
            description: "roams the field".into(),
            common_locations: vec!["Hyrule Field".into()],
            drops: vec!["horn".into(), "fang".into()],
            category: "monsters".into(),
            image: format!("https://example.com/{id}.png"),
            dlc: false,
        })
        .collect()
}

#[derive(Default)]
pub struct RecordingBlobStore {
    objects: DashMap<String, Vec<u8>>,
    fail_puts: AtomicBool,
    puts: AtomicUsize,
    presigns: AtomicUsize,
}

impl RecordingBlobStore {
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.get(key).map(|o| o.value().clone())
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn presign_count(&self) -> usize {
        self.presigns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for RecordingBlobStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("bucket unavailable".into()));
        }
        self.objects.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.object(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.objects.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.objects.remove(key).is_some())
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StorageError> {
        if !self.objects.contains_key(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        let n = self.presigns.fetch_add(1, Ordering::SeqCst) + 1;
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).map_err(|e| StorageError::Presign(e.to_string()))?;
        Ok(PresignedUrl {
            url: format!("https://blobs.test/{key}?sig={n}"),
            expires_at,
        })
    }
}
