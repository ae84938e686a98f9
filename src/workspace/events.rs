//! Discovery notifications published by the workspace index

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::store::Package;

/// Totals of one completed scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub root: PathBuf,
    pub modules: usize,
    pub packages: usize,
    pub platforms: usize,
    pub library_classes: usize,
    /// Files whose parse task failed and were left out
    pub failed: usize,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum IndexEvent {
    /// A DEC file was parsed and its package registered
    PackageDiscovered(Arc<Package>),
    /// A DSC file was parsed
    ProjectDiscovered { path: PathBuf, errors: usize },
    ScanCompleted(ScanSummary),
}

impl IndexEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            IndexEvent::PackageDiscovered(_) => "package-discovered",
            IndexEvent::ProjectDiscovered { .. } => "project-discovered",
            IndexEvent::ScanCompleted(_) => "scan-completed",
        }
    }
}
