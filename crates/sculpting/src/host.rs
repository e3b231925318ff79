//! Boundary to the application hosting the sculpt core.
//!
//! The core never redraws or shows messages itself. After a completed step
//! it calls [`Host::notify`] once; precondition failures go through
//! [`Host::report`]. Every report is also logged with `tracing`.

use std::sync::Mutex;

use tracing::{error, info, warn};

/// Identifier of the object a session edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectId(pub u64);

/// What changed on the object, used by the host to decide what to redraw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Geometry,
    Mask,
    Color,
    FaceSets,
    Topology,
    Weights,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportLevel {
    Info,
    Warning,
    Error,
}

/// Callbacks into the host application.
pub trait Host {
    /// The object changed; fire-and-forget.
    fn notify(&self, kind: ChangeKind, object: ObjectId);

    /// Show a message to the user.
    fn report(&self, level: ReportLevel, message: &str);
}

/// Log a report and forward it to the host.
pub fn report(host: &dyn Host, level: ReportLevel, message: &str) {
    match level {
        ReportLevel::Info => info!("{}", message),
        ReportLevel::Warning => warn!("{}", message),
        ReportLevel::Error => error!("{}", message),
    }
    host.report(level, message);
}

/// Host that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHost;

impl Host for NullHost {
    fn notify(&self, _kind: ChangeKind, _object: ObjectId) {}

    fn report(&self, _level: ReportLevel, _message: &str) {}
}

/// Host that records every call, for tests and headless tools.
#[derive(Debug, Default)]
pub struct RecordingHost {
    notifications: Mutex<Vec<(ChangeKind, ObjectId)>>,
    reports: Mutex<Vec<(ReportLevel, String)>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<(ChangeKind, ObjectId)> {
        self.notifications
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }

    pub fn reports(&self) -> Vec<(ReportLevel, String)> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Host for RecordingHost {
    fn notify(&self, kind: ChangeKind, object: ObjectId) {
        if let Ok(mut notifications) = self.notifications.lock() {
            notifications.push((kind, object));
        }
    }

    fn report(&self, level: ReportLevel, message: &str) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push((level, message.to_string()));
        }
    }
}
