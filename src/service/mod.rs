//! Core operations. Each takes the caller explicitly and runs its mutation
//! through one store transaction; HTTP handlers are thin wrappers.

use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use crate::config::{AttendanceSettings, Config};
use crate::model::leave::LedgerMode;
use crate::notify::Notifier;

pub mod attendance;
pub mod employee;
pub mod leave;
pub mod schedule;

pub struct Services<S> {
    pub store: S,
    pub attendance: AttendanceSettings,
    pub ledger_mode: LedgerMode,
    pub login_url: String,
    notifier: Arc<dyn Notifier>,
}

impl<S> Services<S> {
    pub fn new(
        store: S,
        attendance: AttendanceSettings,
        ledger_mode: LedgerMode,
        login_url: String,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            attendance,
            ledger_mode,
            login_url,
            notifier,
        }
    }

    pub fn from_config(store: S, config: &Config, notifier: Arc<dyn Notifier>) -> Self {
        Self::new(
            store,
            config.attendance.clone(),
            config.ledger_mode,
            config.login_url.clone(),
            notifier,
        )
    }

    pub(crate) fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }
}

/// One page of results with the total match count.
#[derive(Debug, Serialize, ToSchema)]
#[aliases(
    AttendancePage = Page<crate::model::attendance::AttendanceDay>,
    LeavePage = Page<crate::model::leave::LeaveApplication>,
    EmployeePage = Page<crate::model::employee::Employee>
)]
pub struct Page<T> {
    pub data: Vec<T>,
    #[schema(example = 1)]
    pub page: u64,
    #[schema(example = 10)]
    pub per_page: u64,
    #[schema(example = 42)]
    pub total: i64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, request: crate::store::PageRequest, total: i64) -> Self {
        Self {
            data,
            page: request.page,
            per_page: request.per_page,
            total,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveDateTime};

    use super::Services;
    use crate::config::AttendanceSettings;
    use crate::model::leave::LedgerMode;
    use crate::notify::RecordingNotifier;
    use crate::store::memory::MemoryStore;

    pub fn services(mode: LedgerMode) -> (Services<MemoryStore>, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let services = Services::new(
            MemoryStore::new(),
            AttendanceSettings::default(),
            mode,
            "http://localhost:5173/login".to_string(),
            notifier.clone(),
        );
        (services, notifier)
    }

    pub fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    pub fn at(day: &str, h: u32, m: u32) -> NaiveDateTime {
        date(day).and_hms_opt(h, m, 0).unwrap()
    }
}
