//! Classification of a status report for one task view.

use crate::types::{InstanceRecord, StatusReport, UiState};

/// First record bound to `identifier`, in response order.
pub fn matching_record<'a>(report: &'a StatusReport, identifier: &str) -> Option<&'a InstanceRecord> {
    if !report.success {
        return None;
    }
    report
        .records
        .iter()
        .find(|record| record.identifier == identifier)
}

pub fn classify(report: &StatusReport, identifier: &str) -> UiState {
    match matching_record(report, identifier) {
        Some(record) => UiState::InstanceActive(record.clone()),
        None => UiState::NoInstance,
    }
}
