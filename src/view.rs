//! Presentation boundary for one task view.

use async_trait::async_trait;

use crate::types::{ConnectionLink, InstanceRecord, RegionId};

/// The container region's content. Exactly one is shown at a time.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Panel {
    StartAffordance,
    Loading,
    Active {
        identifier: String,
        links: Vec<ConnectionLink>,
        countdown_region: RegionId,
    },
    Expired,
}

impl Panel {
    pub fn active(record: &InstanceRecord) -> Self {
        Panel::Active {
            identifier: record.identifier.clone(),
            links: record.links(),
            countdown_region: record.countdown_region(),
        }
    }

    pub fn countdown_region(&self) -> Option<&RegionId> {
        match self {
            Panel::Active {
                countdown_region, ..
            } => Some(countdown_region),
            _ => None,
        }
    }
}

#[async_trait]
pub trait InstanceView: Send + Sync {
    fn render(&self, panel: &Panel);

    /// Write the countdown text. Implementations ignore regions that are not
    /// currently mounted.
    fn render_countdown(&self, region: &RegionId, remaining: &str);

    /// Blocking yes/no question; `false` means the user declined.
    async fn confirm(&self, prompt: &str) -> bool;
}
