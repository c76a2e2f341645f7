//! Role-changed notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rolegate_core::Identity;
use rolegate_events::{Event, EventEnvelope};

use crate::roles::Role;

pub const ROLE_CHANGED: &str = "auth.role.changed";

/// Emitted after a successful role switch so sibling sessions of the same
/// identity can converge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleChanged {
    pub identity: Identity,
    pub role: Role,
    pub previous_role: Option<Role>,
    pub occurred_at: DateTime<Utc>,
}

impl Event for RoleChanged {
    fn event_type(&self) -> &'static str {
        ROLE_CHANGED
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

pub type RoleChangedEnvelope = EventEnvelope<RoleChanged>;

impl RoleChanged {
    pub fn into_envelope(self) -> RoleChangedEnvelope {
        EventEnvelope::wrap(self.identity.clone(), self)
    }
}
