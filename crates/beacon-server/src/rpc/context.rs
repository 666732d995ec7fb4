//! Per-call context handed to handlers.

use beacon_core::SessionId;
use chrono::{DateTime, Utc};

/// Identifies where a message came from.
#[derive(Clone, Debug)]
pub struct RequestContext {
    /// Session whose POST carried the message.
    pub session_id: SessionId,
    /// When the message was accepted by the router.
    pub received_at: DateTime<Utc>,
}

impl RequestContext {
    /// Context for a message received now.
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            received_at: Utc::now(),
        }
    }
}
