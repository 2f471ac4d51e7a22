//! Service-level call frame
//!
//! `ServiceFrame` records one application-level method invocation. Frames
//! nest to form the service side of the call tree; the statement nodes a
//! frame directly produced are referenced by ID so the two layers can be
//! correlated without bidirectional object references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked service-level method invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceFrame {
    /// Unique call ID
    pub call_id: String,

    /// Service (type) name
    pub service_name: String,

    /// Method name
    pub method_name: String,

    /// Call depth (>= 1); equals the service stack position at entry
    pub depth: u32,

    /// Root-to-self call path, e.g. `UserService.get -> OrderService.list`
    pub call_path: String,

    /// When the invocation started
    pub started_at: DateTime<Utc>,

    /// When the invocation finished (None while in flight)
    pub ended_at: Option<DateTime<Utc>>,

    /// Invocation duration in milliseconds, derived at exit
    pub duration_ms: Option<u64>,

    /// Parent frame call ID. A lookup key only; a root frame has none.
    pub parent_id: Option<String>,

    /// Child frame call IDs, in invocation order
    pub child_ids: Vec<String>,

    /// IDs of statement nodes produced directly within this frame, in
    /// execution order. Does not include nodes produced by nested frames.
    pub statement_ids: Vec<String>,
}

impl ServiceFrame {
    /// Create a frame at entry time. The call path extends the parent's.
    pub fn new(
        service_name: impl Into<String>,
        method_name: impl Into<String>,
        depth: u32,
        parent: Option<&ServiceFrame>,
    ) -> Self {
        let service_name = service_name.into();
        let method_name = method_name.into();
        let qualified = format!("{service_name}.{method_name}");
        let call_path = match parent {
            Some(p) => format!("{} -> {}", p.call_path, qualified),
            None => qualified,
        };
        Self {
            call_id: ulid::Ulid::new().to_string(),
            service_name,
            method_name,
            depth,
            call_path,
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            parent_id: parent.map(|p| p.call_id.clone()),
            child_ids: Vec::new(),
            statement_ids: Vec::new(),
        }
    }

    /// Stamp exit-time fields. Called exactly once, by the tracker, when
    /// the frame is popped from the service stack.
    pub(crate) fn complete(&mut self) {
        let ended_at = Utc::now();
        self.duration_ms = Some((ended_at - self.started_at).num_milliseconds().max(0) as u64);
        self.ended_at = Some(ended_at);
    }

    /// Whether this is a root (depth-1) frame
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Short description for diagnostics
    pub fn short_description(&self) -> String {
        format!(
            "{}.{} (depth={}, statements={})",
            self.service_name,
            self.method_name,
            self.depth,
            self.statement_ids.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_frame() {
        let frame = ServiceFrame::new("UserService", "getUser", 1, None);
        assert!(frame.is_root());
        assert_eq!(frame.call_path, "UserService.getUser");
        assert_eq!(frame.parent_id, None);
    }

    #[test]
    fn test_call_path_extends_parent() {
        let parent = ServiceFrame::new("UserService", "getUser", 1, None);
        let child = ServiceFrame::new("OrderService", "listOrders", 2, Some(&parent));
        assert!(!child.is_root());
        assert_eq!(child.parent_id.as_deref(), Some(parent.call_id.as_str()));
        assert_eq!(
            child.call_path,
            "UserService.getUser -> OrderService.listOrders"
        );
    }

    #[test]
    fn test_complete_records_duration() {
        let mut frame = ServiceFrame::new("UserService", "getUser", 1, None);
        frame.complete();
        assert!(frame.ended_at.is_some());
        assert!(frame.duration_ms.is_some());
    }
}
