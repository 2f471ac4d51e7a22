//! Entry/exit hooks and the cross-layer correlation algorithm
//!
//! `ServiceTracker` and `StatementTracker` are invoked in-line by the
//! external instrumentation layer around each service invocation and each
//! statement execution. Both consult the process-wide and per-execution
//! enabled flags before doing any work, and neither ever surfaces an error
//! into the instrumented call path: mismatches and sink failures are logged
//! and absorbed.
//!
//! The statement parent-resolution order is:
//! 1. the statement stack top, when the stack is non-empty;
//! 2. otherwise, the last statement recorded by the current service frame's
//!    parent frame, when that frame has produced one (cross-layer linkage);
//! 3. otherwise none: the node becomes a root of the execution's tree.

use crate::config::{SharedConfig, TraceConfig, TraceSettings};
use crate::context::{ExecutionContext, ExecutionSettings};
use crate::frame::ServiceFrame;
use crate::node::{CallTreeNode, StatementKind};
use crate::sink::TraceSink;
use crate::stats::{create_statistics, SharedStatistics};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Opaque handle to an in-flight service invocation.
///
/// `None` is the untracked sentinel returned while tracing is disabled;
/// exiting with it is a no-op.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    index: usize,
    call_id: String,
}

impl ServiceHandle {
    pub fn call_id(&self) -> &str {
        &self.call_id
    }
}

/// Opaque handle to an in-flight statement execution
#[derive(Debug, Clone)]
pub struct StatementHandle {
    index: usize,
    node_id: String,
}

impl StatementHandle {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

fn tracing_active(config: &TraceConfig, ctx: &ExecutionContext) -> bool {
    config.is_enabled() && ctx.settings().enabled
}

/// Tracks service-level entry/exit and hands completed trees to the sink
pub struct ServiceTracker {
    config: SharedConfig,
    sink: Arc<dyn TraceSink>,
}

impl ServiceTracker {
    pub fn new(config: SharedConfig, sink: Arc<dyn TraceSink>) -> Self {
        Self { config, sink }
    }

    /// Enter a service invocation. Returns `None` while tracing is disabled
    /// or once the service stack has reached the execution's depth bound.
    pub fn enter(
        &self,
        ctx: &mut ExecutionContext,
        service_name: &str,
        method_name: &str,
    ) -> Option<ServiceHandle> {
        if !tracing_active(&self.config, ctx) {
            return None;
        }
        let max_depth = ctx.settings().max_depth;
        if ctx.service_depth() as u32 >= max_depth {
            warn!(
                service = service_name,
                method = method_name,
                max_depth,
                "service stack at depth bound, dropping entry"
            );
            return None;
        }

        let depth = ctx.service_depth() as u32 + 1;
        let parent_index = ctx.top_service();
        let frame = ServiceFrame::new(
            service_name,
            method_name,
            depth,
            parent_index.and_then(|index| ctx.frame(index)),
        );
        let call_id = frame.call_id.clone();
        debug!(path = %frame.call_path, depth, "service enter");

        let index = ctx.insert_frame(frame, parent_index);
        ctx.push_service(index);
        Some(ServiceHandle { index, call_id })
    }

    /// Exit a service invocation. On a depth-1 exit the execution's root
    /// node list is assembled, handed to the sink, and the context's
    /// transient state is cleared.
    pub fn exit(&self, ctx: &mut ExecutionContext, handle: Option<ServiceHandle>) {
        let Some(handle) = handle else { return };

        let top_matches = ctx.top_service() == Some(handle.index)
            && ctx
                .frame(handle.index)
                .is_some_and(|frame| frame.call_id == handle.call_id);
        if !top_matches {
            let actual = ctx
                .current_frame()
                .map(|frame| frame.call_id.clone())
                .unwrap_or_else(|| "empty".to_string());
            warn!(
                expected = %handle.call_id,
                actual = %actual,
                "service exit does not match stack top, leaving stack untouched"
            );
            return;
        }

        ctx.pop_service();
        let mut is_root = false;
        if let Some(frame) = ctx.frame_mut(handle.index) {
            frame.complete();
            is_root = frame.depth == 1;
            debug!(frame = %frame.short_description(), "service exit");
        }

        if is_root {
            let execution_id = ctx.execution_id().to_string();
            let roots = ctx.take_completed_roots();
            let root_count = roots.len();
            match self.sink.save(&execution_id, roots) {
                Ok(()) => {
                    debug!(execution_id = %execution_id, root_count, "completed call trees handed to sink")
                }
                Err(sink_error) => {
                    error!(execution_id = %execution_id, %sink_error, "failed to persist completed call trees")
                }
            }
        }
    }
}

/// Tracks statement-level entry/exit and runs parent resolution
pub struct StatementTracker {
    config: SharedConfig,
    stats: SharedStatistics,
}

impl StatementTracker {
    pub fn new(config: SharedConfig, stats: SharedStatistics) -> Self {
        Self { config, stats }
    }

    /// Enter a statement execution. Depth is inherited from the innermost
    /// enclosing service frame when one exists, and is the 1-based
    /// statement stack position otherwise.
    pub fn enter(
        &self,
        ctx: &mut ExecutionContext,
        statement: &str,
        kind: StatementKind,
    ) -> Option<StatementHandle> {
        if !tracing_active(&self.config, ctx) {
            return None;
        }
        let max_depth = ctx.settings().max_depth;
        if ctx.statement_depth() as u32 >= max_depth {
            warn!(max_depth, "statement stack at depth bound, dropping entry");
            return None;
        }

        let frame_index = ctx.top_service();
        let node = match frame_index.and_then(|index| ctx.frame(index)) {
            Some(frame) => {
                let mut node = CallTreeNode::new(statement, kind, frame.depth);
                node.service_name = Some(frame.service_name.clone());
                node.method_name = Some(frame.method_name.clone());
                node.call_path = Some(frame.call_path.clone());
                node
            }
            None => CallTreeNode::new(statement, kind, ctx.statement_depth() as u32 + 1),
        };
        let depth = node.depth;
        let node_id = node.node_id.clone();

        let index = ctx.insert_node(node);
        if let Some(frame_index) = frame_index {
            ctx.record_frame_statement(frame_index, index);
        }

        match Self::resolve_parent(ctx, frame_index) {
            Some(parent) => {
                ctx.add_child_edge(parent, index);
                debug!(depth, parent_index = parent, "statement enter");
            }
            None => {
                ctx.add_root(index);
                debug!(depth, "statement enter (new root)");
            }
        }

        ctx.push_statement(index);
        self.stats.increment_total();
        self.stats.update_max_depth(depth);
        Some(StatementHandle { index, node_id })
    }

    /// Attach bound parameter values to an in-flight statement. Values are
    /// dropped without logging when parameter recording is off for this
    /// execution.
    pub fn record_parameters(
        &self,
        ctx: &mut ExecutionContext,
        handle: Option<&StatementHandle>,
        parameters: Vec<serde_json::Value>,
    ) {
        if !tracing_active(&self.config, ctx) {
            return;
        }
        let Some(handle) = handle else { return };
        if !ctx.settings().record_parameters {
            return;
        }
        let Some(node) = ctx.node_mut(handle.index) else {
            return;
        };
        if node.node_id != handle.node_id {
            debug!(
                node_id = %handle.node_id,
                "parameter record does not match its node, ignoring"
            );
            return;
        }
        node.parameters.extend(parameters);
    }

    /// Parent of a new statement node, or `None` when it is a root.
    ///
    /// The cross-layer rule walks one level up only: when the immediate
    /// parent frame has produced no statements, deeper ancestors are not
    /// searched.
    fn resolve_parent(ctx: &ExecutionContext, frame_index: Option<usize>) -> Option<usize> {
        if let Some(top) = ctx.top_statement() {
            return Some(top);
        }
        let parent_frame = ctx.frame_parent(frame_index?)?;
        ctx.frame_last_statement(parent_frame)
    }

    /// Exit a statement execution: stamp timing and outcome, classify slow
    /// against the threshold in effect right now, and update statistics.
    /// Persistence is deliberately not triggered here; trees are saved only
    /// at root service exit, once fully built.
    pub fn exit(
        &self,
        ctx: &mut ExecutionContext,
        handle: Option<StatementHandle>,
        affected_rows: i64,
        error_message: Option<&str>,
    ) {
        if !tracing_active(&self.config, ctx) {
            return;
        }
        let Some(handle) = handle else { return };

        let top_matches = ctx.top_statement() == Some(handle.index)
            && ctx
                .node(handle.index)
                .is_some_and(|node| node.node_id == handle.node_id);
        if !top_matches {
            debug!(
                node_id = %handle.node_id,
                "statement exit does not match stack top, ignoring"
            );
            return;
        }

        ctx.pop_statement();
        let threshold_ms = self.config.slow_threshold_ms();
        let Some(node) = ctx.node_mut(handle.index) else {
            return;
        };
        node.complete(affected_rows, error_message, threshold_ms);

        let slow = node.slow;
        let errored = node.error_message.is_some();
        let duration_ms = node.duration_ms.unwrap_or(0);
        debug!(depth = node.depth, duration_ms, slow, "statement exit");

        if slow {
            self.stats.increment_slow();
        }
        if errored {
            self.stats.increment_errors();
        }
        self.stats.add_execution_time_ms(duration_ms);
    }
}

/// Facade bundling both trackers behind the hook contract consumed by the
/// instrumentation layer.
pub struct CallTreeTracker {
    config: SharedConfig,
    stats: SharedStatistics,
    execution_settings: ExecutionSettings,
    service: ServiceTracker,
    statement: StatementTracker,
}

impl CallTreeTracker {
    /// Build a tracker from settings and a persistence sink
    pub fn new(settings: &TraceSettings, sink: Arc<dyn TraceSink>) -> Self {
        let config: SharedConfig = Arc::new(TraceConfig::new(settings));
        let stats = create_statistics();
        Self::with_shared(config, stats, ExecutionSettings::from(settings), sink)
    }

    /// Build a tracker around externally owned config and statistics,
    /// e.g. when the embedding system shares them with other components.
    pub fn with_shared(
        config: SharedConfig,
        stats: SharedStatistics,
        execution_settings: ExecutionSettings,
        sink: Arc<dyn TraceSink>,
    ) -> Self {
        Self {
            service: ServiceTracker::new(Arc::clone(&config), sink),
            statement: StatementTracker::new(Arc::clone(&config), Arc::clone(&stats)),
            config,
            stats,
            execution_settings,
        }
    }

    /// Mint a context for a new logical execution
    pub fn new_context(&self) -> ExecutionContext {
        ExecutionContext::with_settings(self.execution_settings.clone())
    }

    pub fn enter_service(
        &self,
        ctx: &mut ExecutionContext,
        service_name: &str,
        method_name: &str,
    ) -> Option<ServiceHandle> {
        self.service.enter(ctx, service_name, method_name)
    }

    pub fn exit_service(&self, ctx: &mut ExecutionContext, handle: Option<ServiceHandle>) {
        self.service.exit(ctx, handle)
    }

    pub fn enter_statement(
        &self,
        ctx: &mut ExecutionContext,
        statement: &str,
        kind: StatementKind,
    ) -> Option<StatementHandle> {
        self.statement.enter(ctx, statement, kind)
    }

    pub fn exit_statement(
        &self,
        ctx: &mut ExecutionContext,
        handle: Option<StatementHandle>,
        affected_rows: i64,
        error_message: Option<&str>,
    ) {
        self.statement.exit(ctx, handle, affected_rows, error_message)
    }

    /// Attach bound parameter values to an in-flight statement, subject to
    /// the execution's `record_parameters` toggle.
    pub fn record_statement_parameters(
        &self,
        ctx: &mut ExecutionContext,
        handle: Option<&StatementHandle>,
        parameters: Vec<serde_json::Value>,
    ) {
        self.statement.record_parameters(ctx, handle, parameters)
    }

    /// Fast check for the instrumentation layer, letting it skip argument
    /// formatting before calling the entry hooks.
    pub fn is_tracing_enabled(&self, ctx: &ExecutionContext) -> bool {
        tracing_active(&self.config, ctx)
    }

    pub fn set_trace_enabled(&self, enabled: bool) {
        self.config.set_enabled(enabled);
    }

    pub fn set_slow_threshold_ms(&self, threshold_ms: u64) {
        self.config.set_slow_threshold_ms(threshold_ms);
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn statistics(&self) -> &SharedStatistics {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NoopSink;

    fn tracker() -> CallTreeTracker {
        CallTreeTracker::new(&TraceSettings::default(), Arc::new(NoopSink))
    }

    #[test]
    fn test_disabled_tracing_returns_none() {
        let tracker = tracker();
        tracker.set_trace_enabled(false);
        let mut ctx = tracker.new_context();

        assert!(!tracker.is_tracing_enabled(&ctx));
        assert!(tracker.enter_service(&mut ctx, "UserService", "getUser").is_none());
        assert!(tracker
            .enter_statement(&mut ctx, "SELECT 1", StatementKind::Select)
            .is_none());
        // Exits with the untracked sentinel are no-ops
        tracker.exit_service(&mut ctx, None);
        tracker.exit_statement(&mut ctx, None, 0, None);
        assert!(ctx.is_idle());
        assert_eq!(tracker.statistics().total_statements(), 0);
    }

    #[test]
    fn test_per_execution_disable() {
        let tracker = tracker();
        let mut ctx = tracker.new_context();
        ctx.settings_mut().enabled = false;
        assert!(!tracker.is_tracing_enabled(&ctx));
        assert!(tracker.enter_service(&mut ctx, "UserService", "getUser").is_none());
    }

    #[test]
    fn test_service_depth_and_parentage() {
        let tracker = tracker();
        let mut ctx = tracker.new_context();

        let outer = tracker.enter_service(&mut ctx, "A", "a").unwrap();
        let inner = tracker.enter_service(&mut ctx, "B", "b").unwrap();
        assert_eq!(ctx.service_depth(), 2);
        {
            let frame = ctx.current_frame().unwrap();
            assert_eq!(frame.depth, 2);
            assert_eq!(frame.parent_id.as_deref(), Some(outer.call_id()));
            assert_eq!(frame.call_path, "A.a -> B.b");
        }
        tracker.exit_service(&mut ctx, Some(inner));
        tracker.exit_service(&mut ctx, Some(outer));
        assert!(ctx.is_idle());
    }

    #[test]
    fn test_statement_depth_without_service() {
        let tracker = tracker();
        let mut ctx = tracker.new_context();

        let outer = tracker
            .enter_statement(&mut ctx, "SELECT 1", StatementKind::Select)
            .unwrap();
        let inner = tracker
            .enter_statement(&mut ctx, "SELECT 2", StatementKind::Select)
            .unwrap();
        assert_eq!(ctx.statement_depth(), 2);
        assert_eq!(ctx.node(1).unwrap().depth, 2);
        assert_eq!(ctx.node(0).unwrap().service_name, None);

        tracker.exit_statement(&mut ctx, Some(inner), 0, None);
        tracker.exit_statement(&mut ctx, Some(outer), 0, None);
        assert_eq!(ctx.statement_depth(), 0);
        assert_eq!(tracker.statistics().total_statements(), 2);
        assert_eq!(tracker.statistics().max_depth(), 2);
    }

    #[test]
    fn test_statement_inherits_service_depth() {
        let tracker = tracker();
        let mut ctx = tracker.new_context();

        let svc_a = tracker.enter_service(&mut ctx, "A", "a").unwrap();
        let svc_b = tracker.enter_service(&mut ctx, "B", "b").unwrap();
        let stmt = tracker
            .enter_statement(&mut ctx, "SELECT 1", StatementKind::Select)
            .unwrap();
        {
            let node = ctx.node(0).unwrap();
            assert_eq!(node.depth, 2);
            assert_eq!(node.service_name.as_deref(), Some("B"));
            assert_eq!(node.method_name.as_deref(), Some("b"));
            assert_eq!(node.call_path.as_deref(), Some("A.a -> B.b"));
        }
        tracker.exit_statement(&mut ctx, Some(stmt), 0, None);
        tracker.exit_service(&mut ctx, Some(svc_b));
        tracker.exit_service(&mut ctx, Some(svc_a));
    }

    #[test]
    fn test_service_exit_mismatch_leaves_stack() {
        let tracker = tracker();
        let mut ctx = tracker.new_context();

        let outer = tracker.enter_service(&mut ctx, "A", "a").unwrap();
        let _inner = tracker.enter_service(&mut ctx, "B", "b").unwrap();
        // Exiting the outer frame while the inner one is still open is a
        // mismatch; the stack must stay as it is.
        tracker.exit_service(&mut ctx, Some(outer));
        assert_eq!(ctx.service_depth(), 2);
    }

    #[test]
    fn test_statement_exit_mismatch_leaves_stack() {
        let tracker = tracker();
        let mut ctx = tracker.new_context();

        let outer = tracker
            .enter_statement(&mut ctx, "SELECT 1", StatementKind::Select)
            .unwrap();
        let _inner = tracker
            .enter_statement(&mut ctx, "SELECT 2", StatementKind::Select)
            .unwrap();
        tracker.exit_statement(&mut ctx, Some(outer), 0, None);
        assert_eq!(ctx.statement_depth(), 2);
        assert!(!ctx.node(0).unwrap().is_complete());
    }

    #[test]
    fn test_parameter_recording_respects_toggle() {
        let tracker = tracker();
        let mut ctx = tracker.new_context();

        let stmt = tracker
            .enter_statement(&mut ctx, "SELECT * FROM users WHERE id = ?", StatementKind::Select)
            .unwrap();
        tracker.record_statement_parameters(&mut ctx, Some(&stmt), vec![serde_json::json!(42)]);
        assert_eq!(ctx.node(0).unwrap().parameters, vec![serde_json::json!(42)]);
        tracker.exit_statement(&mut ctx, Some(stmt), 1, None);

        // Toggle off for this execution: values are dropped
        let mut ctx = tracker.new_context();
        ctx.settings_mut().record_parameters = false;
        let stmt = tracker
            .enter_statement(&mut ctx, "SELECT * FROM users WHERE id = ?", StatementKind::Select)
            .unwrap();
        tracker.record_statement_parameters(&mut ctx, Some(&stmt), vec![serde_json::json!(42)]);
        assert!(ctx.node(0).unwrap().parameters.is_empty());
        tracker.exit_statement(&mut ctx, Some(stmt), 1, None);

        // Untracked sentinel is a no-op
        tracker.record_statement_parameters(&mut ctx, None, vec![serde_json::json!(1)]);
    }

    #[test]
    fn test_depth_bound_drops_entries() {
        let settings = TraceSettings {
            max_depth: 2,
            ..TraceSettings::default()
        };
        let tracker = CallTreeTracker::new(&settings, Arc::new(NoopSink));
        let mut ctx = tracker.new_context();

        assert!(tracker.enter_service(&mut ctx, "A", "a").is_some());
        assert!(tracker.enter_service(&mut ctx, "B", "b").is_some());
        assert!(tracker.enter_service(&mut ctx, "C", "c").is_none());
        assert_eq!(ctx.service_depth(), 2);
    }
}
