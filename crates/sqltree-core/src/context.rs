//! Per-execution tracking state
//!
//! `ExecutionContext` is the isolated bundle of state for one logical
//! execution (one request, one worker task): the statement stack, the
//! service stack, and the root-node list. It is a plain value created and
//! owned by the caller and threaded through every tracker call, so no
//! ambient thread-local state is involved and contexts never need locking.
//!
//! Nodes and frames live in per-context arenas addressed by index; tree
//! edges are recorded as index lists and resolved into owned child vectors
//! only when a completed tree is assembled for the persistence sink. Parent
//! links on the public models are ID strings, never references, so
//! ownership stays acyclic.

use crate::config::TraceSettings;
use crate::frame::ServiceFrame;
use crate::node::CallTreeNode;

/// Per-execution configuration, independent of the process-wide flags
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// Whether tracing is enabled for this execution
    pub enabled: bool,

    /// Maximum stack depth; entries past it are dropped with a warning
    pub max_depth: u32,

    /// Whether to record statement parameters
    pub record_parameters: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self::from(&TraceSettings::default())
    }
}

impl From<&TraceSettings> for ExecutionSettings {
    fn from(settings: &TraceSettings) -> Self {
        Self {
            enabled: settings.enabled,
            max_depth: settings.max_depth,
            record_parameters: settings.record_parameters,
        }
    }
}

/// Arena slot for a statement node. The node's own `children` vector stays
/// empty while the tree is being built; edges are kept here as indices.
#[derive(Debug)]
struct NodeSlot {
    node: Option<CallTreeNode>,
    children: Vec<usize>,
}

/// Arena slot for a service frame, with index links the public model
/// mirrors as ID strings.
#[derive(Debug)]
struct FrameSlot {
    frame: ServiceFrame,
    parent: Option<usize>,
    statements: Vec<usize>,
}

/// Isolated tracking state for one logical execution
#[derive(Debug)]
pub struct ExecutionContext {
    execution_id: String,
    settings: ExecutionSettings,
    nodes: Vec<NodeSlot>,
    frames: Vec<FrameSlot>,
    statement_stack: Vec<usize>,
    service_stack: Vec<usize>,
    roots: Vec<usize>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    /// Create a context with default per-execution settings
    pub fn new() -> Self {
        Self::with_settings(ExecutionSettings::default())
    }

    /// Create a context with explicit per-execution settings
    pub fn with_settings(settings: ExecutionSettings) -> Self {
        Self {
            execution_id: ulid::Ulid::new().to_string(),
            settings,
            nodes: Vec::new(),
            frames: Vec::new(),
            statement_stack: Vec::new(),
            service_stack: Vec::new(),
            roots: Vec::new(),
        }
    }

    /// Execution ID handed to the persistence sink
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut ExecutionSettings {
        &mut self.settings
    }

    /// Current statement stack depth
    pub fn statement_depth(&self) -> usize {
        self.statement_stack.len()
    }

    /// Current service stack depth
    pub fn service_depth(&self) -> usize {
        self.service_stack.len()
    }

    /// Whether nothing is in flight and nothing is pending handoff
    pub fn is_idle(&self) -> bool {
        self.statement_stack.is_empty() && self.service_stack.is_empty() && self.roots.is_empty()
    }

    /// Full teardown for pooled reuse: drops all transient state and issues
    /// a fresh execution ID. Call at the end of each logical execution.
    pub fn reset(&mut self) {
        self.clear_transient();
        self.execution_id = ulid::Ulid::new().to_string();
    }

    /// Drop arenas, stacks, and roots, keeping the execution ID
    pub(crate) fn clear_transient(&mut self) {
        self.nodes.clear();
        self.frames.clear();
        self.statement_stack.clear();
        self.service_stack.clear();
        self.roots.clear();
    }

    // ---- node arena -------------------------------------------------------

    pub(crate) fn insert_node(&mut self, node: CallTreeNode) -> usize {
        self.nodes.push(NodeSlot {
            node: Some(node),
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    pub(crate) fn node(&self, index: usize) -> Option<&CallTreeNode> {
        self.nodes.get(index).and_then(|slot| slot.node.as_ref())
    }

    pub(crate) fn node_mut(&mut self, index: usize) -> Option<&mut CallTreeNode> {
        self.nodes
            .get_mut(index)
            .and_then(|slot| slot.node.as_mut())
    }

    /// Record a parent/child edge and stamp the child's parent ID
    pub(crate) fn add_child_edge(&mut self, parent: usize, child: usize) {
        let parent_id = match self.node(parent) {
            Some(node) => node.node_id.clone(),
            None => return,
        };
        if let Some(node) = self.node_mut(child) {
            node.parent_id = Some(parent_id);
        }
        if let Some(slot) = self.nodes.get_mut(parent) {
            slot.children.push(child);
        }
    }

    pub(crate) fn add_root(&mut self, index: usize) {
        self.roots.push(index);
    }

    // ---- statement stack --------------------------------------------------

    pub(crate) fn push_statement(&mut self, index: usize) {
        self.statement_stack.push(index);
    }

    pub(crate) fn top_statement(&self) -> Option<usize> {
        self.statement_stack.last().copied()
    }

    pub(crate) fn pop_statement(&mut self) -> Option<usize> {
        self.statement_stack.pop()
    }

    // ---- frame arena and service stack ------------------------------------

    /// Insert a frame, linking it under its parent when one is given
    pub(crate) fn insert_frame(&mut self, frame: ServiceFrame, parent: Option<usize>) -> usize {
        let call_id = frame.call_id.clone();
        self.frames.push(FrameSlot {
            frame,
            parent,
            statements: Vec::new(),
        });
        let index = self.frames.len() - 1;
        if let Some(parent_slot) = parent.and_then(|p| self.frames.get_mut(p)) {
            parent_slot.frame.child_ids.push(call_id);
        }
        index
    }

    pub(crate) fn frame(&self, index: usize) -> Option<&ServiceFrame> {
        self.frames.get(index).map(|slot| &slot.frame)
    }

    pub(crate) fn frame_mut(&mut self, index: usize) -> Option<&mut ServiceFrame> {
        self.frames.get_mut(index).map(|slot| &mut slot.frame)
    }

    pub(crate) fn frame_parent(&self, index: usize) -> Option<usize> {
        self.frames.get(index).and_then(|slot| slot.parent)
    }

    /// Record a statement node as directly produced by a frame
    pub(crate) fn record_frame_statement(&mut self, frame: usize, node: usize) {
        let node_id = match self.node(node) {
            Some(n) => n.node_id.clone(),
            None => return,
        };
        if let Some(slot) = self.frames.get_mut(frame) {
            slot.statements.push(node);
            slot.frame.statement_ids.push(node_id);
        }
    }

    /// Index of the most recent statement node a frame directly produced
    pub(crate) fn frame_last_statement(&self, frame: usize) -> Option<usize> {
        self.frames
            .get(frame)
            .and_then(|slot| slot.statements.last().copied())
    }

    pub(crate) fn push_service(&mut self, index: usize) {
        self.service_stack.push(index);
    }

    pub(crate) fn top_service(&self) -> Option<usize> {
        self.service_stack.last().copied()
    }

    pub(crate) fn pop_service(&mut self) -> Option<usize> {
        self.service_stack.pop()
    }

    /// The innermost enclosing service frame, if any
    pub fn current_frame(&self) -> Option<&ServiceFrame> {
        self.top_service().and_then(|index| self.frame(index))
    }

    // ---- tree assembly -----------------------------------------------------

    /// Assemble one subtree, moving nodes out of the arena into owned
    /// `children` vectors in recorded order.
    fn assemble(&mut self, index: usize) -> Option<CallTreeNode> {
        let (mut node, children) = {
            let slot = self.nodes.get_mut(index)?;
            (slot.node.take()?, std::mem::take(&mut slot.children))
        };
        for child in children {
            if let Some(assembled) = self.assemble(child) {
                node.children.push(assembled);
            }
        }
        Some(node)
    }

    /// Assemble every collected root into an owned tree and clear all
    /// transient state. Called at root service exit, right before the root
    /// list is handed to the persistence sink.
    ///
    /// The execution ID is kept: sequential root invocations through one
    /// context are saved under the same ID. Call [`reset`](Self::reset)
    /// between logical executions when the sink must see distinct IDs.
    pub fn take_completed_roots(&mut self) -> Vec<CallTreeNode> {
        let roots = std::mem::take(&mut self.roots);
        let trees = roots
            .into_iter()
            .filter_map(|index| self.assemble(index))
            .collect();
        self.clear_transient();
        trees
    }
}
