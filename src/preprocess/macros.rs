//! Macro subsystem: user hooks into the preprocessing walk
//!
//! Two hooks. `on_parse` fires once with the raw AST before any
//! preprocessing; calling `finish()` there returns the raw document and
//! skips every later phase. `on_walk` fires per block after its own
//! properties are evaluated and module properties injected, but before
//! its children are evaluated; the cursor lets the hook reorder child
//! evaluation, rewind, or abort with a user-defined error, and the
//! expander completes whatever the hook did not request in document
//! order.
//!
//! A fresh cursor is built for every `on_walk` call; hooks must not
//! retain it across invocations.

use crate::ast::nodes::{BlockNode, Document};

/// Pipeline-level control handed to `on_parse`.
#[derive(Debug, Default)]
pub struct MacroControl {
    finished: bool,
}

impl MacroControl {
    /// Abort all remaining preprocessing phases.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Child-walk control handed to `on_walk`, scoped to one block.
#[derive(Debug)]
pub struct WalkCursor {
    /// Number of children of the current block.
    child_count: usize,
    /// Child indices the hook wants evaluated first, in request order.
    requested: Vec<usize>,
    /// User-raised error, surfaced as `MacroAbort`.
    error: Option<String>,
    /// Id of the enclosing block, when it has one.
    parent_id: Option<String>,
    /// Blocks visited so far in this expansion run.
    visited: usize,
}

impl WalkCursor {
    pub(crate) fn new(child_count: usize, parent_id: Option<String>, visited: usize) -> Self {
        Self {
            child_count,
            requested: Vec::new(),
            error: None,
            parent_id,
            visited,
        }
    }

    pub fn child_count(&self) -> usize {
        self.child_count
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    /// How many blocks the expander has visited before this one.
    pub fn visited_blocks(&self) -> usize {
        self.visited
    }

    /// Peek the index of the next child the expander would evaluate:
    /// the first one not already requested, in document order.
    pub fn next_block(&self) -> Option<usize> {
        (0..self.child_count).find(|index| !self.requested.contains(index))
    }

    /// Request that the child at `index` be evaluated before the rest.
    /// Requests are honored in order when the hook returns.
    pub fn invoke_walk(&mut self, index: usize) {
        if index < self.child_count && !self.requested.contains(&index) {
            self.requested.push(index);
        }
    }

    /// Rewind the most recent `invoke_walk` request.
    pub fn back(&mut self) {
        self.requested.pop();
    }

    /// Abort preprocessing with a user-defined error message.
    pub fn throw_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    pub(crate) fn requested_order(&self) -> &[usize] {
        &self.requested
    }

    pub(crate) fn take_error(&mut self) -> Option<String> {
        self.error.take()
    }
}

/// `on_parse` receives the raw document and pipeline control.
pub type OnParse = Box<dyn FnMut(&mut Document, &mut MacroControl)>;

/// `on_walk` receives the block (evaluated own-properties, unevaluated
/// children) and the walk cursor.
pub type OnWalk = Box<dyn FnMut(&mut BlockNode, &mut WalkCursor)>;

/// The optional user hooks.
#[derive(Default)]
pub struct MacroHandlers {
    pub on_parse: Option<OnParse>,
    pub on_walk: Option<OnWalk>,
}

impl std::fmt::Debug for MacroHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacroHandlers")
            .field("on_parse", &self.on_parse.is_some())
            .field("on_walk", &self.on_walk.is_some())
            .finish()
    }
}

impl MacroHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_parse(mut self, hook: impl FnMut(&mut Document, &mut MacroControl) + 'static) -> Self {
        self.on_parse = Some(Box::new(hook));
        self
    }

    pub fn on_walk(mut self, hook: impl FnMut(&mut BlockNode, &mut WalkCursor) + 'static) -> Self {
        self.on_walk = Some(Box::new(hook));
        self
    }
}

/// Walk state threaded through one preprocessing run.
#[derive(Debug, Default)]
pub struct MacroContext {
    pub handlers: MacroHandlers,
    pub control: MacroControl,
    /// Count of blocks visited by the expander so far.
    pub visited: usize,
}

impl MacroContext {
    pub fn new(handlers: MacroHandlers) -> Self {
        Self {
            handlers,
            control: MacroControl::default(),
            visited: 0,
        }
    }

    /// Run the `on_parse` hook. Returns true when the hook finished the
    /// pipeline.
    pub fn run_on_parse(&mut self, document: &mut Document) -> bool {
        if let Some(mut hook) = self.handlers.on_parse.take() {
            hook(document, &mut self.control);
            self.handlers.on_parse = Some(hook);
        }
        self.control.is_finished()
    }
}
