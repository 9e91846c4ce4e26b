//! Lexical scope for template variables
//!
//! A stack of name-to-value frames. `set` binds into the topmost frame,
//! `foreach` and `on-data` open a frame per iteration, and `if`/`while`
//! share the enclosing frame. Lookup walks the stack top-down.

use std::collections::HashMap;

use crate::ast::values::Value;

#[derive(Debug, Clone)]
pub struct Scope {
    frames: Vec<HashMap<String, Value>>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    /// A scope with a single root frame.
    pub fn new() -> Self {
        Self {
            frames: vec![HashMap::new()],
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Bind into the topmost frame, shadowing outer bindings.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.frames
            .last_mut()
            .expect("scope always has a root frame")
            .insert(name.into(), value);
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}
