//! VM Stack operations
//!
//! This module provides the unbounded word stack used by `push`, `pop`,
//! `call` and `ret`.

use crate::vm::types::Word;

/// Provides stack operations for the virtual machine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VMStack {
    /// The values on the stack, bottom first
    stack: Vec<Word>,
}

impl VMStack {
    /// Create a new empty stack
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    /// Push a value onto the stack
    pub fn push(&mut self, value: Word) {
        self.stack.push(value);
    }

    /// Pop a value from the stack; `None` on underflow
    pub fn pop(&mut self) -> Option<Word> {
        self.stack.pop()
    }

    /// Return the top value from the stack without popping it
    pub fn top(&self) -> Option<Word> {
        self.stack.last().copied()
    }

    /// Get the current stack values, bottom first
    pub fn as_slice(&self) -> &[Word] {
        &self.stack
    }

    /// Replace the stack contents
    pub fn replace(&mut self, values: Vec<Word>) {
        self.stack = values;
    }

    /// Get the stack length
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Check if the stack is empty
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}
