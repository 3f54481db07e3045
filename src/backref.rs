use crate::{BackRef, Grammar};
use std::collections::HashMap;

impl BackRef {
    /// Create a stack with one base frame holding an unset binding for every
    /// back referenced rule and UDT of the grammar.
    pub(crate) fn new(grammar: &Grammar) -> Self {
        let mut frame = HashMap::new();
        for rule in grammar.rules() {
            if rule.is_bkr {
                frame.insert(rule.lower.clone(), None);
            }
        }
        for udt in grammar.udts() {
            if udt.is_bkr {
                frame.insert(udt.lower.clone(), None);
            }
        }
        Self { stack: vec![frame] }
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Push a copy of the top frame. Bindings made in the new frame are
    /// discarded when the frame is popped without a commit.
    pub(crate) fn push(&mut self) {
        let top = match self.stack.last() {
            Some(frame) => frame.clone(),
            None => HashMap::new(),
        };
        self.stack.push(top);
    }

    /// Roll the stack back to a previously saved depth. The base frame is
    /// never removed.
    pub(crate) fn truncate(&mut self, len: usize) {
        let len = len.max(1);
        self.stack.truncate(len);
    }

    /// Record the last matched phrase for `name` in the top frame.
    pub(crate) fn save_phrase(&mut self, name: &str, phrase_index: usize, phrase_length: usize) {
        if let Some(top) = self.stack.last_mut() {
            top.insert(name.to_string(), Some((phrase_index, phrase_length)));
        }
    }

    /// The last matched `(index, length)` phrase for `name`, or `None` if the
    /// name has never matched in this scope.
    pub(crate) fn get_phrase(&self, name: &str) -> Option<(usize, usize)> {
        self.stack.last().and_then(|top| top.get(name).copied().flatten())
    }
}
