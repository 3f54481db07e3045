//! The parse tree trace collector.
//!
//! The interpreter calls [Trace::down] on entry to every node and [Trace::up]
//! on exit; records surviving the configured filters land in a ring buffer
//! of the last `max_records` records, so tracing a long parse keeps the tail
//! of the walk rather than the head.

use crate::{CircularBuffer, LookAround, OpKind, State, Trace, TraceConfig, TraceDir, TraceRecord};

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            max_records: 5000,
            ops: Vec::new(),
            rules: Vec::new(),
        }
    }
}

impl CircularBuffer {
    pub(crate) fn new(max_size: usize) -> Self {
        Self { items: 0, max_size }
    }

    pub(crate) fn clear(&mut self) {
        self.items = 0;
    }

    /// Register one more item; returns the buffer slot it lands in.
    pub(crate) fn increment(&mut self) -> usize {
        self.items += 1;
        (self.items - 1) % self.max_size
    }

    /// Total items ever pushed, including overwritten ones.
    pub(crate) fn items(&self) -> usize {
        self.items
    }

    pub(crate) fn max_size(&self) -> usize {
        self.max_size
    }

    /// Slot of the oldest item still in the buffer.
    pub(crate) fn first_slot(&self) -> usize {
        if self.items > self.max_size {
            self.items % self.max_size
        } else {
            0
        }
    }
}

impl Trace {
    pub fn new(config: TraceConfig) -> Self {
        let mut config = config;
        config.max_records = config.max_records.max(1);
        /* filters compare lowercase names */
        for rule in config.rules.iter_mut() {
            *rule = rule.to_lowercase();
        }
        let buffer = CircularBuffer::new(config.max_records);
        Self {
            config,
            buffer,
            records: Vec::new(),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.buffer.clear();
        self.records.clear();
    }

    fn selected(&self, kind: OpKind, name: Option<&str>) -> bool {
        if !self.config.ops.is_empty() && !self.config.ops.contains(&kind) {
            return false;
        }
        if !self.config.rules.is_empty()
            && matches!(kind, OpKind::Rnm | OpKind::Udt | OpKind::Bkr)
        {
            return match name {
                Some(name) => self.config.rules.iter().any(|rule| rule == name),
                None => false,
            };
        }
        true
    }

    fn push(&mut self, record: TraceRecord) {
        let slot = self.buffer.increment();
        if slot < self.records.len() {
            self.records[slot] = record;
        } else {
            self.records.push(record);
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn down(
        &mut self,
        kind: OpKind,
        which: Option<usize>,
        name: Option<&str>,
        depth: usize,
        phrase_index: usize,
        anchor: usize,
        look_around: LookAround,
    ) {
        if self.selected(kind, name) {
            self.push(TraceRecord {
                dir: TraceDir::Down,
                kind,
                which,
                depth,
                state: State::Active,
                phrase_index,
                phrase_length: 0,
                anchor,
                look_around,
            });
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn up(
        &mut self,
        kind: OpKind,
        which: Option<usize>,
        name: Option<&str>,
        depth: usize,
        state: State,
        phrase_index: usize,
        phrase_length: usize,
        anchor: usize,
        look_around: LookAround,
    ) {
        if self.selected(kind, name) {
            self.push(TraceRecord {
                dir: TraceDir::Up,
                kind,
                which,
                depth,
                state,
                phrase_index,
                phrase_length,
                anchor,
                look_around,
            });
        }
    }

    /// Number of records retained (at most `max_records`).
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total records collected, including any the ring buffer dropped.
    pub fn collected(&self) -> usize {
        self.buffer.items()
    }

    /// The retained records, oldest first.
    pub fn records_in_order(&self) -> Vec<TraceRecord> {
        let first = self.buffer.first_slot();
        if first == 0 {
            self.records.clone()
        } else {
            let mut ordered = Vec::with_capacity(self.records.len());
            ordered.extend_from_slice(&self.records[first..]);
            ordered.extend_from_slice(&self.records[..first]);
            ordered
        }
    }
}
