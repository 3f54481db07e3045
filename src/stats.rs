//! Node visit statistics.
//!
//! A passive collector: the interpreter calls [Stats::collect] once per node
//! visit with the operator kind, the named-operator index and the exit state.

use crate::{Grammar, NamedTally, OpKind, State, Stats, Tally};

impl Tally {
    fn add(&mut self, state: State) {
        match state {
            State::Empty => self.empty += 1,
            State::Match => self.matched += 1,
            State::NoMatch => self.nomatch += 1,
            State::Active => {}
        }
        self.total += 1;
    }
}

impl Stats {
    pub fn new(grammar: &Grammar) -> Self {
        let rule_stats = grammar
            .rules()
            .iter()
            .map(|rule| NamedTally {
                name: rule.name.clone(),
                lower: rule.lower.clone(),
                index: rule.index,
                tally: Tally::default(),
            })
            .collect();
        let udt_stats = grammar
            .udts()
            .iter()
            .map(|udt| NamedTally {
                name: udt.name.clone(),
                lower: udt.lower.clone(),
                index: udt.index,
                tally: Tally::default(),
            })
            .collect();
        Self {
            totals: Tally::default(),
            ops: vec![Tally::default(); OpKind::ALL.len()],
            rule_stats,
            udt_stats,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.totals = Tally::default();
        for tally in self.ops.iter_mut() {
            *tally = Tally::default();
        }
        for named in self.rule_stats.iter_mut() {
            named.tally = Tally::default();
        }
        for named in self.udt_stats.iter_mut() {
            named.tally = Tally::default();
        }
    }

    /// One node visit. `which` is the combined rule/UDT index for `RNM` and
    /// `UDT` nodes.
    pub(crate) fn collect(&mut self, kind: OpKind, which: Option<usize>, state: State) {
        self.totals.add(state);
        self.ops[kind as usize].add(state);
        match kind {
            OpKind::Rnm => {
                if let Some(index) = which {
                    if let Some(named) = self.rule_stats.get_mut(index) {
                        named.tally.add(state);
                    }
                }
            }
            OpKind::Udt => {
                if let Some(index) = which {
                    let rule_count = self.rule_stats.len();
                    if let Some(named) = self.udt_stats.get_mut(index - rule_count) {
                        named.tally.add(state);
                    }
                }
            }
            _ => {}
        }
    }

    /// Visit counts over all node visits of the parse.
    pub fn totals(&self) -> Tally {
        self.totals
    }

    pub fn op_tally(&self, kind: OpKind) -> Tally {
        self.ops[kind as usize]
    }

    /// Per-rule tallies in grammar index order.
    pub fn rules_by_index(&self) -> &[NamedTally] {
        &self.rule_stats
    }

    pub fn udts_by_index(&self) -> &[NamedTally] {
        &self.udt_stats
    }

    /// Per-rule tallies sorted by hit count, busiest first; name breaks ties.
    pub fn rules_by_hits(&self) -> Vec<NamedTally> {
        let mut sorted: Vec<NamedTally> = self.rule_stats.clone();
        sorted.sort_by(|a, b| {
            b.tally
                .total
                .cmp(&a.tally.total)
                .then_with(|| a.lower.cmp(&b.lower))
        });
        sorted
    }

    /// Per-rule tallies in alphabetical order.
    pub fn rules_by_name(&self) -> Vec<NamedTally> {
        let mut sorted: Vec<NamedTally> = self.rule_stats.clone();
        sorted.sort_by(|a, b| a.lower.cmp(&b.lower));
        sorted
    }
}
