//! The opcode interpreter.
//!
//! [Machine] holds the per-parse state: the input window, the node hit and
//! tree depth counters, the look around stack and the optional collectors.
//! Every node visit funnels through [Machine::op_execute], the single place
//! where limits are enforced and trace/statistics records are emitted. The
//! individual operator evaluators live in `forward.rs` and, for the
//! right-to-left set used inside look behind scopes, in `behind.rs`.

mod behind;
mod forward;
#[cfg(test)]
mod __tests__;

use crate::{
    Ast, BackRef, ConfigError, Grammar, LookAround, LookScope, Opcode, ParseResult, Parser,
    ParserError, Rule, RuleCallback, StartRule, State, Stats, SysData, Trace, TraceConfig, Udt,
    UdtCallback,
};
use std::rc::Rc;

impl SysData {
    pub(crate) fn new(grammar: &Grammar) -> Self {
        Self {
            state: State::Active,
            phrase_length: 0,
            look_around: LookAround::None,
            u_frame: BackRef::new(grammar),
            p_frame: BackRef::new(grammar),
        }
    }
}

/// Per-parse execution state. Built fresh by [Parser::parse] and dropped when
/// the parse completes.
pub(crate) struct Machine<'a, 'd, D> {
    pub(crate) grammar: &'a Grammar,
    pub(crate) chars: &'a [u32],
    pub(crate) chars_begin: usize,
    pub(crate) chars_length: usize,
    pub(crate) chars_end: usize,
    rule_callbacks: &'a [Option<Rc<dyn RuleCallback<D>>>],
    udt_callbacks: &'a [Option<Rc<dyn UdtCallback<D>>>],
    pub(crate) data: &'d mut D,
    look_stack: Vec<LookScope>,
    tree_depth: usize,
    max_tree_depth: usize,
    node_hits: usize,
    max_matched: usize,
    limit_tree_depth: usize,
    limit_node_hits: usize,
    ast: Option<&'a mut Ast>,
    stats: Option<&'a mut Stats>,
    trace: Option<&'a mut Trace>,
}

impl<'a, 'd, D> Machine<'a, 'd, D> {
    fn look_scope(&self) -> LookScope {
        self.look_stack.last().copied().unwrap_or(LookScope {
            mode: LookAround::None,
            anchor: self.chars_begin,
            chars_end: self.chars_end,
            chars_length: self.chars_length,
        })
    }

    pub(crate) fn in_look_around(&self) -> bool {
        self.look_stack.len() > 1
    }

    fn in_look_behind(&self) -> bool {
        self.look_scope().mode == LookAround::Behind
    }

    pub(crate) fn ast_len(&self) -> usize {
        self.ast.as_ref().map(|ast| ast.len()).unwrap_or(0)
    }

    pub(crate) fn ast_truncate(&mut self, len: usize) {
        if let Some(ast) = self.ast.as_mut() {
            ast.truncate(len);
        }
    }

    /// Single node visit: limit checks, dispatch to the operator evaluator,
    /// then statistics and trace collection.
    pub(crate) fn op_execute(
        &mut self,
        ops: &[Opcode],
        op_index: usize,
        phrase_index: usize,
        sys: &mut SysData,
    ) -> Result<(), ParserError> {
        self.node_hits += 1;
        if self.node_hits > self.limit_node_hits {
            return Err(ParserError::limit("node hits", self.limit_node_hits));
        }
        self.tree_depth += 1;
        if self.tree_depth > self.max_tree_depth {
            self.max_tree_depth = self.tree_depth;
            if self.max_tree_depth > self.limit_tree_depth {
                return Err(ParserError::limit("parse tree depth", self.limit_tree_depth));
            }
        }
        let grammar = self.grammar;
        let op = &ops[op_index];
        let kind = op.kind();
        let which = match op {
            Opcode::Rnm { index } => Some(*index),
            Opcode::Udt { index, .. } => Some(grammar.rule_count() + index),
            Opcode::Bkr { index, .. } => Some(*index),
            _ => None,
        };
        let name = which.map(|w| grammar.lower_name(w));
        /* refresh the relay state for this node */
        sys.state = State::Active;
        sys.phrase_length = 0;
        sys.look_around = self.look_scope().mode;
        let scope = self.look_scope();
        let depth = self.tree_depth;
        if let Some(trace) = self.trace.as_mut() {
            trace.down(kind, which, name, depth, phrase_index, scope.anchor, scope.mode);
        }
        let behind = self.in_look_behind();
        match op {
            Opcode::Alt { children } => self.op_alt(ops, children, phrase_index, sys)?,
            Opcode::Cat { children } => {
                if behind {
                    self.op_cat_behind(ops, children, phrase_index, sys)?
                } else {
                    self.op_cat(ops, children, phrase_index, sys)?
                }
            }
            Opcode::Rep { min, max } => {
                if behind {
                    self.op_rep_behind(ops, op_index, *min, *max, phrase_index, sys)?
                } else {
                    self.op_rep(ops, op_index, *min, *max, phrase_index, sys)?
                }
            }
            Opcode::Rnm { index } => self.op_rnm(*index, phrase_index, sys)?,
            Opcode::Udt { index, .. } => self.op_udt(*index, phrase_index, sys)?,
            Opcode::And => self.op_and(ops, op_index, phrase_index, sys)?,
            Opcode::Not => self.op_not(ops, op_index, phrase_index, sys)?,
            Opcode::Trg { min, max } => {
                if behind {
                    self.op_trg_behind(*min, *max, phrase_index, sys)
                } else {
                    self.op_trg(*min, *max, phrase_index, sys)
                }
            }
            Opcode::Tbs { string } => {
                if behind {
                    self.op_tbs_behind(string, phrase_index, sys)
                } else {
                    self.op_tbs(string, phrase_index, sys)
                }
            }
            Opcode::Tls { string } => {
                if behind {
                    self.op_tls_behind(string, phrase_index, sys)
                } else {
                    self.op_tls(string, phrase_index, sys)
                }
            }
            Opcode::Bkr { index, case, mode } => {
                if behind {
                    self.op_bkr_behind(*index, *case, *mode, phrase_index, sys)
                } else {
                    self.op_bkr(*index, *case, *mode, phrase_index, sys)
                }
            }
            Opcode::Bka => self.op_bka(ops, op_index, phrase_index, sys)?,
            Opcode::Bkn => self.op_bkn(ops, op_index, phrase_index, sys)?,
            Opcode::Abg => self.op_abg(phrase_index, sys),
            Opcode::Aen => self.op_aen(phrase_index, sys),
        }
        if sys.state == State::Active {
            return Err(ParserError::callback(
                kind.name(),
                "node exited in ACTIVE state",
            ));
        }
        if !self.in_look_around() && phrase_index + sys.phrase_length > self.max_matched {
            self.max_matched = phrase_index + sys.phrase_length;
        }
        if let Some(stats) = self.stats.as_mut() {
            stats.collect(kind, which, sys.state);
        }
        let scope = self.look_scope();
        let depth = self.tree_depth;
        if let Some(trace) = self.trace.as_mut() {
            trace.up(
                kind,
                which,
                name,
                depth,
                sys.state,
                phrase_index,
                sys.phrase_length,
                scope.anchor,
                scope.mode,
            );
        }
        self.tree_depth -= 1;
        Ok(())
    }

    pub(crate) fn push_look_ahead(&mut self, anchor: usize) {
        self.look_stack.push(LookScope {
            mode: LookAround::Ahead,
            anchor,
            chars_end: self.chars_end,
            chars_length: self.chars_length,
        });
        /* look ahead may inspect characters beyond the parse window */
        self.chars_end = self.chars.len();
        self.chars_length = self.chars.len() - self.chars_begin;
    }

    pub(crate) fn push_look_behind(&mut self, anchor: usize) {
        self.look_stack.push(LookScope {
            mode: LookAround::Behind,
            anchor,
            chars_end: self.chars_end,
            chars_length: self.chars_length,
        });
    }

    pub(crate) fn pop_look(&mut self) {
        if let Some(scope) = self.look_stack.pop() {
            self.chars_end = scope.chars_end;
            self.chars_length = scope.chars_length;
        }
    }
}

/* callback result discipline, per the RNM contract */
pub(crate) fn validate_rnm_result(
    rule: &Rule,
    sys: &mut SysData,
    chars_left: usize,
    down: bool,
) -> Result<(), ParserError> {
    if sys.phrase_length > chars_left {
        return Err(ParserError::callback(
            rule.name.clone(),
            format!(
                "callback phrase length {} exceeds remaining characters {}",
                sys.phrase_length, chars_left
            ),
        ));
    }
    match sys.state {
        State::Active if down => Ok(()),
        State::Active => Err(ParserError::callback(
            rule.name.clone(),
            "ACTIVE state only allowed before the rule body has been executed",
        )),
        State::Empty => {
            sys.phrase_length = 0;
            Ok(())
        }
        State::Match if sys.phrase_length == 0 => {
            sys.state = State::Empty;
            Ok(())
        }
        State::Match => Ok(()),
        State::NoMatch => {
            sys.phrase_length = 0;
            Ok(())
        }
    }
}

/* callback result discipline, per the UDT contract */
pub(crate) fn validate_udt_result(
    udt: &Udt,
    sys: &mut SysData,
    chars_left: usize,
) -> Result<(), ParserError> {
    if sys.phrase_length > chars_left {
        return Err(ParserError::callback(
            udt.name.clone(),
            format!(
                "callback phrase length {} exceeds remaining characters {}",
                sys.phrase_length, chars_left
            ),
        ));
    }
    match sys.state {
        State::Active => Err(ParserError::callback(
            udt.name.clone(),
            "ACTIVE state not allowed from a UDT callback",
        )),
        State::Empty if !udt.empty => Err(ParserError::callback(
            udt.name.clone(),
            "EMPTY not allowed from a UDT declared non-empty",
        )),
        State::Empty => {
            sys.phrase_length = 0;
            Ok(())
        }
        State::Match if sys.phrase_length == 0 => {
            if udt.empty {
                sys.state = State::Empty;
                Ok(())
            } else {
                Err(ParserError::callback(
                    udt.name.clone(),
                    "zero length match not allowed from a UDT declared non-empty",
                ))
            }
        }
        State::Match => Ok(()),
        State::NoMatch => {
            sys.phrase_length = 0;
            Ok(())
        }
    }
}

/// The view of the parse a [RuleCallback] or [UdtCallback] receives alongside
/// the [SysData] relay.
///
/// Exposes the input and the phrase position of the node being visited, the
/// host data, and the `evaluate_rule`/`evaluate_udt` escape hatches. The
/// escape hatches re-enter the interpreter and therefore alter the language
/// the parser accepts; use with caution.
pub struct CallbackEnv<'m, 'a, 'd, D> {
    machine: &'m mut Machine<'a, 'd, D>,
    phrase_index: usize,
}

impl<'m, 'a, 'd, D> CallbackEnv<'m, 'a, 'd, D> {
    /// The full input character array.
    pub fn chars(&self) -> &[u32] {
        self.machine.chars
    }

    /// Index of the first character of the phrase to be matched.
    pub fn phrase_index(&self) -> usize {
        self.phrase_index
    }

    /// Exclusive end of the current parse window.
    pub fn chars_end(&self) -> usize {
        self.machine.chars_end
    }

    /// The longest phrase a callback is allowed to claim.
    pub fn max_phrase_length(&self) -> usize {
        self.machine.chars_end.saturating_sub(self.phrase_index)
    }

    /// The host data passed to [Parser::parse].
    pub fn data(&mut self) -> &mut D {
        self.machine.data
    }

    /// Evaluate any grammar rule at an arbitrary position.
    pub fn evaluate_rule(
        &mut self,
        rule_index: usize,
        phrase_index: usize,
        sys: &mut SysData,
    ) -> Result<(), ParserError> {
        if rule_index >= self.machine.grammar.rule_count() {
            return Err(ParserError::callback(
                "evaluate_rule",
                format!("rule index {} out of range", rule_index),
            ));
        }
        if phrase_index > self.machine.chars_end {
            return Err(ParserError::callback(
                "evaluate_rule",
                format!("phrase index {} out of range", phrase_index),
            ));
        }
        let ops = [Opcode::Rnm { index: rule_index }];
        self.machine.op_execute(&ops, 0, phrase_index, sys)
    }

    /// Evaluate any UDT at an arbitrary position.
    pub fn evaluate_udt(
        &mut self,
        udt_index: usize,
        phrase_index: usize,
        sys: &mut SysData,
    ) -> Result<(), ParserError> {
        let grammar = self.machine.grammar;
        let udt = match grammar.udts().get(udt_index) {
            Some(udt) => udt,
            None => {
                return Err(ParserError::callback(
                    "evaluate_udt",
                    format!("UDT index {} out of range", udt_index),
                ))
            }
        };
        if phrase_index > self.machine.chars_end {
            return Err(ParserError::callback(
                "evaluate_udt",
                format!("phrase index {} out of range", phrase_index),
            ));
        }
        let ops = [Opcode::Udt {
            index: udt_index,
            empty: udt.empty,
        }];
        self.machine.op_execute(&ops, 0, phrase_index, sys)
    }
}

impl<D, F> RuleCallback<D> for F
where
    F: Fn(&mut SysData, &mut CallbackEnv<'_, '_, '_, D>) -> Result<(), ParserError>,
{
    fn on_visit(
        &self,
        sys: &mut SysData,
        env: &mut CallbackEnv<'_, '_, '_, D>,
    ) -> Result<(), ParserError> {
        self(sys, env)
    }
}

impl<D, F> UdtCallback<D> for F
where
    F: Fn(&mut SysData, &mut CallbackEnv<'_, '_, '_, D>) -> Result<(), ParserError>,
{
    fn on_visit(
        &self,
        sys: &mut SysData,
        env: &mut CallbackEnv<'_, '_, '_, D>,
    ) -> Result<(), ParserError> {
        self(sys, env)
    }
}

impl<'s> From<&'s str> for StartRule<'s> {
    fn from(name: &'s str) -> Self {
        StartRule::Name(name)
    }
}

impl From<usize> for StartRule<'static> {
    fn from(index: usize) -> Self {
        StartRule::Index(index)
    }
}

/// Default parse tree depth ceiling. Deep enough for any reasonable grammar,
/// finite enough to stop a runaway recursion before the thread stack does.
pub(crate) const DEFAULT_TREE_DEPTH: usize = 4096;

impl<'g, D> Parser<'g, D> {
    pub fn new(grammar: &'g Grammar) -> Result<Self, ConfigError> {
        if grammar.rule_count() == 0 {
            return Err(ConfigError::new("Parser", "grammar has no rules"));
        }
        Ok(Self {
            grammar,
            rule_callbacks: vec![None; grammar.rule_count()],
            udt_callbacks: vec![None; grammar.udt_count()],
            limit_tree_depth: DEFAULT_TREE_DEPTH,
            limit_node_hits: usize::MAX,
            ast: None,
            stats: None,
            trace: None,
        })
    }

    /// Register a callback for the named rule, replacing any previous one.
    pub fn add_rule_callback(
        &mut self,
        name: &str,
        callback: impl RuleCallback<D> + 'static,
    ) -> Result<(), ConfigError> {
        match self.grammar.rule_index(name) {
            Some(index) => {
                self.rule_callbacks[index] = Some(Rc::new(callback));
                Ok(())
            }
            None => Err(ConfigError::new(
                "Parser",
                format!("callback target '{}' is not a rule name", name),
            )),
        }
    }

    /// Register the matcher for the named UDT. Every UDT of the grammar must
    /// have one before parsing.
    pub fn add_udt_callback(
        &mut self,
        name: &str,
        callback: impl UdtCallback<D> + 'static,
    ) -> Result<(), ConfigError> {
        match self.grammar.udt_index(name) {
            Some(index) => {
                self.udt_callbacks[index] = Some(Rc::new(callback));
                Ok(())
            }
            None => Err(ConfigError::new(
                "Parser",
                format!("callback target '{}' is not a UDT name", name),
            )),
        }
    }

    /// Set the parse tree depth ceiling; exceeding it aborts the parse with
    /// [ParserError::Limit].
    pub fn set_max_tree_depth(&mut self, depth: usize) -> Result<(), ConfigError> {
        if depth == 0 {
            return Err(ConfigError::new("Parser", "max tree depth must be > 0"));
        }
        self.limit_tree_depth = depth;
        Ok(())
    }

    /// Set the node hit ceiling; exceeding it aborts the parse with
    /// [ParserError::Limit]. Unbounded by default.
    pub fn set_max_node_hits(&mut self, hits: usize) -> Result<(), ConfigError> {
        if hits == 0 {
            return Err(ConfigError::new("Parser", "max node hits must be > 0"));
        }
        self.limit_node_hits = hits;
        Ok(())
    }

    pub fn enable_ast(&mut self) {
        self.ast = Some(Ast::new(self.grammar));
    }

    pub fn ast(&self) -> Option<&Ast> {
        self.ast.as_ref()
    }

    pub fn ast_mut(&mut self) -> Option<&mut Ast> {
        self.ast.as_mut()
    }

    pub fn enable_stats(&mut self) {
        self.stats = Some(Stats::new(self.grammar));
    }

    pub fn stats(&self) -> Option<&Stats> {
        self.stats.as_ref()
    }

    pub fn enable_trace(&mut self, config: TraceConfig) {
        self.trace = Some(Trace::new(config));
    }

    pub fn trace(&self) -> Option<&Trace> {
        self.trace.as_ref()
    }

    /// Parse the full input against the grammar, starting at `start`.
    pub fn parse<'s>(
        &mut self,
        start: impl Into<StartRule<'s>>,
        chars: &[u32],
        data: &mut D,
    ) -> Result<ParseResult, ParserError> {
        self.run(start.into(), chars, 0, chars.len(), data)
    }

    /// Parse a sub-window of the input. Look around operators and absolute
    /// anchors still see the full character array.
    pub fn parse_substring<'s>(
        &mut self,
        start: impl Into<StartRule<'s>>,
        chars: &[u32],
        sub_begin: usize,
        sub_length: usize,
        data: &mut D,
    ) -> Result<ParseResult, ParserError> {
        if sub_begin > chars.len() {
            return Err(ConfigError::new(
                "Parser",
                format!("substring beginning index {} out of range", sub_begin),
            )
            .into());
        }
        if sub_length > chars.len() - sub_begin {
            return Err(ConfigError::new(
                "Parser",
                format!("substring length {} out of range", sub_length),
            )
            .into());
        }
        self.run(start.into(), chars, sub_begin, sub_length, data)
    }

    fn run(
        &mut self,
        start: StartRule<'_>,
        chars: &[u32],
        begin: usize,
        length: usize,
        data: &mut D,
    ) -> Result<ParseResult, ParserError> {
        let grammar = self.grammar;
        let start_index = match start {
            StartRule::Index(index) if index < grammar.rule_count() => index,
            StartRule::Index(index) => {
                return Err(ConfigError::new(
                    "Parser",
                    format!("start rule index {} out of range", index),
                )
                .into())
            }
            StartRule::Name(name) => grammar.rule_index(name).ok_or_else(|| {
                ParserError::from(ConfigError::new(
                    "Parser",
                    format!("start rule '{}' not recognized", name),
                ))
            })?,
        };
        for (index, udt) in grammar.udts().iter().enumerate() {
            if self.udt_callbacks[index].is_none() {
                return Err(ConfigError::new(
                    "Parser",
                    format!("no callback registered for UDT '{}'", udt.name),
                )
                .into());
            }
        }
        if let Some(ast) = self.ast.as_mut() {
            ast.init();
        }
        if let Some(stats) = self.stats.as_mut() {
            stats.clear();
        }
        if let Some(trace) = self.trace.as_mut() {
            trace.clear();
        }
        let mut sys = SysData::new(grammar);
        let mut machine = Machine {
            grammar,
            chars,
            chars_begin: begin,
            chars_length: length,
            chars_end: begin + length,
            rule_callbacks: &self.rule_callbacks,
            udt_callbacks: &self.udt_callbacks,
            data,
            look_stack: vec![LookScope {
                mode: LookAround::None,
                anchor: begin,
                chars_end: begin + length,
                chars_length: length,
            }],
            tree_depth: 0,
            max_tree_depth: 0,
            node_hits: 0,
            max_matched: 0,
            limit_tree_depth: self.limit_tree_depth,
            limit_node_hits: self.limit_node_hits,
            ast: self.ast.as_mut(),
            stats: self.stats.as_mut(),
            trace: self.trace.as_mut(),
        };
        /* synthetic root opcode for the start rule */
        let root = [Opcode::Rnm { index: start_index }];
        machine.op_execute(&root, 0, begin, &mut sys)?;
        let success = match sys.state {
            State::Active => {
                return Err(ParserError::callback(
                    "Parser",
                    "final state should never be ACTIVE",
                ))
            }
            State::NoMatch => false,
            /* partial matches are not success at the top level */
            State::Empty | State::Match => sys.phrase_length == length,
        };
        Ok(ParseResult {
            success,
            state: sys.state,
            input_length: chars.len(),
            sub_begin: begin,
            sub_end: begin + length,
            sub_length: length,
            matched: sys.phrase_length,
            max_matched: machine.max_matched,
            max_tree_depth: machine.max_tree_depth,
            node_hits: machine.node_hits,
        })
    }
}
