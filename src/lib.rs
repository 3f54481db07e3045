//! sabnf_pt is a library to execute compiled SABNF (Superset Augmented BNF) grammars
//! against character input with a backtracking recursive descent parser.
//!
//! # Overview
//! ABNF grammars are widely used to specify internet protocols and data formats.
//! SABNF extends ABNF with user-defined terminals (UDTs), look ahead and look behind
//! operators, back references and input anchors, which makes it expressive enough to
//! describe many context-sensitive formats that plain ABNF cannot.
//! This library is the runtime half of such a system: it consumes a compiled
//! [Grammar] object - an opcode tree per rule - and interprets it against a sequence
//! of integer code points, producing a match result, an optional [AST](AstNode),
//! and optional statistics and trace records.
//!
//! # Design
//!
//! A grammar compiler (an external tool, out of scope here) translates SABNF text
//! into a flat array of [opcodes](Opcode) per rule. The [Parser] walks that tree
//! with one evaluator function per operator: `ALT`, `CAT`, `REP`, `RNM`, `UDT`,
//! `AND`, `NOT`, `BKA`, `BKN`, `TRG`, `TBS`, `TLS`, `BKR`, `ABG` and `AEN`.
//! Inside a look behind scope the concatenation, repetition, terminal and back
//! reference operators walk the input right to left; the remaining operators are
//! direction agnostic.
//!
//! Backtracking side effects are transactional. The AST is a record log with a
//! length mark/restore protocol, and the two back reference frame stacks
//! (universal and parent scope) are rolled back to their entry depth whenever a
//! compound operator fails. Host code can participate through the
//! [RuleCallback] and [UdtCallback] interfaces, registered by rule name and
//! resolved into index-addressed tables before parsing begins.
//!
//! Because the interpreter itself has no protection against unbounded recursion,
//! a grammar must first be certified by the [rule_attributes] analyzer, which
//! computes left/right recursion, cyclic, empty and finiteness properties for
//! every rule and reports the unsafe ones. The parser additionally enforces
//! node-hit and tree-depth ceilings as a circuit breaker against
//! catastrophically backtracking grammar/input combinations.
//!
//! Grammar objects can also be assembled programmatically with [GrammarBuilder]
//! and the nested [Op] tree type, which is how the examples and tests in this
//! crate define their grammars.
//!
//! # Example
//!
//! Following is the grammar `S = 1*("a" / "b")` built, analyzed and parsed.
//! ```
//! use sabnf_pt::{rule_attributes, string_to_chars, GrammarBuilder, Op, Parser, INF};
//!
//! let grammar = GrammarBuilder::new()
//!     .rule(
//!         "S",
//!         Op::rep(1, INF, Op::alt(vec![Op::tls("a"), Op::tls("b")])),
//!     )
//!     .build()
//!     .unwrap();
//!
//! // certify the grammar before running it
//! let attrs = rule_attributes(&grammar);
//! assert!(attrs.errors.is_empty());
//!
//! let mut parser = Parser::new(&grammar).unwrap();
//! let input = string_to_chars("aabba");
//! let result = parser.parse("S", &input, &mut ()).unwrap();
//! assert!(result.success);
//! assert_eq!(result.matched, 5);
//! ```
//!
//! # License
//! [sabnf_pt](crate) is provided under the MIT or Apache-2.0 license.
mod ast_node;
mod attributes;
mod backref;
mod error;
pub mod examples;
mod grammar;
mod parser;
mod stats;
mod trace;
mod util;

pub use attributes::{rule_attributes, rule_dependencies};
pub use parser::CallbackEnv;
pub use util::{chars_to_string, string_to_chars};

use once_cell::unsync::OnceCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Maximum repetition count standing in for "unbounded" (`*` in ABNF).
pub const INF: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// The match state of a parser node.
///
/// [Active](State::Active) is the entry sentinel a node starts in; it is never a
/// valid exit state. The other three states classify the outcome of the node.
pub enum State {
    Active,
    Match,
    Empty,
    NoMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Operator vocabulary shared by the opcodes, the statistics collector and the
/// trace records.
pub enum OpKind {
    Alt,
    Cat,
    Rep,
    Rnm,
    Udt,
    And,
    Not,
    Trg,
    Tbs,
    Tls,
    Bkr,
    Bka,
    Bkn,
    Abg,
    Aen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Look around context of a node visit.
pub enum LookAround {
    None,
    Ahead,
    Behind,
}

#[derive(Debug, Clone, Copy)]
/// One entry of the look around stack maintained by the parser.
pub(crate) struct LookScope {
    pub(crate) mode: LookAround,
    pub(crate) anchor: usize,
    pub(crate) chars_end: usize,
    pub(crate) chars_length: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Case mode of a back reference operator.
pub enum BkrCase {
    Sensitive,
    Insensitive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Frame scope of a back reference operator.
///
/// Universal mode matches the last phrase found for the name anywhere in the
/// grammar; parent mode only sees phrases matched within the immediately
/// enclosing rule invocation.
pub enum BkrMode {
    Universal,
    Parent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One node of a rule's compiled opcode tree.
///
/// `Alt` and `Cat` address their children by index into the same rule's opcode
/// array. The single child of `Rep`, `And`, `Not`, `Bka` and `Bkn` is the
/// immediately following opcode. A `Bkr` index of `rules.len() + n` addresses
/// UDT `n`.
pub enum Opcode {
    Alt {
        children: Vec<usize>,
    },
    Cat {
        children: Vec<usize>,
    },
    Rep {
        min: usize,
        max: usize,
    },
    Rnm {
        index: usize,
    },
    Udt {
        index: usize,
        empty: bool,
    },
    And,
    Not,
    Trg {
        min: u32,
        max: u32,
    },
    Tbs {
        string: Vec<u32>,
    },
    Tls {
        string: Vec<u32>,
    },
    Bkr {
        index: usize,
        case: BkrCase,
        mode: BkrMode,
    },
    Bka,
    Bkn,
    Abg,
    Aen,
}

#[derive(Debug, Clone)]
/// A named grammar rule and its compiled opcode array.
pub struct Rule {
    pub name: String,
    pub lower: String,
    pub index: usize,
    pub is_bkr: bool,
    pub opcodes: Vec<Opcode>,
}

#[derive(Debug, Clone)]
/// A user-defined terminal. Its matching logic is supplied by host code through
/// a [UdtCallback]; `empty` declares whether it may match a zero length phrase.
pub struct Udt {
    pub name: String,
    pub lower: String,
    pub index: usize,
    pub empty: bool,
    pub is_bkr: bool,
}

/// A compiled SABNF grammar: the read-only object the [Parser] executes.
///
/// A [Grammar] is immutable once constructed; the grammar itself is never
/// mutated during parsing and may be shared read-only across parser instances.
pub struct Grammar {
    rules: Vec<Rule>,
    udts: Vec<Udt>,
    lookup: OnceCell<HashMap<String, usize>>,
}

#[derive(Debug, Clone)]
/// A nested operator tree used with [GrammarBuilder] to assemble grammars in
/// code. Flattened into per-rule [Opcode] arrays at build time.
pub enum Op {
    Alt(Vec<Op>),
    Cat(Vec<Op>),
    Rep(usize, usize, Box<Op>),
    Rnm(String),
    Udt(String, bool),
    And(Box<Op>),
    Not(Box<Op>),
    Bka(Box<Op>),
    Bkn(Box<Op>),
    Trg(u32, u32),
    Tbs(Vec<u32>),
    Tls(Vec<u32>),
    Bkr(String, BkrCase, BkrMode),
    Abg,
    Aen,
}

/// Assembles a [Grammar] from named rules of nested [Op] trees.
///
/// Rule and UDT names are resolved case-insensitively with stable indices in
/// definition order. Back referenced targets are flagged, and degenerate
/// single-child `ALT`/`CAT` and `1*1` repetition nodes are reduced away - the
/// only opcode optimization this library performs.
pub struct GrammarBuilder {
    rules: Vec<(String, Op)>,
}

#[derive(Clone)]
/// An error raised while validating a grammar object, resolving a start rule or
/// registering callbacks.
pub struct ConfigError {
    what: String,
    message: String,
}

#[derive(Debug, Clone)]
/// A fatal error aborting a parse with no partial result.
///
/// Ordinary match failure is not an error; it is reported through
/// [ParseResult::success]. This type covers configuration mistakes, callback
/// contract violations and the node-hit/tree-depth circuit breaker.
pub enum ParserError {
    Config(ConfigError),
    Callback { name: String, message: String },
    Limit { what: &'static str, limit: usize },
}

/// The system data passed through every node visit and into callbacks.
///
/// Carries the match [State] and phrase length of the current node, the look
/// around context, and the universal and parent back reference frame stacks.
pub struct SysData {
    pub state: State,
    pub phrase_length: usize,
    pub look_around: LookAround,
    pub(crate) u_frame: BackRef,
    pub(crate) p_frame: BackRef,
}

/// A stack of back reference frames.
///
/// Each frame maps the lowercase name of a back referenced rule or UDT to its
/// last matched phrase `(index, length)`, or to nothing if the name has not
/// matched yet. Pushing copies the top frame; popping rolls back to a saved
/// depth.
pub struct BackRef {
    stack: Vec<HashMap<String, Option<(usize, usize)>>>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct AstRecord {
    pub(crate) which: usize,
    pub(crate) down: bool,
    pub(crate) phrase_index: usize,
    pub(crate) phrase_length: usize,
}

/// Records the tree of matched rule/UDT phrases during a parse.
///
/// Operates as a transaction log: `RNM` and `UDT` nodes append down/up records
/// as they are entered and matched, and failed branches are erased by
/// truncating back to a saved length. [Ast::tree] folds the surviving records
/// into [AstNode] values after a successful parse.
pub struct Ast {
    records: Vec<AstRecord>,
    open: Vec<usize>,
    defined: Vec<bool>,
    names: Vec<String>,
    rule_count: usize,
}

#[derive(Clone)]
/// One node of the abstract syntax tree of a successful parse.
pub struct AstNode {
    pub index: usize,
    pub name: String,
    pub start: usize,
    pub length: usize,
    pub children: Vec<AstNode>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Static attributes of one grammar rule, computed by [rule_attributes].
///
/// `leaf` marks an occurrence that terminated a recursive descent during the
/// traversal; it is only meaningful on intermediate values, not on the final
/// per-rule attributes.
pub struct RuleAttrs {
    pub left: bool,
    pub nested: bool,
    pub right: bool,
    pub cyclic: bool,
    pub empty: bool,
    pub finite: bool,
    pub leaf: bool,
}

#[derive(Debug, Clone)]
/// A rule rejected by the attribute analyzer: left recursive, cyclic or not
/// finite. A grammar with any such rule must not be executed.
pub struct AttrError {
    pub index: usize,
    pub name: String,
    pub attrs: RuleAttrs,
}

#[derive(Debug, Clone)]
/// The result of [rule_attributes]: per-rule attributes plus the list of
/// unsafe rules. Reported, never thrown; callers must check `errors`.
pub struct Attributes {
    pub attrs: Vec<RuleAttrs>,
    pub errors: Vec<AttrError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Recursion classification of a rule, computed by [rule_dependencies].
pub enum RecursiveType {
    NonRecursive,
    Recursive,
    /// Member of a mutually recursive group; the payload is the group number.
    MutuallyRecursive(usize),
}

#[derive(Debug, Clone)]
/// Dependency sets of one rule: which rules/UDTs it (transitively) refers to
/// and which rules refer back to it. Diagnostic only.
pub struct RuleDeps {
    pub refers_to: Vec<bool>,
    pub refers_to_udt: Vec<bool>,
    pub referenced_by: Vec<bool>,
    pub recursive_type: RecursiveType,
}

#[derive(Debug, Clone, Copy)]
/// The start rule of a parse, by index or by case-insensitive name.
pub enum StartRule<'s> {
    Index(usize),
    Name(&'s str),
}

#[derive(Debug, Clone)]
/// The structured result of a completed parse.
///
/// `success` is true iff the root node finished in `Match` or `Empty` state
/// *and* the matched length covers the entire requested input window; this
/// parser does not report partial matches at the top level.
pub struct ParseResult {
    pub success: bool,
    pub state: State,
    pub input_length: usize,
    pub sub_begin: usize,
    pub sub_end: usize,
    pub sub_length: usize,
    pub matched: usize,
    pub max_matched: usize,
    pub max_tree_depth: usize,
    pub node_hits: usize,
}

#[derive(Debug, Clone, Copy, Default)]
/// Visit counts of one operator or named rule, split by exit state.
pub struct Tally {
    pub empty: usize,
    pub matched: usize,
    pub nomatch: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
/// Visit counts of one named `RNM` or `UDT` operator.
pub struct NamedTally {
    pub name: String,
    pub lower: String,
    pub index: usize,
    pub tally: Tally,
}

/// Node visit statistics collector.
///
/// Counts every node visit by operator kind and, for `RNM`/`UDT`, by name.
/// Passive: the parser calls [Stats::collect] once per node visit.
pub struct Stats {
    totals: Tally,
    ops: Vec<Tally>,
    rule_stats: Vec<NamedTally>,
    udt_stats: Vec<NamedTally>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Direction of a trace record: entering or leaving a node.
pub enum TraceDir {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy)]
/// One record of the parse tree walk collected by [Trace].
pub struct TraceRecord {
    pub dir: TraceDir,
    pub kind: OpKind,
    /// Combined rule/UDT index for `RNM`, `UDT` and `BKR` nodes.
    pub which: Option<usize>,
    pub depth: usize,
    pub state: State,
    pub phrase_index: usize,
    pub phrase_length: usize,
    pub anchor: usize,
    pub look_around: LookAround,
}

#[derive(Debug, Clone)]
/// Configuration of the [Trace] collector.
///
/// An empty `ops`/`rules` filter selects everything. `max_records` bounds the
/// ring buffer; once full, new records overwrite the oldest ones.
pub struct TraceConfig {
    pub max_records: usize,
    pub ops: Vec<OpKind>,
    pub rules: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct CircularBuffer {
    items: usize,
    max_size: usize,
}

/// Trace collector: keeps the last N records of the parse tree walk.
///
/// Invoked symmetrically on entry and exit of every node visit, so it must
/// stay cheap; record storage is bounded by the configured ring size.
pub struct Trace {
    config: TraceConfig,
    buffer: CircularBuffer,
    records: Vec<TraceRecord>,
}

/// Host-supplied semantics for a named rule.
///
/// Called once on entry with [State::Active]; if the callback leaves the state
/// `Active` the rule's opcode body is executed and the callback is called a
/// second time with the result, free to override it. A callback that sets any
/// other state on the first call preempts the rule body entirely.
pub trait RuleCallback<D> {
    fn on_visit(
        &self,
        sys: &mut SysData,
        env: &mut CallbackEnv<'_, '_, '_, D>,
    ) -> Result<(), ParserError>;
}

/// Host-supplied matcher for a user-defined terminal.
///
/// Every UDT in the grammar must have one registered before parsing. The
/// callback must resolve to `Match`, `Empty` or `NoMatch`; `Empty` (or a zero
/// length match) from a UDT declared non-empty is a contract violation.
pub trait UdtCallback<D> {
    fn on_visit(
        &self,
        sys: &mut SysData,
        env: &mut CallbackEnv<'_, '_, '_, D>,
    ) -> Result<(), ParserError>;
}

/// The opcode interpreter: executes a [Grammar] against integer code points.
///
/// One instance owns all per-parse mutable state (counters, look around stack,
/// collectors) and must not be shared between concurrent parses; independent
/// instances may run in parallel over the same shared grammar.
pub struct Parser<'g, D = ()> {
    grammar: &'g Grammar,
    rule_callbacks: Vec<Option<Rc<dyn RuleCallback<D>>>>,
    udt_callbacks: Vec<Option<Rc<dyn UdtCallback<D>>>>,
    limit_tree_depth: usize,
    limit_node_hits: usize,
    ast: Option<Ast>,
    stats: Option<Stats>,
    trace: Option<Trace>,
}
