//! Ready-made example grammars.
//!
//! Used by the documentation and the integration tests; kept public so hosts
//! have something to experiment with before compiling grammars of their own.

use crate::{BkrCase, BkrMode, ConfigError, Grammar, GrammarBuilder, Op, INF};

/// A floating point number grammar:
///
/// ```text
/// float    = sign decimal exponent
/// sign     = ["+" / "-"]
/// decimal  = integer [dot fraction] / dot fraction
/// integer  = 1*%d48-57
/// dot      = "."
/// fraction = *%d48-57
/// exponent = ["e" esign exp]
/// esign    = ["+" / "-"]
/// exp      = 1*%d48-57
/// ```
pub fn float_grammar() -> Result<Grammar, ConfigError> {
    GrammarBuilder::new()
        .rule(
            "float",
            Op::cat(vec![Op::rnm("sign"), Op::rnm("decimal"), Op::rnm("exponent")]),
        )
        .rule("sign", Op::opt(Op::alt(vec![Op::tls("+"), Op::tls("-")])))
        .rule(
            "decimal",
            Op::alt(vec![
                Op::cat(vec![
                    Op::rnm("integer"),
                    Op::opt(Op::cat(vec![Op::rnm("dot"), Op::rnm("fraction")])),
                ]),
                Op::cat(vec![Op::rnm("dot"), Op::rnm("fraction")]),
            ]),
        )
        .rule("integer", Op::rep(1, INF, Op::trg(48, 57)))
        .rule("dot", Op::tls("."))
        .rule("fraction", Op::rep(0, INF, Op::trg(48, 57)))
        .rule(
            "exponent",
            Op::opt(Op::cat(vec![Op::tls("e"), Op::rnm("esign"), Op::rnm("exp")])),
        )
        .rule("esign", Op::opt(Op::alt(vec![Op::tls("+"), Op::tls("-")])))
        .rule("exp", Op::rep(1, INF, Op::trg(48, 57)))
        .build()
}

/// A doubled-word grammar built on a universal, case-insensitive back
/// reference:
///
/// ```text
/// doubled = word %d32 \%i%uword
/// word    = 1*%d97-122
/// ```
pub fn doubled_word_grammar() -> Result<Grammar, ConfigError> {
    GrammarBuilder::new()
        .rule(
            "doubled",
            Op::cat(vec![
                Op::rnm("word"),
                Op::tbs_codes(vec![32]),
                Op::bkr("word", BkrCase::Insensitive, BkrMode::Universal),
            ]),
        )
        .rule("word", Op::rep(1, INF, Op::trg(97, 122)))
        .build()
}
