use crate::examples::{doubled_word_grammar, float_grammar};
use crate::{
    string_to_chars, BkrCase, BkrMode, CallbackEnv, Grammar, GrammarBuilder, Op, OpKind, Parser,
    ParserError, State, SysData, TraceConfig, TraceDir,
};

fn parse(grammar: &Grammar, start: &str, text: &str) -> crate::ParseResult {
    let mut parser = Parser::new(grammar).unwrap();
    parser.parse(start, &string_to_chars(text), &mut ()).unwrap()
}

#[test]
fn rep_over_alt() {
    // S = 1*("a" / "b")
    let grammar = GrammarBuilder::new()
        .rule("S", Op::plus(Op::alt(vec![Op::tls("a"), Op::tls("b")])))
        .build()
        .unwrap();
    let result = parse(&grammar, "S", "aabba");
    assert!(result.success);
    assert_eq!(result.state, State::Match);
    assert_eq!(result.matched, 5);

    let result = parse(&grammar, "S", "c");
    assert!(!result.success);
    assert_eq!(result.state, State::NoMatch);
}

#[test]
fn cat_concatenates_and_rolls_back() {
    // S = "ab" "cd"
    let grammar = GrammarBuilder::new()
        .rule("S", Op::cat(vec![Op::tls("ab"), Op::tls("cd")]))
        .build()
        .unwrap();
    let result = parse(&grammar, "S", "abcd");
    assert!(result.success);
    assert_eq!(result.matched, 4);

    // the second child fails entirely; only "ab" was ever matched
    let result = parse(&grammar, "S", "abce");
    assert!(!result.success);
    assert_eq!(result.matched, 0);
    assert_eq!(result.max_matched, 2);
}

#[test]
fn rep_bounds() {
    // S = 2*4"a"
    let grammar = GrammarBuilder::new()
        .rule("S", Op::rep(2, 4, Op::tls("a")))
        .build()
        .unwrap();
    assert!(!parse(&grammar, "S", "a").success);
    assert!(parse(&grammar, "S", "aa").success);
    assert_eq!(parse(&grammar, "S", "aaa").matched, 3);

    // five characters: REP stops at four, top level is a partial match
    let result = parse(&grammar, "S", "aaaaa");
    assert!(!result.success);
    assert_eq!(result.matched, 4);
    assert_eq!(result.max_matched, 4);
}

#[test]
fn rep_empty_child_terminates() {
    // S = *"" - an empty child ends the repetition immediately
    let grammar = GrammarBuilder::new()
        .rule("S", Op::star(Op::tls("")))
        .build()
        .unwrap();
    let result = parse(&grammar, "S", "");
    assert!(result.success);
    assert_eq!(result.state, State::Empty);

    // with input remaining the child is evaluated exactly once, goes EMPTY
    // and the repetition stops instead of looping
    let result = parse(&grammar, "S", "x");
    assert!(!result.success);
    assert_eq!(result.state, State::Empty);
    assert_eq!(result.matched, 0);
    // RNM + REP + one TLS visit
    assert_eq!(result.node_hits, 3);

    // T = *"" "x" - the empty repetition composes with a following match
    let grammar = GrammarBuilder::new()
        .rule("T", Op::cat(vec![Op::star(Op::tls("")), Op::tls("x")]))
        .build()
        .unwrap();
    let result = parse(&grammar, "T", "x");
    assert!(result.success);
    assert_eq!(result.matched, 1);
    // RNM + CAT + REP + empty TLS + "x" TLS
    assert_eq!(result.node_hits, 5);
}

#[test]
fn rep_zero_matches_empty() {
    let grammar = GrammarBuilder::new()
        .rule("S", Op::star(Op::tls("a")))
        .build()
        .unwrap();
    let result = parse(&grammar, "S", "");
    assert!(result.success);
    assert_eq!(result.state, State::Empty);
    assert_eq!(result.matched, 0);
}

#[test]
fn tls_is_case_insensitive_tbs_is_not() {
    // S = "a" "a"   T = %s"a" %s"a"
    let grammar = GrammarBuilder::new()
        .rule("S", Op::cat(vec![Op::tls("a"), Op::tls("a")]))
        .rule("T", Op::cat(vec![Op::tbs("a"), Op::tbs("a")]))
        .build()
        .unwrap();
    assert!(parse(&grammar, "S", "aA").success);
    assert!(!parse(&grammar, "S", "ab").success);
    assert!(!parse(&grammar, "T", "aA").success);
    assert!(parse(&grammar, "T", "aa").success);
}

#[test]
fn trg_matches_single_character_range() {
    let grammar = GrammarBuilder::new()
        .rule("S", Op::plus(Op::trg(48, 57)))
        .build()
        .unwrap();
    assert!(parse(&grammar, "S", "0159").success);
    assert!(!parse(&grammar, "S", "01a9").success);
}

#[test]
fn look_ahead_is_zero_width() {
    // S = &"ab" "ab"   N = !"b" "a"
    let grammar = GrammarBuilder::new()
        .rule("S", Op::cat(vec![Op::and(Op::tls("ab")), Op::tls("ab")]))
        .rule("N", Op::cat(vec![Op::not(Op::tls("b")), Op::tls("a")]))
        .build()
        .unwrap();
    let result = parse(&grammar, "S", "ab");
    assert!(result.success);
    assert_eq!(result.matched, 2);
    assert!(!parse(&grammar, "S", "ax").success);
    assert!(parse(&grammar, "N", "a").success);
    assert!(!parse(&grammar, "N", "b").success);
}

#[test]
fn look_ahead_sees_past_the_substring_window() {
    // S = &"ab" "a" - the predicate inspects beyond the one character window
    let grammar = GrammarBuilder::new()
        .rule("S", Op::cat(vec![Op::and(Op::tls("ab")), Op::tls("a")]))
        .build()
        .unwrap();
    let chars = string_to_chars("abc");
    let mut parser = Parser::new(&grammar).unwrap();
    let result = parser.parse_substring("S", &chars, 0, 1, &mut ()).unwrap();
    assert!(result.success);
    assert_eq!(result.matched, 1);
    assert_eq!(result.sub_begin, 0);
    assert_eq!(result.sub_end, 1);
}

#[test]
fn look_behind_matches_right_to_left() {
    // S = "ab" (?<= "ab") "cd" spelled with BKA
    let grammar = GrammarBuilder::new()
        .rule(
            "S",
            Op::cat(vec![Op::tls("ab"), Op::bka(Op::tls("ab")), Op::tls("cd")]),
        )
        .rule(
            "N",
            Op::cat(vec![Op::tls("ab"), Op::bkn(Op::tls("ab")), Op::tls("cd")]),
        )
        .rule(
            "C",
            // behind-mode CAT walks its children right to left
            Op::cat(vec![
                Op::tls("abc"),
                Op::bka(Op::cat(vec![Op::tls("a"), Op::tls("bc")])),
            ]),
        )
        .build()
        .unwrap();
    let result = parse(&grammar, "S", "abcd");
    assert!(result.success);
    assert_eq!(result.matched, 4);
    assert!(!parse(&grammar, "N", "abcd").success);
    assert!(parse(&grammar, "C", "abc").success);
}

#[test]
fn look_behind_matches_tbs_and_back_reference() {
    // S = word %d32 \word (?<= %d32 \word) - the predicate re-matches the
    // space and the bound phrase right to left, ending at the anchor
    let grammar = GrammarBuilder::new()
        .rule(
            "S",
            Op::cat(vec![
                Op::rnm("word"),
                Op::tbs_codes(vec![32]),
                Op::bkr("word", BkrCase::Sensitive, BkrMode::Universal),
                Op::bka(Op::cat(vec![
                    Op::tbs_codes(vec![32]),
                    Op::bkr("word", BkrCase::Sensitive, BkrMode::Universal),
                ])),
            ]),
        )
        .rule("word", Op::plus(Op::trg(97, 122)))
        .build()
        .unwrap();
    let result = parse(&grammar, "S", "ab ab");
    assert!(result.success);
    assert_eq!(result.matched, 5);

    // a case-insensitive forward reference accepts "AB"; the sensitive
    // behind reference then rejects the same phrase
    let grammar = GrammarBuilder::new()
        .rule(
            "S",
            Op::cat(vec![
                Op::rnm("word"),
                Op::tbs_codes(vec![32]),
                Op::bkr("word", BkrCase::Insensitive, BkrMode::Universal),
                Op::bka(Op::bkr("word", BkrCase::Sensitive, BkrMode::Universal)),
            ]),
        )
        .rule("word", Op::plus(Op::trg(97, 122)))
        .build()
        .unwrap();
    assert!(parse(&grammar, "S", "ab ab").success);
    assert!(!parse(&grammar, "S", "ab AB").success);
}

#[test]
fn look_behind_fails_short_of_input_start() {
    // the behind phrase is one character longer than the prefix before the
    // anchor; it must fail, not read off the front of the input
    let grammar = GrammarBuilder::new()
        .rule(
            "S",
            Op::cat(vec![Op::tbs("ab"), Op::bka(Op::tbs("xab")), Op::tls("c")]),
        )
        .rule(
            "T",
            Op::cat(vec![Op::tbs("ab"), Op::bka(Op::tbs("ab")), Op::tls("c")]),
        )
        .build()
        .unwrap();
    assert!(!parse(&grammar, "S", "abc").success);
    // same shape with the behind phrase exactly reaching the input start
    assert!(parse(&grammar, "T", "abc").success);
}

#[test]
fn look_behind_repetition() {
    // S = 3*3%d97-122 (?<= 3*3(a-z))
    let grammar = GrammarBuilder::new()
        .rule(
            "S",
            Op::cat(vec![
                Op::rep(3, 3, Op::trg(97, 122)),
                Op::bka(Op::rep(3, 3, Op::trg(97, 122))),
            ]),
        )
        .build()
        .unwrap();
    assert!(parse(&grammar, "S", "xyz").success);
}

#[test]
fn anchors_are_absolute() {
    // S = %^ "ab" %$
    let grammar = GrammarBuilder::new()
        .rule("S", Op::cat(vec![Op::Abg, Op::tls("ab"), Op::Aen]))
        .rule("E", Op::cat(vec![Op::tls("ab"), Op::Aen]))
        .build()
        .unwrap();
    assert!(parse(&grammar, "S", "ab").success);

    // ABG anchors to position 0 of the full input, not the window
    let chars = string_to_chars("xab");
    let mut parser = Parser::new(&grammar).unwrap();
    let result = parser.parse_substring("S", &chars, 1, 2, &mut ()).unwrap();
    assert!(!result.success);
    // AEN anchors to the end of the full input
    let result = parser.parse_substring("E", &chars, 1, 2, &mut ()).unwrap();
    assert!(result.success);
}

#[test]
fn bkr_unset_binding_fails() {
    // "word" is back referenced but never matched before the BKR
    let grammar = GrammarBuilder::new()
        .rule("S", Op::bkr("word", BkrCase::Sensitive, BkrMode::Universal))
        .rule("word", Op::tls("x"))
        .build()
        .unwrap();
    let result = parse(&grammar, "S", "x");
    assert!(!result.success);
    assert_eq!(result.state, State::NoMatch);
}

#[test]
fn bkr_case_modes() {
    let sensitive = GrammarBuilder::new()
        .rule(
            "S",
            Op::cat(vec![
                Op::rnm("word"),
                Op::tbs_codes(vec![32]),
                Op::bkr("word", BkrCase::Sensitive, BkrMode::Universal),
            ]),
        )
        .rule("word", Op::plus(Op::alt(vec![Op::trg(97, 122), Op::trg(65, 90)])))
        .build()
        .unwrap();
    assert!(parse(&sensitive, "S", "ab ab").success);
    assert!(!parse(&sensitive, "S", "ab AB").success);

    let insensitive = doubled_word_grammar().unwrap();
    assert!(parse(&insensitive, "doubled", "ab ab").success);
    // the insensitive grammar's word rule is lower case only; bind "ab",
    // then match "AB" against it case-blind
    let grammar = GrammarBuilder::new()
        .rule(
            "S",
            Op::cat(vec![
                Op::rnm("word"),
                Op::tbs_codes(vec![32]),
                Op::bkr("word", BkrCase::Insensitive, BkrMode::Universal),
            ]),
        )
        .rule("word", Op::plus(Op::alt(vec![Op::trg(97, 122), Op::trg(65, 90)])))
        .build()
        .unwrap();
    assert!(parse(&grammar, "S", "ab AB").success);
}

#[test]
fn bkr_universal_vs_parent_scope() {
    // the word phrase is bound inside rule A; a universal reference sees it
    // from S, a parent-mode reference does not
    fn grammar(mode: BkrMode) -> Grammar {
        GrammarBuilder::new()
            .rule(
                "S",
                Op::cat(vec![
                    Op::rnm("A"),
                    Op::tbs_codes(vec![32]),
                    Op::bkr("word", BkrCase::Sensitive, mode),
                ]),
            )
            .rule("A", Op::rnm("word"))
            .rule("word", Op::plus(Op::trg(97, 122)))
            .build()
            .unwrap()
    }
    assert!(parse(&grammar(BkrMode::Universal), "S", "ab ab").success);
    assert!(!parse(&grammar(BkrMode::Parent), "S", "ab ab").success);
}

#[test]
fn bkr_parent_scope_sees_sibling_match() {
    // both the binding and the reference live in the same rule body
    let grammar = GrammarBuilder::new()
        .rule(
            "S",
            Op::cat(vec![
                Op::rnm("word"),
                Op::tbs_codes(vec![32]),
                Op::bkr("word", BkrCase::Sensitive, BkrMode::Parent),
            ]),
        )
        .rule("word", Op::plus(Op::trg(97, 122)))
        .build()
        .unwrap();
    assert!(parse(&grammar, "S", "ab ab").success);
}

#[test]
fn failed_branch_rolls_back_bindings() {
    // S = (word "@" / "ab") \word
    // when the first alternative fails its binding of word must not leak
    let grammar = GrammarBuilder::new()
        .rule(
            "S",
            Op::cat(vec![
                Op::alt(vec![
                    Op::cat(vec![Op::rnm("word"), Op::tls("@")]),
                    Op::tls("ab"),
                ]),
                Op::bkr("word", BkrCase::Sensitive, BkrMode::Universal),
            ]),
        )
        .rule("word", Op::plus(Op::trg(97, 122)))
        .build()
        .unwrap();
    // first alternative succeeds: the binding is live
    assert!(parse(&grammar, "S", "ab@ab").success);
    // first alternative fails at "@": binding rolled back, BKR unset
    assert!(!parse(&grammar, "S", "abab").success);
}

#[test]
fn node_hits_limit_aborts() {
    let grammar = GrammarBuilder::new().rule("S", Op::tls("a")).build().unwrap();
    let mut parser = Parser::new(&grammar).unwrap();
    parser.set_max_node_hits(1).unwrap();
    let err = parser.parse("S", &string_to_chars("a"), &mut ()).unwrap_err();
    assert!(err.is_limit());
    match err {
        ParserError::Limit { what, limit } => {
            assert_eq!(what, "node hits");
            assert_eq!(limit, 1);
        }
        other => panic!("expected limit error, got {:?}", other),
    }
}

#[test]
fn tree_depth_limit_aborts() {
    let grammar = GrammarBuilder::new()
        .rule("S", Op::cat(vec![Op::rnm("A"), Op::tls("b")]))
        .rule("A", Op::tls("a"))
        .build()
        .unwrap();
    let mut parser = Parser::new(&grammar).unwrap();
    parser.set_max_tree_depth(2).unwrap();
    let err = parser.parse("S", &string_to_chars("ab"), &mut ()).unwrap_err();
    assert!(err.is_limit());

    parser.set_max_tree_depth(16).unwrap();
    let result = parser.parse("S", &string_to_chars("ab"), &mut ()).unwrap();
    assert!(result.success);
    assert!(result.max_tree_depth > 2);
}

#[test]
fn zero_limits_are_rejected() {
    let grammar = GrammarBuilder::new().rule("S", Op::tls("a")).build().unwrap();
    let mut parser: Parser<'_, ()> = Parser::new(&grammar).unwrap();
    assert!(parser.set_max_tree_depth(0).is_err());
    assert!(parser.set_max_node_hits(0).is_err());
}

#[test]
fn unknown_start_rule_is_a_config_error() {
    let grammar = GrammarBuilder::new().rule("S", Op::tls("a")).build().unwrap();
    let mut parser = Parser::new(&grammar).unwrap();
    let err = parser.parse("missing", &string_to_chars("a"), &mut ()).unwrap_err();
    assert!(err.is_config());
    let err = parser.parse(5usize, &string_to_chars("a"), &mut ()).unwrap_err();
    assert!(err.is_config());
}

#[test]
fn substring_window_bounds_are_validated() {
    let grammar = GrammarBuilder::new().rule("S", Op::tls("a")).build().unwrap();
    let mut parser = Parser::new(&grammar).unwrap();
    let chars = string_to_chars("abc");
    assert!(parser.parse_substring("S", &chars, 4, 0, &mut ()).is_err());
    assert!(parser.parse_substring("S", &chars, 1, 3, &mut ()).is_err());
}

#[test]
fn substring_parse_reports_the_window() {
    let grammar = GrammarBuilder::new()
        .rule("S", Op::plus(Op::trg(97, 122)))
        .build()
        .unwrap();
    let mut parser = Parser::new(&grammar).unwrap();
    let chars = string_to_chars("ab1cd");
    let result = parser.parse_substring("S", &chars, 3, 2, &mut ()).unwrap();
    assert!(result.success);
    assert_eq!(result.matched, 2);
    assert_eq!(result.input_length, 5);
    assert_eq!(result.sub_begin, 3);
    assert_eq!(result.sub_end, 5);
    assert_eq!(result.sub_length, 2);

    // terminals must not read beyond the window's end
    let result = parser.parse_substring("S", &chars, 0, 1, &mut ()).unwrap();
    assert!(result.success);
    assert_eq!(result.matched, 1);
}

/* UDT callbacks */

fn match_digits(
    sys: &mut SysData,
    env: &mut CallbackEnv<'_, '_, '_, ()>,
) -> Result<(), ParserError> {
    let begin = env.phrase_index();
    let mut index = begin;
    while index < env.chars_end() && (48..=57).contains(&env.chars()[index]) {
        index += 1;
    }
    if index > begin {
        sys.state = State::Match;
        sys.phrase_length = index - begin;
    } else {
        sys.state = State::NoMatch;
        sys.phrase_length = 0;
    }
    Ok(())
}

fn claim_empty(
    sys: &mut SysData,
    _env: &mut CallbackEnv<'_, '_, '_, ()>,
) -> Result<(), ParserError> {
    sys.state = State::Empty;
    sys.phrase_length = 0;
    Ok(())
}

fn udt_grammar() -> Grammar {
    GrammarBuilder::new()
        .rule("S", Op::cat(vec![Op::tls("n="), Op::udt("u_digits", false)]))
        .build()
        .unwrap()
}

#[test]
fn udt_matches_phrases() {
    let grammar = udt_grammar();
    let mut parser = Parser::new(&grammar).unwrap();
    parser.add_udt_callback("u_digits", match_digits).unwrap();
    let result = parser.parse("S", &string_to_chars("n=123"), &mut ()).unwrap();
    assert!(result.success);
    assert_eq!(result.matched, 5);
    let result = parser.parse("S", &string_to_chars("n=x"), &mut ()).unwrap();
    assert!(!result.success);
}

#[test]
fn udt_without_callback_is_a_config_error() {
    let grammar = udt_grammar();
    let mut parser = Parser::new(&grammar).unwrap();
    let err = parser.parse("S", &string_to_chars("n=1"), &mut ()).unwrap_err();
    assert!(err.is_config());
}

#[test]
fn non_empty_udt_may_not_return_empty() {
    let grammar = udt_grammar();
    let mut parser = Parser::new(&grammar).unwrap();
    parser.add_udt_callback("u_digits", claim_empty).unwrap();
    let err = parser.parse("S", &string_to_chars("n=1"), &mut ()).unwrap_err();
    assert!(matches!(err, ParserError::Callback { .. }));
}

/* rule callbacks */

fn veto_match(
    sys: &mut SysData,
    _env: &mut CallbackEnv<'_, '_, '_, ()>,
) -> Result<(), ParserError> {
    // second call only: turn the rule body's match into a failure
    if sys.state == State::Match {
        sys.state = State::NoMatch;
        sys.phrase_length = 0;
    }
    Ok(())
}

fn preempt_one_char(
    sys: &mut SysData,
    env: &mut CallbackEnv<'_, '_, '_, ()>,
) -> Result<(), ParserError> {
    // first call: claim one character without running the rule body
    if sys.state == State::Active && env.max_phrase_length() > 0 {
        sys.state = State::Match;
        sys.phrase_length = 1;
    } else if sys.state == State::Active {
        sys.state = State::NoMatch;
    }
    Ok(())
}

#[test]
fn rule_callback_can_override_the_body() {
    let grammar = GrammarBuilder::new()
        .rule("S", Op::rnm("A"))
        .rule("A", Op::tls("a"))
        .build()
        .unwrap();
    let mut parser = Parser::new(&grammar).unwrap();
    parser.add_rule_callback("A", veto_match).unwrap();
    let result = parser.parse("S", &string_to_chars("a"), &mut ()).unwrap();
    assert!(!result.success);
}

#[test]
fn rule_callback_can_preempt_the_body() {
    // the body would only accept "z"; the callback accepts any one character
    let grammar = GrammarBuilder::new()
        .rule("S", Op::rnm("A"))
        .rule("A", Op::tls("z"))
        .build()
        .unwrap();
    let mut parser = Parser::new(&grammar).unwrap();
    parser.add_rule_callback("A", preempt_one_char).unwrap();
    let result = parser.parse("S", &string_to_chars("q"), &mut ()).unwrap();
    assert!(result.success);
    assert_eq!(result.matched, 1);
}

#[test]
fn callback_registration_validates_names() {
    let grammar = udt_grammar();
    let mut parser = Parser::new(&grammar).unwrap();
    assert!(parser.add_rule_callback("nope", veto_match).is_err());
    assert!(parser.add_udt_callback("nope", match_digits).is_err());
    // a UDT name is not a rule name and vice versa
    assert!(parser.add_rule_callback("u_digits", veto_match).is_err());
    assert!(parser.add_udt_callback("S", match_digits).is_err());
}

#[test]
fn callback_data_is_threaded_through() {
    fn count_visits(
        sys: &mut SysData,
        env: &mut CallbackEnv<'_, '_, '_, usize>,
    ) -> Result<(), ParserError> {
        if sys.state == State::Active {
            *env.data() += 1;
        }
        Ok(())
    }
    let grammar = GrammarBuilder::new()
        .rule("S", Op::plus(Op::rnm("A")))
        .rule("A", Op::alt(vec![Op::tls("a"), Op::tls("b")]))
        .build()
        .unwrap();
    let mut parser: Parser<'_, usize> = Parser::new(&grammar).unwrap();
    parser.add_rule_callback("A", count_visits).unwrap();
    let mut visits = 0usize;
    let result = parser.parse("S", &string_to_chars("aba"), &mut visits).unwrap();
    assert!(result.success);
    // one down-phase call per visit; the repetition stops at end of input
    // without a fourth visit
    assert_eq!(visits, 3);
}

/* collectors */

#[test]
fn ast_records_the_matched_tree() {
    let grammar = float_grammar().unwrap();
    let mut parser = Parser::new(&grammar).unwrap();
    parser.enable_ast();
    let result = parser.parse("float", &string_to_chars("12.3e+2"), &mut ()).unwrap();
    assert!(result.success);
    let ast = parser.ast().unwrap();
    let tree = ast.tree();
    assert_eq!(tree.len(), 1);
    let root = &tree[0];
    assert_eq!(root.name, "float");
    assert_eq!(root.length, 7);
    let integer = root.find("integer").unwrap();
    assert_eq!((integer.start, integer.length), (0, 2));
    let exp = root.find("exp").unwrap();
    assert_eq!((exp.start, exp.length), (6, 1));
    assert!(root.contains("fraction"));
}

#[test]
fn ast_select_limits_node_emission() {
    let grammar = float_grammar().unwrap();
    let mut parser = Parser::new(&grammar).unwrap();
    parser.enable_ast();
    parser.ast_mut().unwrap().select(&["float", "integer"]);
    let result = parser.parse("float", &string_to_chars("42"), &mut ()).unwrap();
    assert!(result.success);
    let tree = parser.ast().unwrap().tree();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].name, "float");
    assert!(tree[0].contains("integer"));
    assert!(!tree[0].contains("decimal"));
}

#[test]
fn ast_is_empty_inside_look_around() {
    // the AND branch matches rule A but must emit no AST nodes for it
    let grammar = GrammarBuilder::new()
        .rule("S", Op::cat(vec![Op::and(Op::rnm("A")), Op::tls("ab")]))
        .rule("A", Op::tls("ab"))
        .build()
        .unwrap();
    let mut parser = Parser::new(&grammar).unwrap();
    parser.enable_ast();
    let result = parser.parse("S", &string_to_chars("ab"), &mut ()).unwrap();
    assert!(result.success);
    let tree = parser.ast().unwrap().tree();
    assert_eq!(tree.len(), 1);
    assert_eq!(tree[0].name, "S");
    assert!(!tree[0].contains("A"));
}

#[test]
fn stats_count_node_visits() {
    let grammar = float_grammar().unwrap();
    let mut parser = Parser::new(&grammar).unwrap();
    parser.enable_stats();
    let result = parser.parse("float", &string_to_chars("1.5"), &mut ()).unwrap();
    assert!(result.success);
    let stats = parser.stats().unwrap();
    assert_eq!(stats.totals().total, result.node_hits);
    assert!(stats.op_tally(OpKind::Rnm).total > 0);
    let float_tally = &stats.rules_by_index()[0];
    assert_eq!(float_tally.name, "float");
    assert_eq!(float_tally.tally.matched, 1);
}

#[test]
fn trace_records_the_walk() {
    let grammar = GrammarBuilder::new()
        .rule("S", Op::cat(vec![Op::tls("a"), Op::tls("b")]))
        .build()
        .unwrap();
    let mut parser = Parser::new(&grammar).unwrap();
    parser.enable_trace(TraceConfig::default());
    let result = parser.parse("S", &string_to_chars("ab"), &mut ()).unwrap();
    assert!(result.success);
    let trace = parser.trace().unwrap();
    let records = trace.records_in_order();
    // symmetric down/up records for every node visit
    assert_eq!(records.len(), 2 * result.node_hits);
    let first = &records[0];
    assert_eq!(first.dir, TraceDir::Down);
    assert_eq!(first.kind, OpKind::Rnm);
    assert_eq!(first.which, Some(0));
    let last = &records[records.len() - 1];
    assert_eq!(last.dir, TraceDir::Up);
    assert_eq!(last.kind, OpKind::Rnm);
    assert_eq!(last.state, State::Match);
    assert_eq!(last.phrase_length, 2);
}

#[test]
fn trace_filters_by_rule_name() {
    let grammar = float_grammar().unwrap();
    let mut parser = Parser::new(&grammar).unwrap();
    parser.enable_trace(TraceConfig {
        ops: vec![OpKind::Rnm],
        rules: vec!["integer".to_string()],
        ..TraceConfig::default()
    });
    let result = parser.parse("float", &string_to_chars("12"), &mut ()).unwrap();
    assert!(result.success);
    let records = parser.trace().unwrap().records_in_order();
    assert!(!records.is_empty());
    assert!(records.iter().all(|r| r.kind == OpKind::Rnm));
}

/// A JSON subset (no whitespace, no string escapes), deep enough to exercise
/// nested recursion through several rules.
fn json_grammar() -> Grammar {
    GrammarBuilder::new()
        .rule(
            "value",
            Op::alt(vec![
                Op::rnm("object"),
                Op::rnm("array"),
                Op::rnm("string"),
                Op::rnm("number"),
                Op::tbs("true"),
                Op::tbs("false"),
                Op::tbs("null"),
            ]),
        )
        .rule(
            "object",
            Op::cat(vec![
                Op::tbs("{"),
                Op::opt(Op::cat(vec![
                    Op::rnm("member"),
                    Op::star(Op::cat(vec![Op::tbs(","), Op::rnm("member")])),
                ])),
                Op::tbs("}"),
            ]),
        )
        .rule(
            "member",
            Op::cat(vec![Op::rnm("string"), Op::tbs(":"), Op::rnm("value")]),
        )
        .rule(
            "array",
            Op::cat(vec![
                Op::tbs("["),
                Op::opt(Op::cat(vec![
                    Op::rnm("value"),
                    Op::star(Op::cat(vec![Op::tbs(","), Op::rnm("value")])),
                ])),
                Op::tbs("]"),
            ]),
        )
        .rule(
            "string",
            Op::cat(vec![
                Op::tbs_codes(vec![34]),
                Op::star(Op::alt(vec![
                    Op::trg(32, 33),
                    Op::trg(35, 91),
                    Op::trg(93, 126),
                ])),
                Op::tbs_codes(vec![34]),
            ]),
        )
        .rule(
            "number",
            Op::cat(vec![
                Op::opt(Op::tbs("-")),
                Op::plus(Op::trg(48, 57)),
                Op::opt(Op::cat(vec![Op::tbs("."), Op::plus(Op::trg(48, 57))])),
            ]),
        )
        .build()
        .unwrap()
}

#[test]
fn json_subset_agrees_with_a_reference_parser() {
    let grammar = json_grammar();
    assert!(crate::rule_attributes(&grammar).errors.is_empty());
    let mut parser = Parser::new(&grammar).unwrap();
    let cases = [
        r#"{"a":1,"b":[true,null,"xy"]}"#,
        "[]",
        r#""hi""#,
        "-3.5",
        r#"{"a":}"#,
        "[1,2,]",
        "True",
        "{",
    ];
    for text in cases {
        let result = parser.parse("value", &string_to_chars(text), &mut ()).unwrap();
        let reference = serde_json::from_str::<serde_json::Value>(text).is_ok();
        assert_eq!(result.success, reference, "disagreement on {:?}", text);
    }
}

#[test]
fn deep_rep_counts_depth_not_hits() {
    // a long input through a REP keeps the tree shallow
    let grammar = GrammarBuilder::new()
        .rule("S", Op::star(Op::trg(97, 122)))
        .build()
        .unwrap();
    let text: String = std::iter::repeat('a').take(200).collect();
    let result = parse(&grammar, "S", &text);
    assert!(result.success);
    assert!(result.max_tree_depth < 10);
    assert!(result.node_hits > 200);
}
