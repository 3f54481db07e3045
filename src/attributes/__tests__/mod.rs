use crate::{rule_attributes, rule_dependencies, GrammarBuilder, Op, RecursiveType};

#[test]
fn left_recursion_is_an_error() {
    // S = S "a" / "a"
    let grammar = GrammarBuilder::new()
        .rule(
            "S",
            Op::alt(vec![
                Op::cat(vec![Op::rnm("S"), Op::tls("a")]),
                Op::tls("a"),
            ]),
        )
        .build()
        .unwrap();
    let result = rule_attributes(&grammar);
    assert!(result.attrs[0].left);
    assert!(!result.attrs[0].cyclic);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].name, "S");
}

#[test]
fn right_recursion_is_safe() {
    // S = "a" S / "a"
    let grammar = GrammarBuilder::new()
        .rule(
            "S",
            Op::alt(vec![
                Op::cat(vec![Op::tls("a"), Op::rnm("S")]),
                Op::tls("a"),
            ]),
        )
        .build()
        .unwrap();
    let result = rule_attributes(&grammar);
    let attrs = &result.attrs[0];
    assert!(attrs.right);
    assert!(!attrs.left);
    assert!(attrs.finite);
    assert!(result.errors.is_empty());
}

#[test]
fn cyclic_rule_is_an_error() {
    // S = S
    let grammar = GrammarBuilder::new().rule("S", Op::rnm("S")).build().unwrap();
    let result = rule_attributes(&grammar);
    assert!(result.attrs[0].cyclic);
    assert!(!result.attrs[0].finite);
    assert_eq!(result.errors.len(), 1);
}

#[test]
fn unterminated_recursion_is_not_finite() {
    // X = X "a" - no alternative ever terminates the descent
    let grammar = GrammarBuilder::new()
        .rule("X", Op::cat(vec![Op::rnm("X"), Op::tls("a")]))
        .build()
        .unwrap();
    let result = rule_attributes(&grammar);
    let attrs = &result.attrs[0];
    assert!(attrs.left);
    assert!(!attrs.finite);
    assert_eq!(result.errors.len(), 1);
}

#[test]
fn nested_recursion_is_safe() {
    // P = "(" P ")" / "x"
    let grammar = GrammarBuilder::new()
        .rule(
            "P",
            Op::alt(vec![
                Op::cat(vec![Op::tls("("), Op::rnm("P"), Op::tls(")")]),
                Op::tls("x"),
            ]),
        )
        .build()
        .unwrap();
    let result = rule_attributes(&grammar);
    let attrs = &result.attrs[0];
    assert!(attrs.nested);
    assert!(!attrs.left);
    assert!(!attrs.right);
    assert!(attrs.finite);
    assert!(result.errors.is_empty());
}

#[test]
fn empty_only_rule_is_safe() {
    // E = ""   S = E "a"
    let grammar = GrammarBuilder::new()
        .rule("S", Op::cat(vec![Op::rnm("E"), Op::tls("a")]))
        .rule("E", Op::tls(""))
        .build()
        .unwrap();
    let result = rule_attributes(&grammar);
    assert!(result.attrs[1].empty);
    assert!(result.attrs[1].finite);
    assert!(!result.attrs[0].empty);
    assert!(result.errors.is_empty());
}

#[test]
fn empty_prefix_exposes_left_recursion() {
    // S = E S "a" / "a"   E = "" - the leading child can be empty, so the
    // reference to S is still left-most
    let grammar = GrammarBuilder::new()
        .rule(
            "S",
            Op::alt(vec![
                Op::cat(vec![Op::rnm("E"), Op::rnm("S"), Op::tls("a")]),
                Op::tls("a"),
            ]),
        )
        .rule("E", Op::tls(""))
        .build()
        .unwrap();
    let result = rule_attributes(&grammar);
    assert!(result.attrs[0].left);
    assert_eq!(result.errors.len(), 1);
}

#[test]
fn zero_minimum_repetition_is_empty_and_finite() {
    // S = *"a"
    let grammar = GrammarBuilder::new()
        .rule("S", Op::star(Op::tls("a")))
        .build()
        .unwrap();
    let result = rule_attributes(&grammar);
    assert!(result.attrs[0].empty);
    assert!(result.attrs[0].finite);
    assert!(result.errors.is_empty());
}

#[test]
fn star_of_a_self_reference_is_still_unsafe() {
    // S = *S - zero minimum makes it empty and finite, but the child
    // reference is still evaluated and flags the recursion
    let grammar = GrammarBuilder::new()
        .rule("S", Op::star(Op::rnm("S")))
        .build()
        .unwrap();
    let result = rule_attributes(&grammar);
    assert!(result.attrs[0].empty);
    assert!(result.attrs[0].left);
    assert!(result.attrs[0].cyclic);
    assert_eq!(result.errors.len(), 1);
}

#[test]
fn look_around_contributes_no_phrase() {
    // S = &S "a" - the predicate recursion is still left recursion
    let grammar = GrammarBuilder::new()
        .rule("S", Op::cat(vec![Op::and(Op::rnm("S")), Op::tls("a")]))
        .build()
        .unwrap();
    let result = rule_attributes(&grammar);
    assert!(result.attrs[0].left);
    assert_eq!(result.errors.len(), 1);
}

#[test]
fn interior_rules_are_approximated_conservatively() {
    // A = B   B = B "x" / "y"
    // B is genuinely left recursive; A merely refers to it. The per-start
    // traversal treats an open non-start rule as a finite leaf, so A itself
    // comes out clean while B carries the error.
    let grammar = GrammarBuilder::new()
        .rule("A", Op::rnm("B"))
        .rule(
            "B",
            Op::alt(vec![
                Op::cat(vec![Op::rnm("B"), Op::tls("x")]),
                Op::tls("y"),
            ]),
        )
        .build()
        .unwrap();
    let result = rule_attributes(&grammar);
    assert!(result.attrs[1].left);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].index, 1);
}

#[test]
fn mutual_recursion_attrs_and_groups_agree() {
    // A = "x" B / "x"   B = "y" A / "y" - right recursive through each other
    let grammar = GrammarBuilder::new()
        .rule(
            "A",
            Op::alt(vec![Op::cat(vec![Op::tls("x"), Op::rnm("B")]), Op::tls("x")]),
        )
        .rule(
            "B",
            Op::alt(vec![Op::cat(vec![Op::tls("y"), Op::rnm("A")]), Op::tls("y")]),
        )
        .build()
        .unwrap();
    let result = rule_attributes(&grammar);
    assert!(result.errors.is_empty());
    assert!(result.attrs[0].right);
    assert!(result.attrs[1].right);
    let deps = rule_dependencies(&grammar);
    assert_eq!(deps[0].recursive_type, RecursiveType::MutuallyRecursive(0));
    assert_eq!(deps[1].recursive_type, RecursiveType::MutuallyRecursive(0));
}

#[test]
fn bkr_reference_is_not_recursion() {
    // S = word \word - the back reference borrows word's emptiness but is a
    // terminal match, not a descent into the rule
    let grammar = GrammarBuilder::new()
        .rule(
            "S",
            Op::cat(vec![
                Op::rnm("word"),
                Op::bkr("word", crate::BkrCase::Sensitive, crate::BkrMode::Universal),
            ]),
        )
        .rule("word", Op::plus(Op::trg(97, 122)))
        .build()
        .unwrap();
    let result = rule_attributes(&grammar);
    assert!(result.errors.is_empty());
    assert!(!result.attrs[0].left);
    assert!(!result.attrs[0].right);
}

#[test]
fn udt_attributes_come_from_the_empty_flag() {
    let grammar = GrammarBuilder::new()
        .rule("S", Op::cat(vec![Op::udt("e_opt", true), Op::udt("u_req", false)]))
        .build()
        .unwrap();
    let result = rule_attributes(&grammar);
    assert!(result.errors.is_empty());
    assert!(!result.attrs[0].empty);
    assert!(result.attrs[0].finite);
}
