//! Static rule analysis.
//!
//! [rule_attributes] decides, for every rule, whether it is left/nested/right
//! recursive, cyclic, can match the empty phrase, and whether its derivation
//! is finite. A rule that is left recursive, cyclic or not finite would send
//! the interpreter into unbounded recursion, so such rules are reported as
//! errors and the grammar must not be executed.
//!
//! The traversal runs once per rule with that rule as the start. Rules are
//! three-state: unvisited, open (on the current descent path) and complete.
//! Re-reaching the open start rule is the recursion signal and yields a
//! left/right/cyclic leaf; re-reaching any other open rule is treated as a
//! finite terminal leaf. The latter is a conservative approximation: it can
//! flag attributes on interior rules that a deeper analysis would clear, but
//! it never misses a genuinely unsafe start rule.

mod dependencies;

pub use dependencies::rule_dependencies;

use crate::{AttrError, Attributes, Grammar, Opcode, RuleAttrs};

fn is_empty_only(attr: &RuleAttrs) -> bool {
    if attr.left || attr.nested || attr.right || attr.cyclic {
        return false;
    }
    attr.empty
}

fn is_recursive(attr: &RuleAttrs) -> bool {
    attr.left || attr.nested || attr.right || attr.cyclic
}

fn is_cat_nested(attrs: &[RuleAttrs]) -> bool {
    let count = attrs.len();
    /* 1. any nested child nests the CAT */
    if attrs.iter().any(|a| a.nested) {
        return true;
    }
    /* 2. a right recursive child followed by a non-empty child */
    for i in 0..count {
        if attrs[i].right && !attrs[i].leaf {
            for j in i + 1..count {
                if !is_empty_only(&attrs[j]) {
                    return true;
                }
            }
        }
    }
    /* 3. a left recursive child preceded by a non-empty child */
    for i in (0..count).rev() {
        if attrs[i].left && !attrs[i].leaf {
            for j in (0..i).rev() {
                if !is_empty_only(&attrs[j]) {
                    return true;
                }
            }
        }
    }
    /* 4. a recursive child between two non-recursive, non-empty children */
    for i in 0..count {
        if !attrs[i].empty && !is_recursive(&attrs[i]) {
            for j in i + 1..count {
                if is_recursive(&attrs[j]) {
                    for k in j + 1..count {
                        if !attrs[k].empty && !is_recursive(&attrs[k]) {
                            return true;
                        }
                    }
                }
            }
        }
    }
    false
}

fn is_cat_cyclic(attrs: &[RuleAttrs]) -> bool {
    attrs.iter().all(|a| a.cyclic)
}

fn is_cat_left(attrs: &[RuleAttrs]) -> bool {
    /* left iff the left-most non-empty child is left */
    for attr in attrs {
        if attr.left {
            return true;
        }
        if !attr.empty {
            return false;
        }
    }
    false
}

fn is_cat_right(attrs: &[RuleAttrs]) -> bool {
    /* right iff the right-most non-empty child is right */
    for attr in attrs.iter().rev() {
        if attr.right {
            return true;
        }
        if !attr.empty {
            return false;
        }
    }
    false
}

fn is_cat_empty(attrs: &[RuleAttrs]) -> bool {
    attrs.iter().all(|a| a.empty)
}

fn is_cat_finite(attrs: &[RuleAttrs]) -> bool {
    attrs.iter().all(|a| a.finite)
}

#[derive(Clone, Copy, Default)]
struct WorkAttrs {
    attrs: RuleAttrs,
    is_open: bool,
    is_complete: bool,
}

fn cat(
    grammar: &Grammar,
    start_rule: usize,
    working: &mut [WorkAttrs],
    ops: &[Opcode],
    children: &[usize],
    i_attr: &mut RuleAttrs,
) {
    let mut child_attrs = vec![RuleAttrs::default(); children.len()];
    for (slot, &child) in child_attrs.iter_mut().zip(children) {
        op_eval(grammar, start_rule, working, ops, child, slot);
    }
    i_attr.left = is_cat_left(&child_attrs);
    i_attr.right = is_cat_right(&child_attrs);
    i_attr.nested = is_cat_nested(&child_attrs);
    i_attr.empty = is_cat_empty(&child_attrs);
    i_attr.finite = is_cat_finite(&child_attrs);
    i_attr.cyclic = is_cat_cyclic(&child_attrs);
}

fn alt(
    grammar: &Grammar,
    start_rule: usize,
    working: &mut [WorkAttrs],
    ops: &[Opcode],
    children: &[usize],
    i_attr: &mut RuleAttrs,
) {
    /* an ALT takes any attribute any of its children has */
    let mut child_attr = RuleAttrs::default();
    for &child in children {
        op_eval(grammar, start_rule, working, ops, child, &mut child_attr);
        i_attr.left |= child_attr.left;
        i_attr.nested |= child_attr.nested;
        i_attr.right |= child_attr.right;
        i_attr.empty |= child_attr.empty;
        i_attr.finite |= child_attr.finite;
        i_attr.cyclic |= child_attr.cyclic;
    }
}

fn bkr(
    grammar: &Grammar,
    start_rule: usize,
    working: &mut [WorkAttrs],
    index: usize,
    i_attr: &mut RuleAttrs,
) {
    let rule_count = grammar.rule_count();
    if index >= rule_count {
        i_attr.empty = grammar.udts()[index - rule_count].empty;
        i_attr.finite = true;
    } else {
        /* empty and finite come from the referenced rule, but the matched
        phrase is a terminal, not a recursion into the rule */
        rule_attrs_eval(grammar, start_rule, working, index, i_attr);
        i_attr.left = false;
        i_attr.nested = false;
        i_attr.right = false;
        i_attr.cyclic = false;
    }
}

fn op_eval(
    grammar: &Grammar,
    start_rule: usize,
    working: &mut [WorkAttrs],
    ops: &[Opcode],
    op_index: usize,
    i_attr: &mut RuleAttrs,
) {
    *i_attr = RuleAttrs::default();
    match &ops[op_index] {
        Opcode::Alt { children } => alt(grammar, start_rule, working, ops, children, i_attr),
        Opcode::Cat { children } => cat(grammar, start_rule, working, ops, children, i_attr),
        Opcode::Rep { min, .. } => {
            op_eval(grammar, start_rule, working, ops, op_index + 1, i_attr);
            if *min == 0 {
                /* zero minimum: can always match empty, hence always finite */
                i_attr.empty = true;
                i_attr.finite = true;
            }
        }
        Opcode::Rnm { index } => rule_attrs_eval(grammar, start_rule, working, *index, i_attr),
        Opcode::Bkr { index, .. } => bkr(grammar, start_rule, working, *index, i_attr),
        Opcode::And | Opcode::Not | Opcode::Bka | Opcode::Bkn => {
            op_eval(grammar, start_rule, working, ops, op_index + 1, i_attr);
            i_attr.empty = true;
        }
        Opcode::Tls { string } => {
            i_attr.empty = string.is_empty();
            i_attr.finite = true;
        }
        Opcode::Tbs { .. } | Opcode::Trg { .. } => {
            i_attr.empty = false;
            i_attr.finite = true;
        }
        Opcode::Udt { empty, .. } => {
            i_attr.empty = *empty;
            i_attr.finite = true;
        }
        Opcode::Abg | Opcode::Aen => {
            i_attr.empty = true;
            i_attr.finite = true;
        }
    }
}

/* a rule reference on the descent: completed, first visit, or a revisit */
fn rule_attrs_eval(
    grammar: &Grammar,
    start_rule: usize,
    working: &mut [WorkAttrs],
    rule_index: usize,
    i_attr: &mut RuleAttrs,
) {
    if working[rule_index].is_complete {
        *i_attr = working[rule_index].attrs;
    } else if !working[rule_index].is_open {
        working[rule_index].is_open = true;
        let ops = &grammar.rules()[rule_index].opcodes;
        op_eval(grammar, start_rule, working, ops, 0, i_attr);
        let work = &mut working[rule_index];
        work.attrs = *i_attr;
        work.attrs.leaf = false;
        work.is_open = false;
        work.is_complete = true;
    } else if rule_index == start_rule {
        /* the start rule on its own descent path: recursion found */
        i_attr.left = true;
        i_attr.right = true;
        i_attr.cyclic = true;
        i_attr.leaf = true;
    } else {
        /* any other open rule is treated as a finite terminal leaf */
        i_attr.finite = true;
    }
}

/// Compute the static attributes of every rule and collect the unsafe ones.
///
/// A rule is unsafe when it is left recursive, cyclic or not finite. The
/// result is reported, never thrown; callers decide what to do with a grammar
/// that has errors.
pub fn rule_attributes(grammar: &Grammar) -> Attributes {
    let rule_count = grammar.rule_count();
    let mut attrs = vec![RuleAttrs::default(); rule_count];
    for start_rule in 0..rule_count {
        /* a fresh working set per start rule */
        let mut working = vec![WorkAttrs::default(); rule_count];
        let mut i_attr = RuleAttrs::default();
        rule_attrs_eval(grammar, start_rule, &mut working, start_rule, &mut i_attr);
        attrs[start_rule] = working[start_rule].attrs;
    }
    let errors = attrs
        .iter()
        .enumerate()
        .filter(|(_, attr)| attr.left || !attr.finite || attr.cyclic)
        .map(|(index, attr)| AttrError {
            index,
            name: grammar.rules()[index].name.clone(),
            attrs: *attr,
        })
        .collect();
    Attributes { attrs, errors }
}

#[cfg(test)]
mod __tests__;
