//! Rule dependency and recursion-type discovery.
//!
//! For each rule, which rules and UDTs it refers to, directly or through any
//! chain of references, and which rules refer back to it. From the closure the
//! rules are classified as non-recursive, recursive, or members of mutually
//! recursive groups. Diagnostic output; the attribute analysis does not
//! depend on it.

use crate::{Grammar, Opcode, RecursiveType, RuleDeps};

fn scan(grammar: &Grammar, deps: &mut [RuleDeps], index: usize, scanned: &mut [bool]) {
    scanned[index] = true;
    let rule_count = grammar.rule_count();
    for op in grammar.rules()[index].opcodes.iter() {
        match op {
            Opcode::Rnm { index: child } => {
                deps[index].refers_to[*child] = true;
                if !scanned[*child] {
                    scan(grammar, deps, *child, scanned);
                }
                /* fold in everything the child refers to */
                let child_refs = deps[*child].refers_to.clone();
                for (j, referred) in child_refs.into_iter().enumerate() {
                    if referred {
                        deps[index].refers_to[j] = true;
                    }
                }
            }
            Opcode::Udt { index: udt, .. } => {
                deps[index].refers_to_udt[*udt] = true;
            }
            Opcode::Bkr { index: target, .. } => {
                if *target < rule_count {
                    deps[index].refers_to[*target] = true;
                    if !scanned[*target] {
                        scan(grammar, deps, *target, scanned);
                    }
                } else {
                    deps[index].refers_to_udt[*target - rule_count] = true;
                }
            }
            _ => {}
        }
    }
}

/// Compute the transitive dependency sets and recursion classification of
/// every rule.
pub fn rule_dependencies(grammar: &Grammar) -> Vec<RuleDeps> {
    let rule_count = grammar.rule_count();
    let udt_count = grammar.udt_count();
    let mut deps: Vec<RuleDeps> = (0..rule_count)
        .map(|_| RuleDeps {
            refers_to: vec![false; rule_count],
            refers_to_udt: vec![false; udt_count],
            referenced_by: vec![false; rule_count],
            recursive_type: RecursiveType::NonRecursive,
        })
        .collect();
    for index in 0..rule_count {
        let mut scanned = vec![false; rule_count];
        scan(grammar, &mut deps, index, &mut scanned);
    }
    /* invert refers-to into referenced-by */
    for i in 0..rule_count {
        for j in 0..rule_count {
            if i != j && deps[j].refers_to[i] {
                deps[i].referenced_by[j] = true;
            }
        }
    }
    for (index, dep) in deps.iter_mut().enumerate() {
        if dep.refers_to[index] {
            dep.recursive_type = RecursiveType::Recursive;
        }
    }
    /* group the mutually recursive rules: i and j are in the same group
    when each refers to the other */
    let mut group_count = 0;
    for i in 0..rule_count {
        if deps[i].recursive_type != RecursiveType::Recursive {
            continue;
        }
        let mut new_group = true;
        for j in 0..rule_count {
            if i == j || deps[j].recursive_type != RecursiveType::Recursive {
                continue;
            }
            if deps[i].refers_to[j] && deps[j].refers_to[i] {
                if new_group {
                    deps[i].recursive_type = RecursiveType::MutuallyRecursive(group_count);
                    group_count += 1;
                    new_group = false;
                }
                deps[j].recursive_type = RecursiveType::MutuallyRecursive(group_count - 1);
            }
        }
    }
    deps
}
