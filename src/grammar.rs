use crate::{BkrCase, BkrMode, ConfigError, Grammar, GrammarBuilder, Op, OpKind, Opcode, Rule, Udt};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

impl Opcode {
    pub fn kind(&self) -> OpKind {
        match self {
            Opcode::Alt { .. } => OpKind::Alt,
            Opcode::Cat { .. } => OpKind::Cat,
            Opcode::Rep { .. } => OpKind::Rep,
            Opcode::Rnm { .. } => OpKind::Rnm,
            Opcode::Udt { .. } => OpKind::Udt,
            Opcode::And => OpKind::And,
            Opcode::Not => OpKind::Not,
            Opcode::Trg { .. } => OpKind::Trg,
            Opcode::Tbs { .. } => OpKind::Tbs,
            Opcode::Tls { .. } => OpKind::Tls,
            Opcode::Bkr { .. } => OpKind::Bkr,
            Opcode::Bka => OpKind::Bka,
            Opcode::Bkn => OpKind::Bkn,
            Opcode::Abg => OpKind::Abg,
            Opcode::Aen => OpKind::Aen,
        }
    }
}

impl OpKind {
    pub const ALL: [OpKind; 15] = [
        OpKind::Alt,
        OpKind::Cat,
        OpKind::Rep,
        OpKind::Rnm,
        OpKind::Udt,
        OpKind::And,
        OpKind::Not,
        OpKind::Trg,
        OpKind::Tbs,
        OpKind::Tls,
        OpKind::Bkr,
        OpKind::Bka,
        OpKind::Bkn,
        OpKind::Abg,
        OpKind::Aen,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Alt => "ALT",
            OpKind::Cat => "CAT",
            OpKind::Rep => "REP",
            OpKind::Rnm => "RNM",
            OpKind::Udt => "UDT",
            OpKind::And => "AND",
            OpKind::Not => "NOT",
            OpKind::Trg => "TRG",
            OpKind::Tbs => "TBS",
            OpKind::Tls => "TLS",
            OpKind::Bkr => "BKR",
            OpKind::Bka => "BKA",
            OpKind::Bkn => "BKN",
            OpKind::Abg => "ABG",
            OpKind::Aen => "AEN",
        }
    }
}

impl Display for OpKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Op {
    pub fn alt(children: Vec<Op>) -> Op {
        Op::Alt(children)
    }
    pub fn cat(children: Vec<Op>) -> Op {
        Op::Cat(children)
    }
    pub fn rep(min: usize, max: usize, child: Op) -> Op {
        Op::Rep(min, max, Box::new(child))
    }
    /// `*child` - zero or more repetitions.
    pub fn star(child: Op) -> Op {
        Op::Rep(0, crate::INF, Box::new(child))
    }
    /// `1*child` - one or more repetitions.
    pub fn plus(child: Op) -> Op {
        Op::Rep(1, crate::INF, Box::new(child))
    }
    /// `[child]` - zero or one occurrence.
    pub fn opt(child: Op) -> Op {
        Op::Rep(0, 1, Box::new(child))
    }
    pub fn rnm(name: impl Into<String>) -> Op {
        Op::Rnm(name.into())
    }
    pub fn udt(name: impl Into<String>, empty: bool) -> Op {
        Op::Udt(name.into(), empty)
    }
    pub fn and(child: Op) -> Op {
        Op::And(Box::new(child))
    }
    pub fn not(child: Op) -> Op {
        Op::Not(Box::new(child))
    }
    pub fn bka(child: Op) -> Op {
        Op::Bka(Box::new(child))
    }
    pub fn bkn(child: Op) -> Op {
        Op::Bkn(Box::new(child))
    }
    pub fn trg(min: u32, max: u32) -> Op {
        Op::Trg(min, max)
    }
    /// Case-sensitive terminal string (`%s"..."`).
    pub fn tbs(s: &str) -> Op {
        Op::Tbs(s.chars().map(|c| c as u32).collect())
    }
    pub fn tbs_codes(codes: Vec<u32>) -> Op {
        Op::Tbs(codes)
    }
    /// Case-insensitive terminal literal string (`"..."`/`%i"..."`).
    pub fn tls(s: &str) -> Op {
        Op::Tls(s.chars().map(|c| c as u32).collect())
    }
    pub fn bkr(name: impl Into<String>, case: BkrCase, mode: BkrMode) -> Op {
        Op::Bkr(name.into(), case, mode)
    }
}

/* name resolution context for flattening a rule's op tree */
struct BuildCtx<'b> {
    rule_lookup: &'b HashMap<String, usize>,
    udt_lookup: &'b HashMap<String, usize>,
    rule_count: usize,
    udts: &'b [(String, bool)],
}

impl GrammarBuilder {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Add a named rule. Rule indices are assigned in definition order.
    pub fn rule(mut self, name: impl Into<String>, op: Op) -> Self {
        self.rules.push((name.into(), op));
        self
    }

    /// Resolve names, reduce degenerate nodes, flatten the op trees and
    /// validate the result into an immutable [Grammar].
    pub fn build(self) -> Result<Grammar, ConfigError> {
        if self.rules.is_empty() {
            return Err(ConfigError::new("GrammarBuilder", "no rules defined"));
        }
        /* rule name table */
        let mut rule_lookup: HashMap<String, usize> = HashMap::new();
        for (index, (name, _)) in self.rules.iter().enumerate() {
            if rule_lookup.insert(name.to_lowercase(), index).is_some() {
                return Err(ConfigError::new(
                    "GrammarBuilder",
                    format!("rule '{}' defined more than once", name),
                ));
            }
        }
        /* collect the UDTs declared by use inside the op trees */
        let mut udts: Vec<(String, bool)> = Vec::new();
        let mut udt_lookup: HashMap<String, usize> = HashMap::new();
        for (_, op) in self.rules.iter() {
            collect_udts(op, &rule_lookup, &mut udts, &mut udt_lookup)?;
        }
        /* flag the back referenced rules and UDTs */
        let mut rule_bkr = vec![false; self.rules.len()];
        let mut udt_bkr = vec![false; udts.len()];
        for (_, op) in self.rules.iter() {
            collect_bkr(op, &rule_lookup, &udt_lookup, &mut rule_bkr, &mut udt_bkr)?;
        }

        let ctx = BuildCtx {
            rule_lookup: &rule_lookup,
            udt_lookup: &udt_lookup,
            rule_count: self.rules.len(),
            udts: &udts,
        };
        let mut rules = Vec::with_capacity(self.rules.len());
        for (index, (name, op)) in self.rules.iter().enumerate() {
            let mut opcodes = Vec::new();
            flatten_op(op, &mut opcodes, &ctx)
                .map_err(|err| ConfigError::new(name.clone(), err.message().to_string()))?;
            rules.push(Rule {
                name: name.clone(),
                lower: name.to_lowercase(),
                index,
                is_bkr: rule_bkr[index],
                opcodes,
            });
        }
        let udts = udts
            .into_iter()
            .enumerate()
            .map(|(index, (name, empty))| Udt {
                lower: name.to_lowercase(),
                name,
                index,
                empty,
                is_bkr: udt_bkr[index],
            })
            .collect();
        Grammar::new(rules, udts)
    }
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_udts(
    op: &Op,
    rule_lookup: &HashMap<String, usize>,
    udts: &mut Vec<(String, bool)>,
    udt_lookup: &mut HashMap<String, usize>,
) -> Result<(), ConfigError> {
    match op {
        Op::Udt(name, empty) => {
            let lower = name.to_lowercase();
            if rule_lookup.contains_key(&lower) {
                return Err(ConfigError::new(
                    "GrammarBuilder",
                    format!("UDT '{}' collides with a rule name", name),
                ));
            }
            match udt_lookup.get(&lower) {
                Some(&index) => {
                    if udts[index].1 != *empty {
                        return Err(ConfigError::new(
                            "GrammarBuilder",
                            format!("UDT '{}' declared with conflicting empty flags", name),
                        ));
                    }
                }
                None => {
                    udt_lookup.insert(lower, udts.len());
                    udts.push((name.clone(), *empty));
                }
            }
            Ok(())
        }
        Op::Alt(children) | Op::Cat(children) => {
            for child in children {
                collect_udts(child, rule_lookup, udts, udt_lookup)?;
            }
            Ok(())
        }
        Op::Rep(_, _, child) | Op::And(child) | Op::Not(child) | Op::Bka(child) | Op::Bkn(child) => {
            collect_udts(child, rule_lookup, udts, udt_lookup)
        }
        _ => Ok(()),
    }
}

fn collect_bkr(
    op: &Op,
    rule_lookup: &HashMap<String, usize>,
    udt_lookup: &HashMap<String, usize>,
    rule_bkr: &mut [bool],
    udt_bkr: &mut [bool],
) -> Result<(), ConfigError> {
    match op {
        Op::Bkr(name, _, _) => {
            let lower = name.to_lowercase();
            if let Some(&index) = rule_lookup.get(&lower) {
                rule_bkr[index] = true;
            } else if let Some(&index) = udt_lookup.get(&lower) {
                udt_bkr[index] = true;
            } else {
                return Err(ConfigError::new(
                    "GrammarBuilder",
                    format!("back reference to unknown rule or UDT '{}'", name),
                ));
            }
            Ok(())
        }
        Op::Alt(children) | Op::Cat(children) => {
            for child in children {
                collect_bkr(child, rule_lookup, udt_lookup, rule_bkr, udt_bkr)?;
            }
            Ok(())
        }
        Op::Rep(_, _, child) | Op::And(child) | Op::Not(child) | Op::Bka(child) | Op::Bkn(child) => {
            collect_bkr(child, rule_lookup, udt_lookup, rule_bkr, udt_bkr)
        }
        _ => Ok(()),
    }
}

/* ASCII upper case folded at build time; TLS comparison is against lower case */
fn fold_tls(string: &[u32]) -> Vec<u32> {
    string
        .iter()
        .map(|&c| if (65..=90).contains(&c) { c + 32 } else { c })
        .collect()
}

fn flatten_op(op: &Op, ops: &mut Vec<Opcode>, ctx: &BuildCtx) -> Result<(), ConfigError> {
    match op {
        /* single-child ALT/CAT and 1*1 repetitions are degenerate: reduce */
        Op::Alt(children) | Op::Cat(children) if children.len() == 1 => {
            flatten_op(&children[0], ops, ctx)
        }
        Op::Rep(1, 1, child) => flatten_op(child, ops, ctx),
        Op::Alt(children) | Op::Cat(children) => {
            if children.is_empty() {
                return Err(ConfigError::new("GrammarBuilder", "ALT/CAT with no children"));
            }
            let at = ops.len();
            let is_alt = matches!(op, Op::Alt(_));
            ops.push(if is_alt {
                Opcode::Alt { children: Vec::new() }
            } else {
                Opcode::Cat { children: Vec::new() }
            });
            let mut indices = Vec::with_capacity(children.len());
            for child in children {
                indices.push(ops.len());
                flatten_op(child, ops, ctx)?;
            }
            match &mut ops[at] {
                Opcode::Alt { children } | Opcode::Cat { children } => *children = indices,
                _ => {}
            }
            Ok(())
        }
        Op::Rep(min, max, child) => {
            if *max == 0 {
                return Err(ConfigError::new(
                    "GrammarBuilder",
                    "zero repetitions (0*0) are not allowed",
                ));
            }
            if min > max {
                return Err(ConfigError::new(
                    "GrammarBuilder",
                    format!("repetition min {} exceeds max {}", min, max),
                ));
            }
            ops.push(Opcode::Rep {
                min: *min,
                max: *max,
            });
            flatten_op(child, ops, ctx)
        }
        Op::Rnm(name) => match ctx.rule_lookup.get(&name.to_lowercase()) {
            Some(&index) => {
                ops.push(Opcode::Rnm { index });
                Ok(())
            }
            None => Err(ConfigError::new(
                "GrammarBuilder",
                format!("reference to unknown rule '{}'", name),
            )),
        },
        Op::Udt(name, _) => {
            /* collected earlier; the declared empty flag lives in the UDT table */
            let index = ctx.udt_lookup[&name.to_lowercase()];
            ops.push(Opcode::Udt {
                index,
                empty: ctx.udts[index].1,
            });
            Ok(())
        }
        Op::And(child) => {
            ops.push(Opcode::And);
            flatten_op(child, ops, ctx)
        }
        Op::Not(child) => {
            ops.push(Opcode::Not);
            flatten_op(child, ops, ctx)
        }
        Op::Bka(child) => {
            ops.push(Opcode::Bka);
            flatten_op(child, ops, ctx)
        }
        Op::Bkn(child) => {
            ops.push(Opcode::Bkn);
            flatten_op(child, ops, ctx)
        }
        Op::Trg(min, max) => {
            if min > max {
                return Err(ConfigError::new(
                    "GrammarBuilder",
                    format!("terminal range min {} exceeds max {}", min, max),
                ));
            }
            ops.push(Opcode::Trg {
                min: *min,
                max: *max,
            });
            Ok(())
        }
        Op::Tbs(string) => {
            if string.is_empty() {
                return Err(ConfigError::new(
                    "GrammarBuilder",
                    "empty TBS strings are not allowed; use TLS for the empty string",
                ));
            }
            ops.push(Opcode::Tbs {
                string: string.clone(),
            });
            Ok(())
        }
        Op::Tls(string) => {
            ops.push(Opcode::Tls {
                string: fold_tls(string),
            });
            Ok(())
        }
        Op::Bkr(name, case, mode) => {
            let lower = name.to_lowercase();
            let index = match ctx.rule_lookup.get(&lower) {
                Some(&index) => index,
                None => ctx.rule_count + ctx.udt_lookup[&lower],
            };
            ops.push(Opcode::Bkr {
                index,
                case: *case,
                mode: *mode,
            });
            Ok(())
        }
        Op::Abg => {
            ops.push(Opcode::Abg);
            Ok(())
        }
        Op::Aen => {
            ops.push(Opcode::Aen);
            Ok(())
        }
    }
}

impl Grammar {
    /// Validate an externally produced grammar object into an executable
    /// [Grammar]. All structural problems are reported as [ConfigError]s.
    pub fn new(rules: Vec<Rule>, udts: Vec<Udt>) -> Result<Self, ConfigError> {
        if rules.is_empty() {
            return Err(ConfigError::new("Grammar", "grammar object has no rules"));
        }
        let mut seen: HashMap<&str, ()> = HashMap::new();
        for (position, rule) in rules.iter().enumerate() {
            if rule.index != position {
                return Err(ConfigError::new(
                    "Grammar",
                    format!("rule '{}' index {} out of order", rule.name, rule.index),
                ));
            }
            if rule.lower != rule.name.to_lowercase() {
                return Err(ConfigError::new(
                    "Grammar",
                    format!("rule '{}' lower case name mismatch", rule.name),
                ));
            }
            if seen.insert(&rule.lower, ()).is_some() {
                return Err(ConfigError::new(
                    "Grammar",
                    format!("duplicate rule name '{}'", rule.name),
                ));
            }
        }
        for (position, udt) in udts.iter().enumerate() {
            if udt.index != position {
                return Err(ConfigError::new(
                    "Grammar",
                    format!("UDT '{}' index {} out of order", udt.name, udt.index),
                ));
            }
            if udt.lower != udt.name.to_lowercase() {
                return Err(ConfigError::new(
                    "Grammar",
                    format!("UDT '{}' lower case name mismatch", udt.name),
                ));
            }
            if seen.insert(&udt.lower, ()).is_some() {
                return Err(ConfigError::new(
                    "Grammar",
                    format!("UDT name '{}' collides with another name", udt.name),
                ));
            }
        }
        for rule in rules.iter() {
            validate_opcodes(rule, rules.len(), &udts)?;
        }
        Ok(Self {
            rules,
            udts,
            lookup: once_cell::unsync::OnceCell::new(),
        })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn udts(&self) -> &[Udt] {
        &self.udts
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn udt_count(&self) -> usize {
        self.udts.len()
    }

    fn lookup(&self) -> &HashMap<String, usize> {
        self.lookup.get_or_init(|| {
            let mut map = HashMap::new();
            for rule in self.rules.iter() {
                map.insert(rule.lower.clone(), rule.index);
            }
            for udt in self.udts.iter() {
                map.insert(udt.lower.clone(), self.rules.len() + udt.index);
            }
            map
        })
    }

    /// Case-insensitive rule index lookup.
    pub fn rule_index(&self, name: &str) -> Option<usize> {
        self.lookup()
            .get(&name.to_lowercase())
            .copied()
            .filter(|&index| index < self.rules.len())
    }

    /// Case-insensitive UDT index lookup.
    pub fn udt_index(&self, name: &str) -> Option<usize> {
        self.lookup()
            .get(&name.to_lowercase())
            .copied()
            .filter(|&index| index >= self.rules.len())
            .map(|index| index - self.rules.len())
    }

    /// The lowercase name behind a combined rule/UDT index, as used by `BKR`
    /// opcodes and trace records.
    pub(crate) fn lower_name(&self, index: usize) -> &str {
        if index < self.rules.len() {
            &self.rules[index].lower
        } else {
            &self.udts[index - self.rules.len()].lower
        }
    }
}

fn validate_opcodes(rule: &Rule, rule_count: usize, udts: &[Udt]) -> Result<(), ConfigError> {
    let ops = &rule.opcodes;
    if ops.is_empty() {
        return Err(ConfigError::new(
            "Grammar",
            format!("rule '{}' has no opcodes", rule.name),
        ));
    }
    for (op_index, op) in ops.iter().enumerate() {
        match op {
            Opcode::Alt { children } | Opcode::Cat { children } => {
                if children.is_empty() {
                    return Err(ConfigError::new(
                        "Grammar",
                        format!("rule '{}': ALT/CAT with no children", rule.name),
                    ));
                }
                for &child in children {
                    if child >= ops.len() {
                        return Err(ConfigError::new(
                            "Grammar",
                            format!("rule '{}': child index {} out of range", rule.name, child),
                        ));
                    }
                }
            }
            Opcode::Rep { .. } | Opcode::And | Opcode::Not | Opcode::Bka | Opcode::Bkn => {
                if op_index + 1 >= ops.len() {
                    return Err(ConfigError::new(
                        "Grammar",
                        format!("rule '{}': operator at {} has no child", rule.name, op_index),
                    ));
                }
            }
            Opcode::Rnm { index } => {
                if *index >= rule_count {
                    return Err(ConfigError::new(
                        "Grammar",
                        format!("rule '{}': RNM index {} out of range", rule.name, index),
                    ));
                }
            }
            Opcode::Udt { index, empty } => match udts.get(*index) {
                Some(udt) if udt.empty == *empty => {}
                Some(_) => {
                    return Err(ConfigError::new(
                        "Grammar",
                        format!("rule '{}': UDT {} empty flag mismatch", rule.name, index),
                    ));
                }
                None => {
                    return Err(ConfigError::new(
                        "Grammar",
                        format!("rule '{}': UDT index {} out of range", rule.name, index),
                    ));
                }
            },
            Opcode::Bkr { index, .. } => {
                if *index >= rule_count + udts.len() {
                    return Err(ConfigError::new(
                        "Grammar",
                        format!("rule '{}': BKR index {} out of range", rule.name, index),
                    ));
                }
            }
            Opcode::Tbs { string } => {
                if string.is_empty() {
                    return Err(ConfigError::new(
                        "Grammar",
                        format!("rule '{}': empty TBS string", rule.name),
                    ));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

impl Display for Grammar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for rule in self.rules.iter() {
            writeln!(f, "{} ({} opcodes)", rule.name, rule.opcodes.len())?;
        }
        for udt in self.udts.iter() {
            writeln!(f, "{} (udt, empty: {})", udt.name, udt.empty)?;
        }
        Ok(())
    }
}
