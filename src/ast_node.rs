use crate::{Ast, AstNode, AstRecord, Grammar};
use ptree::TreeItem;
use std::fmt::{Debug, Display, Formatter};

impl Ast {
    /// Create an AST builder for the grammar with every rule and UDT selected
    /// for node emission.
    pub fn new(grammar: &Grammar) -> Self {
        let rule_count = grammar.rule_count();
        let mut names = Vec::with_capacity(rule_count + grammar.udt_count());
        for rule in grammar.rules() {
            names.push(rule.name.clone());
        }
        for udt in grammar.udts() {
            names.push(udt.name.clone());
        }
        let defined = vec![true; names.len()];
        Self {
            records: Vec::new(),
            open: Vec::new(),
            defined,
            names,
            rule_count,
        }
    }

    /// Restrict node emission to the named rules/UDTs only.
    /// Unknown names are ignored.
    pub fn select(&mut self, names: &[&str]) {
        for d in self.defined.iter_mut() {
            *d = false;
        }
        for name in names {
            let lower = name.to_lowercase();
            for (i, n) in self.names.iter().enumerate() {
                if n.to_lowercase() == lower {
                    self.defined[i] = true;
                }
            }
        }
    }

    /* per-parse reset, called by the parser before execution */
    pub(crate) fn init(&mut self) {
        self.records.clear();
        self.open.clear();
    }

    pub(crate) fn rule_defined(&self, rule_index: usize) -> bool {
        self.defined.get(rule_index).copied().unwrap_or(false)
    }

    pub(crate) fn udt_defined(&self, udt_index: usize) -> bool {
        self.defined
            .get(self.rule_count + udt_index)
            .copied()
            .unwrap_or(false)
    }

    /// Current length of the record log; the mark for a later rollback.
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Roll the record log back to a saved mark, erasing the records of a
    /// failed branch.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.records.truncate(len);
        while matches!(self.open.last(), Some(&i) if i >= len) {
            self.open.pop();
        }
    }

    /// Open a node for the rule/UDT at combined index `which`.
    pub(crate) fn down(&mut self, which: usize) {
        self.open.push(self.records.len());
        self.records.push(AstRecord {
            which,
            down: true,
            phrase_index: 0,
            phrase_length: 0,
        });
    }

    /// Close the most recently opened node, recording its matched span.
    pub(crate) fn up(&mut self, which: usize, phrase_index: usize, phrase_length: usize) {
        self.open.pop();
        self.records.push(AstRecord {
            which,
            down: false,
            phrase_index,
            phrase_length,
        });
    }

    /// Fold the record log into a tree. Empty unless the last parse succeeded
    /// over at least one selected rule.
    pub fn tree(&self) -> Vec<AstNode> {
        let mut roots: Vec<AstNode> = Vec::new();
        let mut stack: Vec<AstNode> = Vec::new();
        for record in &self.records {
            if record.down {
                stack.push(AstNode {
                    index: record.which,
                    name: self.names[record.which].clone(),
                    start: 0,
                    length: 0,
                    children: Vec::new(),
                });
            } else if let Some(mut node) = stack.pop() {
                node.start = record.phrase_index;
                node.length = record.phrase_length;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => roots.push(node),
                }
            }
        }
        roots
    }
}

impl AstNode {
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    /// Find the first node with the given name searching through all nested
    /// children.
    pub fn find(&self, name: &str) -> Option<&AstNode> {
        if self.name == name {
            Some(self)
        } else {
            self.children.iter().find_map(|child| child.find(name))
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.name == name || self.children.iter().any(|child| child.contains(name))
    }

    /// Return all nodes matching the predicate, in record order.
    pub fn list<TF: Fn(&AstNode) -> bool>(&self, p: &TF) -> Vec<&AstNode> {
        let mut found = Vec::new();
        self.walk(&mut found, &|node, list| {
            if p(node) {
                list.push(node);
            }
        });
        found
    }

    fn walk<'this, TR, TF: Fn(&'this Self, &mut TR)>(&'this self, r: &mut TR, p: &TF) {
        p(self, r);
        self.children.iter().for_each(|child| child.walk(r, p));
    }
}

impl Display for AstNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let children_string = self.children.iter().map(|c| format!("{}", c));
        f.debug_struct("")
            .field("value", &(&self.name, &self.start, &self.end()))
            .field("children", &children_string)
            .finish()
    }
}

impl Debug for AstNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut debug_struct = f.debug_struct("AstNode");
        debug_struct
            .field("name", &self.name)
            .field("start", &self.start)
            .field("length", &self.length);
        if !self.children.is_empty() {
            debug_struct.field("children", &self.children);
        }
        debug_struct.finish()
    }
}

impl TreeItem for AstNode {
    type Child = Self;

    fn write_self<W: std::io::Write>(&self, f: &mut W, _: &ptree::Style) -> std::io::Result<()> {
        write!(f, "{} # {}-{}", self.name, self.start, self.end())
    }

    fn children(&self) -> std::borrow::Cow<[Self::Child]> {
        std::borrow::Cow::from(&self.children)
    }
}

impl AstNode {
    pub fn print(&self) -> Result<(), std::io::Error> {
        ptree::print_tree(self)
    }
}
