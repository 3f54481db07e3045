//! The left-to-right operator evaluators.
//!
//! Each evaluator implements one operator's semantics over the relay state in
//! [SysData]: terminals inspect the input directly, compound operators
//! re-enter [Machine::op_execute](super::Machine::op_execute) for their
//! children and roll the AST log and back reference frames back when a branch
//! fails.

use super::{validate_rnm_result, validate_udt_result, CallbackEnv, Machine};
use crate::{BackRef, BkrCase, BkrMode, Opcode, ParserError, State, SysData};

/* ASCII alphabetics fold to lower case for the insensitive comparisons */
fn fold(code: u32) -> u32 {
    if (65..=90).contains(&code) {
        code + 32
    } else {
        code
    }
}

impl<'a, 'd, D> Machine<'a, 'd, D> {
    /// `ALT`: first child that does not fail wins.
    pub(super) fn op_alt(
        &mut self,
        ops: &[Opcode],
        children: &[usize],
        phrase_index: usize,
        sys: &mut SysData,
    ) -> Result<(), ParserError> {
        for &child in children {
            self.op_execute(ops, child, phrase_index, sys)?;
            if sys.state != State::NoMatch {
                break;
            }
        }
        Ok(())
    }

    /// `CAT`: all children must succeed over adjacent phrases; any failure
    /// fails the whole concatenation and rolls back its side effects.
    pub(super) fn op_cat(
        &mut self,
        ops: &[Opcode],
        children: &[usize],
        phrase_index: usize,
        sys: &mut SysData,
    ) -> Result<(), ParserError> {
        let ulen = sys.u_frame.len();
        let plen = sys.p_frame.len();
        let ast_len = self.ast_len();
        let mut success = true;
        let mut cat_char_index = phrase_index;
        let mut cat_phrase = 0;
        for &child in children {
            self.op_execute(ops, child, cat_char_index, sys)?;
            if sys.state == State::NoMatch {
                success = false;
                break;
            }
            cat_char_index += sys.phrase_length;
            cat_phrase += sys.phrase_length;
        }
        if success {
            sys.state = if cat_phrase == 0 {
                State::Empty
            } else {
                State::Match
            };
            sys.phrase_length = cat_phrase;
        } else {
            sys.state = State::NoMatch;
            sys.phrase_length = 0;
            sys.u_frame.truncate(ulen);
            sys.p_frame.truncate(plen);
            self.ast_truncate(ast_len);
        }
        Ok(())
    }

    /// `REP`: repeat the single child, concatenating matched phrases, until
    /// the child fails, goes empty, input runs out or `max` is reached.
    pub(super) fn op_rep(
        &mut self,
        ops: &[Opcode],
        op_index: usize,
        min: usize,
        max: usize,
        phrase_index: usize,
        sys: &mut SysData,
    ) -> Result<(), ParserError> {
        let ulen = sys.u_frame.len();
        let plen = sys.p_frame.len();
        let ast_len = self.ast_len();
        let mut rep_char_index = phrase_index;
        let mut rep_phrase = 0;
        let mut rep_count = 0;
        loop {
            if rep_char_index >= self.chars_end {
                break;
            }
            self.op_execute(ops, op_index + 1, rep_char_index, sys)?;
            if sys.state == State::NoMatch {
                break;
            }
            if sys.state == State::Empty {
                /* an empty child always ends, and satisfies, the repetition */
                break;
            }
            rep_count += 1;
            rep_phrase += sys.phrase_length;
            rep_char_index += sys.phrase_length;
            if rep_count == max {
                break;
            }
        }
        if sys.state == State::Empty || rep_count >= min {
            sys.state = if rep_phrase == 0 {
                State::Empty
            } else {
                State::Match
            };
            sys.phrase_length = rep_phrase;
        } else {
            sys.state = State::NoMatch;
            sys.phrase_length = 0;
            sys.u_frame.truncate(ulen);
            sys.p_frame.truncate(plen);
            self.ast_truncate(ast_len);
        }
        Ok(())
    }

    /// `RNM`: the rule reference. Root of a parse tree branch; also the seat
    /// of AST node emission, back reference frame management and the
    /// two-phase rule callback protocol.
    pub(super) fn op_rnm(
        &mut self,
        rule_index: usize,
        phrase_index: usize,
        sys: &mut SysData,
    ) -> Result<(), ParserError> {
        let grammar = self.grammar;
        let rule = &grammar.rules()[rule_index];
        let not_look_around = !self.in_look_around();
        /* AST and back references are suspended inside look around */
        let mut saved = None;
        if not_look_around {
            let ast_defined = self
                .ast
                .as_ref()
                .map(|ast| ast.rule_defined(rule_index))
                .unwrap_or(false);
            let ast_len = self.ast_len();
            if ast_defined {
                if let Some(ast) = self.ast.as_mut() {
                    ast.down(rule_index);
                }
            }
            let ulen = sys.u_frame.len();
            let plen = sys.p_frame.len();
            sys.u_frame.push();
            sys.p_frame.push();
            /* re-root the parent frame: %p references inside this rule only
            see phrases matched within this rule invocation */
            let parent = std::mem::replace(&mut sys.p_frame, BackRef::new(grammar));
            saved = Some((ast_defined, ast_len, ulen, plen, parent));
        }
        match self.rule_callbacks.get(rule_index).cloned().flatten() {
            None => self.op_execute(&rule.opcodes, 0, phrase_index, sys)?,
            Some(callback) => {
                let chars_left = self.chars_end.saturating_sub(phrase_index);
                {
                    let mut env = CallbackEnv {
                        machine: self,
                        phrase_index,
                    };
                    callback.on_visit(sys, &mut env)?;
                }
                validate_rnm_result(rule, sys, chars_left, true)?;
                if sys.state == State::Active {
                    self.op_execute(&rule.opcodes, 0, phrase_index, sys)?;
                    let mut env = CallbackEnv {
                        machine: self,
                        phrase_index,
                    };
                    callback.on_visit(sys, &mut env)?;
                    validate_rnm_result(rule, sys, chars_left, false)?;
                }
                /* otherwise the callback's result stands: RNM acting as a UDT */
            }
        }
        if let Some((ast_defined, ast_len, ulen, plen, parent)) = saved {
            if ast_defined {
                if sys.state == State::NoMatch {
                    self.ast_truncate(ast_len);
                } else if let Some(ast) = self.ast.as_mut() {
                    ast.up(rule_index, phrase_index, sys.phrase_length);
                }
            }
            sys.p_frame = parent;
            if sys.state == State::NoMatch {
                sys.u_frame.truncate(ulen);
                sys.p_frame.truncate(plen);
            } else if rule.is_bkr {
                /* save on both frames; BKR picks one by its mode */
                sys.p_frame
                    .save_phrase(&rule.lower, phrase_index, sys.phrase_length);
                sys.u_frame
                    .save_phrase(&rule.lower, phrase_index, sys.phrase_length);
            }
        }
        Ok(())
    }

    /// `UDT`: a terminal for phrase recognition but a named rule for AST
    /// nodes and back referencing.
    pub(super) fn op_udt(
        &mut self,
        udt_index: usize,
        phrase_index: usize,
        sys: &mut SysData,
    ) -> Result<(), ParserError> {
        let grammar = self.grammar;
        let udt = &grammar.udts()[udt_index];
        let ast_index = grammar.rule_count() + udt_index;
        let not_look_around = !self.in_look_around();
        let mut saved = None;
        if not_look_around {
            let ast_defined = self
                .ast
                .as_ref()
                .map(|ast| ast.udt_defined(udt_index))
                .unwrap_or(false);
            let ast_len = self.ast_len();
            if ast_defined {
                if let Some(ast) = self.ast.as_mut() {
                    ast.down(ast_index);
                }
            }
            /* frame push/pop only matters if the callback re-enters the
            interpreter through evaluate_rule()/evaluate_udt() */
            let ulen = sys.u_frame.len();
            let plen = sys.p_frame.len();
            sys.u_frame.push();
            sys.p_frame.push();
            let parent = std::mem::replace(&mut sys.p_frame, BackRef::new(grammar));
            saved = Some((ast_defined, ast_len, ulen, plen, parent));
        }
        let callback = match self.udt_callbacks.get(udt_index).cloned().flatten() {
            Some(callback) => callback,
            None => {
                return Err(ParserError::callback(
                    udt.name.clone(),
                    "no callback registered",
                ))
            }
        };
        let chars_left = self.chars_end.saturating_sub(phrase_index);
        {
            let mut env = CallbackEnv {
                machine: self,
                phrase_index,
            };
            callback.on_visit(sys, &mut env)?;
        }
        validate_udt_result(udt, sys, chars_left)?;
        if let Some((ast_defined, ast_len, ulen, plen, parent)) = saved {
            if ast_defined {
                if sys.state == State::NoMatch {
                    self.ast_truncate(ast_len);
                } else if let Some(ast) = self.ast.as_mut() {
                    ast.up(ast_index, phrase_index, sys.phrase_length);
                }
            }
            sys.p_frame = parent;
            if sys.state == State::NoMatch {
                sys.u_frame.truncate(ulen);
                sys.p_frame.truncate(plen);
            } else if udt.is_bkr {
                sys.p_frame
                    .save_phrase(&udt.lower, phrase_index, sys.phrase_length);
                sys.u_frame
                    .save_phrase(&udt.lower, phrase_index, sys.phrase_length);
            }
        }
        Ok(())
    }

    /// `AND`: positive look ahead. Always zero width; EMPTY if the child
    /// matches, NOMATCH if it fails.
    pub(super) fn op_and(
        &mut self,
        ops: &[Opcode],
        op_index: usize,
        phrase_index: usize,
        sys: &mut SysData,
    ) -> Result<(), ParserError> {
        self.push_look_ahead(phrase_index);
        let result = self.op_execute(ops, op_index + 1, phrase_index, sys);
        self.pop_look();
        result?;
        sys.phrase_length = 0;
        sys.state = match sys.state {
            State::Empty | State::Match => State::Empty,
            _ => State::NoMatch,
        };
        Ok(())
    }

    /// `NOT`: negative look ahead. Always zero width; EMPTY if the child
    /// fails, NOMATCH if it matches.
    pub(super) fn op_not(
        &mut self,
        ops: &[Opcode],
        op_index: usize,
        phrase_index: usize,
        sys: &mut SysData,
    ) -> Result<(), ParserError> {
        self.push_look_ahead(phrase_index);
        let result = self.op_execute(ops, op_index + 1, phrase_index, sys);
        self.pop_look();
        result?;
        sys.phrase_length = 0;
        sys.state = match sys.state {
            State::Empty | State::Match => State::NoMatch,
            _ => State::Empty,
        };
        Ok(())
    }

    /// `BKA`: positive look behind. The child is evaluated right to left
    /// from the anchor; always zero width.
    pub(super) fn op_bka(
        &mut self,
        ops: &[Opcode],
        op_index: usize,
        phrase_index: usize,
        sys: &mut SysData,
    ) -> Result<(), ParserError> {
        self.push_look_behind(phrase_index);
        let result = self.op_execute(ops, op_index + 1, phrase_index, sys);
        self.pop_look();
        result?;
        sys.phrase_length = 0;
        sys.state = match sys.state {
            State::Empty | State::Match => State::Empty,
            _ => State::NoMatch,
        };
        Ok(())
    }

    /// `BKN`: negative look behind; always zero width.
    pub(super) fn op_bkn(
        &mut self,
        ops: &[Opcode],
        op_index: usize,
        phrase_index: usize,
        sys: &mut SysData,
    ) -> Result<(), ParserError> {
        self.push_look_behind(phrase_index);
        let result = self.op_execute(ops, op_index + 1, phrase_index, sys);
        self.pop_look();
        result?;
        sys.phrase_length = 0;
        sys.state = match sys.state {
            State::Empty | State::Match => State::NoMatch,
            _ => State::Empty,
        };
        Ok(())
    }

    /// `TRG`: single character range terminal.
    pub(super) fn op_trg(&mut self, min: u32, max: u32, phrase_index: usize, sys: &mut SysData) {
        sys.state = State::NoMatch;
        if phrase_index < self.chars_end {
            let code = self.chars[phrase_index];
            if min <= code && code <= max {
                sys.state = State::Match;
                sys.phrase_length = 1;
            }
        }
    }

    /// `TBS`: case-sensitive terminal string. Never empty.
    pub(super) fn op_tbs(&mut self, string: &[u32], phrase_index: usize, sys: &mut SysData) {
        sys.state = State::NoMatch;
        let len = string.len();
        if phrase_index + len <= self.chars_end {
            if self.chars[phrase_index..phrase_index + len] != *string {
                return;
            }
            sys.state = State::Match;
            sys.phrase_length = len;
        }
    }

    /// `TLS`: case-insensitive terminal string; the only operator that can
    /// be defined as an empty phrase.
    pub(super) fn op_tls(&mut self, string: &[u32], phrase_index: usize, sys: &mut SysData) {
        sys.state = State::NoMatch;
        let len = string.len();
        if len == 0 {
            sys.state = State::Empty;
            return;
        }
        if phrase_index + len <= self.chars_end {
            for (i, &expected) in string.iter().enumerate() {
                if fold(self.chars[phrase_index + i]) != expected {
                    return;
                }
            }
            sys.state = State::Match;
            sys.phrase_length = len;
        }
    }

    /// `ABG`: begin-of-input anchor. Matches position 0 of the full input,
    /// not of the sub-parse window.
    pub(super) fn op_abg(&mut self, phrase_index: usize, sys: &mut SysData) {
        sys.phrase_length = 0;
        sys.state = if phrase_index == 0 {
            State::Empty
        } else {
            State::NoMatch
        };
    }

    /// `AEN`: end-of-input anchor, against the full input length.
    pub(super) fn op_aen(&mut self, phrase_index: usize, sys: &mut SysData) {
        sys.phrase_length = 0;
        sys.state = if phrase_index == self.chars.len() {
            State::Empty
        } else {
            State::NoMatch
        };
    }

    /// `BKR`: match the last phrase the named rule/UDT matched. An unset
    /// binding fails; a bound empty phrase is EMPTY.
    pub(super) fn op_bkr(
        &mut self,
        index: usize,
        case: BkrCase,
        mode: BkrMode,
        phrase_index: usize,
        sys: &mut SysData,
    ) {
        sys.state = State::NoMatch;
        let lower = self.grammar.lower_name(index);
        let phrase = match mode {
            BkrMode::Parent => sys.p_frame.get_phrase(lower),
            BkrMode::Universal => sys.u_frame.get_phrase(lower),
        };
        let (lm_index, len) = match phrase {
            Some(phrase) => phrase,
            None => return,
        };
        if len == 0 {
            sys.state = State::Empty;
            return;
        }
        if phrase_index + len <= self.chars_end {
            let matched = match case {
                BkrCase::Insensitive => (0..len)
                    .all(|i| fold(self.chars[phrase_index + i]) == fold(self.chars[lm_index + i])),
                BkrCase::Sensitive => {
                    self.chars[phrase_index..phrase_index + len]
                        == self.chars[lm_index..lm_index + len]
                }
            };
            if matched {
                sys.state = State::Match;
                sys.phrase_length = len;
            }
        }
    }
}
