//! The right-to-left operator evaluators used inside look behind scopes.
//!
//! `CAT`, `REP`, the terminals and `BKR` mirror their forward counterparts
//! with the match direction reversed: children are visited right to left and
//! phrases are matched against the characters immediately left of the phrase
//! index. `ALT`, `RNM`, `UDT`, the look around operators and the anchors are
//! direction agnostic and keep their forward evaluators.

use super::Machine;
use crate::{BkrCase, BkrMode, Opcode, ParserError, State, SysData};

fn fold(code: u32) -> u32 {
    if (65..=90).contains(&code) {
        code + 32
    } else {
        code
    }
}

impl<'a, 'd, D> Machine<'a, 'd, D> {
    pub(super) fn op_cat_behind(
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
        for &child in children.iter().rev() {
            self.op_execute(ops, child, cat_char_index, sys)?;
            cat_char_index = cat_char_index.saturating_sub(sys.phrase_length);
            cat_phrase += sys.phrase_length;
            if sys.state == State::NoMatch {
                success = false;
                break;
            }
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

    pub(super) fn op_rep_behind(
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
            if rep_char_index == 0 {
                /* ran off the beginning of the input */
                break;
            }
            self.op_execute(ops, op_index + 1, rep_char_index, sys)?;
            if sys.state == State::NoMatch {
                break;
            }
            if sys.state == State::Empty {
                break;
            }
            rep_count += 1;
            rep_phrase += sys.phrase_length;
            rep_char_index = rep_char_index.saturating_sub(sys.phrase_length);
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

    /// Matches the single character at `phrase_index - 1`.
    pub(super) fn op_trg_behind(&mut self, min: u32, max: u32, phrase_index: usize, sys: &mut SysData) {
        sys.state = State::NoMatch;
        sys.phrase_length = 0;
        if phrase_index > 0 {
            let code = self.chars[phrase_index - 1];
            if min <= code && code <= max {
                sys.state = State::Match;
                sys.phrase_length = 1;
            }
        }
    }

    /// Matches the string ending at `phrase_index`.
    pub(super) fn op_tbs_behind(&mut self, string: &[u32], phrase_index: usize, sys: &mut SysData) {
        sys.state = State::NoMatch;
        let len = string.len();
        if phrase_index >= len {
            let beg = phrase_index - len;
            if self.chars[beg..phrase_index] != *string {
                return;
            }
            sys.state = State::Match;
            sys.phrase_length = len;
        }
    }

    pub(super) fn op_tls_behind(&mut self, string: &[u32], phrase_index: usize, sys: &mut SysData) {
        sys.state = State::NoMatch;
        let len = string.len();
        if len == 0 {
            sys.state = State::Empty;
            return;
        }
        if phrase_index >= len {
            let beg = phrase_index - len;
            for (i, &expected) in string.iter().enumerate() {
                if fold(self.chars[beg + i]) != expected {
                    return;
                }
            }
            sys.state = State::Match;
            sys.phrase_length = len;
        }
    }

    /// Matches the back referenced phrase ending at `phrase_index`.
    pub(super) fn op_bkr_behind(
        &mut self,
        index: usize,
        case: BkrCase,
        mode: BkrMode,
        phrase_index: usize,
        sys: &mut SysData,
    ) {
        sys.state = State::NoMatch;
        sys.phrase_length = 0;
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
        if phrase_index >= len {
            let beg = phrase_index - len;
            let matched = match case {
                BkrCase::Insensitive => {
                    (0..len).all(|i| fold(self.chars[beg + i]) == fold(self.chars[lm_index + i]))
                }
                BkrCase::Sensitive => {
                    self.chars[beg..phrase_index] == self.chars[lm_index..lm_index + len]
                }
            };
            if matched {
                sys.state = State::Match;
                sys.phrase_length = len;
            }
        }
    }
}
