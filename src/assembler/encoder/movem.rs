/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! MOVEM and the REG directive. `MOVEM <list>,<ea>` and `MOVEM <ea>,<list>`
//! are syntactically ambiguous, so the first form is attempted and the
//! second tried on failure; which one succeeded in pass 1 is guarded so
//! pass 2 parses the same shape without trial errors.

use crate::assembler::Assembler;
use crate::assembler::encoder::eff_addr;
use crate::assembler::guard::{GUARD_REGLIST_LEFT, GUARD_REGLIST_RIGHT};
use crate::assembler::lexer::{capitalize, compact_operands, parse_id};
use crate::assembler::operand::*;
use crate::assembler::symbol_table::SymbolKind;
use crate::errors::{AsmResult, ErrorCode, Severity};

const CONTROL_ALT: u32 = AN_IND | AN_IND_DISP | AN_IND_INDEX | ABS_SHORT | ABS_LONG;
const DEST_MODES: u32 = CONTROL_ALT | AN_IND_PRE;
const SOURCE_MODES: u32 = CONTROL_ALT | AN_IND_POST | PC_DISP | PC_INDEX;

fn reverse_list(list: u16) -> u16 {
    list.reverse_bits()
}

impl Assembler<'_> {
    pub fn dir_movem(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        let inst_mask: u16 = match size {
            Some(Size::Word) | None => 0x4880,
            Some(Size::Long) => 0x48C0,
            Some(_) => {
                self.log.report(ErrorCode::InvSizeCode, None);
                0x4880
            }
        };

        if !label.is_empty() {
            self.define_label(label)?;
        }

        let Some(compact) = compact_operands(op) else {
            return Err(self
                .log
                .report(ErrorCode::UnterminatedString, Some(op.to_string())));
        };

        let try_left = self.pass < 2 || self.guard_get(0)? == GUARD_REGLIST_LEFT;
        if try_left {
            match self.movem_list_ea(&compact, inst_mask, size) {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(diag) => {
                    if self.pass == 2 {
                        return Err(diag);
                    }
                }
            }
        }

        self.log.reset_line_status();
        self.movem_ea_list(&compact, inst_mask, size)
    }

    /// `MOVEM <list>,<ea>`. Returns Ok(false) when the operand field does
    /// not have this shape, so the caller can try the mirrored form.
    fn movem_list_ea(&mut self, s: &str, inst_mask: u16, size: Option<Size>) -> AsmResult<bool> {
        let Some((list, rest)) = self.eval_reg_list(s).ok().flatten() else {
            return Ok(false);
        };
        if !self.log.line_is_ok() || !rest.starts_with(',') {
            return Ok(false);
        }
        let (mem, _consumed) = self.parse_operand(&rest[1..], 2, false)?;
        if self.log.line_at_least(Severity::Error) {
            return Ok(false);
        }
        if mem.mode.mask() & DEST_MODES == 0 {
            self.log.report(ErrorCode::InvAddrMode, None);
            return Ok(true);
        }
        if self.pass == 2 {
            self.output((inst_mask | eff_addr(&mem)) as i32, Size::Word);
            self.sections.out_loc += 2;
            // predecrement reverses the register order in the mask
            let list = if mem.mode == AddrMode::AnIndPre {
                reverse_list(list)
            } else {
                list
            };
            self.output(list as i32, Size::Word);
            self.sections.out_loc += 2;
        } else {
            if self.pass == 1 {
                self.guard_set(0, GUARD_REGLIST_LEFT);
            }
            self.sections.out_loc += 4;
        }
        self.ext_words(&mem, size);
        Ok(true)
    }

    /// `MOVEM <ea>,<list>`.
    fn movem_ea_list(&mut self, s: &str, inst_mask: u16, size: Option<Size>) -> AsmResult<()> {
        let (mem, consumed) = self.parse_operand(s, 1, false)?;
        let rest = &s[consumed..];
        if self.log.line_at_least(Severity::Error) || !rest.starts_with(',') {
            return Ok(());
        }
        if mem.mode.mask() & SOURCE_MODES == 0 {
            self.log.report(ErrorCode::InvAddrMode, None);
            return Ok(());
        }
        let Some((list, _)) = self.eval_reg_list(&rest[1..])? else {
            return Ok(());
        };
        if !self.log.line_is_ok() {
            return Ok(());
        }
        if self.pass == 2 {
            self.output((inst_mask | 0x0400 | eff_addr(&mem)) as i32, Size::Word);
            self.sections.out_loc += 2;
            self.output(list as i32, Size::Word);
            self.sections.out_loc += 2;
        } else {
            if self.pass == 1 {
                self.guard_set(0, GUARD_REGLIST_RIGHT);
            }
            self.sections.out_loc += 4;
        }
        self.ext_words(&mem, size);
        Ok(())
    }

    /// The REG directive binds a label to a register list mask.
    pub fn dir_reg(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        if size.is_some() {
            self.log.report(ErrorCode::InvSizeCode, None);
        }
        if op.is_empty() {
            return Err(self.log.report(ErrorCode::Syntax, None));
        }
        let Some(compact) = compact_operands(op) else {
            return Err(self
                .log
                .report(ErrorCode::UnterminatedString, Some(op.to_string())));
        };
        let Some((list, _)) = self.eval_reg_list(&compact)? else {
            return Ok(());
        };
        if label.is_empty() {
            self.log.report(ErrorCode::LabelRequired, None);
        } else {
            self.symbols.create(
                label,
                SymbolKind::RegList,
                None,
                list as i32,
                self.pass,
                &mut self.log,
            )?;
        }
        Ok(())
    }

    /// Parse a register list: either explicit (`D0-D2/A5` style ranges and
    /// singles) or a register-list symbol, possibly `proc.name` qualified.
    /// Returns None after reporting when the list is missing or wrong.
    fn eval_reg_list<'a>(&mut self, s: &'a str) -> AsmResult<Option<(u16, &'a str)>> {
        let upper = capitalize(s);
        let u = upper.as_bytes();

        let is_term = |b: Option<&u8>| {
            matches!(b.copied(), None | Some(b',') | Some(b'/') | Some(b'-'))
                || b.is_some_and(|c| c.is_ascii_whitespace())
        };
        let reg_at = |i: usize| -> Option<u8> {
            let r = u.get(i).copied()?;
            let n = u.get(i + 1).copied()?;
            if (r == b'A' || r == b'D') && (b'0'..=b'7').contains(&n) {
                Some(if r == b'A' { 8 + n - b'0' } else { n - b'0' })
            } else {
                None
            }
        };

        if reg_at(0).is_some() && is_term(u.get(2)) {
            // explicit list
            let mut list: u16 = 0;
            let mut i = 0;
            loop {
                let Some(reg1) = reg_at(i) else {
                    return Err(self
                        .log
                        .report(ErrorCode::Syntax, Some(s[i.min(s.len())..].to_string())));
                };
                match u.get(i + 2).copied() {
                    Some(b'/') => {
                        list |= 1 << reg1;
                        i += 3;
                    }
                    Some(b'-') => {
                        let Some(reg2) = reg_at(i + 3) else {
                            return Err(self
                                .log
                                .report(ErrorCode::Syntax, Some(s[i + 3..].to_string())));
                        };
                        if u.get(i + 5) == Some(&b'-') {
                            return Err(self
                                .log
                                .report(ErrorCode::Syntax, Some(s[i + 5..].to_string())));
                        }
                        let (lo, hi) = if reg1 < reg2 { (reg1, reg2) } else { (reg2, reg1) };
                        for r in lo..=hi {
                            list |= 1 << r;
                        }
                        if u.get(i + 5) != Some(&b'/') {
                            return Ok(Some((list, &s[i + 5..])));
                        }
                        i += 6;
                    }
                    _ => {
                        list |= 1 << reg1;
                        return Ok(Some((list, &s[i + 2..])));
                    }
                }
            }
        }

        // register list symbol
        let first = u.first().copied();
        if first.is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, b'_' | b'?' | b'@')) {
            let (id, mut rest) = parse_id(s);
            let mut sym = self
                .symbols
                .lookup_scope_proc(&id)
                .or_else(|| self.symbols.lookup(&id));
            match sym {
                None => {
                    self.log.report(ErrorCode::RegListUndef, Some(id));
                }
                Some(found) => {
                    if self.symbols.kind(found) == SymbolKind::ProcEntry
                        && rest.starts_with('.')
                    {
                        let (member, after) = parse_id(&rest[1..]);
                        rest = after;
                        sym = self.symbols.lookup_member(found, &member);
                    }
                    match sym {
                        None => {
                            self.log.report(ErrorCode::RegListUndef, Some(id));
                        }
                        Some(found) if self.symbols.kind(found) != SymbolKind::RegList => {
                            self.log.report(
                                ErrorCode::NotRegList,
                                Some(self.symbols.name(found).to_string()),
                            );
                        }
                        Some(found) => {
                            return Ok(Some((self.symbols.value(found) as u16, rest)));
                        }
                    }
                }
            }
            return Ok(Some((0, rest)));
        }

        Err(self.log.report(ErrorCode::Syntax, Some(s.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predecrement_reverses_bits() {
        // D0-D2/A0 = bits 0,1,2,8
        assert_eq!(reverse_list(0x0107), 0xE080);
    }
}
