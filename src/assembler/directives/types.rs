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

//! STRUCT/UNION/ENUM bodies, bitfield members, TYPEDEF, and the line
//! continuation that routes member lines (and skipped conditional lines)
//! away from the normal instruction path.

use crate::assembler::Assembler;
use crate::assembler::lexer::{parse_id, skip_space};
use crate::assembler::operand::Size;
use crate::assembler::symbol_table::{SymbolCategory, SymbolId, SymbolKind, Value};
use crate::errors::{AsmResult, ErrorCode};

impl Assembler<'_> {
    /// Lines inside a skipped conditional region or a membered type body
    /// never reach the instruction dispatcher. Returns true when the line
    /// has been consumed here.
    pub fn directive_continuation(&mut self, line: &str) -> AsmResult<bool> {
        if self.if_nogen > 0 {
            let (id, _) = parse_id(skip_space(line));
            let keeps_scanning = ["IF", "IFDEF", "IFNDEF", "ELSE", "ENDIF"]
                .iter()
                .any(|d| id.eq_ignore_ascii_case(d));
            return Ok(!keeps_scanning);
        }

        let Some(inside) = self.inside_type else {
            return Ok(false);
        };
        let kind = self.symbols.kind(inside);
        let (id, rest) = parse_id(skip_space(line));
        if id.is_empty() {
            let code = match kind {
                SymbolKind::TypeEnum => ErrorCode::ExpectedEnumMember,
                SymbolKind::TypeStruct => ErrorCode::ExpectedStructMember,
                _ => ErrorCode::ExpectedUnionMember,
            };
            self.log.report(code, Some(line.to_string()));
            return Ok(true);
        }

        if id.eq_ignore_ascii_case("ENDENUM") {
            if kind == SymbolKind::TypeEnum {
                self.end_membered_type(rest);
            } else {
                self.log.report(ErrorCode::UnexpectedEndEnum, None);
            }
        } else if id.eq_ignore_ascii_case("ENDSTRUCT") {
            if kind == SymbolKind::TypeStruct {
                self.end_membered_type(rest);
            } else {
                self.log.report(ErrorCode::UnexpectedEndStruct, None);
            }
        } else if id.eq_ignore_ascii_case("ENDUNION") {
            if kind == SymbolKind::TypeUnion {
                self.end_membered_type(rest);
            } else {
                self.log.report(ErrorCode::UnexpectedEndUnion, None);
            }
        } else if id.eq_ignore_ascii_case("ENUM") {
            self.log.report(ErrorCode::UnexpectedEnum, None);
        } else if id.eq_ignore_ascii_case("STRUCT") {
            self.log.report(ErrorCode::UnexpectedStruct, None);
        } else if id.eq_ignore_ascii_case("UNION") {
            self.log.report(ErrorCode::UnexpectedUnion, None);
        } else if kind == SymbolKind::TypeEnum {
            self.parse_enum_member(&id, rest)?;
        } else {
            self.parse_struct_or_union_member(&id, rest)?;
        }
        Ok(true)
    }

    /// ENUM/STRUCT/UNION: open a membered type; its members arrive on the
    /// following lines until the matching end directive.
    pub fn dir_membered_type(
        &mut self,
        kind: SymbolKind,
        size: Option<Size>,
        label: &str,
        op: &str,
    ) -> AsmResult<()> {
        if size.is_some() {
            self.log.report(ErrorCode::InvSizeCode, None);
        }
        let (name, rest) = if label.is_empty() {
            parse_id(skip_space(op))
        } else {
            (label.to_string(), op)
        };
        if name.is_empty() {
            let code = match kind {
                SymbolKind::TypeEnum => ErrorCode::ExpectedEnumName,
                SymbolKind::TypeStruct => ErrorCode::ExpectedStructName,
                _ => ErrorCode::ExpectedUnionName,
            };
            return Err(self.log.report(code, None));
        }

        self.bitfield_shift = 0;
        self.bitfield_size = 0;
        self.next_enum = Value::constant(0);

        self.inside_type = if self.pass == 0 {
            Some(
                self.symbols
                    .create(&name, kind, None, 0, self.pass, &mut self.log)?,
            )
        } else {
            self.symbols.lookup(&name)
        };
        self.trailing_check(rest);
        Ok(())
    }

    fn parse_enum_member(&mut self, name: &str, op: &str) -> AsmResult<()> {
        let inside = self.inside_type.expect("enum body is open");
        let mut op = skip_space(op);
        if let Some(expr) = op.strip_prefix('=') {
            let (value, rest) = self.evaluate(expr)?;
            if value.category() != SymbolCategory::Const {
                self.log.report(ErrorCode::InvValueCategory, None);
            }
            self.next_enum = Value::constant(value.value);
            op = rest;
        }
        let member = self.symbols.create_member(
            inside,
            name,
            Some(inside),
            self.next_enum.value,
            self.pass,
            &mut self.log,
        )?;
        self.next_enum.value += 1;
        let shown = self.symbols.value(member);
        self.listing.put_symbol(shown);
        self.trailing_check(op);
        Ok(())
    }

    fn parse_struct_or_union_member(&mut self, name: &str, op: &str) -> AsmResult<()> {
        let inside = self.inside_type.expect("struct or union body is open");
        let (ty, rest) = self.parse_type_spec(op, true)?;
        let Some(mut member_ty) = ty else {
            return Ok(());
        };

        let mut rest = rest;
        if self.symbols.kind(inside) == SymbolKind::TypeStruct
            && (rest.starts_with(':') || self.bitfield_shift != 0)
        {
            if let Some(expr) = rest.strip_prefix(':') {
                let (bits, after) = self.evaluate(expr)?;
                rest = after;
                if self.bitfield_shift == 0 {
                    self.bitfield_size = self.symbols.size_of(member_ty);
                    self.bitfield_shift = self.bitfield_size * 8;
                }
                if self.bitfield_size != self.symbols.size_of(member_ty) {
                    self.log.report(
                        ErrorCode::InvalidBitmapMemberType,
                        Some(self.symbols.name(member_ty).to_string()),
                    );
                    return Ok(());
                }
                if bits.value < 1 || self.bitfield_shift < bits.value {
                    self.log.report(ErrorCode::BitCountTooBig, None);
                    return Ok(());
                }
                self.bitfield_shift -= bits.value;
                let field = self.symbols.alloc(
                    "",
                    SymbolKind::TypeBitfield,
                    Some(member_ty),
                    self.bitfield_shift,
                );
                let mask = (u32::MAX >> (32 - bits.value)) as i32;
                self.symbols
                    .create_member(field, "mask", None, mask, self.pass, &mut self.log)?;
                self.symbols
                    .create_member(field, "size", None, bits.value, self.pass, &mut self.log)?;
                let shift = self.bitfield_shift;
                self.symbols
                    .create_member(field, "shift", None, shift, self.pass, &mut self.log)?;
                member_ty = field;
            } else {
                // the previous bitmap left bits dangling; start fresh
                self.bitfield_shift = 0;
                self.bitfield_size = 0;
            }
        }

        let member = self.symbols.create_member(
            inside,
            name,
            Some(member_ty),
            0,
            self.pass,
            &mut self.log,
        )?;
        let shown = self.symbols.value(member);
        self.listing.put_symbol(shown);
        self.trailing_check(rest);
        Ok(())
    }

    fn end_membered_type(&mut self, op: &str) {
        if let Some(inside) = self.inside_type {
            let size = self.symbols.size_of(inside);
            self.listing.put_symbol(size);
        }
        self.inside_type = None;
        self.next_enum = Value::constant(0);
        self.trailing_check(op);
    }

    /// TYPEDEF introduces an alias, either of an existing (possibly
    /// derived) type or of a procedure signature written as `name.(parms)`.
    pub fn dir_typedef(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        if size.is_some() {
            self.log.report(ErrorCode::InvSizeCode, None);
        }
        let look_for_dot = label.is_empty();
        let (name, rest) = if look_for_dot {
            parse_id(skip_space(op))
        } else {
            (label.to_string(), op)
        };
        if name.is_empty() {
            return Err(self.log.report(ErrorCode::ExpectedTypeName, None));
        }

        let proc_alias = (look_for_dot && rest.starts_with(".(")) ||
            (!look_for_dot && rest.starts_with('('));
        if proc_alias {
            let parm_list = if self.pass == 0 {
                let list = self.symbols.alloc("", SymbolKind::TypeProc, None, 0);
                self.symbols.create(
                    &name,
                    SymbolKind::TypeAlias,
                    Some(list),
                    0,
                    self.pass,
                    &mut self.log,
                )?;
                list
            } else {
                match self.symbols.lookup(&name).and_then(|s| self.symbols.ty(s)) {
                    Some(list) => list,
                    None => return Err(self.log.report(ErrorCode::UndefinedType, Some(name))),
                }
            };
            let rest = if look_for_dot { &rest[1..] } else { rest };
            let rest = self.parse_parameters(rest, parm_list, SymbolKind::ProcDef)?;
            self.trailing_check(rest);
        } else {
            let (ty, rest) = self.parse_type_spec(rest, look_for_dot)?;
            if let Some(ty) = ty {
                if name != self.symbols.name(ty) {
                    self.symbols.create(
                        &name,
                        SymbolKind::TypeAlias,
                        Some(ty),
                        0,
                        self.pass,
                        &mut self.log,
                    )?;
                }
            }
            self.trailing_check(rest);
        }
        Ok(())
    }

    /// Parse a type specification: a type name (or a bare size in bytes,
    /// which mints an anonymous simple type), `*` pointer derivations and
    /// `[dims]` array derivations.
    pub fn parse_type_spec<'a>(
        &mut self,
        s: &'a str,
        dot_first: bool,
    ) -> AsmResult<(Option<SymbolId>, &'a str)> {
        let mut s = s;
        if dot_first {
            let Some(after) = s.strip_prefix('.') else {
                return Err(self
                    .log
                    .report(ErrorCode::ExpectedPeriodBeforeType, Some(s.to_string())));
            };
            s = after;
        }

        let (id, mut rest) = parse_id(s);
        let base = if id.is_empty() {
            let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                return Err(self
                    .log
                    .report(ErrorCode::ExpectedTypeName, Some(s.to_string())));
            }
            rest = &s[digits.len()..];
            let size: i32 = digits.parse().unwrap_or(0);
            Some(self.symbols.create(
                &digits,
                SymbolKind::TypeSimple,
                None,
                size,
                self.pass,
                &mut self.log,
            )?)
        } else {
            self.symbols.lookup(&id)
        };

        let Some(mut ty) = base.filter(|&t| self.symbols.kind(t).category() == SymbolCategory::Type)
        else {
            self.log.report(ErrorCode::UndefinedType, Some(id));
            return Ok((None, rest));
        };

        while let Some(after) = rest.strip_prefix('*') {
            ty = self.symbols.create_derived(ty, SymbolKind::TypePointer, 0);
            rest = after;
        }

        while rest.starts_with('[') {
            loop {
                rest = skip_space(&rest[1..]);
                if rest.starts_with(']') || rest.starts_with(',') {
                    ty = self.symbols.create_derived(ty, SymbolKind::TypeArray, 0);
                } else {
                    let (dim, after) = self.evaluate(rest)?;
                    rest = after;
                    if dim.category() != SymbolCategory::Const {
                        self.log.report(ErrorCode::InvValueCategory, None);
                    }
                    ty = self
                        .symbols
                        .create_derived(ty, SymbolKind::TypeArray, dim.value);
                }
                if !rest.starts_with(',') {
                    break;
                }
            }
            if let Some(after) = rest.strip_prefix(']') {
                rest = after;
            }
        }

        Ok((Some(ty), skip_space(rest)))
    }
}
