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

pub mod builders;
pub mod movem;
pub mod table;

use crate::assembler::Assembler;
use crate::assembler::lexer::compact_operands;
use crate::assembler::operand::{AddrMode, Operand, Size};
use crate::assembler::symbol_table::Value;
use crate::errors::{AsmResult, ErrorCode};
use table::{Builder, Flavor, Instruction, lookup_mnemonic};

/// The 6-bit mode/register field most instructions use to encode an
/// effective address.
pub fn eff_addr(op: &Operand) -> u16 {
    let reg = op.reg as u16;
    match op.mode {
        AddrMode::DnDirect => reg,
        AddrMode::AnDirect => 0x08 | reg,
        AddrMode::AnInd => 0x10 | reg,
        AddrMode::AnIndPost => 0x18 | reg,
        AddrMode::AnIndPre => 0x20 | reg,
        AddrMode::AnIndDisp => 0x28 | reg,
        AddrMode::AnIndIndex => 0x30 | reg,
        AddrMode::AbsShort => 0x38,
        AddrMode::AbsLong => 0x39,
        AddrMode::PcDisp => 0x3A,
        AddrMode::PcIndex => 0x3B,
        AddrMode::Immediate => 0x3C,
        _ => unreachable!("system register operands carry no effective address"),
    }
}

impl Assembler<'_> {
    /// Parse the mnemonic and optional `.B`/`.W`/`.L`/`.S` suffix, then
    /// find the instruction-table entry by binary search.
    pub fn lookup_instruction<'a>(
        &mut self,
        s: &'a str,
    ) -> AsmResult<(&'static Instruction, Option<Size>, &'a str)> {
        let b = s.as_bytes();
        let mut end = 0;
        while end < b.len() && b[end].is_ascii_alphabetic() {
            end += 1;
        }
        let opcode = &s[..end];
        let mut rest = &s[end..];
        let mut size = None;

        let rb = rest.as_bytes();
        if rb.first() == Some(&b'.') {
            let size_ok = rb.get(1).is_some()
                && rb.get(2).is_none_or(|c| c.is_ascii_whitespace());
            if !size_ok {
                return Err(self.log.report(ErrorCode::Syntax, Some(rest.to_string())));
            }
            size = match rb[1].to_ascii_uppercase() {
                b'B' => Some(Size::Byte),
                b'W' => Some(Size::Word),
                b'L' => Some(Size::Long),
                b'S' => Some(Size::Short),
                _ => {
                    self.log
                        .report(ErrorCode::InvSizeCode, Some(rest.to_string()));
                    None
                }
            };
            rest = &rest[2..];
        } else if !rest.is_empty() && !rb[0].is_ascii_whitespace() {
            return Err(self.log.report(ErrorCode::Syntax, Some(rest.to_string())));
        }

        match lookup_mnemonic(opcode) {
            Some(inst) => Ok((inst, size, rest)),
            None => Err(self
                .log
                .report(ErrorCode::InvOpcode, Some(opcode.to_string()))),
        }
    }

    /// Pick the skeleton mask matching the size suffix, checking it against
    /// the flavor's legal size set.
    pub fn pick_mask(&mut self, size: Option<Size>, flavor: &Flavor) -> u16 {
        if size.is_none_or(|s| s.mask() & flavor.sizes != 0) {
            match size {
                Some(Size::Byte) | Some(Size::Short) => flavor.bytemask,
                None | Some(Size::Word) => flavor.wordmask,
                Some(Size::Long) => flavor.longmask,
            }
        } else {
            self.log.report(ErrorCode::InvSizeCode, None);
            flavor.wordmask
        }
    }

    /// Walk the flavor list: operands are parsed lazily the first time a
    /// flavor needs them, then each flavor's mode sets are tested against
    /// the parsed modes. The first match builds the instruction.
    pub fn dispatch_flavors(
        &mut self,
        flavors: &'static [Flavor],
        size: Option<Size>,
        operands: &str,
    ) -> AsmResult<()> {
        let Some(compact) = compact_operands(operands) else {
            return Err(self
                .log
                .report(ErrorCode::UnterminatedString, Some(operands.to_string())));
        };
        let mut p: &str = &compact;

        let mut source: Option<Operand> = None;
        let mut dest: Option<Operand> = None;

        for flavor in flavors {
            if source.is_none() && flavor.source != 0 {
                let (op, consumed) =
                    self.parse_operand(p, 1, flavor.builder == Builder::Branch)?;
                p = &p[consumed..];
                source = Some(op);
            }
            if dest.is_none() && flavor.dest != 0 {
                if !p.starts_with(',') {
                    return Err(self.log.report(ErrorCode::Syntax, Some(p.to_string())));
                }
                let (op, consumed) =
                    self.parse_operand(&p[1..], 2, flavor.builder == Builder::Dbcc)?;
                p = &p[1 + consumed..];
                if !p.is_empty() {
                    return Err(self.log.report(ErrorCode::Syntax, Some(p.to_string())));
                }
                dest = Some(op);
            }

            if flavor.source == 0 {
                let mask = self.pick_mask(size, flavor);
                let mut src = source.clone().unwrap_or_else(dummy_operand);
                let mut dst = dest.clone().unwrap_or_else(dummy_operand);
                return self.build(flavor.builder, mask, size, &mut src, &mut dst);
            }
            let src_match = source
                .as_ref()
                .is_some_and(|s| s.mode.mask() & flavor.source != 0);
            if src_match && flavor.dest == 0 {
                if !p.is_empty() {
                    return Err(self.log.report(ErrorCode::Syntax, Some(p.to_string())));
                }
                let mask = self.pick_mask(size, flavor);
                let mut src = source.clone().unwrap();
                let mut dst = dummy_operand();
                return self.build(flavor.builder, mask, size, &mut src, &mut dst);
            }
            let dst_match = dest
                .as_ref()
                .is_some_and(|d| d.mode.mask() & flavor.dest != 0);
            if src_match && dst_match {
                let mask = self.pick_mask(size, flavor);
                let mut src = source.clone().unwrap();
                let mut dst = dest.clone().unwrap();
                return self.build(flavor.builder, mask, size, &mut src, &mut dst);
            }
        }
        Err(self.log.report(ErrorCode::InvAddrMode, None))
    }

    /// Emit the extension words an effective address needs: displacements,
    /// index words, absolute addresses and immediate data. PC-relative
    /// displacements are measured from the extension word's own location.
    pub fn ext_words(&mut self, op: &Operand, size: Option<Size>) {
        match op.mode {
            AddrMode::DnDirect
            | AddrMode::AnDirect
            | AddrMode::AnInd
            | AddrMode::AnIndPost
            | AddrMode::AnIndPre => {}
            AddrMode::AnIndDisp | AddrMode::PcDisp => {
                if self.pass == 2 {
                    let mut disp = op.data.value;
                    if op.mode == AddrMode::PcDisp {
                        disp -= self.sections.out_loc as i32;
                    } else {
                        self.check_operand_type_size(op, size);
                    }
                    self.output(disp & 0xFFFF, Size::Word);
                    if !(-32768..=32767).contains(&disp) {
                        self.log.report(ErrorCode::InvDisp, None);
                    }
                }
                self.sections.out_loc += 2;
            }
            AddrMode::AnIndIndex | AddrMode::PcIndex => {
                if self.pass == 2 {
                    let mut disp = op.data.value;
                    if op.mode == AddrMode::PcIndex {
                        disp -= self.sections.out_loc as i32;
                    } else {
                        self.check_operand_type_size(op, size);
                    }
                    let long_bit = if op.index_size == Size::Long { 0x800 } else { 0 };
                    self.output(
                        long_bit | (op.index as i32) << 12 | (disp & 0xFF),
                        Size::Word,
                    );
                    if !(-128..=127).contains(&disp) {
                        self.log.report(ErrorCode::InvDisp, None);
                    }
                }
                self.sections.out_loc += 2;
            }
            AddrMode::AbsShort => {
                if self.pass == 2 {
                    self.output(op.data.value & 0xFFFF, Size::Word);
                    if !(-32768..=32767).contains(&op.data.value) {
                        self.log.report(ErrorCode::InvAbsAddress, None);
                    }
                }
                self.sections.out_loc += 2;
            }
            AddrMode::AbsLong => {
                if self.pass == 2 {
                    self.output(op.data.value, Size::Long);
                }
                self.sections.out_loc += 4;
            }
            AddrMode::Immediate => match size {
                None | Some(Size::Word) => {
                    if self.pass == 2 {
                        self.output(op.data.value & 0xFFFF, Size::Word);
                        if op.data.value > 0xFFFF {
                            self.log.report(ErrorCode::Inv16BitData, None);
                        }
                    }
                    self.sections.out_loc += 2;
                }
                Some(Size::Byte) | Some(Size::Short) => {
                    if self.pass == 2 {
                        self.output(op.data.value & 0xFF, Size::Word);
                        if !(-32768..=32767).contains(&op.data.value) {
                            self.log.report(ErrorCode::Inv8BitData, None);
                        }
                    }
                    self.sections.out_loc += 2;
                }
                Some(Size::Long) => {
                    if self.pass == 2 {
                        self.output(op.data.value, Size::Long);
                    }
                    self.sections.out_loc += 4;
                }
            },
            _ => {}
        }
    }

    /// A displacement that came from a typed symbol should agree with the
    /// instruction's operation size.
    fn check_operand_type_size(&mut self, op: &Operand, size: Option<Size>) {
        if let (Some(ty), Some(size)) = (op.data.ty, size) {
            let type_size = self.symbols.size_of(ty);
            if type_size > 0 && type_size <= 4 && type_size as u32 != size.bytes() {
                self.log.report(ErrorCode::InstrAndOperSizeMismatch, None);
            }
        }
    }
}

fn dummy_operand() -> Operand {
    Operand {
        mode: AddrMode::DnDirect,
        data: Value::constant(0),
        reg: 0,
        index: 0,
        index_size: Size::Word,
    }
}
