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

use crate::assembler::Assembler;
use crate::assembler::guard::{GUARD_ABS_LONG, GUARD_ABS_SHORT};
use crate::assembler::symbol_table::{SymbolCategory, SymbolKind, Value};
use crate::errors::{AsmResult, ErrorCode};

// operation size codes, also used as bit masks in flavor size sets
pub const BYTE: u8 = 1;
pub const WORD: u8 = 2;
pub const LONG: u8 = 4;
pub const SHORT: u8 = 8;

pub const BW: u8 = BYTE | WORD;
pub const WL: u8 = WORD | LONG;
pub const BWL: u8 = BYTE | WORD | LONG;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Size {
    Byte,
    Word,
    Long,
    Short,
}

impl Size {
    pub fn mask(self) -> u8 {
        match self {
            Size::Byte => BYTE,
            Size::Word => WORD,
            Size::Long => LONG,
            Size::Short => SHORT,
        }
    }

    /// Bytes this size occupies in the output stream.
    pub fn bytes(self) -> u32 {
        match self {
            Size::Byte | Size::Short => 1,
            Size::Word => 2,
            Size::Long => 4,
        }
    }
}

// addressing mode bit masks
pub const DN_DIRECT: u32 = 0x00001;
pub const AN_DIRECT: u32 = 0x00002;
pub const AN_IND: u32 = 0x00004;
pub const AN_IND_POST: u32 = 0x00008;
pub const AN_IND_PRE: u32 = 0x00010;
pub const AN_IND_DISP: u32 = 0x00020;
pub const AN_IND_INDEX: u32 = 0x00040;
pub const ABS_SHORT: u32 = 0x00080;
pub const ABS_LONG: u32 = 0x00100;
pub const PC_DISP: u32 = 0x00200;
pub const PC_INDEX: u32 = 0x00400;
pub const IMMEDIATE: u32 = 0x00800;
pub const SR_DIRECT: u32 = 0x01000;
pub const CCR_DIRECT: u32 = 0x02000;
pub const USP_DIRECT: u32 = 0x04000;
pub const SFC_DIRECT: u32 = 0x08000;
pub const DFC_DIRECT: u32 = 0x10000;
pub const VBR_DIRECT: u32 = 0x20000;

// mode classes used by the instruction table
pub const DATA: u32 = DN_DIRECT
    | AN_IND
    | AN_IND_POST
    | AN_IND_PRE
    | AN_IND_DISP
    | AN_IND_INDEX
    | ABS_SHORT
    | ABS_LONG
    | PC_DISP
    | PC_INDEX
    | IMMEDIATE;
pub const MEMORY: u32 = AN_IND
    | AN_IND_POST
    | AN_IND_PRE
    | AN_IND_DISP
    | AN_IND_INDEX
    | ABS_SHORT
    | ABS_LONG
    | PC_DISP
    | PC_INDEX
    | IMMEDIATE;
pub const CONTROL: u32 =
    AN_IND | AN_IND_DISP | AN_IND_INDEX | ABS_SHORT | ABS_LONG | PC_DISP | PC_INDEX;
pub const ALTER: u32 = DN_DIRECT
    | AN_DIRECT
    | AN_IND
    | AN_IND_POST
    | AN_IND_PRE
    | AN_IND_DISP
    | AN_IND_INDEX
    | ABS_SHORT
    | ABS_LONG;
pub const ALL: u32 = DATA | MEMORY | CONTROL | ALTER;
pub const DATA_ALT: u32 = DATA & ALTER;
pub const MEM_ALT: u32 = MEMORY & ALTER;
pub const ABSOLUTE: u32 = ABS_LONG | ABS_SHORT;
pub const GEN_REG: u32 = DN_DIRECT | AN_DIRECT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrMode {
    DnDirect,
    AnDirect,
    AnInd,
    AnIndPost,
    AnIndPre,
    AnIndDisp,
    AnIndIndex,
    AbsShort,
    AbsLong,
    PcDisp,
    PcIndex,
    Immediate,
    SrDirect,
    CcrDirect,
    UspDirect,
    SfcDirect,
    DfcDirect,
    VbrDirect,
}

impl AddrMode {
    pub fn mask(self) -> u32 {
        use AddrMode::*;
        match self {
            DnDirect => DN_DIRECT,
            AnDirect => AN_DIRECT,
            AnInd => AN_IND,
            AnIndPost => AN_IND_POST,
            AnIndPre => AN_IND_PRE,
            AnIndDisp => AN_IND_DISP,
            AnIndIndex => AN_IND_INDEX,
            AbsShort => ABS_SHORT,
            AbsLong => ABS_LONG,
            PcDisp => PC_DISP,
            PcIndex => PC_INDEX,
            Immediate => IMMEDIATE,
            SrDirect => SR_DIRECT,
            CcrDirect => CCR_DIRECT,
            UspDirect => USP_DIRECT,
            SfcDirect => SFC_DIRECT,
            DfcDirect => DFC_DIRECT,
            VbrDirect => VBR_DIRECT,
        }
    }
}

/// A parsed operand: the recognized addressing mode, the principal
/// register, the evaluated displacement/address/immediate, and the index
/// register description where one applies (0-7 = D0-D7, 8-15 = A0-A7).
#[derive(Debug, Clone)]
pub struct Operand {
    pub mode: AddrMode,
    pub data: Value,
    pub reg: u8,
    pub index: u8,
    pub index_size: Size,
}

impl Operand {
    fn new(mode: AddrMode) -> Self {
        Operand {
            mode,
            data: Value::constant(0),
            reg: 0,
            index: 0,
            index_size: Size::Word,
        }
    }
}

fn is_term(b: Option<&u8>) -> bool {
    match b.copied() {
        None | Some(b',') | Some(b';') => true,
        Some(c) => c.is_ascii_whitespace(),
    }
}

fn is_reg_num(b: u8) -> bool {
    (b'0'..=b'7').contains(&b)
}

/// Parse `(An...` / `(SP...` style suffixes shared by the indirect and
/// displacement forms: returns (reg, consumed, index part) for
/// `(An)`, `(An,Xn)`, `(An,Xn.W)`, `(An,Xn.L)`.
struct IndexPart {
    index: u8,
    size: Size,
    consumed: usize,
}

fn parse_index(u: &[u8]) -> Result<Option<IndexPart>, usize> {
    // called with u positioned at the character after the base register,
    // which is either ')' for the plain form or ',' for the indexed form
    match u.first().copied() {
        Some(b')') => Ok(None),
        Some(b',') if u.len() >= 3 && (u[1] == b'A' || u[1] == b'D') && is_reg_num(u[2]) => {
            let mut index = u[2] - b'0';
            if u[1] == b'A' {
                index += 8;
            }
            match u.get(3).copied() {
                Some(b'.') => match u.get(4).copied() {
                    Some(b'W') if u.get(5) == Some(&b')') => Ok(Some(IndexPart {
                        index,
                        size: Size::Word,
                        consumed: 6,
                    })),
                    Some(b'L') if u.get(5) == Some(&b')') => Ok(Some(IndexPart {
                        index,
                        size: Size::Long,
                        consumed: 6,
                    })),
                    _ => Err(4),
                },
                Some(b')') => Ok(Some(IndexPart {
                    index,
                    size: Size::Word,
                    consumed: 4,
                })),
                _ => Err(3),
            }
        }
        _ => Err(0),
    }
}

impl Assembler<'_> {
    /// Recognize one operand out of the compacted operand field. `s` must
    /// already be whitespace-squeezed and comment-free; matching happens
    /// against an uppercased shadow while expressions keep their case.
    /// Returns the descriptor and the number of bytes consumed.
    pub fn parse_operand(
        &mut self,
        s: &str,
        guard_sub: u8,
        branch_target: bool,
    ) -> AsmResult<(Operand, usize)> {
        let (op, consumed) = self.recognize_operand(s, guard_sub)?;

        // semantic contracts tied to the displacement's category
        match op.mode {
            AddrMode::AnIndDisp | AddrMode::AnIndIndex => match op.data.category() {
                SymbolCategory::Code => {
                    self.log.report(ErrorCode::CodeAddressNotPc, Some(s.to_string()));
                }
                SymbolCategory::Data if op.reg != 5 => {
                    self.log
                        .report(ErrorCode::GlobalDataAddressNotA5, Some(s.to_string()));
                }
                SymbolCategory::Stack if op.reg != 6 => {
                    self.log
                        .report(ErrorCode::StackAddressNotA6, Some(s.to_string()));
                }
                _ => {}
            },
            AddrMode::AbsShort | AddrMode::AbsLong => {
                if !branch_target || op.data.category() != SymbolCategory::Code {
                    self.log
                        .report(ErrorCode::AbsoluteAddress, Some(s.to_string()));
                }
            }
            AddrMode::PcDisp | AddrMode::PcIndex => {
                if op.data.category() != SymbolCategory::Code {
                    self.log
                        .report(ErrorCode::PcWithNonCodeAddr, Some(s.to_string()));
                }
            }
            AddrMode::Immediate => {
                if op.data.category() != SymbolCategory::Const {
                    self.log
                        .report(ErrorCode::ImmediateNotAConstant, Some(s.to_string()));
                }
            }
            _ => {}
        }

        Ok((op, consumed))
    }

    fn recognize_operand(&mut self, s: &str, guard_sub: u8) -> AsmResult<(Operand, usize)> {
        let upper = s.to_ascii_uppercase();
        let u = upper.as_bytes();

        // immediate
        if u.first() == Some(&b'#') {
            let (value, rest) = self.evaluate(&s[1..])?;
            let consumed = s.len() - rest.len();
            if !is_term(u.get(consumed)) {
                return Err(self.log.report(ErrorCode::Syntax, Some(rest.to_string())));
            }
            let mut op = Operand::new(AddrMode::Immediate);
            op.data = value;
            return Ok((op, consumed));
        }

        // data / address register direct
        if u.len() >= 2 && is_reg_num(u[1]) && is_term(u.get(2)) {
            if u[0] == b'D' {
                let mut op = Operand::new(AddrMode::DnDirect);
                op.reg = u[1] - b'0';
                return Ok((op, 2));
            }
            if u[0] == b'A' {
                let mut op = Operand::new(AddrMode::AnDirect);
                op.reg = u[1] - b'0';
                return Ok((op, 2));
            }
        }
        // stack pointer alias
        if u.starts_with(b"SP") && is_term(u.get(2)) {
            let mut op = Operand::new(AddrMode::AnDirect);
            op.reg = 7;
            return Ok((op, 2));
        }

        // address register indirect, postincrement, indexed
        if u.first() == Some(&b'(')
            && u.len() >= 4
            && ((u[1] == b'A' && is_reg_num(u[2])) || (u[1] == b'S' && u[2] == b'P'))
        {
            let reg = if u[1] == b'S' { 7 } else { u[2] - b'0' };
            if u[3] == b')' {
                if is_term(u.get(4)) {
                    let mut op = Operand::new(AddrMode::AnInd);
                    op.reg = reg;
                    return Ok((op, 4));
                }
                if u.get(4) == Some(&b'+') {
                    let mut op = Operand::new(AddrMode::AnIndPost);
                    op.reg = reg;
                    return Ok((op, 5));
                }
            }
            match parse_index(&u[3..]) {
                Ok(Some(part)) => {
                    let mut op = Operand::new(AddrMode::AnIndIndex);
                    op.reg = reg;
                    op.index = part.index;
                    op.index_size = part.size;
                    return Ok((op, 3 + part.consumed));
                }
                Ok(None) | Err(_) => {}
            }
        }

        // predecrement
        if u.starts_with(b"-(")
            && u.len() >= 5
            && u[4] == b')'
            && ((u[2] == b'A' && is_reg_num(u[3])) || (u[2] == b'S' && u[3] == b'P'))
        {
            let mut op = Operand::new(AddrMode::AnIndPre);
            op.reg = if u[2] == b'S' { 7 } else { u[3] - b'0' };
            return Ok((op, 5));
        }

        // PC relative with zero displacement
        if u.starts_with(b"(PC") {
            let mut data = Value::constant(0);
            data.kind = SymbolKind::Code;
            if u.get(3) == Some(&b')') {
                let mut op = Operand::new(AddrMode::PcDisp);
                op.data = data;
                return Ok((op, 4));
            }
            // anything else may still be a parenthesized expression
            if let Ok(Some(part)) = parse_index(&u[3..]) {
                let mut op = Operand::new(AddrMode::PcIndex);
                op.data = data;
                op.index = part.index;
                op.index_size = part.size;
                return Ok((op, 3 + part.consumed));
            }
        }

        // special registers
        for (name, mode) in [
            ("SR", AddrMode::SrDirect),
            ("CCR", AddrMode::CcrDirect),
            ("USP", AddrMode::UspDirect),
            ("SFC", AddrMode::SfcDirect),
            ("DFC", AddrMode::DfcDirect),
            ("VBR", AddrMode::VbrDirect),
        ] {
            if u.starts_with(name.as_bytes()) && is_term(u.get(name.len())) {
                return Ok((Operand::new(mode), name.len()));
            }
        }

        // everything else starts with an expression
        let (value, rest) = self.evaluate(s)?;
        let mut pos = s.len() - rest.len();

        // explicit absolute size: (expr).W / (expr).L
        let t = &u[pos..];
        if t.len() >= 2 && t[0] == b'.' && is_term(t.get(2)) {
            if t[1] == b'W' {
                let mut op = Operand::new(AddrMode::AbsShort);
                op.data = value;
                if !(-32768..=32767).contains(&value.value) {
                    self.log.report(ErrorCode::InvAbsAddress, None);
                }
                return Ok((op, pos + 2));
            }
            if t[1] == b'L' {
                let mut op = Operand::new(AddrMode::AbsLong);
                op.data = value;
                return Ok((op, pos + 2));
            }
        }

        // bare expression: an absolute address, short when it fits
        if is_term(u.get(pos)) {
            let mode = if self.pass < 2 {
                let mode = if value.value > 32767
                    || value.value < -32768
                    || value.kind == SymbolKind::Undefined
                {
                    AddrMode::AbsLong
                } else {
                    AddrMode::AbsShort
                };
                if self.pass > 0 {
                    self.guard_set(
                        guard_sub,
                        if mode == AddrMode::AbsShort {
                            GUARD_ABS_SHORT
                        } else {
                            GUARD_ABS_LONG
                        },
                    );
                }
                mode
            } else {
                let guarded = self.guard_get(guard_sub)?;
                if guarded == GUARD_ABS_SHORT
                    && (value.value > 32767 || value.value < -32768)
                {
                    return Err(self.log.report(ErrorCode::GuardError, None));
                }
                if guarded == GUARD_ABS_SHORT {
                    AddrMode::AbsShort
                } else {
                    AddrMode::AbsLong
                }
            };
            let mut op = Operand::new(mode);
            op.data = value;
            return Ok((op, pos));
        }

        // displacement followed by (An...) or (PC...)
        let t = &u[pos..];
        if t.first() == Some(&b'(')
            && t.len() >= 4
            && ((t[1] == b'A' && is_reg_num(t[2])) || (t[1] == b'S' && t[2] == b'P'))
        {
            let reg = if t[1] == b'S' { 7 } else { t[2] - b'0' };
            if t[3] == b')' {
                let mut op = Operand::new(if value.value == 0 {
                    AddrMode::AnInd
                } else {
                    AddrMode::AnIndDisp
                });
                op.reg = reg;
                op.data = value;
                return Ok((op, pos + 4));
            }
            match parse_index(&t[3..]) {
                Ok(Some(part)) => {
                    let mut op = Operand::new(AddrMode::AnIndIndex);
                    op.reg = reg;
                    op.data = value;
                    op.index = part.index;
                    op.index_size = part.size;
                    return Ok((op, pos + 3 + part.consumed));
                }
                Ok(None) => {}
                Err(off) => {
                    pos += 3 + off;
                    return Err(self.log.report(ErrorCode::Syntax, Some(s[pos..].to_string())));
                }
            }
        }
        if t.starts_with(b"(PC") {
            if t.get(3) == Some(&b')') {
                let mut op = Operand::new(AddrMode::PcDisp);
                op.data = value;
                return Ok((op, pos + 4));
            }
            match parse_index(&t[3..]) {
                Ok(Some(part)) => {
                    let mut op = Operand::new(AddrMode::PcIndex);
                    op.data = value;
                    op.index = part.index;
                    op.index_size = part.size;
                    return Ok((op, pos + 3 + part.consumed));
                }
                Ok(None) => {}
                Err(off) => {
                    pos += 3 + off;
                    return Err(self.log.report(ErrorCode::Syntax, Some(s[pos..].to_string())));
                }
            }
        }

        Err(self.log.report(ErrorCode::Syntax, Some(s[pos..].to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Options;
    use crate::assembler::Assembler;
    use crate::file_reader::MockFileReader;

    fn parse(s: &str) -> Operand {
        let reader = MockFileReader::default();
        let mut asm = Assembler::new("t.asm".into(), Options::default(), &reader);
        asm.log.set_position("t.asm", 1);
        let (op, consumed) = asm.parse_operand(s, 1, false).unwrap();
        assert_eq!(consumed, s.len(), "operand not fully consumed: {}", s);
        op
    }

    #[test]
    fn register_direct_modes() {
        assert_eq!(parse("D3").mode, AddrMode::DnDirect);
        assert_eq!(parse("D3").reg, 3);
        assert_eq!(parse("a5").mode, AddrMode::AnDirect);
        assert_eq!(parse("SP").reg, 7);
    }

    #[test]
    fn indirect_modes() {
        assert_eq!(parse("(A2)").mode, AddrMode::AnInd);
        assert_eq!(parse("(A2)+").mode, AddrMode::AnIndPost);
        assert_eq!(parse("-(SP)").mode, AddrMode::AnIndPre);
        let op = parse("12(A5,D3.L)");
        assert_eq!(op.mode, AddrMode::AnIndIndex);
        assert_eq!(op.reg, 5);
        assert_eq!(op.index, 3);
        assert_eq!(op.index_size, Size::Long);
        assert_eq!(op.data.value, 12);
    }

    #[test]
    fn displacement_of_zero_collapses_to_indirect() {
        assert_eq!(parse("0(A3)").mode, AddrMode::AnInd);
        assert_eq!(parse("2(A3)").mode, AddrMode::AnIndDisp);
    }

    #[test]
    fn immediate_and_special_registers() {
        let op = parse("#$FF");
        assert_eq!(op.mode, AddrMode::Immediate);
        assert_eq!(op.data.value, 255);
        assert_eq!(parse("SR").mode, AddrMode::SrDirect);
        assert_eq!(parse("CCR").mode, AddrMode::CcrDirect);
        assert_eq!(parse("USP").mode, AddrMode::UspDirect);
        assert_eq!(parse("VBR").mode, AddrMode::VbrDirect);
    }

    #[test]
    fn absolute_size_selection() {
        // pass 0: short when the value fits a signed word
        assert_eq!(parse("$1000").mode, AddrMode::AbsShort);
        assert_eq!(parse("$10000").mode, AddrMode::AbsLong);
        // explicit forcing suffixes
        assert_eq!(parse("($10).L").mode, AddrMode::AbsLong);
        assert_eq!(parse("($10).W").mode, AddrMode::AbsShort);
    }

    #[test]
    fn pc_relative() {
        let op = parse("(PC)");
        assert_eq!(op.mode, AddrMode::PcDisp);
        assert_eq!(op.data.kind, SymbolKind::Code);
        let op = parse("(PC,D2.W)");
        assert_eq!(op.mode, AddrMode::PcIndex);
        assert_eq!(op.index, 2);
    }

    #[test]
    fn mode_masks_match_classes() {
        assert_ne!(AddrMode::DnDirect.mask() & DATA_ALT, 0);
        assert_eq!(AddrMode::AnDirect.mask() & DATA, 0);
        assert_ne!(AddrMode::PcDisp.mask() & CONTROL, 0);
        assert_eq!(AddrMode::Immediate.mask() & ALTER, 0);
        assert_eq!(AddrMode::SrDirect.mask() & ALL, 0);
    }
}
