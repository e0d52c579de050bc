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

//! Instruction builders. Each routine assembles the opcode word from the
//! skeleton mask and the operand descriptors, emits extension words, and
//! advances the location counter by the same amount in every pass. Bytes
//! only reach the output buffer in pass 2.

use crate::assembler::Assembler;
use crate::assembler::encoder::eff_addr;
use crate::assembler::encoder::table::Builder;
use crate::assembler::guard::*;
use crate::assembler::operand::{AddrMode, Operand, Size};
use crate::assembler::symbol_table::SymbolKind;
use crate::errors::{AsmResult, ErrorCode};

impl Assembler<'_> {
    pub fn build(
        &mut self,
        builder: Builder,
        mask: u16,
        size: Option<Size>,
        src: &mut Operand,
        dst: &mut Operand,
    ) -> AsmResult<()> {
        match builder {
            Builder::Move => self.build_move(mask, size, src, dst),
            Builder::ZeroOp => self.build_zero_op(mask),
            Builder::OneOp => self.build_one_op(mask, size, src),
            Builder::ArithReg => self.build_arith_reg(mask, size, src, dst),
            Builder::ArithAddr => self.build_arith_addr(mask, size, src, dst),
            Builder::ImmedInst => self.build_immed_inst(mask, size, src, dst),
            Builder::QuickMath => self.build_quick_math(mask, size, src, dst),
            Builder::Movep => self.build_movep(mask, size, src, dst),
            Builder::Moves => self.build_moves(mask, size, src, dst),
            Builder::MoveReg => self.build_move_reg(mask, size, dst),
            Builder::StaticBit => self.build_static_bit(mask, size, src, dst),
            Builder::Movec => self.build_movec(mask, src, dst),
            Builder::Trap => self.build_trap(mask, src),
            Builder::Branch => self.build_branch(mask, size, src),
            Builder::Moveq => self.build_moveq(mask, src, dst),
            Builder::ImmedToCcr => self.build_immed_to_ccr(mask, src),
            Builder::ImmedWord => self.build_immed_word(mask, src),
            Builder::Dbcc => self.build_dbcc(mask, src, dst),
            Builder::Scc => self.build_scc(mask, size, src),
            Builder::ShiftReg => self.build_shift_reg(mask, src, dst),
            Builder::Exg => self.build_exg(mask, src, dst),
            Builder::TwoReg => self.build_two_reg(mask, src, dst),
            Builder::OneReg => self.build_one_reg(mask, src),
            Builder::MoveUsp => self.build_move_usp(mask, src, dst),
            Builder::LinkOp => self.build_link(mask, src, dst),
        }
    }

    /// MOVE and MOVEA, with the guarded MOVEQ downgrade for byte-range
    /// long immediates into a data register.
    fn build_move(
        &mut self,
        mask: u16,
        size: Option<Size>,
        src: &mut Operand,
        dst: &mut Operand,
    ) -> AsmResult<()> {
        let quick = src.mode == AddrMode::Immediate
            && size == Some(Size::Long)
            && dst.mode == AddrMode::DnDirect
            && (-128..=127).contains(&src.data.value)
            && src.data.kind != SymbolKind::Undefined;

        if quick {
            if self.pass == 1 {
                self.guard_set(0, GUARD_USE_MOVEQ);
            }
            if self.pass == 1 || (self.pass == 2 && self.guard_get(0)? == GUARD_USE_MOVEQ) {
                return self.build_moveq(0x7000, src, dst);
            }
        } else {
            if self.pass == 1 {
                self.guard_set(0, GUARD_USE_MOVE);
            } else if self.pass == 2 && self.guard_get(0)? != GUARD_USE_MOVE {
                return Err(self.log.report(ErrorCode::GuardError, None));
            }
        }

        let mut move_mask = mask | eff_addr(src);
        let dest_code = eff_addr(dst) & 0xFF;
        move_mask |= (dest_code & 0x38) << 3 | (dest_code & 7) << 9;
        if self.pass == 2 {
            self.output(move_mask as i32, Size::Word);
        }
        self.sections.out_loc += 2;
        self.ext_words(src, size);
        self.ext_words(dst, size);
        Ok(())
    }

    fn build_zero_op(&mut self, mask: u16) -> AsmResult<()> {
        if self.pass == 2 {
            self.output(mask as i32, Size::Word);
        }
        self.sections.out_loc += 2;
        Ok(())
    }

    fn build_one_op(&mut self, mask: u16, size: Option<Size>, src: &Operand) -> AsmResult<()> {
        if self.pass == 2 {
            self.output((mask | eff_addr(src)) as i32, Size::Word);
        }
        self.sections.out_loc += 2;
        self.ext_words(src, size);
        Ok(())
    }

    fn build_arith_reg(
        &mut self,
        mask: u16,
        size: Option<Size>,
        src: &Operand,
        dst: &Operand,
    ) -> AsmResult<()> {
        if self.pass == 2 {
            self.output(
                (mask | eff_addr(src) | (dst.reg as u16) << 9) as i32,
                Size::Word,
            );
        }
        self.sections.out_loc += 2;
        self.ext_words(src, size);
        Ok(())
    }

    fn build_arith_addr(
        &mut self,
        mask: u16,
        size: Option<Size>,
        src: &Operand,
        dst: &Operand,
    ) -> AsmResult<()> {
        if self.pass == 2 {
            self.output(
                (mask | eff_addr(dst) | (src.reg as u16) << 9) as i32,
                Size::Word,
            );
        }
        self.sections.out_loc += 2;
        self.ext_words(dst, size);
        Ok(())
    }

    /// ADDI/ANDI/CMPI/EORI/ORI/SUBI, downgrading immediate ADD/SUB with a
    /// quick-range constant to ADDQ/SUBQ under guard.
    fn build_immed_inst(
        &mut self,
        mask: u16,
        size: Option<Size>,
        src: &mut Operand,
        dst: &mut Operand,
    ) -> AsmResult<()> {
        let op_class = mask & 0xFF00;
        let quick = (op_class == 0x0600 || op_class == 0x0400)
            && (1..=8).contains(&src.data.value)
            && src.data.kind != SymbolKind::Undefined;

        if quick {
            if self.pass == 1 {
                self.guard_set(0, GUARD_USE_QUICKMATH);
            }
            if self.pass == 1 || (self.pass == 2 && self.guard_get(0)? == GUARD_USE_QUICKMATH) {
                let quick_mask = if op_class == 0x0600 { 0x5000 } else { 0x5100 };
                return self.build_quick_math(quick_mask | (mask & 0x00C0), size, src, dst);
            }
        } else {
            if self.pass == 1 {
                self.guard_set(0, GUARD_NO_QUICKMATH);
            } else if self.pass == 2 && self.guard_get(0)? != GUARD_NO_QUICKMATH {
                return Err(self.log.report(ErrorCode::GuardError, None));
            }
        }

        if self.pass == 2 {
            self.output((mask | eff_addr(dst)) as i32, Size::Word);
        }
        self.sections.out_loc += 2;
        self.ext_words(src, size);
        self.ext_words(dst, size);
        Ok(())
    }

    fn build_quick_math(
        &mut self,
        mask: u16,
        size: Option<Size>,
        src: &Operand,
        dst: &Operand,
    ) -> AsmResult<()> {
        if self.pass == 2 {
            self.output(
                (mask | eff_addr(dst) | ((src.data.value as u16 & 7) << 9)) as i32,
                Size::Word,
            );
            if !(1..=8).contains(&src.data.value) {
                self.log.report(ErrorCode::InvQuickConst, None);
            }
        }
        self.sections.out_loc += 2;
        self.ext_words(dst, size);
        Ok(())
    }

    fn build_movep(
        &mut self,
        mask: u16,
        size: Option<Size>,
        src: &mut Operand,
        dst: &mut Operand,
    ) -> AsmResult<()> {
        if self.pass == 2 {
            if src.mode == AddrMode::DnDirect {
                // plain indirect becomes a zero displacement
                if dst.mode == AddrMode::AnInd {
                    dst.mode = AddrMode::AnIndDisp;
                    dst.data = crate::assembler::symbol_table::Value::constant(0);
                }
                self.output(
                    (mask | (src.reg as u16) << 9 | dst.reg as u16) as i32,
                    Size::Word,
                );
                self.sections.out_loc += 2;
                self.ext_words(dst, size);
            } else {
                if src.mode == AddrMode::AnInd {
                    src.mode = AddrMode::AnIndDisp;
                    src.data = crate::assembler::symbol_table::Value::constant(0);
                }
                self.output(
                    (mask | (dst.reg as u16) << 9 | src.reg as u16) as i32,
                    Size::Word,
                );
                self.sections.out_loc += 2;
                self.ext_words(src, size);
            }
        } else {
            self.sections.out_loc += 4;
        }
        Ok(())
    }

    fn build_moves(
        &mut self,
        mask: u16,
        size: Option<Size>,
        src: &Operand,
        dst: &Operand,
    ) -> AsmResult<()> {
        let src_is_reg = src.mode.mask() & (crate::assembler::operand::GEN_REG) != 0;
        if self.pass == 2 {
            if src_is_reg {
                self.output((mask | eff_addr(dst)) as i32, Size::Word);
                self.sections.out_loc += 2;
                let reg_word = if src.mode == AddrMode::DnDirect {
                    0x0800 | (src.reg as u16) << 12
                } else {
                    0x8800 | (src.reg as u16) << 12
                };
                self.output(reg_word as i32, Size::Word);
                self.sections.out_loc += 2;
            } else {
                self.output((mask | eff_addr(src)) as i32, Size::Word);
                self.sections.out_loc += 2;
                let reg_word = if dst.mode == AddrMode::DnDirect {
                    (dst.reg as u16) << 12
                } else {
                    0x8000 | (dst.reg as u16) << 12
                };
                self.output(reg_word as i32, Size::Word);
                self.sections.out_loc += 2;
            }
        } else {
            self.sections.out_loc += 4;
        }
        self.ext_words(if src_is_reg { dst } else { src }, size);
        Ok(())
    }

    fn build_move_reg(&mut self, mask: u16, size: Option<Size>, dst: &Operand) -> AsmResult<()> {
        if self.pass == 2 {
            self.output((mask | eff_addr(dst)) as i32, Size::Word);
        }
        self.sections.out_loc += 2;
        self.ext_words(dst, size);
        Ok(())
    }

    fn build_static_bit(
        &mut self,
        mask: u16,
        size: Option<Size>,
        src: &Operand,
        dst: &Operand,
    ) -> AsmResult<()> {
        if self.pass == 2 {
            self.output((mask | eff_addr(dst)) as i32, Size::Word);
            self.sections.out_loc += 2;
            self.output(src.data.value & 0xFF, Size::Word);
            self.sections.out_loc += 2;
        } else {
            self.sections.out_loc += 4;
        }
        self.ext_words(dst, size);
        Ok(())
    }

    fn build_movec(&mut self, mask: u16, src: &Operand, dst: &Operand) -> AsmResult<()> {
        if self.pass == 2 {
            self.output(mask as i32, Size::Word);
            self.sections.out_loc += 2;
            let (reg_op, control_mode) = if mask & 1 != 0 {
                (src, dst.mode)
            } else {
                (dst, src.mode)
            };
            let mut word = (reg_op.reg as u16) << 12;
            if reg_op.mode == AddrMode::AnDirect {
                word |= 0x8000;
            }
            word |= match control_mode {
                AddrMode::SfcDirect => 0x000,
                AddrMode::DfcDirect => 0x001,
                AddrMode::UspDirect => 0x800,
                AddrMode::VbrDirect => 0x801,
                _ => 0,
            };
            self.output(word as i32, Size::Word);
            self.sections.out_loc += 2;
        } else {
            self.sections.out_loc += 4;
        }
        Ok(())
    }

    fn build_trap(&mut self, mask: u16, src: &Operand) -> AsmResult<()> {
        if self.pass == 2 {
            self.output((mask as i32) | (src.data.value & 0xF), Size::Word);
            if !(0..=15).contains(&src.data.value) {
                self.log.report(ErrorCode::InvVectorNum, None);
            }
        }
        self.sections.out_loc += 2;
        Ok(())
    }

    /// Conditional and unconditional branches. The length decision made in
    /// pass 1 is guarded; a short branch that stops fitting in pass 2 is a
    /// hard failure the programmer resolves with an explicit `.L`.
    fn build_branch(&mut self, mask: u16, size: Option<Size>, src: &Operand) -> AsmResult<()> {
        let disp = if src.data.kind == SymbolKind::Undefined {
            32000 // force the long form while the target is unknown
        } else {
            src.data.value - self.sections.out_loc as i32 - 2
        };

        let short_fits = size == Some(Size::Short)
            || (size != Some(Size::Long) && (-128..=127).contains(&disp) && disp != 0);
        let use_short =
            short_fits && (self.pass < 2 || self.guard_get(0)? == GUARD_SHORT_BRANCH);

        if use_short {
            if self.pass == 1 {
                self.guard_set(0, GUARD_SHORT_BRANCH);
            } else if self.pass == 2 {
                self.output((mask as i32) | (disp & 0xFF), Size::Word);
                if !(-128..=127).contains(&disp) || disp == 0 {
                    self.log.report(ErrorCode::InvBranchDisp, None);
                }
            }
            self.sections.out_loc += 2;
        } else if self.pass == 2 {
            if self.guard_get(0)? != GUARD_LONG_BRANCH {
                self.sections.out_loc += 2;
                return Err(self
                    .log
                    .report(ErrorCode::UnsuccessfullShortBranch, None));
            }
            self.output(mask as i32, Size::Word);
            self.sections.out_loc += 2;
            self.output(disp, Size::Word);
            self.sections.out_loc += 2;
            if !(-32768..=32767).contains(&disp) {
                self.log.report(ErrorCode::InvBranchDisp, None);
            }
        } else {
            if self.pass == 1 {
                self.guard_set(0, GUARD_LONG_BRANCH);
            }
            self.sections.out_loc += 4;
        }
        Ok(())
    }

    fn build_moveq(&mut self, mask: u16, src: &Operand, dst: &Operand) -> AsmResult<()> {
        if self.pass == 2 {
            self.output(
                (mask as i32) | ((dst.reg as i32) << 9) | (src.data.value & 0xFF),
                Size::Word,
            );
            if !(-128..=127).contains(&src.data.value) {
                self.log.report(ErrorCode::InvQuickConst, None);
            }
        }
        self.sections.out_loc += 2;
        Ok(())
    }

    fn build_immed_to_ccr(&mut self, mask: u16, src: &Operand) -> AsmResult<()> {
        if self.pass == 2 {
            self.output(mask as i32, Size::Word);
            self.sections.out_loc += 2;
            self.output(src.data.value & 0xFF, Size::Word);
            self.sections.out_loc += 2;
            if (src.data.value & 0xFF) != src.data.value {
                self.log.report(ErrorCode::Inv8BitData, None);
            }
        } else {
            self.sections.out_loc += 4;
        }
        Ok(())
    }

    fn build_immed_word(&mut self, mask: u16, src: &Operand) -> AsmResult<()> {
        if self.pass == 2 {
            self.output(mask as i32, Size::Word);
            self.sections.out_loc += 2;
            self.output(src.data.value & 0xFFFF, Size::Word);
            self.sections.out_loc += 2;
            if !(-32768..=65535).contains(&src.data.value) {
                self.log.report(ErrorCode::Inv16BitData, None);
            }
        } else {
            self.sections.out_loc += 4;
        }
        Ok(())
    }

    fn build_dbcc(&mut self, mask: u16, src: &Operand, dst: &Operand) -> AsmResult<()> {
        let disp = dst.data.value - self.sections.out_loc as i32 - 2;
        if self.pass == 2 {
            self.output((mask | src.reg as u16) as i32, Size::Word);
            self.sections.out_loc += 2;
            self.output(disp, Size::Word);
            self.sections.out_loc += 2;
            if !(-32768..=32767).contains(&disp) {
                self.log.report(ErrorCode::InvBranchDisp, None);
            }
        } else {
            self.sections.out_loc += 4;
        }
        Ok(())
    }

    fn build_scc(&mut self, mask: u16, size: Option<Size>, src: &Operand) -> AsmResult<()> {
        if self.pass == 2 {
            self.output((mask | eff_addr(src)) as i32, Size::Word);
        }
        self.sections.out_loc += 2;
        self.ext_words(src, size);
        Ok(())
    }

    fn build_shift_reg(&mut self, mask: u16, src: &Operand, dst: &Operand) -> AsmResult<()> {
        if self.pass == 2 {
            let mut mask = mask | dst.reg as u16;
            if src.mode == AddrMode::Immediate {
                mask |= (src.data.value as u16 & 7) << 9;
                if !(1..=8).contains(&src.data.value) {
                    self.log.report(ErrorCode::InvShiftCount, None);
                }
            } else {
                mask |= (src.reg as u16) << 9;
            }
            self.output(mask as i32, Size::Word);
        }
        self.sections.out_loc += 2;
        Ok(())
    }

    fn build_exg(&mut self, mask: u16, src: &Operand, dst: &Operand) -> AsmResult<()> {
        if self.pass == 2 {
            let mut mask = mask;
            if src.mode != dst.mode {
                // the address register goes in the bottom three bits
                if src.mode == AddrMode::AnDirect {
                    mask |= src.reg as u16 | (dst.reg as u16) << 9;
                } else {
                    mask |= dst.reg as u16 | (src.reg as u16) << 9;
                }
            } else {
                mask |= dst.reg as u16 | (src.reg as u16) << 9;
            }
            self.output(mask as i32, Size::Word);
        }
        self.sections.out_loc += 2;
        Ok(())
    }

    fn build_two_reg(&mut self, mask: u16, src: &Operand, dst: &Operand) -> AsmResult<()> {
        if self.pass == 2 {
            self.output(
                (mask | (dst.reg as u16) << 9 | src.reg as u16) as i32,
                Size::Word,
            );
        }
        self.sections.out_loc += 2;
        Ok(())
    }

    fn build_one_reg(&mut self, mask: u16, src: &Operand) -> AsmResult<()> {
        if self.pass == 2 {
            self.output((mask | src.reg as u16) as i32, Size::Word);
        }
        self.sections.out_loc += 2;
        Ok(())
    }

    fn build_move_usp(&mut self, mask: u16, src: &Operand, dst: &Operand) -> AsmResult<()> {
        if self.pass == 2 {
            let reg = if src.mode == AddrMode::AnDirect {
                src.reg
            } else {
                dst.reg
            };
            self.output((mask | reg as u16) as i32, Size::Word);
        }
        self.sections.out_loc += 2;
        Ok(())
    }

    fn build_link(&mut self, mask: u16, src: &Operand, dst: &Operand) -> AsmResult<()> {
        if self.pass == 2 {
            self.output((mask | src.reg as u16) as i32, Size::Word);
            self.sections.out_loc += 2;
            self.output(dst.data.value, Size::Word);
            self.sections.out_loc += 2;
            if !(-32768..=32767).contains(&dst.data.value) {
                self.log.report(ErrorCode::Inv16BitData, None);
            }
        } else {
            self.sections.out_loc += 4;
        }
        Ok(())
    }
}
