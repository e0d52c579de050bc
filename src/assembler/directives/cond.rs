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

//! Conditional assembly. A counter tracks how deep we are inside
//! non-generating regions; skipped lines are still scanned for nested
//! conditionals (see the continuation hook) so the nesting stays balanced.

use crate::assembler::Assembler;
use crate::assembler::lexer::{parse_id, skip_space};
use crate::assembler::operand::Size;
use crate::errors::{AsmResult, ErrorCode};

pub const MAX_IF_LEVEL: usize = 32;

impl Assembler<'_> {
    fn cond_preamble(&mut self, size: Option<Size>, label: &str) {
        if size.is_some() {
            self.log.report(ErrorCode::InvSizeCode, None);
        }
        if !label.is_empty() {
            self.log
                .report(ErrorCode::LabelIgnored, Some(label.to_string()));
        }
    }

    pub fn dir_if(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        self.cond_preamble(size, label);
        self.if_level += 1;
        if self.if_level < MAX_IF_LEVEL {
            self.if_else[self.if_level] = false;
        }

        if self.if_nogen == 0 {
            let condition = match self.evaluate(op) {
                Ok((value, rest)) => {
                    self.trailing_check(rest);
                    if value.value != 0 && value.value != 1 {
                        self.log
                            .report(ErrorCode::InvalidBooleanValue, Some(op.to_string()));
                        0
                    } else {
                        value.value
                    }
                }
                // a broken expression skips the region rather than killing
                // the whole conditional structure
                Err(_) => 0,
            };
            if condition == 0 {
                self.if_nogen += 1;
            }
        } else {
            self.if_nogen += 1;
        }
        Ok(())
    }

    pub fn dir_ifdef(
        &mut self,
        size: Option<Size>,
        label: &str,
        op: &str,
        negate: bool,
    ) -> AsmResult<()> {
        self.cond_preamble(size, label);
        self.if_level += 1;
        if self.if_level < MAX_IF_LEVEL {
            self.if_else[self.if_level] = false;
        }

        if self.if_nogen == 0 {
            let (id, rest) = parse_id(skip_space(op));
            if id.is_empty() {
                self.log
                    .report(ErrorCode::ExpectedSymbol, Some(op.to_string()));
                self.if_nogen += 1;
            } else {
                let defined = self.symbols.lookup(&id).is_some();
                if defined == negate {
                    self.if_nogen += 1;
                }
                self.trailing_check(rest);
            }
        } else {
            self.if_nogen += 1;
        }
        Ok(())
    }

    pub fn dir_else(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        self.cond_preamble(size, label);
        if self.if_level == 0 {
            self.log.report(ErrorCode::UnexpectedElseMissingIf, None);
        } else if self.if_level < MAX_IF_LEVEL && self.if_else[self.if_level] {
            self.log.report(ErrorCode::UnexpectedElseMultiple, None);
        } else {
            if self.if_level < MAX_IF_LEVEL {
                self.if_else[self.if_level] = true;
            }
            if self.if_nogen == 0 {
                self.if_nogen = 1;
            } else if self.if_nogen == 1 {
                self.if_nogen = 0;
            }
        }
        self.trailing_check(op);
        Ok(())
    }

    pub fn dir_endif(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        self.cond_preamble(size, label);
        if self.if_level == 0 {
            self.log.report(ErrorCode::UnmatchedEndIf, None);
            self.if_nogen = 0;
        } else {
            self.if_level -= 1;
            if self.if_nogen > 0 {
                self.if_nogen -= 1;
            }
        }
        self.trailing_check(op);
        Ok(())
    }
}
