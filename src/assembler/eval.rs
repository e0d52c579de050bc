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
use crate::assembler::lexer::{parse_id, skip_space};
use crate::assembler::symbol_table::{SymbolCategory, SymbolId, SymbolKind, Value};
use crate::errors::{AsmResult, ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Terminator,
    Equal,
    Lower,
    LowerOrEqual,
    Higher,
    HigherOrEqual,
    BitOr,
    BitAnd,
    BitXor,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    ShiftLeft,
    ShiftRight,
}

impl Operator {
    /// Higher numbers bind tighter; the terminator has precedence zero so
    /// every stacked operation reduces before the expression ends.
    fn precedence(self) -> u8 {
        use Operator::*;
        match self {
            Terminator => 0,
            Equal | Lower | LowerOrEqual | Higher | HigherOrEqual => 1,
            BitOr | BitAnd | BitXor => 2,
            Plus | Minus => 3,
            Multiply | Divide | Modulo => 4,
            ShiftLeft | ShiftRight => 5,
        }
    }
}

// the stack never needs more room than one slot per precedence level
const MAX_EVAL_STACK: usize = 7;

#[derive(Debug, Clone, Copy)]
struct StackEntry {
    value: Value,
    op: Operator,
}

fn parse_operator(s: &str) -> Option<(Operator, &str)> {
    use Operator::*;
    let b = s.as_bytes();
    let (op, len) = match b.first().copied() {
        None | Some(b',') | Some(b'(') | Some(b')') | Some(b';') | Some(b'.') | Some(b']') => {
            (Terminator, 0)
        }
        Some(b'=') => match b.get(1).copied() {
            Some(b'=') => (Equal, 2),
            Some(b'<') => (LowerOrEqual, 2),
            Some(b'>') => (HigherOrEqual, 2),
            _ => return None,
        },
        Some(b'<') => match b.get(1).copied() {
            Some(b'=') => (LowerOrEqual, 2),
            Some(b'<') => (ShiftLeft, 2),
            _ => (Lower, 1),
        },
        Some(b'>') => match b.get(1).copied() {
            Some(b'=') => (HigherOrEqual, 2),
            Some(b'>') => (ShiftRight, 2),
            _ => (Higher, 1),
        },
        Some(b'|') => (BitOr, 1),
        Some(b'&') => (BitAnd, 1),
        Some(b'^') => (BitXor, 1),
        Some(b'+') => (Plus, 1),
        Some(b'-') => (Minus, 1),
        Some(b'*') => (Multiply, 1),
        Some(b'/') => {
            if b.get(1) == Some(&b'/') {
                (Modulo, 2)
            } else {
                (Divide, 1)
            }
        }
        _ => return None,
    };
    Some((op, skip_space(&s[len..])))
}

impl Assembler<'_> {
    /// Evaluate an expression. Returns the tagged value and the remainder
    /// of the input starting at the terminator character.
    pub fn evaluate<'a>(&mut self, s: &'a str) -> AsmResult<(Value, &'a str)> {
        let mut stack = [StackEntry {
            value: Value::undefined(),
            op: Operator::Terminator,
        }; MAX_EVAL_STACK];
        let mut sp = MAX_EVAL_STACK;
        let mut s = s;

        while sp > 0 {
            sp -= 1;
            let (value, rest) = self.evaluate_operand(s)?;
            stack[sp].value = value;

            let Some((op, rest)) = parse_operator(skip_space(rest)) else {
                return Err(self
                    .log
                    .report(ErrorCode::InvOperator, Some(skip_space(rest).to_string())));
            };
            s = rest;

            // reduce every stacked operation of higher or equal precedence
            let prec = op.precedence();
            while sp < MAX_EVAL_STACK - 1 && prec <= stack[sp + 1].op.precedence() {
                let (left, right) = (stack[sp + 1], stack[sp]);
                stack[sp + 1].value = self.apply(left, right.value);
                sp += 1;
            }
            if prec > 0 {
                stack[sp].op = op;
            } else {
                return Ok((stack[sp].value, s));
            }
        }
        Err(self.log.report(ErrorCode::ExprNestedTooDeep, None))
    }

    /// Apply `left.op` to `(left.value, right)` with the category
    /// propagation rules: undefined poisons, relational comparisons yield
    /// constants, additive operators keep the single non-constant side and
    /// collapse two matching addresses into a constant distance.
    fn apply(&mut self, left: StackEntry, right: Value) -> Value {
        use Operator::*;
        let cat1 = left.value.category();
        let cat2 = right.category();
        let mut kind = left.value.kind;

        if left.value.kind == SymbolKind::Undefined || right.kind == SymbolKind::Undefined {
            kind = SymbolKind::Undefined;
        } else {
            match left.op {
                Terminator => {}
                Equal | Lower | LowerOrEqual | Higher | HigherOrEqual => {
                    kind = SymbolKind::Const;
                }
                BitOr | BitAnd | BitXor => {
                    if cat1 == SymbolCategory::Const {
                        kind = right.kind;
                    } else if cat2 != SymbolCategory::Const && cat1 != cat2 {
                        self.log.report(ErrorCode::InvValueCategory, None);
                    }
                }
                Plus | Minus => {
                    if cat1 == SymbolCategory::Const {
                        kind = right.kind;
                    } else if cat2 == SymbolCategory::Const {
                        // address +- constant keeps its category
                    } else if cat1 == cat2 {
                        kind = SymbolKind::Const;
                    } else {
                        self.log.report(ErrorCode::InvValueCategory, None);
                    }
                }
                Multiply => {
                    if cat1 == SymbolCategory::Const {
                        kind = right.kind;
                    } else if cat2 != SymbolCategory::Const {
                        self.log.report(ErrorCode::InvValueCategory, None);
                    }
                }
                Divide | Modulo | ShiftLeft | ShiftRight => {
                    if cat2 != SymbolCategory::Const {
                        self.log.report(ErrorCode::InvValueCategory, None);
                    }
                }
            }
        }

        let a = left.value.value;
        let b = right.value;
        let value = match left.op {
            Terminator => a,
            Equal => (a == b) as i32,
            Lower => (a < b) as i32,
            LowerOrEqual => (a <= b) as i32,
            Higher => (a > b) as i32,
            HigherOrEqual => (a >= b) as i32,
            BitOr => a | b,
            BitAnd => a & b,
            BitXor => a ^ b,
            Plus => a.wrapping_add(b),
            Minus => a.wrapping_sub(b),
            Multiply => a.wrapping_mul(b),
            Divide => {
                if b != 0 {
                    a.wrapping_div(b)
                } else {
                    self.log.report(ErrorCode::DivByZero, None);
                    a
                }
            }
            Modulo => {
                if b != 0 {
                    a.wrapping_rem(b)
                } else {
                    self.log.report(ErrorCode::DivByZero, None);
                    a
                }
            }
            ShiftLeft => a.wrapping_shl(b as u32),
            ShiftRight => a.wrapping_shr(b as u32),
        };

        // calculation results carry no type
        Value {
            value,
            kind,
            ty: None,
        }
    }

    fn evaluate_operand<'a>(&mut self, s: &'a str) -> AsmResult<(Value, &'a str)> {
        let start = s;
        let s = skip_space(s);
        let b = s.as_bytes();

        match b.first().copied() {
            Some(b'-') => {
                let (mut v, rest) = self.evaluate_operand(&s[1..])?;
                v.value = v.value.wrapping_neg();
                Ok((v, rest))
            }
            Some(b'~') => {
                let (mut v, rest) = self.evaluate_operand(&s[1..])?;
                v.value = !v.value;
                Ok((v, rest))
            }
            Some(b'(') => {
                let (v, rest) = self.evaluate(&s[1..])?;
                if rest.as_bytes().first() == Some(&b')') {
                    Ok((v, &rest[1..]))
                } else {
                    Err(self
                        .log
                        .report(ErrorCode::ExpectedRightParen, Some(rest.to_string())))
                }
            }
            Some(b'$') if b.get(1).is_some_and(u8::is_ascii_hexdigit) => {
                Ok(self.number_literal(&s[1..], 16, start))
            }
            Some(b'0')
                if matches!(b.get(1).copied(), Some(b'x') | Some(b'X'))
                    && b.get(2).is_some_and(u8::is_ascii_hexdigit) =>
            {
                Ok(self.number_literal(&s[2..], 16, start))
            }
            Some(b'%') => {
                if b.get(1).is_none_or(|c| !(b'0'..b'2').contains(c)) {
                    return Err(self.log.report(ErrorCode::Syntax, Some(s.to_string())));
                }
                Ok(self.number_literal(&s[1..], 2, start))
            }
            Some(b'0') => Ok(self.number_literal(s, 8, start)),
            Some(c) if c.is_ascii_digit() => Ok(self.number_literal(s, 10, start)),
            Some(b'\'') => self.char_literal(s),
            Some(b'.') => self.temp_label_ref(s),
            Some(c) if c.is_ascii_alphabetic() || matches!(c, b'_' | b'?' | b'@') => {
                self.symbol_ref(s)
            }
            _ => Err(self.log.report(ErrorCode::Syntax, Some(start.to_string()))),
        }
    }

    /// Digits in the given base, permitting `.` separators and `u`/`l`
    /// suffixes. Overflow past 32 bits keeps the truncated value and warns.
    fn number_literal<'a>(&mut self, s: &'a str, base: u32, start: &str) -> (Value, &'a str) {
        let mut acc: u64 = 0;
        let mut too_big = false;
        let mut end = s.len();
        for (i, c) in s.char_indices() {
            if c == '.' {
                continue;
            }
            match c.to_digit(base) {
                Some(d) => {
                    acc = acc * base as u64 + d as u64;
                    if acc > u32::MAX as u64 {
                        too_big = true;
                        acc &= u32::MAX as u64;
                    }
                }
                None => {
                    end = i;
                    break;
                }
            }
        }
        let mut rest = &s[end..];
        for suffix in ["u", "U", "l", "L"] {
            if rest.starts_with(suffix) {
                rest = &rest[1..];
            }
        }
        if too_big {
            self.log
                .report(ErrorCode::NumberTooBig, Some(start.trim().to_string()));
        }
        (Value::constant(acc as u32 as i32), rest)
    }

    /// Character literal of up to four bytes, packed big-endian. Escape
    /// sequences follow the C set, including `\ooo` and `\xhh`.
    fn char_literal<'a>(&mut self, s: &'a str) -> AsmResult<(Value, &'a str)> {
        let mut x: u32 = 0;
        let mut count = 0usize;
        let bytes = s.as_bytes();
        let mut i = 1;
        loop {
            match bytes.get(i).copied() {
                None => {
                    return Err(self
                        .log
                        .report(ErrorCode::UnterminatedString, Some(s.to_string())));
                }
                Some(b'\'') => {
                    i += 1;
                    break;
                }
                Some(b'\\') => {
                    i += 1;
                    let mut c = match bytes.get(i).copied() {
                        None => {
                            return Err(self
                                .log
                                .report(ErrorCode::UnterminatedString, Some(s.to_string())));
                        }
                        Some(b'a') => 0x07,
                        Some(b'b') => 0x08,
                        Some(b'f') => 0x0C,
                        Some(b'n') => 0x0A,
                        Some(b'r') => 0x0D,
                        Some(b't') => 0x09,
                        Some(b'v') => 0x0B,
                        Some(b'0') => 0x00,
                        Some(d @ b'1'..=b'7') => {
                            let mut v = (d - b'0') as u32;
                            while let Some(o @ b'0'..=b'7') = bytes.get(i + 1).copied() {
                                v = v * 8 + (o - b'0') as u32;
                                i += 1;
                            }
                            if v > 255 {
                                self.log.report(ErrorCode::OctalTooBig, None);
                                v &= 255;
                            }
                            v
                        }
                        Some(b'x') => {
                            i += 1;
                            match bytes.get(i).copied().and_then(|h| (h as char).to_digit(16)) {
                                None => {
                                    let c = bytes.get(i).copied().unwrap_or(0) as u32 & 15;
                                    self.log.report(ErrorCode::InvHexConstant, None);
                                    c
                                }
                                Some(mut v) => {
                                    if let Some(h2) = bytes
                                        .get(i + 1)
                                        .copied()
                                        .and_then(|h| (h as char).to_digit(16))
                                    {
                                        v = v * 16 + h2;
                                        i += 1;
                                    }
                                    v
                                }
                            }
                        }
                        Some(other) => other as u32,
                    };
                    c &= 0xFF;
                    x = (x << 8) | c;
                    count += 1;
                    i += 1;
                }
                Some(c) => {
                    x = (x << 8) | c as u32;
                    count += 1;
                    i += 1;
                }
            }
        }

        if count == 0 {
            return Err(self.log.report(ErrorCode::Syntax, Some(s.to_string())));
        } else if count == 3 {
            x <<= 8;
        } else if count > 4 {
            self.log.report(ErrorCode::AsciiTooBig, Some(s.to_string()));
        }
        Ok((Value::constant(x as i32), &s[i..]))
    }

    /// `.Nf` / `.Nb` temporary label reference.
    fn temp_label_ref<'a>(&mut self, s: &'a str) -> AsmResult<(Value, &'a str)> {
        let b = s.as_bytes();
        if let (Some(digit @ b'1'..=b'9'), Some(dir)) = (b.get(1).copied(), b.get(2).copied()) {
            if matches!(dir, b'f' | b'F' | b'b' | b'B') {
                let follower = b.get(3).copied();
                let id_continues = follower.is_some_and(|c| {
                    c.is_ascii_alphanumeric() || matches!(c, b'.' | b'_' | b'$' | b'?' | b'@')
                });
                if !id_continues {
                    let value = match self.symbols.lookup_temp_label(digit, dir, self.pass) {
                        None => {
                            self.log
                                .report(ErrorCode::UndefinedSymbol, Some(s[..3].to_string()));
                            Value::undefined()
                        }
                        Some(sym) => Value {
                            value: self.symbols.value(sym),
                            kind: SymbolKind::Code,
                            ty: None,
                        },
                    };
                    return Ok((value, &s[3..]));
                }
            }
        }
        Err(self
            .log
            .report(ErrorCode::InvalidTempLabel, Some(s.to_string())))
    }

    /// Symbol reference, possibly qualified with `.member` steps, plus the
    /// `sizeof(name)` builtin.
    fn symbol_ref<'a>(&mut self, s: &'a str) -> AsmResult<(Value, &'a str)> {
        let (name, after) = parse_id(s);

        if name == "sizeof" {
            let after = skip_space(after);
            if after.as_bytes().first() != Some(&b'(') {
                return Err(self
                    .log
                    .report(ErrorCode::ExpectedLeftParen, Some(after.to_string())));
            }
            let inner = skip_space(&after[1..]);
            let first = inner.as_bytes().first().copied();
            if !first.is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, b'_' | b'?' | b'@')) {
                return Err(self
                    .log
                    .report(ErrorCode::ExpectedSymbol, Some(inner.to_string())));
            }
            let (sym, _, rest) = self.parse_symbol(inner);
            let value = match sym {
                None => {
                    self.log
                        .report(ErrorCode::UndefinedSymbol, Some(inner.to_string()));
                    Value::undefined()
                }
                Some(sym) => Value::constant(self.symbols.size_of_symbol(sym)),
            };
            let rest = skip_space(rest);
            if rest.as_bytes().first() != Some(&b')') {
                return Err(self
                    .log
                    .report(ErrorCode::ExpectedRightParen, Some(rest.to_string())));
            }
            return Ok((value, &rest[1..]));
        }

        let (sym, value, rest) = self.parse_symbol(s);
        match sym {
            Some(sym) => {
                let cat = self.symbols.kind(sym).category();
                if cat == SymbolCategory::None || cat == SymbolCategory::Type {
                    self.log.report(
                        ErrorCode::InvSymbolInExpr,
                        Some(self.symbols.name(sym).to_string()),
                    );
                }
                Ok((value, rest))
            }
            None => {
                self.log.report(ErrorCode::UndefinedSymbol, Some(name));
                Ok((Value::undefined(), rest))
            }
        }
    }

    /// Resolve a (possibly qualified) name: procedure scope first, then
    /// global scope, then `.member` traversal through the type hierarchy.
    /// Bitfield member access yields the member's constant.
    pub fn parse_symbol<'a>(&mut self, s: &'a str) -> (Option<SymbolId>, Value, &'a str) {
        let mut value = Value::undefined();
        let (id, mut rest) = parse_id(skip_space(s));
        let mut sym: Option<SymbolId> = None;

        if !id.is_empty() {
            sym = self
                .symbols
                .lookup_scope_proc(&id)
                .or_else(|| self.symbols.lookup(&id));
            if let Some(found) = sym {
                let cat = self.symbols.kind(found).category();
                if cat != SymbolCategory::None && cat != SymbolCategory::Type {
                    value = self.symbols.val(found);
                }
            }
        }

        while rest.as_bytes().first() == Some(&b'.') {
            let (member, after) = parse_id(&rest[1..]);
            rest = after;
            if member.is_empty() || sym.is_none() {
                sym = None;
                break;
            }
            let last = sym.unwrap();
            sym = self.symbols.lookup_member(last, &member);
            if let Some(found) = sym {
                let cat = self.symbols.kind(found).category();
                if value.kind == SymbolKind::Undefined || value.kind == SymbolKind::ProcEntry {
                    // a label or local shadows the entry address of the
                    // procedure the traversal went through
                    if cat != SymbolCategory::None && cat != SymbolCategory::Type {
                        value = self.symbols.val(found);
                    }
                } else if cat != SymbolCategory::None && cat != SymbolCategory::Type {
                    let through_bitfield = self
                        .symbols
                        .ty(last)
                        .is_some_and(|t| self.symbols.kind(t) == SymbolKind::TypeBitfield);
                    if through_bitfield {
                        value = Value::constant(self.symbols.value(found));
                    } else {
                        value.value = value.value.wrapping_add(self.symbols.value(found));
                        value.ty = self.symbols.ty(found);
                    }
                }
            }
        }

        (sym, value, rest)
    }
}

#[cfg(test)]
mod tests {
    use crate::Options;
    use crate::assembler::Assembler;
    use crate::assembler::symbol_table::{SymbolCategory, SymbolKind};
    use crate::errors::Severity;
    use crate::file_reader::MockFileReader;

    fn with_assembler<R>(f: impl FnOnce(&mut Assembler) -> R) -> R {
        let reader = MockFileReader::default();
        let mut asm = Assembler::new("t.asm".into(), Options::default(), &reader);
        asm.log.set_position("t.asm", 1);
        f(&mut asm)
    }

    fn eval(asm: &mut Assembler, s: &str) -> i32 {
        let (value, rest) = asm.evaluate(s).unwrap();
        assert!(rest.is_empty(), "leftover {:?}", rest);
        value.value
    }

    #[test]
    fn radix_prefixes() {
        with_assembler(|asm| {
            assert_eq!(eval(asm, "$FF"), 255);
            assert_eq!(eval(asm, "0x10"), 16);
            assert_eq!(eval(asm, "%1011"), 11);
            assert_eq!(eval(asm, "017"), 15);
            assert_eq!(eval(asm, "42"), 42);
            assert_eq!(eval(asm, "-5"), -5);
            assert_eq!(eval(asm, "~0"), -1);
        });
    }

    #[test]
    fn precedence_runs_shift_tightest() {
        with_assembler(|asm| {
            assert_eq!(eval(asm, "1+2*3"), 7);
            assert_eq!(eval(asm, "2*3+1"), 7);
            assert_eq!(eval(asm, "(1+2)*3"), 9);
            // shift binds tighter than multiplication
            assert_eq!(eval(asm, "3*1<<2"), 12);
            assert_eq!(eval(asm, "10//3"), 1);
            assert_eq!(eval(asm, "5==5"), 1);
            assert_eq!(eval(asm, "4=<5"), 1);
        });
    }

    #[test]
    fn character_literal_padding() {
        with_assembler(|asm| {
            assert_eq!(eval(asm, "'A'"), 0x41);
            assert_eq!(eval(asm, "'AB'"), 0x4142);
            // three characters pad out to a full long
            assert_eq!(eval(asm, "'ABC'"), 0x41424300u32 as i32);
            assert_eq!(eval(asm, "'\\x41'"), 0x41);
            assert_eq!(eval(asm, "'\\101'"), 0x41);
        });
    }

    #[test]
    fn address_categories_propagate() {
        with_assembler(|asm| {
            asm.symbols
                .create("a", SymbolKind::Code, None, 10, 0, &mut asm.log)
                .unwrap();
            asm.symbols
                .create("b", SymbolKind::Code, None, 30, 0, &mut asm.log)
                .unwrap();
            let (v, _) = asm.evaluate("b-a").unwrap();
            assert_eq!(v.value, 20);
            assert_eq!(v.category(), SymbolCategory::Const);
            let (v, _) = asm.evaluate("a+2").unwrap();
            assert_eq!(v.value, 12);
            assert_eq!(v.category(), SymbolCategory::Code);
            assert!(asm.log.line_is_ok());
        });
    }

    #[test]
    fn undefined_poisons_and_reports() {
        with_assembler(|asm| {
            let (v, _) = asm.evaluate("missing+1").unwrap();
            assert_eq!(v.kind, SymbolKind::Undefined);
            assert!(asm.log.line_at_least(Severity::Error));
        });
    }

    #[test]
    fn division_by_zero_keeps_left_value() {
        with_assembler(|asm| {
            let (v, _) = asm.evaluate("7/0").unwrap();
            assert_eq!(v.value, 7);
            assert!(asm.log.line_at_least(Severity::Error));
        });
    }

    #[test]
    fn sizeof_builtin() {
        with_assembler(|asm| {
            assert_eq!(eval(asm, "sizeof(w)"), 2);
            assert_eq!(eval(asm, "sizeof(l)*2"), 8);
        });
    }
}
