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

//! Procedure machinery: PROC/PROXY define entry points with parameter
//! lists, PROCDEF/TRAPDEF declare callable signatures, LOCAL lays out
//! frame variables, and BEGINPROC/ENDPROC/ENDPROXY/CALL synthesize the
//! frame and call sequences through the expand buffer.

use crate::assembler::Assembler;
use crate::assembler::lexer::{parse_arg, parse_id, skip_space};
use crate::assembler::operand::Size;
use crate::assembler::source::instruction_line;
use crate::assembler::symbol_table::{SymbolCategory, SymbolId, SymbolKind};
use crate::errors::{AsmResult, ErrorCode};

impl Assembler<'_> {
    pub fn dir_proc(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        self.entry_point(SymbolKind::ProcEntry, size, label, op)
    }

    pub fn dir_proxy(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        self.entry_point(SymbolKind::ProxyEntry, size, label, op)
    }

    pub fn dir_procdef(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        let result = self.entry_point(SymbolKind::ProcDef, size, label, op);
        self.symbols.set_current_proc(None);
        result
    }

    pub fn dir_trapdef(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        let result = self.entry_point(SymbolKind::TrapDef, size, label, op);
        self.symbols.set_current_proc(None);
        result
    }

    /// Shared by PROC, PROXY, PROCDEF and TRAPDEF: create (or re-verify)
    /// the entry symbol, open the procedure scope, and parse the
    /// parameter list. TRAPDEF additionally carries `[trap]` or
    /// `[trap:selector[.w]]` in front of the parameters.
    fn entry_point(
        &mut self,
        kind: SymbolKind,
        size: Option<Size>,
        label: &str,
        op: &str,
    ) -> AsmResult<()> {
        if size.is_some() {
            self.log.report(ErrorCode::InvSizeCode, None);
        }
        let (name, mut op) = if label.is_empty() {
            parse_id(skip_space(op))
        } else {
            (label.to_string(), op)
        };
        if name.is_empty() {
            return Err(self
                .log
                .report(ErrorCode::ExpectedProcName, Some(op.to_string())));
        }
        if self.symbols.has_current_proc() || self.proc_begun {
            return Err(self
                .log
                .report(ErrorCode::UnexpectedEntryDefinition, Some(name)));
        }

        let mut sym_value = 0i32;
        let mut trap_selector = 0i32;
        let mut type_kind = SymbolKind::TypeProc;

        match kind {
            SymbolKind::ProcEntry | SymbolKind::ProxyEntry => {
                if self.sections.out_loc & 1 != 0 {
                    self.word_align();
                }
                sym_value = self.sections.out_loc as i32;
                if kind == SymbolKind::ProxyEntry {
                    type_kind = SymbolKind::TypeProxy;
                }
            }
            SymbolKind::TrapDef => {
                let Some(inner) = skip_space(op).strip_prefix('[') else {
                    return Err(self
                        .log
                        .report(ErrorCode::ExpectedLeftBracket, Some(op.to_string())));
                };
                let (arg, rest) = parse_arg(inner, "]:", &mut self.log);
                if arg.is_empty() {
                    return Err(self.log.report(ErrorCode::MissingTrapDef, None));
                }
                let (value, leftover) = self.evaluate(&arg)?;
                if !leftover.is_empty() {
                    self.log
                        .report(ErrorCode::Syntax, Some(leftover.to_string()));
                }
                if value.category() != SymbolCategory::Const
                    && value.kind != SymbolKind::Undefined
                {
                    self.log.report(ErrorCode::InvValueCategory, None);
                }
                sym_value = value.value;
                type_kind = SymbolKind::TypeTrapSimple;

                let mut rest = rest;
                if let Some(sel) = rest.strip_prefix(':') {
                    let (arg, after) = parse_arg(sel, "]", &mut self.log);
                    rest = after;
                    if !arg.is_empty() {
                        let (value, leftover) = self.evaluate(&arg)?;
                        type_kind = if leftover.eq_ignore_ascii_case(".w") {
                            SymbolKind::TypeTrap16BitSel
                        } else {
                            if !leftover.is_empty() {
                                self.log
                                    .report(ErrorCode::Syntax, Some(leftover.to_string()));
                            }
                            SymbolKind::TypeTrapSelector
                        };
                        if value.category() != SymbolCategory::Const {
                            self.log.report(ErrorCode::InvValueCategory, None);
                        }
                        trap_selector = value.value;
                    }
                }
                let Some(after) = rest.strip_prefix(']') else {
                    return Err(self
                        .log
                        .report(ErrorCode::ExpectedRightBracket, Some(rest.to_string())));
                };
                op = skip_space(after);
            }
            _ => {}
        }

        let symbol =
            self.symbols
                .create(&name, kind, None, sym_value, self.pass, &mut self.log)?;
        let parms = match self.symbols.ty(symbol) {
            Some(parms) => {
                if self.symbols.kind(parms) != type_kind
                    || (kind == SymbolKind::TrapDef
                        && self.symbols.value(parms) != trap_selector)
                {
                    self.log.report(ErrorCode::PhaseError, Some(name.clone()));
                }
                parms
            }
            None => {
                let parms = self.symbols.alloc("", type_kind, None, trap_selector);
                self.symbols.set_type(symbol, Some(parms));
                parms
            }
        };

        self.symbols.set_current_proc(Some(symbol));
        let rest = self.parse_parameters(op, parms, kind)?;

        if kind == SymbolKind::ProxyEntry {
            // proxies have no BEGINPROC: stash the return address in its
            // parameter slot right at the entry point
            self.proc_begun = true;
            let slot = self.symbols.value(parms);
            self.expand.push_group(vec![instruction_line(
                "move.l",
                Some("(a7)+"),
                Some(&format!("{}(a7)", slot)),
            )]);
        }

        self.trailing_check(rest);
        Ok(())
    }

    /// `(name.type, ..., name.type[.returntype])`. Parameters without a
    /// name get positional `_parmN` names; `...` accepts any surplus call
    /// arguments.
    pub fn parse_parameters<'a>(
        &mut self,
        s: &'a str,
        parm_list: SymbolId,
        kind: SymbolKind,
    ) -> AsmResult<&'a str> {
        let Some(mut s) = skip_space(s).strip_prefix('(') else {
            return Err(self
                .log
                .report(ErrorCode::ExpectedLeftParen, Some(s.to_string())));
        };

        let mut parm_count = 0usize;
        loop {
            s = skip_space(s);
            if s.starts_with(')') {
                break;
            }
            parm_count += 1;
            let (id, mut rest) = parse_id(s);
            let mut ty: Option<SymbolId> = None;
            let name = if id.is_empty() {
                if let Some(after) = rest.strip_prefix("...") {
                    rest = skip_space(after);
                    if !rest.starts_with(')') {
                        return Err(self
                            .log
                            .report(ErrorCode::ExpectedRightParen, Some(rest.to_string())));
                    }
                    ty = self.symbols.lookup("void");
                    "...".to_string()
                } else {
                    format!("_parm{}", parm_count)
                }
            } else {
                id
            };

            if ty.is_none() {
                let (spec, after) = self.parse_type_spec(rest, true)?;
                rest = after;
                let Some(spec) = spec else {
                    return Ok(rest);
                };
                ty = Some(spec);
            }
            self.symbols
                .create_parameter(parm_list, kind, parm_count, &name, ty, self.pass, &mut self.log)?;

            s = skip_space(rest);
            if let Some(after) = s.strip_prefix(',') {
                s = after;
            } else if !s.starts_with(')') {
                return Err(self
                    .log
                    .report(ErrorCode::ExpectedParenOrComma, Some(s.to_string())));
            }
        }

        let mut s = &s[1..];
        if s.starts_with('.') {
            let (ret, rest) = self.parse_type_spec(s, true)?;
            if ret.is_some() {
                self.symbols.set_type(parm_list, ret);
            }
            s = rest;
        }
        Ok(skip_space(s))
    }

    pub fn dir_local(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        if !self.symbols.has_current_proc() {
            return Err(self.log.report(ErrorCode::UnexpectedLocal, None));
        }
        if size.is_some() {
            self.log.report(ErrorCode::InvSizeCode, None);
        }
        let look_for_dot = label.is_empty();
        let (name, p) = if look_for_dot {
            parse_id(skip_space(op))
        } else {
            (label.to_string(), op)
        };
        if name.is_empty() {
            return Err(self
                .log
                .report(ErrorCode::ExpectedLocalVarId, Some(op.to_string())));
        }
        let (ty, rest) = self.parse_type_spec(p, look_for_dot)?;
        let Some(ty) = ty else { return Ok(()) };

        let sym = self.symbols.create_in_proc(
            &name,
            SymbolKind::ProcLocal,
            Some(ty),
            0,
            self.pass,
            &mut self.log,
        )?;
        if let Some(sym) = sym {
            let offset = self.symbols.value(sym);
            self.listing.put_symbol(offset);
            self.last_local = Some(sym);
        }
        self.trailing_check(rest);
        Ok(())
    }

    /// BEGINPROC closes the declaration part of a procedure: the most
    /// negative local offset becomes the LINK frame size.
    pub fn dir_beginproc(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        if !self.symbols.has_current_proc() || self.proc_begun {
            return Err(self.log.report(ErrorCode::UnexpectedBeginProc, None));
        }
        if size.is_some() {
            self.log.report(ErrorCode::InvSizeCode, None);
        }
        if !label.is_empty() {
            self.log
                .report(ErrorCode::LabelIgnored, Some(label.to_string()));
        }
        let offset = self.last_local.map_or(0, |sym| self.symbols.value(sym));
        self.expand.push_group(vec![instruction_line(
            "link",
            Some("a6"),
            Some(&format!("#{}", offset)),
        )]);
        self.proc_begun = true;
        self.trailing_check(op);
        Ok(())
    }

    pub fn dir_endproc(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        if size.is_some() {
            self.log.report(ErrorCode::InvSizeCode, None);
        }
        if !label.is_empty() {
            self.define_label(label)?;
        }
        let current = self.symbols.set_current_proc(None);
        let valid = current
            .is_some_and(|p| self.symbols.kind(p) == SymbolKind::ProcEntry && self.proc_begun);
        if !valid {
            return Err(self.log.report(ErrorCode::UnexpectedEndProc, None));
        }
        self.last_local = None;
        self.proc_begun = false;

        let mut lines = vec![
            instruction_line("unlk", Some("a6"), None),
            instruction_line("rts", None, None),
        ];
        if self.opts.emit_proc_symbols {
            lines.push(self.macsbug_symbol_line(current.unwrap()));
        }
        self.expand.push_group(lines);
        self.trailing_check(op);
        Ok(())
    }

    pub fn dir_endproxy(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        if size.is_some() {
            self.log.report(ErrorCode::InvSizeCode, None);
        }
        if !label.is_empty() {
            self.define_label(label)?;
        }
        let current = self.symbols.set_current_proc(None);
        let valid = current
            .is_some_and(|p| self.symbols.kind(p) == SymbolKind::ProxyEntry && self.proc_begun);
        if !valid {
            return Err(self.log.report(ErrorCode::UnexpectedEndProxy, None));
        }
        self.proc_begun = false;

        let proc = current.unwrap();
        let slot = self
            .symbols
            .ty(proc)
            .map_or(0, |parms| self.symbols.value(parms));
        let mut lines = vec![
            // recover the return address from its space holder
            instruction_line("move.l", Some(&format!("{}(a7)", slot)), Some("-(a7)")),
            instruction_line("rts", None, None),
        ];
        if self.opts.emit_proc_symbols {
            lines.push(self.macsbug_symbol_line(proc));
        }
        self.expand.push_group(lines);
        self.trailing_check(op);
        Ok(())
    }

    /// Macsbug-style symbol record after the final RTS: a length-tagged,
    /// even-padded copy of the procedure name.
    fn macsbug_symbol_line(&self, proc: SymbolId) -> String {
        let name = self.symbols.name(proc);
        let len = name.len();
        let (mut data, padded_len) = if len <= 31 {
            (format!("${:x},\"{}\",0,0", len | 0x80, name), len)
        } else {
            (format!("$80,${:x},\"{}\",0,0", len, name), len + 1)
        };
        if padded_len & 1 == 0 {
            data.push_str(",0");
        }
        instruction_line("dc.b", Some(&data), None)
    }

    /// CALL (and SYSTRAP/SYSLIBTRAP): marshal the arguments right-to-left
    /// onto the stack, invoke the target (JSR for procedures and proxies,
    /// TRAP #15 plus a selector for traps), then pop the argument bytes.
    pub fn dir_call(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        if size.is_some() {
            self.log.report(ErrorCode::InvSizeCode, None);
        }

        let mut lines: Vec<String> = Vec::new();
        if !label.is_empty() {
            lines.push(format!("{}:", label));
        }

        let (target_name, rest) = parse_id(skip_space(op));
        if target_name.is_empty() {
            return Err(self.log.report(ErrorCode::ExpectedProcName, None));
        }
        let target = match self.symbols.lookup(&target_name) {
            Some(t) => t,
            None => {
                // implicit declaration records that the name was referenced
                self.symbols.create(
                    &target_name,
                    SymbolKind::ProcDef,
                    None,
                    0,
                    self.pass,
                    &mut self.log,
                )?
            }
        };

        let target_kind = self.symbols.kind(target);
        match target_kind {
            SymbolKind::ProcDef => {
                if self.symbols.ty(target).is_none() {
                    self.log
                        .report(ErrorCode::UndefinedSymbol, Some(target_name));
                } else {
                    self.log
                        .report(ErrorCode::DeclaredButUndefinedProc, Some(target_name));
                }
                return Ok(());
            }
            SymbolKind::ProcEntry | SymbolKind::TrapDef | SymbolKind::ProxyEntry => {}
            _ => {
                if self.pass > 0 {
                    self.log
                        .report(ErrorCode::NotAProcedureNorTrap, Some(target_name));
                }
                return Ok(());
            }
        }

        let rest = skip_space(rest);
        let Some(mut p) = rest.strip_prefix('(') else {
            return Err(self
                .log
                .report(ErrorCode::ExpectedLeftParen, Some(rest.to_string())));
        };

        if target_kind == SymbolKind::ProxyEntry {
            // space holder for the return address
            lines.push(instruction_line("subq.l", Some("#4"), Some("a7")));
        }

        // collect the raw arguments first; they marshal last-first
        let mut args: Vec<String> = Vec::new();
        loop {
            let (arg, rest) = parse_arg(p, "),", &mut self.log);
            p = rest;
            args.push(arg);
            if let Some(next) = p.strip_prefix(',') {
                p = next;
            } else {
                break;
            }
        }
        if args.last().is_some_and(String::is_empty) && args.len() == 1 {
            args.clear();
        }

        let parm_list = self.symbols.ty(target);
        let parms: Vec<SymbolId> = parm_list
            .map(|list| {
                self.symbols
                    .members(list)
                    .iter()
                    .copied()
                    .filter(|&m| self.symbols.kind(m) == SymbolKind::ProcParm)
                    .collect()
            })
            .unwrap_or_default();
        let is_vararg = parms
            .last()
            .is_some_and(|&p| self.symbols.name(p) == "...");

        let mut stack_bytes = 0i32;
        let mut marshal: Vec<Vec<String>> = Vec::new();
        let arg_count = args.len().max(parms.len());
        for idx in 0..arg_count {
            let mut arg = args.get(idx).cloned().unwrap_or_default();
            let parm = parms.get(idx).copied();
            let parm_is_vararg =
                parm.is_some_and(|p| self.symbols.name(p) == "...");

            if !arg.is_empty() && parm.is_none() && !is_vararg {
                self.log
                    .report(ErrorCode::TooManyParameters, Some(arg.clone()));
            } else if arg.is_empty() {
                match parm {
                    Some(p) if !parm_is_vararg => {
                        self.log.report(
                            ErrorCode::MissingParameters,
                            Some(self.symbols.name(p).to_string()),
                        );
                        arg = "#0".to_string();
                    }
                    _ => continue,
                }
            }

            let mut arg_size = parm
                .filter(|_| !parm_is_vararg)
                .map_or(0, |p| self.symbols.size_of_symbol(p));

            // `(value).type` overrides the marshalled size of one argument
            let mut text: &str = &arg;
            if let Some(inner) = arg.strip_prefix('(') {
                if let Some(close) = inner.rfind(')') {
                    if inner[close + 1..].starts_with('.') {
                        let (ty, leftover) =
                            self.parse_type_spec(&inner[close + 1..], true)?;
                        if let Some(ty) = ty {
                            let type_size = self.symbols.size_of(ty);
                            if arg_size != 0 && arg_size != type_size {
                                self.log.report(ErrorCode::UnmatchingTypeSizes, None);
                            }
                            arg_size = type_size;
                            if !leftover.is_empty() {
                                self.log
                                    .report(ErrorCode::Syntax, Some(leftover.to_string()));
                            }
                            text = &inner[..close];
                        }
                    }
                }
            }

            let mut group = Vec::new();
            if let Some(address) = text.strip_prefix('&') {
                if arg_size != 4 && arg_size != 0 {
                    self.log.report(ErrorCode::InvParmSize, None);
                }
                group.push(instruction_line("pea", Some(address), None));
                stack_bytes += 4;
            } else if text == "#0" {
                match arg_size {
                    1 => {
                        group.push(instruction_line("clr.b", Some("-(a7)"), None));
                        stack_bytes += 2;
                    }
                    2 => {
                        group.push(instruction_line("clr.w", Some("-(a7)"), None));
                        stack_bytes += 2;
                    }
                    // unknown sizes marshal at the maximum width
                    0 | 4 => {
                        group.push(instruction_line("clr.l", Some("-(a7)"), None));
                        stack_bytes += 4;
                    }
                    _ => {
                        self.log.report(ErrorCode::InvParmSize, None);
                    }
                }
            } else {
                match arg_size {
                    1 => {
                        group.push(instruction_line("move.b", Some(text), Some("-(a7)")));
                        stack_bytes += 2;
                    }
                    2 => {
                        group.push(instruction_line("move.w", Some(text), Some("-(a7)")));
                        stack_bytes += 2;
                    }
                    0 | 4 => {
                        group.push(instruction_line("move.l", Some(text), Some("-(a7)")));
                        stack_bytes += 4;
                    }
                    _ => {
                        self.log.report(ErrorCode::InvParmSize, None);
                    }
                }
            }
            marshal.push(group);
        }
        for group in marshal.into_iter().rev() {
            lines.extend(group);
        }

        let Some(after) = p.strip_prefix(')') else {
            return Err(self
                .log
                .report(ErrorCode::ExpectedRightParen, Some(p.to_string())));
        };

        if target_kind == SymbolKind::ProxyEntry {
            stack_bytes += 4; // account for the return-address holder
        }

        if matches!(target_kind, SymbolKind::ProcEntry | SymbolKind::ProxyEntry) {
            lines.push(format!("\tjsr\t{}(pc)", self.symbols.name(target)));
        } else {
            let trap_type = self.symbols.ty(target);
            let selector_kind = trap_type.map(|t| self.symbols.kind(t));
            if selector_kind != Some(SymbolKind::TypeTrapSimple) {
                let selector = trap_type.map_or(0, |t| self.symbols.value(t));
                let imm = format!("#${:X}", selector);
                if selector_kind == Some(SymbolKind::TypeTrapSelector) {
                    lines.push(instruction_line("moveq", Some(&imm), Some("d2")));
                } else {
                    lines.push(instruction_line("move.w", Some(&imm), Some("-(a7)")));
                    stack_bytes += 2;
                }
            }
            lines.push(instruction_line("trap", Some("#15"), None));
            lines.push(instruction_line(
                "dc.w",
                Some(&format!("${:X}", self.symbols.value(target))),
                None,
            ));
        }

        if stack_bytes > 0 {
            if stack_bytes <= 8 {
                lines.push(instruction_line(
                    "addq.l",
                    Some(&format!("#{}", stack_bytes)),
                    Some("a7"),
                ));
            } else {
                lines.push(instruction_line(
                    "lea",
                    Some(&format!("{}(a7)", stack_bytes)),
                    Some("a7"),
                ));
            }
        }

        self.expand.push_group(lines);

        // show the declared return type in the listing
        if let Some(ret) = parm_list.and_then(|list| self.symbols.ty(list)) {
            let name = self.symbols.name(ret).to_string();
            self.listing.put_type_name(&name);
        }
        self.trailing_check(after);
        Ok(())
    }
}
