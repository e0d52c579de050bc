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

pub mod cond;
pub mod proc;
pub mod types;

use std::path::{Path, PathBuf};

use log::debug;

use crate::assembler::Assembler;
use crate::assembler::lexer::{parse_id, parse_quoted_string, skip_space};
use crate::assembler::operand::Size;
use crate::assembler::section::BlockType;
use crate::assembler::symbol_table::{SymbolCategory, SymbolKind};
use crate::errors::{AsmResult, ErrorCode, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Align,
    Appl,
    BeginProc,
    Call,
    Code,
    Data,
    Dc,
    Dcb,
    Ds,
    Else,
    End,
    EndEnum,
    EndIf,
    EndProc,
    EndProxy,
    EndStruct,
    EndUnion,
    Enum,
    Equ,
    ErrorDir,
    Extern,
    Global,
    If,
    IfDef,
    IfNDef,
    Incbin,
    Include,
    List,
    Local,
    Movem,
    Org,
    Proc,
    ProcDef,
    Proxy,
    Reg,
    Res,
    Set,
    Struct,
    TrapDef,
    TypeDef,
    Union,
}

impl Assembler<'_> {
    pub fn run_directive(
        &mut self,
        directive: Directive,
        size: Option<Size>,
        label: &str,
        op: &str,
    ) -> AsmResult<()> {
        use Directive::*;
        match directive {
            Align => self.dir_align(size, label, op),
            Appl => self.dir_appl(size, op),
            BeginProc => self.dir_beginproc(size, label, op),
            Call => self.dir_call(size, label, op),
            Code => self.dir_code(size),
            Data => self.dir_data(size),
            Dc => self.dir_dc(size, label, op),
            Dcb => self.dir_dcb(size, label, op),
            Ds => self.dir_ds(size, label, op),
            Else => self.dir_else(size, label, op),
            End => self.dir_end(size),
            EndEnum => {
                self.log.report(ErrorCode::UnexpectedEndEnum, None);
                Ok(())
            }
            EndIf => self.dir_endif(size, label, op),
            EndProc => self.dir_endproc(size, label, op),
            EndProxy => self.dir_endproxy(size, label, op),
            EndStruct => {
                self.log.report(ErrorCode::UnexpectedEndStruct, None);
                Ok(())
            }
            EndUnion => {
                self.log.report(ErrorCode::UnexpectedEndUnion, None);
                Ok(())
            }
            Enum => self.dir_membered_type(SymbolKind::TypeEnum, size, label, op),
            Equ => self.dir_equ(size, label, op, false),
            ErrorDir => {
                self.log
                    .report(ErrorCode::UserError, Some(skip_space(op).to_string()));
                Ok(())
            }
            Extern => self.dir_extern(size, label, op),
            Global => self.dir_global(size, label, op),
            If => self.dir_if(size, label, op),
            IfDef => self.dir_ifdef(size, label, op, false),
            IfNDef => self.dir_ifdef(size, label, op, true),
            Incbin => self.dir_incbin(size, label, op),
            Include => self.dir_include(size, op),
            List => self.dir_list(size, op),
            Local => self.dir_local(size, label, op),
            Movem => self.dir_movem(size, label, op),
            Org => self.dir_org(size, label, op),
            Proc => self.dir_proc(size, label, op),
            ProcDef => self.dir_procdef(size, label, op),
            Proxy => self.dir_proxy(size, label, op),
            Reg => self.dir_reg(size, label, op),
            Res => self.dir_res(size, op),
            Set => self.dir_equ(size, label, op, true),
            Struct => self.dir_membered_type(SymbolKind::TypeStruct, size, label, op),
            TrapDef => self.dir_trapdef(size, label, op),
            TypeDef => self.dir_typedef(size, label, op),
            Union => self.dir_membered_type(SymbolKind::TypeUnion, size, label, op),
        }
    }

    fn size_forbidden(&mut self, size: Option<Size>) {
        if size.is_some() {
            self.log.report(ErrorCode::InvSizeCode, None);
        }
    }

    fn trailing_check(&mut self, rest: &str) {
        let rest = skip_space(rest);
        if !rest.is_empty() && !rest.starts_with(';') {
            self.log.report(ErrorCode::Syntax, Some(rest.to_string()));
        }
    }

    /// EQU defines a symbol once; SET creates a freely re-assignable one.
    /// An equate whose expression is still unresolved is recorded as
    /// undefined, so a later-pass resolution trips the phase check.
    fn dir_equ(
        &mut self,
        size: Option<Size>,
        label: &str,
        op: &str,
        redefineable: bool,
    ) -> AsmResult<()> {
        self.size_forbidden(size);
        if label.is_empty() {
            self.log.report(ErrorCode::LabelRequired, None);
        }
        if op.is_empty() {
            self.log.report(ErrorCode::ExpectedExpression, None);
            return Ok(());
        }
        let (value, rest) = self.evaluate(op)?;
        let defineable =
            !self.log.line_at_least(Severity::Error) || value.kind == SymbolKind::Undefined;
        if defineable && !label.is_empty() {
            let sym = self.symbols.create(
                label,
                value.kind,
                value.ty,
                value.value,
                self.pass,
                &mut self.log,
            )?;
            if redefineable {
                self.symbols.set_redefineable(sym);
            }
            self.listing.put_symbol(value.value);
        }
        self.trailing_check(rest);
        Ok(())
    }

    fn dc_size(&mut self, size: Option<Size>) -> Size {
        match size {
            Some(Size::Short) => {
                self.log.report(ErrorCode::InvSizeCode, None);
                Size::Word
            }
            None => Size::Word,
            Some(s) => s,
        }
    }

    fn word_align(&mut self) {
        if self.sections.out_loc & 1 != 0 {
            self.log.report(ErrorCode::AlignmentWarning, None);
            self.sections.out_loc += 1;
            self.listing.put_location(self.sections.out_loc);
        }
    }

    fn dir_dc(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        let size = self.dc_size(size);
        // DC.B runs may stay contiguous; words and longs align first
        if size != Size::Byte {
            self.word_align();
        }
        if !label.is_empty() {
            self.define_label(label)?;
        }
        let mut p = skip_space(op);
        if p.is_empty() {
            return Err(self.log.report(ErrorCode::Syntax, None));
        }
        loop {
            if p.starts_with('"') {
                let (string, rest) = parse_quoted_string(p);
                p = rest;
                if !p.is_empty() && !p.starts_with(',') && !p.starts_with(';') {
                    return Err(self.log.report(ErrorCode::Syntax, Some(p.to_string())));
                }
                let width = size.bytes() as usize;
                for chunk in string.as_bytes().chunks(width) {
                    let mut value: u32 = 0;
                    for k in 0..width {
                        value = (value << 8) | *chunk.get(k).unwrap_or(&0) as u32;
                    }
                    if self.pass == 2 {
                        self.output(value as i32, size);
                    }
                    self.sections.out_loc += size.bytes();
                }
            } else {
                let (value, rest) = self.evaluate(p)?;
                p = skip_space(rest);
                if !p.is_empty() && !p.starts_with(',') && !p.starts_with(';') {
                    return Err(self.log.report(ErrorCode::Syntax, Some(p.to_string())));
                }
                if self.pass == 2 {
                    self.output(value.value, size);
                }
                self.sections.out_loc += size.bytes();
                match size {
                    Size::Byte if !(-128..=255).contains(&value.value) => {
                        self.log.report(ErrorCode::Inv8BitData, None);
                    }
                    Size::Word if !(-32768..=65535).contains(&value.value) => {
                        self.log.report(ErrorCode::Inv16BitData, None);
                    }
                    _ => {}
                }
            }
            if let Some(next) = p.strip_prefix(',') {
                p = skip_space(next);
            } else {
                break;
            }
        }
        self.trailing_check(p);
        Ok(())
    }

    fn dir_dcb(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        let size = self.dc_size(size);
        if size != Size::Byte {
            self.word_align();
        }
        if !label.is_empty() {
            self.define_label(label)?;
        }
        let (count, rest) = self.evaluate(op)?;
        self.guard_verify(0, count.value)?;
        if !rest.starts_with(',') {
            return Err(self.log.report(ErrorCode::Syntax, None));
        }
        if count.value < 0 {
            self.log.report(ErrorCode::InvLength, None);
            return Ok(());
        }
        let (value, rest) = self.evaluate(&rest[1..])?;
        self.trailing_check(rest);
        if self.pass == 2 {
            // the fill bytes bypass the listing
            for _ in 0..count.value {
                self.sections.write(value.value, size);
                self.sections.out_loc += size.bytes();
            }
        } else {
            self.sections.out_loc += count.value as u32 * size.bytes();
        }
        Ok(())
    }

    fn dir_ds(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        let size = self.dc_size(size);
        if size != Size::Byte {
            self.word_align();
        }
        if !label.is_empty() {
            self.define_label(label)?;
        }
        let (count, rest) = self.evaluate(op)?;
        self.guard_verify(0, count.value)?;
        let rest = skip_space(rest);
        if !rest.is_empty() && !rest.starts_with(';') {
            return Err(self.log.report(ErrorCode::Syntax, Some(rest.to_string())));
        }
        if count.value < 0 {
            self.log.report(ErrorCode::InvLength, None);
            return Ok(());
        }
        // uninitialized storage is pooled with the initialized data
        if self.pass == 2 {
            for _ in 0..count.value {
                self.output(0, size);
                self.sections.out_loc += size.bytes();
            }
        } else {
            self.sections.out_loc += count.value as u32 * size.bytes();
        }
        Ok(())
    }

    fn dir_org(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        self.size_forbidden(size);
        if op.is_empty() {
            return Err(self.log.report(ErrorCode::Syntax, None));
        }
        let (value, rest) = self.evaluate(op)?;
        self.guard_verify(0, value.value)?;
        if self.log.line_at_least(Severity::Error) {
            return Ok(());
        }
        if value.category() != SymbolCategory::Const {
            self.log.report(ErrorCode::InvValueCategory, None);
            return Ok(());
        }
        let rest = skip_space(rest);
        if !rest.is_empty() && !rest.starts_with(';') {
            self.log.report(ErrorCode::Syntax, Some(rest.to_string()));
            return Ok(());
        }
        let mut target = value.value;
        if target & 1 != 0 {
            self.log.report(ErrorCode::OddAddress, None);
            target += 1;
        }
        self.sections.out_loc = target.max(0) as u32;
        if !label.is_empty() {
            self.define_label(label)?;
        }
        self.listing.put_location(self.sections.out_loc);
        Ok(())
    }

    fn dir_align(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        self.size_forbidden(size);
        if op.is_empty() {
            return Err(self.log.report(ErrorCode::Syntax, None));
        }
        let (value, rest) = self.evaluate(op)?;
        if self.log.line_at_least(Severity::Error) {
            return Ok(());
        }
        let rest = skip_space(rest);
        if !rest.is_empty() && !rest.starts_with(';') {
            self.log.report(ErrorCode::Syntax, Some(rest.to_string()));
            return Ok(());
        }
        if value.value <= 0 {
            self.log.report(ErrorCode::InvLength, None);
            return Ok(());
        }
        let n = value.value as u32;
        self.sections.out_loc += n - 1;
        self.sections.out_loc -= self.sections.out_loc % n;
        if !label.is_empty() {
            self.define_label(label)?;
        }
        self.listing.put_location(self.sections.out_loc);
        Ok(())
    }

    fn dir_code(&mut self, size: Option<Size>) -> AsmResult<()> {
        self.size_forbidden(size);
        if self.sections.bt == BlockType::Code {
            return Ok(());
        }
        self.finish_block();
        self.sections.select_code();
        Ok(())
    }

    fn dir_data(&mut self, size: Option<Size>) -> AsmResult<()> {
        self.size_forbidden(size);
        if self.sections.bt == BlockType::Data {
            return Ok(());
        }
        self.finish_block();
        self.sections.select_data();
        Ok(())
    }

    fn dir_end(&mut self, size: Option<Size>) -> AsmResult<()> {
        self.size_forbidden(size);
        self.end_flag = true;
        self.finish_block();
        Ok(())
    }

    /// `RES type, id [, "file"]`: with a file the resource body comes from
    /// disk; without one the resource segment becomes the active block.
    fn dir_res(&mut self, size: Option<Size>, op: &str) -> AsmResult<()> {
        self.size_forbidden(size);
        self.finish_block();

        let (ty, rest) = self.evaluate(skip_space(op))?;
        let rest = skip_space(rest);
        if !rest.is_empty() && !rest.starts_with(',') {
            return Err(self.log.report(ErrorCode::Syntax, Some(rest.to_string())));
        }
        self.res_type = ty.value as u32;

        let rest = skip_space(rest.strip_prefix(',').unwrap_or(rest));
        let (id, rest) = self.evaluate(rest)?;
        let rest = skip_space(rest);
        if !rest.is_empty() && !rest.starts_with(',') && !rest.starts_with(';') {
            return Err(self.log.report(ErrorCode::Syntax, Some(rest.to_string())));
        }
        self.res_id = id.value as u16;

        if let Some(after) = rest.strip_prefix(',') {
            let after = skip_space(after);
            if !after.starts_with('"') {
                return Err(self.log.report(ErrorCode::Syntax, Some(after.to_string())));
            }
            let (file, tail) = parse_quoted_string(after);
            let Some(path) = self.resolve_file(&file) else {
                return Err(self
                    .log
                    .report(ErrorCode::ResourceOpenFailed, Some(file.clone())));
            };
            let bytes = match self.reader.read_binary(&path) {
                Ok(bytes) => bytes,
                Err(_) => {
                    return Err(self.log.report(ErrorCode::ResourceOpenFailed, Some(file)));
                }
            };
            debug!("resource 0x{:08x} #{} from {}", self.res_type, self.res_id, file);
            let (fc, id) = (self.res_type, self.res_id);
            self.add_resource(fc, id, bytes);
            self.sections.select_code();
            self.trailing_check(tail);
        } else {
            debug!("resource 0x{:08x} #{} from block", self.res_type, self.res_id);
            self.sections.select_resource();
        }
        Ok(())
    }

    fn dir_appl(&mut self, size: Option<Size>, op: &str) -> AsmResult<()> {
        self.size_forbidden(size);
        let op = skip_space(op);
        if !op.starts_with('"') {
            return Err(self
                .log
                .report(ErrorCode::MissingApplName, Some(op.to_string())));
        }
        let (name, rest) = parse_quoted_string(op);
        self.app_name = name;
        self.app_name.truncate(31);

        let rest = skip_space(rest);
        let Some(rest) = rest.strip_prefix(',') else {
            return Err(self
                .log
                .report(ErrorCode::MissingCreatorId, Some(rest.to_string())));
        };
        let (creator, rest) = self.evaluate(skip_space(rest))?;
        self.creator = creator.value as u32;
        self.trailing_check(rest);
        Ok(())
    }

    fn dir_include(&mut self, size: Option<Size>, op: &str) -> AsmResult<()> {
        self.size_forbidden(size);
        let op = skip_space(op);
        if !op.starts_with('"') {
            return Err(self.log.report(ErrorCode::Syntax, Some(op.to_string())));
        }
        let (file, _) = parse_quoted_string(op);
        let Some(path) = self.resolve_include(&file) else {
            return Err(self.log.report(ErrorCode::IncludeOpenFailed, Some(file)));
        };
        if self.push_source_file(path)? {
            debug!("include \"{}\"", file);
        }
        Ok(())
    }

    fn dir_incbin(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        self.size_forbidden(size);
        let op = skip_space(op);
        if !op.starts_with('"') {
            return Err(self.log.report(ErrorCode::Syntax, Some(op.to_string())));
        }
        let (file, _) = parse_quoted_string(op);
        if !label.is_empty() {
            self.define_label(label)?;
        }
        let Some(path) = self.resolve_file(&file) else {
            return Err(self.log.report(ErrorCode::IncludeOpenFailed, Some(file)));
        };
        let bytes = match self.reader.read_binary(&path) {
            Ok(bytes) => bytes,
            Err(_) => return Err(self.log.report(ErrorCode::IncludeOpenFailed, Some(file))),
        };
        if self.pass == 2 {
            for (i, b) in bytes.iter().enumerate() {
                self.sections.write_byte_at(self.sections.out_loc + i as u32, *b);
            }
        }
        self.sections.out_loc += bytes.len() as u32;
        Ok(())
    }

    fn dir_list(&mut self, size: Option<Size>, op: &str) -> AsmResult<()> {
        self.size_forbidden(size);
        if op.is_empty() {
            return Err(self.log.report(ErrorCode::Syntax, None));
        }
        let (value, rest) = self.evaluate(op)?;
        if self.log.line_at_least(Severity::Error) {
            return Ok(());
        }
        let rest = skip_space(rest);
        if !rest.is_empty() && !rest.starts_with(';') {
            self.log.report(ErrorCode::Syntax, Some(rest.to_string()));
            return Ok(());
        }
        if value.value == 0 {
            self.listing.disable();
        } else {
            self.listing.enable();
        }
        Ok(())
    }

    fn dir_global(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        let look_for_dot = label.is_empty();
        self.size_forbidden(size);
        if self.sections.bt != BlockType::Data {
            self.log.report(ErrorCode::GlobalNotInData, None);
        }
        let (name, p) = if look_for_dot {
            parse_id(skip_space(op))
        } else {
            (label.to_string(), op)
        };
        if name.is_empty() {
            return Err(self
                .log
                .report(ErrorCode::ExpectedGlobalVarId, Some(op.to_string())));
        }
        let (ty, rest) = self.parse_type_spec(p, look_for_dot)?;
        let Some(ty) = ty else { return Ok(()) };
        let type_size = self.symbols.size_of(ty);
        if type_size > 1 && self.sections.out_loc & 1 != 0 {
            self.word_align();
        }
        self.symbols.create(
            &name,
            SymbolKind::Data,
            Some(ty),
            self.sections.out_loc as i32,
            self.pass,
            &mut self.log,
        )?;
        // like DS, globals are pooled zero-initialized into the data block
        if self.pass == 2 {
            for _ in 0..type_size {
                self.output(0, Size::Byte);
                self.sections.out_loc += 1;
            }
        } else {
            self.sections.out_loc += type_size.max(0) as u32;
        }
        self.trailing_check(rest);
        Ok(())
    }

    fn dir_extern(&mut self, size: Option<Size>, label: &str, op: &str) -> AsmResult<()> {
        let look_for_dot = label.is_empty();
        self.size_forbidden(size);
        let (name, p) = if look_for_dot {
            parse_id(skip_space(op))
        } else {
            (label.to_string(), op)
        };
        if name.is_empty() {
            return Err(self
                .log
                .report(ErrorCode::ExpectedExternVarId, Some(op.to_string())));
        }
        let (ty, rest) = self.parse_type_spec(p, look_for_dot)?;
        let Some(ty) = ty else { return Ok(()) };
        self.symbols.create(
            &name,
            SymbolKind::Extern,
            Some(ty),
            0,
            self.pass,
            &mut self.log,
        )?;
        self.trailing_check(rest);
        Ok(())
    }

    /// Locate an include file: absolute paths as-is, then the including
    /// file's directory, the working directory, and each entry of the
    /// PILAINC search path.
    pub fn resolve_include(&self, name: &str) -> Option<PathBuf> {
        let given = Path::new(name);
        if given.is_absolute() {
            return self.reader.exists(given).then(|| given.to_path_buf());
        }
        if let Some(frame) = self.sources.current() {
            if let Some(dir) = frame.path.parent() {
                let candidate = dir.join(name);
                if self.reader.exists(&candidate) {
                    return Some(candidate);
                }
            }
        }
        if self.reader.exists(given) {
            return Some(given.to_path_buf());
        }
        if let Ok(search) = std::env::var("PILAINC") {
            for dir in std::env::split_paths(&search) {
                let candidate = dir.join(name);
                if self.reader.exists(&candidate) {
                    return Some(candidate);
                }
            }
        }
        None
    }

    /// Binary companion files (INCBIN, RES) resolve the same way.
    pub fn resolve_file(&self, name: &str) -> Option<PathBuf> {
        self.resolve_include(name)
    }
}
