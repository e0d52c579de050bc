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

pub mod directives;
pub mod encoder;
pub mod eval;
pub mod guard;
pub mod lexer;
pub mod listing;
pub mod operand;
pub mod section;
pub mod source;
pub mod symbol_table;

use std::collections::HashMap;
use std::path::PathBuf;

use log::debug;

use crate::Options;
use crate::errors::{AsmResult, ErrorCode, ErrorLog};
use crate::file_reader::FileReader;
use crate::prc::{Resource, fourcc};
use crate::{bitmap, rle};
use directives::cond::MAX_IF_LEVEL;
use encoder::table::Entry;
use guard::{GuardKey, GuardStore};
use lexer::skip_space;
use listing::Listing;
use operand::Size;
use section::{BlockType, Sections};
use source::{ExpandBuffer, SourceFrame, SourceStack, MAX_INCLUDE_DEPTH};
use symbol_table::{SymbolId, SymbolKind, SymbolTable, Value};

/// All assembler state, threaded through every directive handler and
/// instruction builder. One instance runs all three passes so symbols,
/// guards and diagnostics survive between them.
pub struct Assembler<'a> {
    pub(crate) reader: &'a dyn FileReader,
    pub(crate) opts: Options,
    pub(crate) pass: u8,

    pub(crate) symbols: SymbolTable,
    pub(crate) guards: GuardStore,
    pub(crate) log: ErrorLog,
    pub(crate) listing: Listing,
    pub(crate) sections: Sections,
    pub(crate) sources: SourceStack,
    pub(crate) expand: ExpandBuffer,
    included: HashMap<PathBuf, u8>,

    root: PathBuf,
    pub(crate) end_flag: bool,
    pub(crate) app_name: String,
    pub(crate) creator: u32,

    pub(crate) resources: Vec<Resource>,
    pub(crate) res_type: u32,
    pub(crate) res_id: u16,
    pub(crate) res_total: u32,

    // conditional assembly
    pub(crate) if_level: usize,
    pub(crate) if_nogen: usize,
    pub(crate) if_else: [bool; MAX_IF_LEVEL],

    // membered type body being collected
    pub(crate) inside_type: Option<SymbolId>,
    pub(crate) next_enum: Value,
    pub(crate) bitfield_shift: i32,
    pub(crate) bitfield_size: i32,

    // open procedure
    pub(crate) last_local: Option<SymbolId>,
    pub(crate) proc_begun: bool,
}

impl<'a> Assembler<'a> {
    pub fn new(root: PathBuf, opts: Options, reader: &'a dyn FileReader) -> Self {
        let listing = Listing::new(opts.listing, opts.const_expanded);
        Assembler {
            reader,
            opts,
            pass: 0,
            symbols: SymbolTable::new(),
            guards: GuardStore::new(),
            log: ErrorLog::new(),
            listing,
            sections: Sections::new(),
            sources: SourceStack::new(),
            expand: ExpandBuffer::new(),
            included: HashMap::new(),
            root,
            end_flag: false,
            app_name: String::new(),
            creator: fourcc(b"TEMP"),
            resources: Vec::new(),
            res_type: 0,
            res_id: 0,
            res_total: 0,
            if_level: 0,
            if_nogen: 0,
            if_else: [false; MAX_IF_LEVEL],
            inside_type: None,
            next_enum: Value::constant(0),
            bitfield_shift: 0,
            bitfield_size: 0,
            last_local: None,
            proc_begun: false,
        }
    }

    /// Run the three passes: discover symbols, fix encoding choices, emit.
    pub fn run(&mut self) {
        for pass in 0..=2 {
            debug!("pass {}", pass);
            self.run_pass(pass);
        }
    }

    fn run_pass(&mut self, pass: u8) {
        self.pass = pass;
        self.sections.reset();
        self.expand.clear();
        self.sources.clear();
        self.end_flag = false;
        self.if_level = 0;
        self.if_nogen = 0;
        self.inside_type = None;
        self.next_enum = Value::constant(0);
        self.bitfield_shift = 0;
        self.bitfield_size = 0;
        self.last_local = None;
        self.proc_begun = false;
        self.symbols.set_current_proc(None);

        if pass == 2 {
            self.log.start_reporting();
            self.listing.start();
        }

        let root = self.root.clone();
        let _ = self.push_source_file(root);

        while !self.end_flag {
            let Some(line) = self.next_line() else { break };
            if let Some(frame) = self.sources.current() {
                let (file, line_no) = (frame.display.clone(), frame.line);
                self.log.set_position(&file, line_no);
            }
            self.log.reset_line_status();
            self.listing.put_location(self.sections.out_loc);
            let line_no = self.sources.current().map_or(0, |f| f.line);
            self.listing
                .put_source_line(&line, line_no, self.expand.line_num() != 0);

            // severe errors were recorded when raised; just stop the line
            let _ = self.assemble_line(&line);

            let pending = self.log.drain_pending();
            self.listing.write_line(&pending);
        }

        if !self.end_flag {
            self.finish_block();
        }
        if self.app_name.is_empty() {
            self.log.report(ErrorCode::MissingAppl, None);
        }
        if self.if_level > 0 {
            self.log.report(ErrorCode::MissingEndIf, None);
        }
    }

    /// The logical line stream: expanded lines first, then the innermost
    /// open file, popping include frames at their end.
    fn next_line(&mut self) -> Option<String> {
        if let Some(line) = self.expand.next() {
            return Some(line);
        }
        self.expand.reset_line_num();
        loop {
            match self.sources.next_line() {
                Some(line) => return Some(line),
                None => {
                    if !self.sources.pop() {
                        return None;
                    }
                }
            }
        }
    }

    /// Split one source line into label, mnemonic and operands and hand it
    /// to the right place.
    fn assemble_line(&mut self, line: &str) -> AsmResult<()> {
        let p = skip_space(line);
        if p.is_empty() || p.starts_with('*') || p.starts_with(';') {
            return Ok(());
        }
        if self.directive_continuation(p)? {
            return Ok(());
        }

        // temporary label
        let b = p.as_bytes();
        if b[0] == b'.'
            && b.len() >= 2
            && (b'1'..=b'9').contains(&b[1])
            && (b.len() == 2 || b[2] == b':' || b[2].is_ascii_whitespace())
        {
            if self.sections.bt != BlockType::Code {
                self.log.report(ErrorCode::TempLabelCodeOnly, None);
                return Ok(());
            }
            let loc = self.sections.out_loc as i32;
            self.symbols
                .create_temp_label(b[1], loc, self.pass, &mut self.log)?;
            let mut rest = &p[2..];
            if let Some(after) = rest.strip_prefix(':') {
                rest = after;
            }
            let rest = skip_space(rest);
            if rest.is_empty() || rest.starts_with('*') || rest.starts_with(';') {
                return Ok(());
            }
            return self.assemble_statement("", rest);
        }

        // a name at column one, or any name ending in a colon, is a label
        let at_col1 = p.len() == line.len();
        let (id, after) = lexer::parse_id(p);
        let looks_like_label = !id.is_empty()
            && (after.starts_with(':')
                || (at_col1
                    && (after.is_empty() || after.starts_with(|c: char| c.is_whitespace()))));
        if looks_like_label {
            let mut rest = after;
            if let Some(a) = rest.strip_prefix(':') {
                rest = a;
            }
            let rest = skip_space(rest);
            if rest.is_empty() || rest.starts_with('*') || rest.starts_with(';') {
                self.define_label(&id)?;
                return Ok(());
            }
            return self.assemble_statement(&id, rest);
        }

        self.assemble_statement("", p)
    }

    fn assemble_statement(&mut self, label: &str, text: &str) -> AsmResult<()> {
        let (inst, size, after) = self.lookup_instruction(text)?;
        let op = skip_space(after);
        match inst.entry {
            Entry::Flavors(flavors) => {
                // instructions start on word boundaries
                if self.sections.out_loc & 1 != 0 {
                    self.log.report(ErrorCode::AlignmentWarning, None);
                    self.sections.out_loc += 1;
                    self.listing.put_location(self.sections.out_loc);
                }
                if !label.is_empty() {
                    self.define_label(label)?;
                }
                self.dispatch_flavors(flavors, size, op)
            }
            Entry::Directive(directive) => self.run_directive(directive, size, label, op),
        }
    }

    /// Define a label at the current location; its kind follows the block
    /// being assembled.
    pub(crate) fn define_label(&mut self, name: &str) -> AsmResult<SymbolId> {
        let kind = match self.sections.bt {
            BlockType::Code => SymbolKind::Code,
            BlockType::Data => SymbolKind::Data,
            BlockType::Resource => SymbolKind::Res,
        };
        let loc = self.sections.out_loc as i32;
        self.symbols
            .create(name, kind, None, loc, self.pass, &mut self.log)
    }

    // ----- output -----

    /// Emit a value at the current location (big-endian) and mirror it
    /// into the listing's object field. Callers advance the counter.
    pub(crate) fn output(&mut self, data: i32, size: Size) {
        self.listing.put_data(data, size);
        self.sections.write(data, size);
    }

    /// Close the active block; a finished resource block becomes a
    /// resource entry.
    pub(crate) fn finish_block(&mut self) {
        if let Some(bytes) = self.sections.end_block() {
            let (fc, id) = (self.res_type, self.res_id);
            self.add_resource(fc, id, bytes);
        }
    }

    /// Register a resource, converting known types: `WBMP` bodies become
    /// Palm bitmaps, `data` bodies are RLE-compressed. With `-r` every
    /// resource is stored untouched.
    pub(crate) fn add_resource(&mut self, fc: u32, id: u16, data: Vec<u8>) {
        if self.pass < 2 {
            return;
        }
        self.res_total += data.len() as u32 + 10;
        if self.opts.resources_only {
            self.resources.push(Resource { fc, id, data });
            return;
        }
        if fc == fourcc(b"WBMP") {
            match bitmap::convert(&data, id) {
                Ok((fc, id, data)) => self.resources.push(Resource { fc, id, data }),
                Err(code) => {
                    self.log.report(code, None);
                }
            }
        } else if fc == fourcc(b"data") {
            let data = rle::build_data_resource(&data);
            self.resources.push(Resource { fc, id, data });
        } else {
            self.resources.push(Resource { fc, id, data });
        }
    }

    // ----- sources -----

    /// Open a source file unless it was already read in this pass (include
    /// guard). Returns false for a suppressed re-inclusion.
    pub(crate) fn push_source_file(&mut self, path: PathBuf) -> AsmResult<bool> {
        if self.included.get(&path) == Some(&self.pass) {
            return Ok(false);
        }
        if self.sources.depth() >= MAX_INCLUDE_DEPTH {
            return Err(self.log.report(
                ErrorCode::IncludeNestedTooDeep,
                Some(path.display().to_string()),
            ));
        }
        let text = match self.reader.read_to_string(&path) {
            Ok(text) => text,
            Err(_) => {
                return Err(self.log.report(
                    ErrorCode::IncludeOpenFailed,
                    Some(path.display().to_string()),
                ));
            }
        };
        self.included.insert(path.clone(), self.pass);
        self.sources.push(SourceFrame::new(path, &text));
        Ok(true)
    }

    // ----- guards -----

    fn guard_key(&self, sub: u8) -> GuardKey {
        let (file, line) = self
            .sources
            .current()
            .map(|f| (f.display.clone(), f.line))
            .unwrap_or_default();
        GuardKey {
            file,
            line,
            expand: self.expand.line_num(),
            sub,
        }
    }

    /// Record a decision in pass 1. Passes 0 and 2 never write guards.
    pub(crate) fn guard_set(&mut self, sub: u8, value: i32) {
        if self.pass == 1 {
            self.guards.set(self.guard_key(sub), value);
        }
    }

    /// Read back a pass-1 decision in pass 2.
    pub(crate) fn guard_get(&mut self, sub: u8) -> AsmResult<i32> {
        match self.guards.get(&self.guard_key(sub)) {
            Some(value) => Ok(value),
            None => Err(self.log.report(ErrorCode::InternalErrorGuardNotDef, None)),
        }
    }

    /// Store in pass 1, verify in pass 2: the value of a guarded decision
    /// must not change between passes.
    pub(crate) fn guard_verify(&mut self, sub: u8, value: i32) -> AsmResult<()> {
        match self.pass {
            0 => Ok(()),
            1 => {
                self.guard_set(sub, value);
                Ok(())
            }
            _ => {
                if self.guard_get(sub)? != value {
                    Err(self.log.report(ErrorCode::GuardError, None))
                } else {
                    Ok(())
                }
            }
        }
    }
}
