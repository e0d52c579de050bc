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

use std::collections::HashMap;

use crate::errors::{AsmResult, ErrorCode, ErrorLog};

/// Index into the symbol arena. Types reference each other cyclically
/// (pointer -> base, struct -> member types), so symbols are addressed by
/// index instead of by reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Undefined,
    ProcDef,
    ProcEntry,
    ProcLocal,
    ProcLabel,
    ProcParm,
    RegList,
    ProxyEntry,
    TrapDef,
    Code,
    Data,
    Res,
    Const,
    Extern,
    TypeProc,
    TypeProxy,
    TypeTrapSimple,
    TypeTrapSelector,
    TypeTrap16BitSel,
    TypeEnum,
    TypeStruct,
    TypeUnion,
    TypeBitfield,
    TypePointer,
    TypeArray,
    TypeAlias,
    TypeSimple,
}

/// Coarse classification of what a value means. Categories drive the
/// legality rules of expressions and addressing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolCategory {
    None,
    Code,
    Data,
    Stack,
    Res,
    Const,
    Type,
}

impl SymbolKind {
    pub fn category(self) -> SymbolCategory {
        use SymbolKind::*;
        match self {
            Undefined | ProcDef | RegList | TrapDef | Extern => SymbolCategory::None,
            ProcEntry | ProcLabel | ProxyEntry | Code => SymbolCategory::Code,
            Data => SymbolCategory::Data,
            ProcLocal | ProcParm => SymbolCategory::Stack,
            Res => SymbolCategory::Res,
            Const => SymbolCategory::Const,
            TypeProc | TypeProxy | TypeTrapSimple | TypeTrapSelector | TypeTrap16BitSel
            | TypeEnum | TypeStruct | TypeUnion | TypeBitfield | TypePointer | TypeArray
            | TypeAlias | TypeSimple => SymbolCategory::Type,
        }
    }
}

/// The tagged result of evaluating an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Value {
    pub value: i32,
    pub kind: SymbolKind,
    pub ty: Option<SymbolId>,
}

impl Value {
    pub fn constant(value: i32) -> Self {
        Value {
            value,
            kind: SymbolKind::Const,
            ty: None,
        }
    }

    pub fn undefined() -> Self {
        Value {
            value: 0,
            kind: SymbolKind::Undefined,
            ty: None,
        }
    }

    pub fn category(&self) -> SymbolCategory {
        self.kind.category()
    }
}

#[derive(Debug)]
pub struct Symbol {
    pub name: String,
    pub value: Value,
    /// Sub-symbols: struct/union/enum members, procedure parameters,
    /// locals and labels, bitfield mask/size/shift constants.
    pub members: Vec<SymbolId>,
    /// Pointer/array types derived from this type, interned by shape.
    pub derived: Vec<SymbolId>,
    pub redefineable: bool,
}

pub struct SymbolTable {
    arena: Vec<Symbol>,
    global: HashMap<String, SymbolId>,
    current_proc: Option<SymbolId>,
    temp_counts: [u32; 9],
    temp_pass: Option<u8>,
}

enum Target {
    Global,
    Members(SymbolId),
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = SymbolTable {
            arena: Vec::new(),
            global: HashMap::new(),
            current_proc: None,
            temp_counts: [0; 9],
            temp_pass: None,
        };
        for (name, size) in [
            ("void", 0),
            ("int", 2),
            ("float", 4),
            ("double", 8),
            ("char", 1),
            ("b", 1),
            ("w", 2),
            ("l", 4),
            ("d", 8),
        ] {
            let id = table.alloc(name, SymbolKind::TypeSimple, None, size);
            table.global.insert(name.to_string(), id);
        }
        table
    }

    /// Allocate a detached symbol. Callers wire it into a scope themselves
    /// (or not at all, for anonymous parameter-list and bitfield types).
    pub fn alloc(
        &mut self,
        name: &str,
        kind: SymbolKind,
        ty: Option<SymbolId>,
        value: i32,
    ) -> SymbolId {
        let id = SymbolId(self.arena.len() as u32);
        self.arena.push(Symbol {
            name: name.to_string(),
            value: Value { value, kind, ty },
            members: Vec::new(),
            derived: Vec::new(),
            redefineable: false,
        });
        id
    }

    // ----- accessors -----

    pub fn name(&self, id: SymbolId) -> &str {
        &self.arena[id.0 as usize].name
    }

    pub fn kind(&self, id: SymbolId) -> SymbolKind {
        self.arena[id.0 as usize].value.kind
    }

    pub fn value(&self, id: SymbolId) -> i32 {
        self.arena[id.0 as usize].value.value
    }

    pub fn ty(&self, id: SymbolId) -> Option<SymbolId> {
        self.arena[id.0 as usize].value.ty
    }

    pub fn val(&self, id: SymbolId) -> Value {
        self.arena[id.0 as usize].value
    }

    pub fn members(&self, id: SymbolId) -> &[SymbolId] {
        &self.arena[id.0 as usize].members
    }

    pub fn set_value(&mut self, id: SymbolId, value: i32) {
        self.arena[id.0 as usize].value.value = value;
    }

    pub fn set_kind(&mut self, id: SymbolId, kind: SymbolKind) {
        self.arena[id.0 as usize].value.kind = kind;
    }

    pub fn set_type(&mut self, id: SymbolId, ty: Option<SymbolId>) {
        self.arena[id.0 as usize].value.ty = ty;
    }

    pub fn set_redefineable(&mut self, id: SymbolId) {
        self.arena[id.0 as usize].redefineable = true;
    }

    pub fn is_redefineable(&self, id: SymbolId) -> bool {
        self.arena[id.0 as usize].redefineable
    }

    // ----- procedure scope -----

    pub fn set_current_proc(&mut self, proc: Option<SymbolId>) -> Option<SymbolId> {
        std::mem::replace(&mut self.current_proc, proc)
    }

    pub fn current_proc(&self) -> Option<SymbolId> {
        self.current_proc
    }

    pub fn has_current_proc(&self) -> bool {
        self.current_proc.is_some()
    }

    // ----- lookup -----

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.global.get(name).copied()
    }

    /// Resolve `id` inside the member scope of `sym`: procedure parameter
    /// lists, struct/union members, enum members, bitfield constants.
    pub fn lookup_member(&self, sym: SymbolId, id: &str) -> Option<SymbolId> {
        let mut sym = sym;
        if self.kind(sym).category() != SymbolCategory::Type {
            sym = self.ty(sym)?;
        }
        while self.kind(sym) == SymbolKind::TypeAlias {
            sym = self.ty(sym)?;
        }
        use SymbolKind::*;
        match self.kind(sym) {
            TypeEnum | TypeStruct | TypeUnion | TypeProc | TypeProxy | TypeTrapSimple
            | TypeTrapSelector | TypeTrap16BitSel | TypeBitfield => self
                .members(sym)
                .iter()
                .copied()
                .find(|&m| self.name(m) == id),
            _ => None,
        }
    }

    pub fn lookup_scope_proc(&self, id: &str) -> Option<SymbolId> {
        self.lookup_member(self.current_proc?, id)
    }

    // ----- creation -----

    /// Create or re-define a symbol. Code-category names defined inside an
    /// open procedure land in the procedure scope, everything else in the
    /// global map. Re-definitions are verified against the phase rules.
    pub fn create(
        &mut self,
        name: &str,
        kind: SymbolKind,
        ty: Option<SymbolId>,
        value: i32,
        pass: u8,
        log: &mut ErrorLog,
    ) -> AsmResult<SymbolId> {
        if let Some(proc) = self.current_proc {
            let scoped = (kind.category() == SymbolCategory::Code && name != self.name(proc))
                || kind == SymbolKind::RegList;
            if scoped {
                return Ok(self
                    .create_in_proc(name, kind, ty, value, pass, log)?
                    .expect("code labels always create a scope symbol"));
            }
        }
        self.add_symbol(Target::Global, name, kind, ty, value, pass, log)
    }

    /// Create a symbol in the current procedure's scope. `LOCAL` offsets
    /// are computed here: each local sits below every previous one,
    /// rounded to an even frame offset.
    pub fn create_in_proc(
        &mut self,
        name: &str,
        kind: SymbolKind,
        ty: Option<SymbolId>,
        value: i32,
        pass: u8,
        log: &mut ErrorLog,
    ) -> AsmResult<Option<SymbolId>> {
        let Some(proc) = self.current_proc else {
            log.report(ErrorCode::InternalErrorNoCurrProc, Some(name.to_string()));
            return Ok(None);
        };
        let Some(list) = self.ty(proc) else {
            log.report(ErrorCode::InternalErrorNoCurrProc, Some(name.to_string()));
            return Ok(None);
        };

        let (kind, ty, value) = match kind {
            SymbolKind::Code | SymbolKind::ProcLabel => {
                if let Some(t) = ty {
                    log.report(ErrorCode::TypeIgnored, Some(self.name(t).to_string()));
                }
                (SymbolKind::ProcLabel, None, value)
            }
            SymbolKind::ProcLocal => {
                let Some(t) = ty else {
                    log.report(ErrorCode::MissingTypeSpec, Some(name.to_string()));
                    return Ok(None);
                };
                // only locals declared before this one count, so that
                // later passes recompute the same offsets
                let mut min = 0i32;
                for &m in self.members(list) {
                    if self.name(m) == name {
                        break;
                    }
                    if self.kind(m) == SymbolKind::ProcLocal && self.value(m) < min {
                        min = self.value(m);
                    }
                }
                let mut offset = min - self.size_of(t);
                if offset & 1 != 0 {
                    offset -= 1;
                }
                (SymbolKind::ProcLocal, Some(t), offset)
            }
            SymbolKind::RegList => (SymbolKind::RegList, None, value),
            _ => {
                log.report(ErrorCode::InternalErrorSymbolKind, Some(name.to_string()));
                return Ok(None);
            }
        };

        self.add_symbol(Target::Members(list), name, kind, ty, value, pass, log)
            .map(Some)
    }

    /// The shared insertion path with the phase rules:
    /// - undefined symbols may be refined to a concrete category in pass 0
    ///   only; later refinement is a phase error,
    /// - a non-redefineable symbol whose value or type changes in pass 2 is
    ///   a phase error,
    /// - procedure declarations merge with their later definitions.
    fn add_symbol(
        &mut self,
        target: Target,
        name: &str,
        kind: SymbolKind,
        ty: Option<SymbolId>,
        value: i32,
        pass: u8,
        log: &mut ErrorLog,
    ) -> AsmResult<SymbolId> {
        use SymbolKind::*;

        let existing = match &target {
            Target::Global => self.global.get(name).copied(),
            Target::Members(list) => self
                .members(*list)
                .iter()
                .copied()
                .find(|&m| self.name(m) == name),
        };

        let Some(existing) = existing else {
            let id = self.alloc(name, kind, ty, value);
            match target {
                Target::Global => {
                    self.global.insert(name.to_string(), id);
                }
                Target::Members(list) => {
                    self.arena[list.0 as usize].members.push(id);
                }
            }
            return Ok(id);
        };

        let old_kind = self.kind(existing);

        // procedure declarations and entry points merge
        if matches!(kind, ProcDef | ProcEntry | ProxyEntry | TrapDef) {
            let compatible = match kind {
                ProcDef | ProcEntry => matches!(old_kind, ProcDef | ProcEntry),
                _ => old_kind == kind || old_kind == ProcDef,
            };
            if !compatible {
                log.report(ErrorCode::KindDifferent, Some(name.to_string()));
                return Ok(self.alloc(name, kind, ty, value));
            }
            if matches!(kind, ProcEntry | ProxyEntry | TrapDef) {
                if pass == 2 && old_kind == kind && self.value(existing) != value {
                    return Err(log.report(ErrorCode::PhaseError, Some(name.to_string())));
                }
                self.set_kind(existing, kind);
                self.set_value(existing, value);
            }
            if ty.is_some() {
                self.set_type(existing, ty);
            }
            return Ok(existing);
        }

        if old_kind == Undefined && kind != Undefined {
            if pass == 0 {
                self.set_kind(existing, kind);
                self.set_value(existing, value);
                self.set_type(existing, ty);
                return Ok(existing);
            }
            return Err(log.report(ErrorCode::PhaseError, Some(name.to_string())));
        }

        if kind == Undefined {
            // reference to a still-unresolved name; keep whatever is there
            return Ok(existing);
        }

        if old_kind != kind {
            log.report(ErrorCode::KindDifferent, Some(name.to_string()));
            return Ok(self.alloc(name, kind, ty, value));
        }

        if pass == 2
            && !self.is_redefineable(existing)
            && (self.value(existing) != value || (ty.is_some() && self.ty(existing) != ty))
        {
            return Err(log.report(ErrorCode::PhaseError, Some(name.to_string())));
        }
        self.set_value(existing, value);
        if ty.is_some() {
            self.set_type(existing, ty);
        }
        Ok(existing)
    }

    /// Position `parm_no` (1-based) of a parameter list. Offsets start at 8
    /// off the frame pointer (0 for proxies, which address through the
    /// stack pointer) and grow past each earlier parameter, even-aligned.
    pub fn create_parameter(
        &mut self,
        parm_list: SymbolId,
        proc_kind: SymbolKind,
        parm_no: usize,
        name: &str,
        ty: Option<SymbolId>,
        pass: u8,
        log: &mut ErrorLog,
    ) -> AsmResult<SymbolId> {
        let parms: Vec<SymbolId> = self
            .members(parm_list)
            .iter()
            .copied()
            .filter(|&m| self.kind(m) == SymbolKind::ProcParm)
            .collect();

        let mut value = if self.kind(parm_list) == SymbolKind::TypeProxy {
            0
        } else {
            8
        };
        for &p in parms.iter().take(parm_no.saturating_sub(1)) {
            let mut max = self.value(p) + self.size_of_symbol(p);
            if max & 1 != 0 {
                max += 1;
            }
            if max > value {
                value = max;
            }
        }

        if let Some(&existing) = parms.get(parm_no - 1) {
            if matches!(proc_kind, SymbolKind::ProcEntry | SymbolKind::ProxyEntry)
                && self.name(existing) != name
            {
                self.arena[existing.0 as usize].name = name.to_string();
            }
            if pass == 2 && (self.value(existing) != value || self.ty(existing) != ty) {
                return Err(log.report(ErrorCode::PhaseError, Some(name.to_string())));
            }
            self.set_value(existing, value);
            self.set_type(existing, ty);
            return Ok(existing);
        }

        // proxies keep the return-address slot just past the last parameter
        if proc_kind == SymbolKind::ProxyEntry {
            let mut slot = value + ty.map_or(0, |t| self.size_of(t));
            if slot & 1 != 0 {
                slot += 1;
            }
            self.set_value(parm_list, slot);
        }

        let id = self.alloc(name, SymbolKind::ProcParm, ty, value);
        self.arena[parm_list.0 as usize].members.push(id);
        Ok(id)
    }

    /// Intern a pointer or array derivation of a base type.
    pub fn create_derived(&mut self, base: SymbolId, kind: SymbolKind, value: i32) -> SymbolId {
        let name = match kind {
            SymbolKind::TypePointer => format!("{}*", self.name(base)),
            SymbolKind::TypeArray => format!("{}[{}]", self.name(base), value),
            _ => unreachable!("only pointers and arrays derive"),
        };
        if let Some(&d) = self.arena[base.0 as usize]
            .derived
            .iter()
            .find(|&&d| self.arena[d.0 as usize].name == name)
        {
            return d;
        }
        let id = self.alloc(&name, kind, Some(base), value);
        self.arena[base.0 as usize].derived.push(id);
        id
    }

    /// Add a member to a struct, union, enum or bitfield type. Struct
    /// members are laid out consecutively (even-aligned past byte-sized
    /// members), union and enum members at their given values.
    pub fn create_member(
        &mut self,
        target: SymbolId,
        name: &str,
        ty: Option<SymbolId>,
        value: i32,
        pass: u8,
        log: &mut ErrorLog,
    ) -> AsmResult<SymbolId> {
        use SymbolKind::*;
        let target_kind = self.kind(target);

        let member = match self
            .members(target)
            .iter()
            .copied()
            .find(|&m| self.name(m) == name)
        {
            Some(m) => {
                if pass == 0 {
                    log.report(ErrorCode::MultipleDefs, Some(name.to_string()));
                }
                self.set_type(m, ty);
                m
            }
            None => {
                let id = self.alloc(name, Const, ty, value);
                self.arena[target.0 as usize].members.push(id);
                id
            }
        };
        let pos = self
            .members(target)
            .iter()
            .position(|&m| m == member)
            .expect("member was just inserted");
        let prev = pos.checked_sub(1).map(|i| self.members(target)[i]);

        let value = match target_kind {
            TypeEnum => {
                // the enum itself is the type of each member, and members
                // are visible as global constants too
                self.set_type(member, Some(target));
                self.add_symbol(
                    Target::Global,
                    name,
                    Const,
                    Some(target),
                    value,
                    pass,
                    log,
                )?;
                value
            }
            TypeStruct => match prev {
                None => 0,
                Some(prev) => {
                    let prev_ty = self.ty(prev);
                    let packs_on = prev_ty.is_some_and(|t| {
                        self.kind(t) == TypeBitfield
                            && self.value(t) > 0
                            && ty.is_some_and(|nt| self.kind(nt) == TypeBitfield)
                    });
                    let mut v = if packs_on {
                        self.value(prev)
                    } else {
                        self.value(prev) + prev_ty.map_or(0, |t| self.size_of(t))
                    };
                    if ty.map_or(0, |t| self.size_of(t)) > 1 && v & 1 != 0 {
                        v += 1;
                    }
                    v
                }
            },
            TypeUnion => 0,
            TypeBitfield => value,
            _ => {
                log.report(ErrorCode::InternalErrorSymbolKind, Some(name.to_string()));
                value
            }
        };

        if pass == 2 && self.value(member) != value {
            return Err(log.report(ErrorCode::PhaseError, Some(name.to_string())));
        }
        self.set_value(member, value);
        Ok(member)
    }

    // ----- temporary labels -----

    fn temp_name(digit: u8, counter: u32) -> String {
        format!(":temp:{}:{:08X}", digit as char, counter)
    }

    fn temp_reset_check(&mut self, pass: u8) {
        if self.temp_pass != Some(pass) {
            self.temp_counts = [0; 9];
            self.temp_pass = Some(pass);
        }
    }

    pub fn create_temp_label(
        &mut self,
        digit: u8,
        loc: i32,
        pass: u8,
        log: &mut ErrorLog,
    ) -> AsmResult<SymbolId> {
        self.temp_reset_check(pass);
        let slot = (digit - b'1') as usize;
        self.temp_counts[slot] += 1;
        let name = Self::temp_name(digit, self.temp_counts[slot]);
        self.create(&name, SymbolKind::Code, None, loc, pass, log)
    }

    /// `direction` is `f` (next definition) or `b` (most recent one).
    pub fn lookup_temp_label(&mut self, digit: u8, direction: u8, pass: u8) -> Option<SymbolId> {
        self.temp_reset_check(pass);
        let direction = direction.to_ascii_lowercase();
        if !(b'1'..=b'9').contains(&digit) || (direction != b'f' && direction != b'b') {
            return None;
        }
        let mut counter = self.temp_counts[(digit - b'1') as usize];
        if direction == b'f' {
            counter += 1;
        } else if counter == 0 {
            return None;
        }
        let name = Self::temp_name(digit, counter);
        self.lookup_scope_proc(&name).or_else(|| self.lookup(&name))
    }

    // ----- sizes -----

    /// Size in bytes of a symbol's value, i.e. the size of its type.
    pub fn size_of_symbol(&self, id: SymbolId) -> i32 {
        if self.kind(id).category() == SymbolCategory::Type {
            self.size_of(id)
        } else {
            self.ty(id).map_or(0, |t| self.size_of(t))
        }
    }

    pub fn size_of(&self, ty: SymbolId) -> i32 {
        use SymbolKind::*;
        match self.kind(ty) {
            TypeEnum => {
                let mut min = 0i32;
                let mut max = 0i32;
                for &m in self.members(ty) {
                    min = min.min(self.value(m));
                    max = max.max(self.value(m));
                }
                if min < -32768 || (min < 0 && max > 32767) || max > 65535 {
                    4
                } else if min < -128 || (min < 0 && max > 127) || max > 255 {
                    2
                } else {
                    1
                }
            }
            TypeStruct => match self.members(ty).last() {
                Some(&last) => self.value(last) + self.size_of_symbol(last),
                None => 0,
            },
            TypeUnion => self
                .members(ty)
                .iter()
                .map(|&m| self.size_of_symbol(m))
                .max()
                .unwrap_or(0),
            TypeBitfield => self.ty(ty).map_or(0, |t| self.size_of(t)),
            TypePointer => 4,
            TypeArray => {
                if self.value(ty) == 0 {
                    return 0;
                }
                let mut elem = self.ty(ty).map_or(0, |t| self.size_of(t));
                if elem > 1 && elem & 1 != 0 {
                    elem += 1;
                }
                self.value(ty) * elem
            }
            TypeAlias => self.ty(ty).map_or(0, |t| self.size_of(t)),
            TypeSimple => self.value(ty),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> ErrorLog {
        let mut l = ErrorLog::new();
        l.set_position("test", 1);
        l
    }

    #[test]
    fn builtin_types_seeded() {
        let t = SymbolTable::new();
        let w = t.lookup("w").unwrap();
        assert_eq!(t.kind(w), SymbolKind::TypeSimple);
        assert_eq!(t.size_of(w), 2);
    }

    #[test]
    fn struct_layout_aligns_words() {
        let mut t = SymbolTable::new();
        let mut l = log();
        let st = t.alloc("Rec", SymbolKind::TypeStruct, None, 0);
        let b = t.lookup("b").unwrap();
        let w = t.lookup("w").unwrap();
        t.create_member(st, "flag", Some(b), 0, 0, &mut l).unwrap();
        t.create_member(st, "count", Some(w), 0, 0, &mut l).unwrap();
        let count = t.lookup_member(st, "count").unwrap();
        assert_eq!(t.value(count), 2); // byte member padded to even offset
        assert_eq!(t.size_of(st), 4);
    }

    #[test]
    fn enum_size_spans_range() {
        let mut t = SymbolTable::new();
        let mut l = log();
        let en = t.alloc("Color", SymbolKind::TypeEnum, None, 0);
        t.create_member(en, "Red", None, 0, 0, &mut l).unwrap();
        t.create_member(en, "Green", None, 5, 0, &mut l).unwrap();
        t.create_member(en, "Blue", None, 6, 0, &mut l).unwrap();
        assert_eq!(t.size_of(en), 1);
        // members are exposed globally as constants
        assert_eq!(t.value(t.lookup("Green").unwrap()), 5);
        t.create_member(en, "Big", None, 70000, 0, &mut l).unwrap();
        assert_eq!(t.size_of(en), 4);
    }

    #[test]
    fn locals_stack_downward_even() {
        let mut t = SymbolTable::new();
        let mut l = log();
        let parms = t.alloc("", SymbolKind::TypeProc, None, 0);
        let p = t.alloc("MyProc", SymbolKind::ProcEntry, Some(parms), 0);
        t.set_current_proc(Some(p));
        let b = t.lookup("b").unwrap();
        let w = t.lookup("w").unwrap();
        let v1 = t
            .create_in_proc("v1", SymbolKind::ProcLocal, Some(b), 0, 0, &mut l)
            .unwrap()
            .unwrap();
        let v2 = t
            .create_in_proc("v2", SymbolKind::ProcLocal, Some(w), 0, 0, &mut l)
            .unwrap()
            .unwrap();
        assert_eq!(t.value(v1), -2); // one byte, rounded down to even
        assert_eq!(t.value(v2), -4);
    }

    #[test]
    fn parameters_start_at_eight() {
        let mut t = SymbolTable::new();
        let mut l = log();
        let parms = t.alloc("", SymbolKind::TypeProc, None, 0);
        let w = t.lookup("w").unwrap();
        let lty = t.lookup("l").unwrap();
        let p1 = t
            .create_parameter(parms, SymbolKind::ProcEntry, 1, "a", Some(w), 0, &mut l)
            .unwrap();
        let p2 = t
            .create_parameter(parms, SymbolKind::ProcEntry, 2, "bp", Some(lty), 0, &mut l)
            .unwrap();
        assert_eq!(t.value(p1), 8);
        assert_eq!(t.value(p2), 10);
    }

    #[test]
    fn late_refinement_is_phase_error() {
        let mut t = SymbolTable::new();
        let mut l = log();
        t.create("fwd", SymbolKind::Undefined, None, 0, 0, &mut l)
            .unwrap();
        // pass 1 resolution of a symbol pass 0 left undefined
        let err = t
            .create("fwd", SymbolKind::Const, None, 16, 1, &mut l)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PhaseError);
    }

    #[test]
    fn pass2_value_drift_is_phase_error() {
        let mut t = SymbolTable::new();
        let mut l = log();
        t.create("lbl", SymbolKind::Code, None, 10, 0, &mut l).unwrap();
        t.create("lbl", SymbolKind::Code, None, 12, 1, &mut l).unwrap();
        let err = t
            .create("lbl", SymbolKind::Code, None, 14, 2, &mut l)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PhaseError);
    }

    #[test]
    fn set_symbols_redefine_freely() {
        let mut t = SymbolTable::new();
        let mut l = log();
        let s = t.create("cnt", SymbolKind::Const, None, 1, 0, &mut l).unwrap();
        t.set_redefineable(s);
        assert!(t.create("cnt", SymbolKind::Const, None, 2, 2, &mut l).is_ok());
        assert_eq!(t.value(s), 2);
    }

    #[test]
    fn derived_types_intern() {
        let mut t = SymbolTable::new();
        let w = t.lookup("w").unwrap();
        let p1 = t.create_derived(w, SymbolKind::TypePointer, 0);
        let p2 = t.create_derived(w, SymbolKind::TypePointer, 0);
        assert_eq!(p1, p2);
        assert_eq!(t.size_of(p1), 4);
        let arr = t.create_derived(w, SymbolKind::TypeArray, 5);
        assert_eq!(t.size_of(arr), 10);
    }

    #[test]
    fn temp_labels_count_per_digit() {
        let mut t = SymbolTable::new();
        let mut l = log();
        assert!(t.lookup_temp_label(b'1', b'b', 0).is_none());
        t.create_temp_label(b'1', 100, 0, &mut l).unwrap();
        let back = t.lookup_temp_label(b'1', b'b', 0).unwrap();
        assert_eq!(t.value(back), 100);
        assert!(t.lookup_temp_label(b'1', b'f', 0).is_none());
        t.create_temp_label(b'1', 200, 0, &mut l).unwrap();
        let back = t.lookup_temp_label(b'1', b'B', 0).unwrap();
        assert_eq!(t.value(back), 200);
    }
}
