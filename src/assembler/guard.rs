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

// guarded decision values
pub const GUARD_LONG_BRANCH: i32 = 1;
pub const GUARD_SHORT_BRANCH: i32 = 2;
pub const GUARD_REGLIST_LEFT: i32 = 3;
pub const GUARD_REGLIST_RIGHT: i32 = 4;
pub const GUARD_USE_MOVEQ: i32 = 5;
pub const GUARD_USE_MOVE: i32 = 6;
pub const GUARD_USE_QUICKMATH: i32 = 7;
pub const GUARD_NO_QUICKMATH: i32 = 8;
pub const GUARD_ABS_SHORT: i32 = 9;
pub const GUARD_ABS_LONG: i32 = 10;

/// A decision made in pass 1 that pass 2 must repeat identically, keyed by
/// the exact source position (file, line, expand-line index) plus a sub id
/// to tell several guarded decisions on one line apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GuardKey {
    pub file: String,
    pub line: u32,
    pub expand: u32,
    pub sub: u8,
}

#[derive(Debug, Default)]
pub struct GuardStore {
    entries: HashMap<GuardKey, i32>,
}

impl GuardStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: GuardKey, value: i32) {
        self.entries.insert(key, value);
    }

    pub fn get(&self, key: &GuardKey) -> Option<i32> {
        self.entries.get(key).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_distinguish_sub_ids_and_expansion() {
        let mut g = GuardStore::new();
        let k1 = GuardKey {
            file: "a.asm".into(),
            line: 4,
            expand: 0,
            sub: 1,
        };
        let k2 = GuardKey { sub: 2, ..k1.clone() };
        let k3 = GuardKey { expand: 3, ..k1.clone() };
        g.set(k1.clone(), GUARD_ABS_SHORT);
        g.set(k2.clone(), GUARD_ABS_LONG);
        assert_eq!(g.get(&k1), Some(GUARD_ABS_SHORT));
        assert_eq!(g.get(&k2), Some(GUARD_ABS_LONG));
        assert_eq!(g.get(&k3), None);
    }
}
