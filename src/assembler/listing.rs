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

use crate::assembler::operand::Size;

// the object-code field ends at this column; the source text follows
const OBJECT_FIELD: usize = 41;
const DATA_LIMIT: usize = 40;

/// Builds the listing text during pass 2. Each line carries the output
/// location, the emitted bytes (or `=value` for equates), and the source
/// line. Nothing is produced until `start()`, so the earlier passes stay
/// silent, and `LIST 0`/`LIST 1` toggle output mid-file.
#[derive(Debug, Default)]
pub struct Listing {
    wanted: bool,
    started: bool,
    enabled: bool,
    const_expanded: bool,
    out: String,
    line_buf: String,
    source_line: String,
    source_line_no: u32,
    source_is_expand: bool,
}

impl Listing {
    pub fn new(wanted: bool, const_expanded: bool) -> Self {
        Listing {
            wanted,
            const_expanded,
            ..Default::default()
        }
    }

    /// Called at the start of the emitting pass.
    pub fn start(&mut self) {
        self.started = true;
        self.enable();
    }

    pub fn enable(&mut self) {
        self.enabled = self.wanted && self.started;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn put_location(&mut self, location: u32) {
        if self.enabled {
            self.line_buf = format!("{:08X}  ", location);
        }
    }

    pub fn put_source_line(&mut self, line: &str, line_no: u32, is_expand: bool) {
        if self.enabled {
            self.source_line = line.to_string();
            self.source_line_no = line_no;
            self.source_is_expand = is_expand;
        }
    }

    /// EQU/SET and type-sized directives show their value instead of bytes.
    pub fn put_symbol(&mut self, value: i32) {
        if self.enabled {
            self.line_buf.push('=');
            self.put_data(value, Size::Long);
        }
    }

    pub fn put_type_name(&mut self, name: &str) {
        if self.enabled {
            self.line_buf.push('=');
            let mut name = name.to_string();
            name.truncate(29);
            self.line_buf.push_str(&name);
        }
    }

    /// Append emitted bytes to the object field. Overflowing data either
    /// elides with `...` or, with `-c`, continues on fresh lines.
    pub fn put_data(&mut self, data: i32, size: Size) {
        if !self.enabled {
            return;
        }
        let width = match size {
            Size::Byte | Size::Short => 2,
            Size::Word => 4,
            Size::Long => 8,
        };
        if self.line_buf.len() + width + 1 > DATA_LIMIT {
            if !self.const_expanded {
                let cut = if size == Size::Word { 35 } else { 37 };
                self.line_buf.truncate(cut);
                while self.line_buf.len() < cut {
                    self.line_buf.push(' ');
                }
                self.line_buf.push_str("...");
                return;
            }
            self.flush_line();
            self.line_buf = " ".repeat(10);
        }
        match size {
            Size::Byte | Size::Short => {
                self.line_buf.push_str(&format!("{:02X} ", data & 0xFF));
            }
            Size::Word => {
                self.line_buf.push_str(&format!("{:04X} ", data & 0xFFFF));
            }
            Size::Long => {
                self.line_buf.push_str(&format!("{:08X} ", data as u32));
            }
        }
    }

    fn flush_line(&mut self) {
        if self.enabled {
            self.out.push_str(&format!("{:<width$.width$}", self.line_buf, width = OBJECT_FIELD));
            if !self.source_line.is_empty() {
                if self.source_is_expand {
                    self.out.push_str(&format!("       {}", self.source_line));
                } else {
                    self.out
                        .push_str(&format!("{:5}  {}", self.source_line_no, self.source_line));
                }
                self.source_line.clear();
            }
            self.out.push('\n');
        }
    }

    /// Finish the current listing line, then append any diagnostics raised
    /// on it so errors follow the line they concern.
    pub fn write_line(&mut self, pending_errors: &[String]) {
        self.flush_line();
        if self.wanted && self.started {
            for msg in pending_errors {
                self.out.push_str(msg);
                self.out.push('\n');
            }
        }
        self.line_buf.clear();
    }

    /// The completed listing text, with the error summary appended.
    pub fn finish(mut self, summary: &str) -> Option<String> {
        if !self.wanted {
            return None;
        }
        self.out.push('\n');
        self.out.push_str(summary);
        self.out.push('\n');
        Some(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> Listing {
        let mut l = Listing::new(true, false);
        l.start();
        l
    }

    #[test]
    fn line_carries_location_bytes_and_source() {
        let mut l = listing();
        l.put_location(0x10);
        l.put_source_line("\tMOVEQ\t#5,D0", 3, false);
        l.put_data(0x7005, Size::Word);
        l.write_line(&[]);
        let text = l.finish("0 errors, 0 warnings").unwrap();
        let line = text.lines().next().unwrap();
        assert!(line.starts_with("00000010  7005 "));
        assert!(line.contains("    3  \tMOVEQ\t#5,D0"));
    }

    #[test]
    fn equ_lines_show_value() {
        let mut l = listing();
        l.put_location(0);
        l.put_source_line("five\tEQU\t5", 1, false);
        l.put_symbol(5);
        l.write_line(&[]);
        let text = l.finish("").unwrap();
        assert!(text.lines().next().unwrap().contains("=00000005"));
    }

    #[test]
    fn long_data_elides_without_dash_c() {
        let mut l = listing();
        l.put_location(0);
        l.put_source_line("\tdc.w\t...", 1, false);
        for i in 0..40 {
            l.put_data(i, Size::Word);
        }
        l.write_line(&[]);
        let text = l.finish("").unwrap();
        let first = text.lines().next().unwrap();
        assert!(first.contains("..."));
        assert_eq!(text.lines().count(), 3); // line + blank + summary
    }

    #[test]
    fn long_data_continues_with_dash_c() {
        let mut l = Listing::new(true, true);
        l.start();
        l.put_location(0);
        l.put_source_line("\tdc.w\t...", 1, false);
        for i in 0..40 {
            l.put_data(i, Size::Word);
        }
        l.write_line(&[]);
        let text = l.finish("").unwrap();
        assert!(text.lines().count() > 4);
        assert!(!text.contains("..."));
    }
}
