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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Code,
    Data,
    Resource,
}

/// The three output segments and the active location counter. Only one
/// block is assembled at a time; switching blocks saves the counter of the
/// block being left and restores the counter of the one being entered.
#[derive(Debug)]
pub struct Sections {
    pub bt: BlockType,
    pub out_loc: u32,
    pub code: Vec<u8>,
    pub code_loc: u32,
    pub data: Vec<u8>,
    pub data_loc: u32,
    pub res: Vec<u8>,
}

impl Sections {
    pub fn new() -> Self {
        Sections {
            bt: BlockType::Code,
            out_loc: 0,
            code: Vec::new(),
            code_loc: 0,
            data: Vec::new(),
            data_loc: 0,
            res: Vec::new(),
        }
    }

    /// Start-of-pass reset. Buffers are reused; counters restart at zero
    /// and the code block is selected.
    pub fn reset(&mut self) {
        self.bt = BlockType::Code;
        self.out_loc = 0;
        self.code_loc = 0;
        self.data_loc = 0;
        self.code.clear();
        self.data.clear();
        self.res.clear();
    }

    /// Write `data` big-endian at the current location of the active block
    /// without advancing the counter (builders advance it themselves).
    pub fn write(&mut self, data: i32, size: Size) {
        let loc = self.out_loc as usize;
        let buf = match self.bt {
            BlockType::Code => &mut self.code,
            BlockType::Data => &mut self.data,
            BlockType::Resource => &mut self.res,
        };
        write_be(buf, loc, data, size);
    }

    pub fn write_byte_at(&mut self, loc: u32, byte: u8) {
        let buf = match self.bt {
            BlockType::Code => &mut self.code,
            BlockType::Data => &mut self.data,
            BlockType::Resource => &mut self.res,
        };
        let loc = loc as usize;
        if buf.len() < loc + 1 {
            buf.resize(loc + 1, 0);
        }
        buf[loc] = byte;
    }

    /// Close the active block: save its location counter (resource blocks
    /// hand back their bytes instead) and fall back to the code block.
    pub fn end_block(&mut self) -> Option<Vec<u8>> {
        let finished = match self.bt {
            BlockType::Data => {
                self.data_loc = self.out_loc;
                None
            }
            BlockType::Code => {
                self.code_loc = self.out_loc;
                None
            }
            BlockType::Resource => {
                let len = self.out_loc as usize;
                if self.res.len() < len {
                    self.res.resize(len, 0);
                }
                let mut bytes = std::mem::take(&mut self.res);
                bytes.truncate(len);
                Some(bytes)
            }
        };
        self.bt = BlockType::Code;
        self.out_loc = self.code_loc;
        finished
    }

    pub fn select_code(&mut self) {
        self.bt = BlockType::Code;
        self.out_loc = self.code_loc;
    }

    pub fn select_data(&mut self) {
        self.bt = BlockType::Data;
        self.out_loc = self.data_loc;
    }

    pub fn select_resource(&mut self) {
        self.bt = BlockType::Resource;
        self.out_loc = 0;
        self.res.clear();
    }

    /// Final code bytes, padded out to the code location counter.
    pub fn code_bytes(&mut self) -> Vec<u8> {
        let len = self.code_loc as usize;
        if self.code.len() < len {
            self.code.resize(len, 0);
        }
        let mut bytes = std::mem::take(&mut self.code);
        bytes.truncate(len);
        bytes
    }

    pub fn data_bytes(&mut self) -> Vec<u8> {
        let len = self.data_loc as usize;
        if self.data.len() < len {
            self.data.resize(len, 0);
        }
        let mut bytes = std::mem::take(&mut self.data);
        bytes.truncate(len);
        bytes
    }
}

pub fn write_be(buf: &mut Vec<u8>, loc: usize, data: i32, size: Size) {
    let bytes: &[u8] = match size {
        Size::Byte | Size::Short => &[data as u8],
        Size::Word => &(data as u16).to_be_bytes(),
        Size::Long => &(data as u32).to_be_bytes(),
    };
    if buf.len() < loc + bytes.len() {
        buf.resize(loc + bytes.len(), 0);
    }
    buf[loc..loc + bytes.len()].copy_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_emission() {
        let mut buf = Vec::new();
        write_be(&mut buf, 0, 0x1234_5678u32 as i32, Size::Long);
        write_be(&mut buf, 4, 0xBEEFu16 as i32, Size::Word);
        write_be(&mut buf, 6, 0x7F, Size::Byte);
        assert_eq!(buf, [0x12, 0x34, 0x56, 0x78, 0xBE, 0xEF, 0x7F]);
    }

    #[test]
    fn block_switch_saves_counters() {
        let mut s = Sections::new();
        s.out_loc = 6;
        s.end_block(); // code, saves 6
        s.select_data();
        assert_eq!(s.out_loc, 0);
        s.out_loc = 10;
        s.end_block();
        assert_eq!(s.bt, BlockType::Code);
        assert_eq!(s.out_loc, 6);
        s.select_data();
        assert_eq!(s.out_loc, 10);
    }

    #[test]
    fn resource_block_hands_back_bytes() {
        let mut s = Sections::new();
        s.select_resource();
        s.write(0x4142, Size::Word);
        s.out_loc += 2;
        let bytes = s.end_block().unwrap();
        assert_eq!(bytes, b"AB");
        assert_eq!(s.bt, BlockType::Code);
    }
}
