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

//! The PalmOS `data` #0 resource and its run-length encoding.
//!
//! The byte stream uses tag-driven opcodes:
//! `0x40..0x7F` a run of 1-64 zero bytes, `0x10..0x1F` a run of 1-16
//! `0xFF` bytes, `0x20..0x3F` a run of 2-33 copies of the next byte, and
//! `0x80..0xFF` a literal block of 1-128 bytes.

/// Compress one byte stream. At every position the encoder prefers the
/// zero run, then the 0xFF run, then a same-byte run of at least two,
/// then the shortest literal block of non-repeating bytes.
pub fn compress_stream(mut data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    while !data.is_empty() {
        if data.len() > 1 {
            let c = data[0];
            if c == 0 {
                let run = data.iter().take(0x40).take_while(|&&b| b == 0).count();
                out.push(0x40 + run as u8 - 1);
                data = &data[run..];
                continue;
            }
            if c == 0xFF {
                let run = data.iter().take(0x10).take_while(|&&b| b == 0xFF).count();
                out.push(0x10 + run as u8 - 1);
                data = &data[run..];
                continue;
            }
            let run = data.iter().take(0x20).take_while(|&&b| b == c).count();
            if run > 1 {
                out.push(0x20 + run as u8 - 2);
                out.push(c);
                data = &data[run..];
                continue;
            }
        }
        // literal block up to the next repeated pair
        let mut len = 0usize;
        while len < data.len()
            && len < 0x80
            && (len + 1 >= data.len() || data[len + 1] != data[len])
        {
            len += 1;
        }
        if len == 0 {
            len = 1;
        }
        out.push(0x80 + len as u8 - 1);
        out.extend_from_slice(&data[..len]);
        data = &data[len..];
    }
    out
}

/// Expand a compressed stream back to bytes (used to verify round trips).
pub fn decompress_stream(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let tag = data[i];
        i += 1;
        match tag {
            0x40..=0x7F => {
                out.extend(std::iter::repeat_n(0u8, (tag - 0x3F) as usize));
            }
            0x10..=0x1F => {
                out.extend(std::iter::repeat_n(0xFFu8, (tag - 0x0F) as usize));
            }
            0x20..=0x3F => {
                let value = data[i];
                i += 1;
                out.extend(std::iter::repeat_n(value, (tag - 0x1E) as usize));
            }
            0x80..=0xFF => {
                let count = (tag - 0x7F) as usize;
                out.extend_from_slice(&data[i..i + count]);
                i += count;
            }
            _ => break, // 0x00..0x0F terminate a sub-block
        }
    }
    out
}

/// Build the complete `data` #0 resource body. Three A5-relative
/// sub-blocks, each a u32 offset plus a zero-terminated compressed
/// stream; only the first carries data. The stream starts 4 bytes in
/// because the loader overwrites the first long with the SysAppInfo
/// pointer. Six zero u32s stand in for the empty relocation tables.
pub fn build_data_resource(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());

    let skip = data.len().min(4);
    out.extend_from_slice(&(skip as u32).to_be_bytes());
    out.extend_from_slice(&compress_stream(&data[skip..]));
    out.push(0);

    for _ in 0..2 {
        out.extend_from_slice(&0u32.to_be_bytes());
        out.push(0);
    }
    out.extend_from_slice(&[0u8; 24]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(data: &[u8]) {
        let packed = compress_stream(data);
        assert_eq!(decompress_stream(&packed), data, "input {:02x?}", data);
    }

    #[test]
    fn round_trips() {
        round_trip(b"");
        round_trip(b"a");
        round_trip(b"abcdef");
        round_trip(&[0u8; 200]);
        round_trip(&[0xFFu8; 50]);
        round_trip(&[7u8; 100]);
        let mut mixed = Vec::new();
        mixed.extend_from_slice(&[0; 70]);
        mixed.extend_from_slice(b"hello");
        mixed.extend_from_slice(&[0xFF; 20]);
        mixed.extend_from_slice(&[0x42; 33]);
        mixed.push(0x99);
        round_trip(&mixed);
        // every byte distinct, longer than one literal block
        let wide: Vec<u8> = (0..=255).collect();
        round_trip(&wide);
    }

    #[test]
    fn zero_run_opcode() {
        assert_eq!(compress_stream(&[0, 0, 0]), vec![0x42]);
        assert_eq!(compress_stream(&[0xFF, 0xFF]), vec![0x11]);
        assert_eq!(compress_stream(&[5, 5, 5, 5]), vec![0x22, 5]);
        assert_eq!(compress_stream(&[9]), vec![0x80, 9]);
    }

    #[test]
    fn data_resource_layout() {
        let data = [0u8, 0, 0, 0, 1, 2, 2, 2];
        let res = build_data_resource(&data);
        // total uncompressed size first
        assert_eq!(&res[0..4], &8u32.to_be_bytes());
        // first sub-block skips the SysAppInfo long
        assert_eq!(&res[4..8], &4u32.to_be_bytes());
        let stream_end = res.len() - 24 - 2 * 5 - 1;
        assert_eq!(decompress_stream(&res[8..stream_end]), &data[4..]);
        // six empty relocation tables at the tail
        assert_eq!(&res[res.len() - 24..], &[0u8; 24]);
    }
}
