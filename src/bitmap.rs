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

//! `WBMP` resource bodies hold ordinary BMP files; they leave the PRC as
//! 1-bpp Palm bitmaps with 16-bit-aligned rows. Resource id 0x7FFE is the
//! application icon: it becomes `tAIB` #1000 and must be 32x32.

use image::GenericImageView;

use crate::errors::ErrorCode;
use crate::prc::fourcc;

pub const ICON_SOURCE_ID: u16 = 0x7FFE;
pub const ICON_ID: u16 = 1000;

/// Convert a decoded bitmap into the Palm wire format and pick the final
/// resource type and id.
pub fn convert(data: &[u8], id: u16) -> Result<(u32, u16, Vec<u8>), ErrorCode> {
    let img = image::load_from_memory(data).map_err(|_| ErrorCode::ResourceBadBitmap)?;
    let (width, height) = img.dimensions();

    let (fc, id) = if id == ICON_SOURCE_ID {
        if width != 32 || height != 32 {
            return Err(ErrorCode::ResourceBadIconSize);
        }
        (fourcc(b"tAIB"), ICON_ID)
    } else {
        (fourcc(b"Tbmp"), id)
    };

    // rows are padded to a word boundary
    let row_bytes = (width as usize).div_ceil(16) * 2;
    let mut out = Vec::with_capacity(16 + row_bytes * height as usize);
    out.extend_from_slice(&(width as u16).to_be_bytes());
    out.extend_from_slice(&(height as u16).to_be_bytes());
    out.extend_from_slice(&(row_bytes as u16).to_be_bytes());
    out.extend_from_slice(&[0u8; 10]); // flags and reserved words

    let luma = img.to_luma8();
    for y in 0..height {
        let mut row = vec![0u8; row_bytes];
        for x in 0..width {
            // dark pixels are foreground bits
            if luma.get_pixel(x, y).0[0] < 128 {
                row[(x / 8) as usize] |= 1 << (7 - (x & 7));
            }
        }
        out.extend_from_slice(&row);
    }
    Ok((fc, id, out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma};

    fn bmp_bytes(width: u32, height: u32, dark: &[(u32, u32)]) -> Vec<u8> {
        let mut img = GrayImage::from_pixel(width, height, Luma([255u8]));
        for &(x, y) in dark {
            img.put_pixel(x, y, Luma([0u8]));
        }
        let mut bytes = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(img)
            .write_to(&mut bytes, image::ImageFormat::Bmp)
            .unwrap();
        bytes.into_inner()
    }

    #[test]
    fn rows_align_to_words() {
        let bmp = bmp_bytes(20, 2, &[(0, 0), (8, 1)]);
        let (fc, id, data) = convert(&bmp, 5).unwrap();
        assert_eq!(fc, fourcc(b"Tbmp"));
        assert_eq!(id, 5);
        // header: width, height, row bytes
        assert_eq!(&data[0..2], &20u16.to_be_bytes());
        assert_eq!(&data[2..4], &2u16.to_be_bytes());
        assert_eq!(&data[4..6], &4u16.to_be_bytes());
        assert_eq!(data.len(), 16 + 2 * 4);
        assert_eq!(data[16], 0x80); // pixel (0,0)
        assert_eq!(data[16 + 4 + 1], 0x80); // pixel (8,1)
    }

    #[test]
    fn icon_id_is_rewritten() {
        let bmp = bmp_bytes(32, 32, &[(0, 0)]);
        let (fc, id, _) = convert(&bmp, ICON_SOURCE_ID).unwrap();
        assert_eq!(fc, fourcc(b"tAIB"));
        assert_eq!(id, ICON_ID);
    }

    #[test]
    fn icon_must_be_32x32() {
        let bmp = bmp_bytes(16, 16, &[]);
        assert_eq!(
            convert(&bmp, ICON_SOURCE_ID).unwrap_err(),
            ErrorCode::ResourceBadIconSize
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(
            convert(b"not a bitmap", 1).unwrap_err(),
            ErrorCode::ResourceBadBitmap
        );
    }
}
