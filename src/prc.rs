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

//! PRC container layout: a 78-byte database header, the resource map
//! (10 bytes per entry plus two trailing zero bytes), then the resource
//! bodies in map order. Everything is big-endian.

pub const DB_NAME_LENGTH: usize = 32;
pub const HEADER_SIZE: usize = 78;
pub const MAP_ENTRY_SIZE: usize = 10;

// database attribute bits
pub const ATTR_RES_DB: u16 = 0x0001;
pub const ATTR_BACKUP: u16 = 0x0008;
pub const ATTR_BUNDLE: u16 = 0x0800;

/// Seconds between the UNIX and Mac epochs; PRC dates use the latter.
pub const MAC_EPOCH_DELTA: u32 = 2_082_844_800;

const UNIQUE_ID_SEED: u32 = 123_456;

pub const fn fourcc(tag: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*tag)
}

#[derive(Debug, Clone)]
pub struct Resource {
    pub fc: u32,
    pub id: u16,
    pub data: Vec<u8>,
}

/// Lay out the whole database file.
pub fn layout(
    app_name: &str,
    db_type: [u8; 4],
    creator: u32,
    resources: &[Resource],
    now_unix: u64,
) -> Vec<u8> {
    let map_end = HEADER_SIZE + resources.len() * MAP_ENTRY_SIZE + 2;
    let total: usize = map_end + resources.iter().map(|r| r.data.len()).sum::<usize>();
    let mut out = vec![0u8; map_end];
    out.reserve(total - map_end);

    // name field, with the builder tag tucked into its unused tail
    out[28..32].copy_from_slice(b"Pila");
    let name_bytes = app_name.as_bytes();
    let len = name_bytes.len().min(DB_NAME_LENGTH - 1);
    out[..len].copy_from_slice(&name_bytes[..len]);
    out[len..len + 1].copy_from_slice(&[0]);

    let date = (now_unix as u32).wrapping_add(MAC_EPOCH_DELTA);
    put_u16(&mut out, 32, ATTR_RES_DB | ATTR_BACKUP | ATTR_BUNDLE);
    put_u16(&mut out, 34, 1); // version
    put_u32(&mut out, 36, date); // creation
    put_u32(&mut out, 40, date); // modification
    // last backup, modification number, appInfo, sortInfo stay zero
    out[60..64].copy_from_slice(&db_type);
    put_u32(&mut out, 64, creator);
    put_u32(&mut out, 68, UNIQUE_ID_SEED);
    // next record list id stays zero
    put_u16(&mut out, 76, resources.len() as u16);

    let mut offset = map_end;
    for (i, res) in resources.iter().enumerate() {
        let entry = HEADER_SIZE + i * MAP_ENTRY_SIZE;
        put_u32(&mut out, entry, res.fc);
        put_u16(&mut out, entry + 4, res.id);
        put_u32(&mut out, entry + 6, offset as u32);
        offset += res.data.len();
    }
    // two zero bytes already in place between map and data

    for res in resources {
        out.extend_from_slice(&res.data);
    }
    out
}

/// Find a resource's bytes in a laid-out PRC by walking the map.
pub fn find_resource(prc: &[u8], fc: u32, id: u16) -> Option<&[u8]> {
    let count = u16::from_be_bytes([prc[76], prc[77]]) as usize;
    for i in 0..count {
        let entry = HEADER_SIZE + i * MAP_ENTRY_SIZE;
        let ty = u32::from_be_bytes(prc[entry..entry + 4].try_into().ok()?);
        let rid = u16::from_be_bytes([prc[entry + 4], prc[entry + 5]]);
        if ty == fc && rid == id {
            let start = u32::from_be_bytes(prc[entry + 6..entry + 10].try_into().ok()?) as usize;
            let end = if i + 1 < count {
                let next = HEADER_SIZE + (i + 1) * MAP_ENTRY_SIZE;
                u32::from_be_bytes(prc[next + 6..next + 10].try_into().ok()?) as usize
            } else {
                prc.len()
            };
            return Some(&prc[start..end]);
        }
    }
    None
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields_are_big_endian() {
        let resources = vec![
            Resource {
                fc: fourcc(b"code"),
                id: 1,
                data: vec![0x4E, 0x75],
            },
            Resource {
                fc: fourcc(b"Tbmp"),
                id: 10,
                data: vec![1, 2, 3],
            },
        ];
        let prc = layout("Test", *b"appl", fourcc(b"TEST"), &resources, 0);

        assert_eq!(&prc[0..4], b"Test");
        assert_eq!(prc[4], 0);
        assert_eq!(&prc[28..32], b"Pila");
        assert_eq!(&prc[32..34], &0x0809u16.to_be_bytes());
        assert_eq!(&prc[34..36], &1u16.to_be_bytes());
        assert_eq!(&prc[36..40], &MAC_EPOCH_DELTA.to_be_bytes());
        assert_eq!(&prc[60..64], b"appl");
        assert_eq!(&prc[64..68], b"TEST");
        assert_eq!(&prc[68..72], &UNIQUE_ID_SEED.to_be_bytes());
        assert_eq!(&prc[76..78], &2u16.to_be_bytes());

        // map entries and the two-byte gap before the data
        let first_data = HEADER_SIZE + 2 * MAP_ENTRY_SIZE + 2;
        assert_eq!(&prc[78..82], b"code");
        assert_eq!(&prc[82..84], &1u16.to_be_bytes());
        assert_eq!(&prc[84..88], &(first_data as u32).to_be_bytes());
        assert_eq!(&prc[88..92], b"Tbmp");
        assert_eq!(
            &prc[94..98],
            &((first_data + 2) as u32).to_be_bytes()
        );
        assert_eq!(&prc[first_data - 2..first_data], &[0, 0]);
        assert_eq!(&prc[first_data..first_data + 2], &[0x4E, 0x75]);
        assert_eq!(&prc[first_data + 2..], &[1, 2, 3]);
    }

    #[test]
    fn map_offsets_walk_back() {
        let resources = vec![
            Resource {
                fc: fourcc(b"code"),
                id: 0,
                data: vec![9; 8],
            },
            Resource {
                fc: fourcc(b"code"),
                id: 1,
                data: vec![7; 3],
            },
        ];
        let prc = layout("X", *b"appl", fourcc(b"XXXX"), &resources, 42);
        assert_eq!(find_resource(&prc, fourcc(b"code"), 0).unwrap(), &[9u8; 8]);
        assert_eq!(find_resource(&prc, fourcc(b"code"), 1).unwrap(), &[7u8; 3]);
    }
}
