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

//! A three-pass Motorola 68000 assembler producing PalmOS PRC resource
//! databases: a `code` resource, an RLE-compressed `data` resource,
//! converted bitmap resources and any raw resources the source declares.

pub mod assembler;
pub mod bitmap;
pub mod errors;
pub mod file_reader;
pub mod prc;
pub mod rle;

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};

use assembler::Assembler;
use file_reader::FileReader;
use prc::{Resource, fourcc};

/// Command-line options that change how the assembly behaves.
#[derive(Debug, Clone)]
pub struct Options {
    /// produce a listing
    pub listing: bool,
    /// show full constant expansions for DC directives in the listing
    pub const_expanded: bool,
    /// verbose progress output
    pub verbose: bool,
    /// only resources, no code or data
    pub resources_only: bool,
    /// append Macsbug procedure-name symbols after each RTS
    pub emit_proc_symbols: bool,
    /// database type, overridable with -t
    pub db_type: [u8; 4],
}

impl Default for Options {
    fn default() -> Self {
        Options {
            listing: false,
            const_expanded: false,
            verbose: false,
            resources_only: false,
            emit_proc_symbols: false,
            db_type: *b"appl",
        }
    }
}

/// Everything a run produces. The PRC bytes are only present when the
/// source assembled without errors.
pub struct AssemblyOutput {
    pub prc: Option<Vec<u8>>,
    pub listing: Option<String>,
    pub messages: Vec<String>,
    pub error_count: usize,
    pub warning_count: usize,
    pub code_size: u32,
    pub data_size: u32,
    pub data_compressed: usize,
    pub res_size: u32,
    pub prc_size: usize,
}

pub fn assemble(
    source_path: &Path,
    opts: &Options,
    reader: &dyn FileReader,
) -> Result<AssemblyOutput> {
    // surface a missing input file before the passes start
    reader
        .read_to_string(source_path)
        .with_context(|| format!("Failed to read input file: {}", source_path.display()))?;

    let mut asm = Assembler::new(source_path.to_path_buf(), opts.clone(), reader);
    asm.run();

    let code = asm.sections.code_bytes();
    let data = asm.sections.data_bytes();
    let code_size = code.len() as u32;
    let data_size = data.len() as u32;
    let error_count = asm.log.error_count();
    let warning_count = asm.log.warning_count();

    let mut data_compressed = 0;
    let mut prc = None;
    let mut prc_size = 0;
    if error_count == 0 {
        let mut resources: Vec<Resource> = Vec::new();
        if !opts.resources_only {
            resources.push(Resource {
                fc: fourcc(b"code"),
                id: 0,
                data: code_zero_resource(data_size),
            });
            resources.push(Resource {
                fc: fourcc(b"code"),
                id: 1,
                data: code,
            });
            if data_size > 0 {
                let body = rle::build_data_resource(&data);
                data_compressed = body.len();
                resources.push(Resource {
                    fc: fourcc(b"data"),
                    id: 0,
                    data: body,
                });
            }
        }
        resources.append(&mut asm.resources);

        let name = if asm.app_name.is_empty() {
            source_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            asm.app_name.clone()
        };
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let bytes = prc::layout(&name, opts.db_type, asm.creator, &resources, now);
        prc_size = bytes.len();
        prc = Some(bytes);
    }

    let summary = format!(
        "{} error{}, {} warning{}",
        error_count,
        if error_count != 1 { "s" } else { "" },
        warning_count,
        if warning_count != 1 { "s" } else { "" },
    );
    let res_size = asm.res_total;
    let messages = asm.log.messages().to_vec();
    let listing = asm.listing.finish(&summary);

    Ok(AssemblyOutput {
        prc,
        listing,
        messages,
        error_count,
        warning_count,
        code_size,
        data_size,
        data_compressed,
        res_size,
        prc_size,
    })
}

/// `code` #0 describes the data section to the loader: initialized size
/// and a zero uninitialized size.
fn code_zero_resource(data_size: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(8);
    out.extend_from_slice(&data_size.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out
}
