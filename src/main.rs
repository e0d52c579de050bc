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

use anyhow::{Result, bail};
use clap::Parser as clap_parser;
use log::info;
use prcasm::file_reader::AsmFileReader;
use prcasm::{Options, assemble};
use std::fs;
use std::path::PathBuf;

#[derive(clap_parser)]
#[clap(version = "0.1.0", about = "68000 assembler producing PalmOS PRC databases")]
struct Opts {
    /// Show full constant expansions for DC directives
    #[clap(short = 'c')]
    const_expanded: bool,
    /// Produce listing file (input.lis)
    #[clap(short = 'l')]
    listing: bool,
    /// Debugging output
    #[clap(short = 'd')]
    verbose: bool,
    /// Resources only, don't generate code or data
    #[clap(short = 'r')]
    resources_only: bool,
    /// Include debugging symbols in output
    #[clap(short = 's')]
    emit_proc_symbols: bool,
    /// PRC database type (four characters)
    #[clap(short = 't', value_name = "TYPE")]
    db_type: Option<String>,
    input: PathBuf,
}

fn main() -> Result<()> {
    let opts: Opts = Opts::parse();

    env_logger::Builder::new()
        .filter_level(if opts.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .format_timestamp(None)
        .format_target(false)
        .init();

    let mut db_type = *b"appl";
    if let Some(ty) = &opts.db_type {
        if ty.len() != 4 {
            bail!("-t requires a four character type");
        }
        db_type.copy_from_slice(ty.as_bytes());
    }

    let options = Options {
        listing: opts.listing,
        const_expanded: opts.const_expanded,
        verbose: opts.verbose,
        resources_only: opts.resources_only,
        emit_proc_symbols: opts.emit_proc_symbols,
        db_type,
    };

    let reader = AsmFileReader;
    let output = assemble(&opts.input, &options, &reader)?;

    for message in &output.messages {
        eprintln!("{}", message);
    }

    if let Some(listing) = &output.listing {
        let lis_path = opts.input.with_extension("lis");
        fs::write(&lis_path, listing)?;
    }

    if let Some(prc) = &output.prc {
        let prc_path = opts.input.with_extension("prc");
        fs::write(&prc_path, prc)?;
        info!(
            "Code: {} bytes\nData: {} bytes ({} compressed)\nRes:  {} bytes\nPRC:  {} bytes",
            output.code_size,
            output.data_size,
            output.data_compressed,
            output.res_size,
            output.prc_size
        );
        println!(
            "Successfully assembled {} to {}",
            opts.input.display(),
            prc_path.display()
        );
    }

    println!(
        "{} error{}, {} warning{}",
        output.error_count,
        if output.error_count != 1 { "s" } else { "" },
        output.warning_count,
        if output.warning_count != 1 { "s" } else { "" },
    );

    std::process::exit(output.error_count.min(255) as i32);
}
