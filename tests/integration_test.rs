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

use std::path::Path;

use prcasm::file_reader::{AsmFileReader, MockFileReader};
use prcasm::prc::{find_resource, fourcc};
use prcasm::{AssemblyOutput, Options, assemble, rle};

const HEADER: &str = "\tAPPL\t\"Test\",'TST!'\n";

fn assemble_body(body: &str) -> AssemblyOutput {
    assemble_full(&format!("{}{}\tEND\n", HEADER, body), &Options::default())
}

fn assemble_full(source: &str, opts: &Options) -> AssemblyOutput {
    let mut reader = MockFileReader::default();
    reader.add_file("test.asm", source);
    assemble(Path::new("test.asm"), opts, &reader).unwrap()
}

fn code_bytes(output: &AssemblyOutput) -> Vec<u8> {
    let prc = output.prc.as_ref().expect("assembly should succeed");
    find_resource(prc, fourcc(b"code"), 1).unwrap().to_vec()
}

#[test]
fn move_downgrades_to_moveq() {
    let out = assemble_body("\tMOVE.L\t#5,D0\n");
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(code_bytes(&out), [0x70, 0x05]);
}

#[test]
fn move_out_of_quick_range_stays_move() {
    let out = assemble_body("\tMOVE.L\t#300,D0\n");
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(code_bytes(&out), [0x20, 0x3C, 0x00, 0x00, 0x01, 0x2C]);
}

#[test]
fn addi_downgrades_to_addq() {
    let out = assemble_body("\tADDI.L\t#3,D4\n");
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(code_bytes(&out), [0x56, 0x84]);
}

#[test]
fn subi_downgrades_to_subq() {
    let out = assemble_body("\tSUBI.W\t#1,D0\n");
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(code_bytes(&out), [0x53, 0x40]);
}

#[test]
fn nearby_branch_is_short() {
    let out = assemble_body("\tBRA\ttarget\n\tNOP\ntarget:\tRTS\n");
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(code_bytes(&out), [0x60, 0x02, 0x4E, 0x71, 0x4E, 0x75]);
}

#[test]
fn distant_branch_is_long() {
    let out = assemble_body("\tBRA\ttarget\n\tORG\t$100\ntarget:\tRTS\n");
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    let code = code_bytes(&out);
    // 0x100 - (0 + 2) = 0xFE
    assert_eq!(&code[0..4], &[0x60, 0x00, 0x00, 0xFE]);
    assert_eq!(&code[0x100..0x102], &[0x4E, 0x75]);
}

#[test]
fn dot_l_forces_long_branch() {
    let out = assemble_body("\tBRA.L\ttarget\n\tNOP\ntarget:\tRTS\n");
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(
        code_bytes(&out),
        [0x60, 0x00, 0x00, 0x04, 0x4E, 0x71, 0x4E, 0x75]
    );
}

#[test]
fn pc_relative_displacement() {
    let out = assemble_body("target:\tNOP\n\tLEA\ttarget(PC),A0\n");
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    // displacement = 0 - (2 + 2)
    assert_eq!(
        code_bytes(&out),
        [0x4E, 0x71, 0x41, 0xFA, 0xFF, 0xFC]
    );
}

#[test]
fn struct_layout_and_sizeof() {
    let out = assemble_body(
        "\tSTRUCT\tPoint\nx.w\ny.w\n\tENDSTRUCT\n\tDC.B\tsizeof(Point), Point.y\n",
    );
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(code_bytes(&out), [4, 2]);
}

#[test]
fn struct_bitfields_expose_mask_size_shift() {
    let out = assemble_body(
        "\tSTRUCT\tFlags\nhi.b:4\nlo.b:4\n\tENDSTRUCT\n\
         \tDC.B\tFlags.hi.shift, Flags.hi.mask, Flags.lo.shift, sizeof(Flags)\n",
    );
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(code_bytes(&out), [4, 0x0F, 0, 1]);
}

#[test]
fn enum_auto_increment() {
    let out = assemble_body(
        "\tENUM\tColor\nRed\nGreen = 5\nBlue\n\tENDENUM\n\
         \tDC.B\tRed, Green, Blue, sizeof(Color)\n",
    );
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(code_bytes(&out), [0, 5, 6, 1]);
}

#[test]
fn forward_equ_is_a_phase_error() {
    let out = assemble_body("fwd\tEQU\tlater\n\tDS.B\t4\nlater\tEQU\t$10\n");
    assert!(out.error_count > 0);
    assert!(out.prc.is_none());
    assert!(
        out.messages
            .iter()
            .any(|m| m.contains("first and second pass")),
        "{:?}",
        out.messages
    );
}

#[test]
fn movem_list_to_predecrement() {
    let out = assemble_body("\tMOVEM.W\tD0-D2/A0,-(A7)\n");
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    // the predecrement form stores the register mask bit-reversed
    assert_eq!(code_bytes(&out), [0x48, 0xA7, 0xE0, 0x80]);
}

#[test]
fn movem_memory_to_list() {
    let out = assemble_body("\tMOVEM.W\t(A7)+,D0-D2/A0\n");
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(code_bytes(&out), [0x4C, 0x9F, 0x01, 0x07]);
}

#[test]
fn reg_directive_names_a_register_list() {
    let out = assemble_body("saved\tREG\tD0-D2/A0\n\tMOVEM.W\tsaved,-(A7)\n");
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(code_bytes(&out), [0x48, 0xA7, 0xE0, 0x80]);
}

#[test]
fn temporary_labels_resolve_backwards() {
    let out = assemble_body(".1\tNOP\n\tBNE\t.1b\n");
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(code_bytes(&out), [0x4E, 0x71, 0x66, 0xFC]);
}

#[test]
fn temporary_labels_resolve_forwards() {
    let out = assemble_body("\tBRA\t.2f\n\tNOP\n.2\tRTS\n");
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(code_bytes(&out), [0x60, 0x02, 0x4E, 0x71, 0x4E, 0x75]);
}

#[test]
fn expressions_follow_precedence() {
    let out = assemble_body("\tDC.B\t1+2*3, (1+2)*3, 15//4, 1<<4, $FF&%1010\n");
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(code_bytes(&out), [7, 9, 3, 16, 10]);
}

#[test]
fn character_literals_pack_big_endian() {
    let out = assemble_body("\tDC.L\t'AB', 'ABC'\n\tDC.W\t'\\n'\n");
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(
        code_bytes(&out),
        [0, 0, 0x41, 0x42, 0x41, 0x42, 0x43, 0, 0, 0x0A]
    );
}

#[test]
fn dc_strings_pack_into_words() {
    let out = assemble_body("\tDC.B\t\"AB\",0\n\tDC.W\t\"ABC\"\n");
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(code_bytes(&out), [0x41, 0x42, 0, 0, 0x41, 0x42, 0x43, 0]);
}

#[test]
fn dcb_repeats_fill_value() {
    let out = assemble_body("\tDCB.W\t3,$1234\n");
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(code_bytes(&out), [0x12, 0x34, 0x12, 0x34, 0x12, 0x34]);
}

#[test]
fn align_pads_location() {
    let out = assemble_body("\tDC.B\t1\n\tALIGN\t4\n\tDC.B\t2\n");
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(code_bytes(&out), [1, 0, 0, 0, 2]);
}

#[test]
fn division_by_zero_reported() {
    let out = assemble_body("\tDC.W\t5/0\n");
    assert!(out.error_count > 0);
    assert!(
        out.messages.iter().any(|m| m.contains("division by zero")),
        "{:?}",
        out.messages
    );
}

#[test]
fn mixed_category_addition_rejected() {
    let out = assemble_body("a:\tNOP\n\tDATA\nb\tGLOBAL\tw\n\tCODE\n\tDC.L\ta+b\n");
    assert!(out.error_count > 0);
    assert!(
        out.messages.iter().any(|m| m.contains("invalid type")),
        "{:?}",
        out.messages
    );
}

#[test]
fn address_subtraction_is_constant() {
    let out = assemble_body("a:\tNOP\nb:\tNOP\n\tDC.B\tb-a\n\tMOVE.W\t#b-a,D0\n");
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(
        code_bytes(&out),
        [0x4E, 0x71, 0x4E, 0x71, 2, 0, 0x30, 0x3C, 0, 2]
    );
}

#[test]
fn data_resource_compresses_data_segment() {
    let out = assemble_body(
        "\tDATA\n\tDC.L\t0\n\tDC.B\t1,2,3,4\n\tCODE\n\tRTS\n",
    );
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(out.data_size, 8);
    let prc = out.prc.as_ref().unwrap();
    let data = find_resource(prc, fourcc(b"data"), 0).unwrap();
    // uncompressed total, then the A5 offset skipping the SysAppInfo slot
    assert_eq!(&data[0..4], &8u32.to_be_bytes());
    assert_eq!(&data[4..8], &4u32.to_be_bytes());
    assert_eq!(&rle::decompress_stream(&data[8..])[..4], &[1, 2, 3, 4]);

    let code0 = find_resource(prc, fourcc(b"code"), 0).unwrap();
    assert_eq!(&code0[0..4], &8u32.to_be_bytes());
    assert_eq!(&code0[4..8], &0u32.to_be_bytes());
}

#[test]
fn globals_lay_out_in_data_segment() {
    let out = assemble_body(
        "\tDATA\n\tDC.L\t0\nflag\tGLOBAL\tb\ncount\tGLOBAL\tw\n\tCODE\n\
         \tMOVE.W\tcount(A5),D0\n",
    );
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    // flag at 4, count aligned to 6
    assert_eq!(code_bytes(&out), [0x30, 0x2D, 0x00, 0x06]);
    assert_eq!(out.data_size, 8);
}

#[test]
fn procedure_frame_and_call_sequence() {
    let out = assemble_body(
        "\tPROC\tAdd2(x.w,y.w).w\n\tLOCAL\ttmp.l\n\tBEGINPROC\n\
         \tMOVE.W\tx(A6),D0\n\tENDPROC\nmain:\tCALL\tAdd2(#1,#2)\n",
    );
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(
        code_bytes(&out),
        [
            0x4E, 0x56, 0xFF, 0xFC, // link a6,#-4
            0x30, 0x2E, 0x00, 0x08, // move.w 8(a6),d0
            0x4E, 0x5E, // unlk a6
            0x4E, 0x75, // rts
            0x3F, 0x3C, 0x00, 0x02, // move.w #2,-(a7)  (last argument first)
            0x3F, 0x3C, 0x00, 0x01, // move.w #1,-(a7)
            0x4E, 0xBA, 0xFF, 0xEA, // jsr Add2(pc)
            0x58, 0x8F, // addq.l #4,a7
        ]
    );
}

#[test]
fn trapdef_call_emits_trap_and_selector_word() {
    let out = assemble_body(
        "\tTRAPDEF\tSysDoit[$A123](p.l)\n\tCALL\tSysDoit(#0)\n",
    );
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(
        code_bytes(&out),
        [
            0x42, 0xA7, // clr.l -(a7)
            0x4E, 0x4F, // trap #15
            0xA1, 0x23, // dc.w $A123
            0x58, 0x8F, // addq.l #4,a7
        ]
    );
}

#[test]
fn conditional_assembly_selects_branch() {
    let out = assemble_body(
        "flag\tEQU\t1\n\tIF\tflag\n\tDC.B\t1\n\tELSE\n\tDC.B\t2\n\tENDIF\n\
         \tIFNDEF\tnope\n\tDC.B\t3\n\tENDIF\n\tIFDEF\tnope\n\tDC.B\t4\n\tENDIF\n",
    );
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(code_bytes(&out), [1, 3]);
}

#[test]
fn include_files_assemble_inline_once() {
    let mut reader = MockFileReader::default();
    reader.add_file(
        "test.asm",
        "\tAPPL\t\"Test\",'TST!'\n\tINCLUDE\t\"defs.inc\"\n\tINCLUDE\t\"defs.inc\"\n\tDC.B\tfive\n\tEND\n",
    );
    reader.add_file("defs.inc", "five\tEQU\t5\n");
    let out = assemble(Path::new("test.asm"), &Options::default(), &reader).unwrap();
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(code_bytes(&out), [5]);
}

#[test]
fn incbin_copies_raw_bytes() {
    let mut reader = MockFileReader::default();
    reader.add_file(
        "test.asm",
        "\tAPPL\t\"Test\",'TST!'\n\tINCBIN\t\"blob.bin\"\n\tEND\n",
    );
    reader.add_binary_file("blob.bin", &[0xDE, 0xAD, 0xBE, 0xEF]);
    let out = assemble(Path::new("test.asm"), &Options::default(), &reader).unwrap();
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(code_bytes(&out), [0xDE, 0xAD, 0xBE, 0xEF]);
}

#[test]
fn res_directive_adds_raw_resource() {
    let mut reader = MockFileReader::default();
    reader.add_file(
        "test.asm",
        "\tAPPL\t\"Test\",'TST!'\n\tRES\t'STR ', 100\n\tDC.B\t\"hello\",0\n\tEND\n",
    );
    let out = assemble(Path::new("test.asm"), &Options::default(), &reader).unwrap();
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    let prc = out.prc.as_ref().unwrap();
    let res = find_resource(prc, fourcc(b"STR "), 100).unwrap();
    assert_eq!(res, b"hello\0");
}

#[test]
fn missing_appl_is_an_error() {
    let out = assemble_full("\tRTS\n\tEND\n", &Options::default());
    assert!(out.error_count > 0);
    assert!(
        out.messages.iter().any(|m| m.contains("APPL")),
        "{:?}",
        out.messages
    );
}

#[test]
fn undefined_symbol_is_reported_once_per_use() {
    let out = assemble_body("\tMOVE.W\t#nothere,D0\n");
    assert!(out.error_count > 0);
    assert!(
        out.messages.iter().any(|m| m.contains("undefined symbol")),
        "{:?}",
        out.messages
    );
}

#[test]
fn listing_shows_locations_and_equates() {
    let opts = Options {
        listing: true,
        ..Options::default()
    };
    let out = assemble_full(
        "\tAPPL\t\"Test\",'TST!'\nfive\tEQU\t5\n\tNOP\n\tEND\n",
        &opts,
    );
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    let listing = out.listing.unwrap();
    assert!(listing.contains("=00000005"), "{}", listing);
    assert!(listing.contains("4E71"), "{}", listing);
    assert!(listing.contains("0 errors, 0 warnings"), "{}", listing);
}

#[test]
fn database_header_carries_type_and_creator() {
    let opts = Options {
        db_type: *b"libr",
        ..Options::default()
    };
    let out = assemble_full(
        "\tAPPL\t\"MyApp\",'MYAP'\n\tRTS\n\tEND\n",
        &opts,
    );
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    let prc = out.prc.unwrap();
    assert_eq!(&prc[0..5], b"MyApp");
    assert_eq!(&prc[28..32], b"Pila");
    assert_eq!(&prc[60..64], b"libr");
    assert_eq!(&prc[64..68], b"MYAP");
}

#[test]
fn counters_match_between_pass_one_and_two() {
    // a branch whose distance depends on the MOVE/MOVEQ downgrade: any
    // pass disagreement would surface as a guard or phase error
    let out = assemble_body(
        "start:\tMOVE.L\t#5,D0\n\tMOVE.L\t#500,D1\n\tBRA\tstart\n\
         \tDC.B\tend-start\nend:\n",
    );
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    let code = code_bytes(&out);
    // moveq(2) + move.l immediate(6) + short bra(2) = 10
    assert_eq!(&code[8..10], [0x60, 0xF6]);
    assert_eq!(code[10], 11);
}

#[test]
fn real_files_on_disk_assemble() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.asm");
    std::fs::write(
        &path,
        "\tAPPL\t\"Disk\",'DISK'\n\tMOVEQ\t#1,D0\n\tRTS\n\tEND\n",
    )
    .unwrap();
    let out = assemble(&path, &Options::default(), &AsmFileReader).unwrap();
    assert_eq!(out.error_count, 0, "{:?}", out.messages);
    assert_eq!(code_bytes(&out), [0x70, 0x01, 0x4E, 0x75]);
}
