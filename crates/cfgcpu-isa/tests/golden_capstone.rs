//! Cross-checks this crate's parsed instruction length against two
//! independent reference decoders (`iced-x86`, `capstone`) for a curated set
//! of 16-bit real-mode encodings. This decoder only implements the subset
//! of the opcode map a 386-class DOS core actually needs, so we cross-check
//! concrete, known-supported byte sequences rather than fuzzing over the
//! full x86 opcode space — a random byte string is far more likely to
//! decode as something we deliberately leave `InvalidOpcode` than as a
//! genuine length mismatch.

use capstone::prelude::*;
use cfgcpu_isa::parse;
use cfgcpu_types::SegmentedAddress;
use iced_x86::{Decoder, DecoderOptions};

/// `(bytes, mnemonic)` pairs covering prefix chains, both ModRM addressing
/// widths, group-dispatch opcodes, and two-byte `0F` encodings.
const CASES: &[(&[u8], &str)] = &[
    (&[0xB8, 0x34, 0x12], "mov ax, 0x1234"),
    (&[0x89, 0xD8], "mov ax, bx"),
    (&[0x01, 0xD8], "add ax, bx"),
    (&[0x83, 0xC0, 0x05], "add ax, 0x5 (grp1 sign-extended imm8)"),
    (&[0xF7, 0xF1], "div cx (grp3)"),
    (&[0xFE, 0xC0], "inc al (grp5 8-bit)"),
    (&[0x8B, 0x47, 0x04], "mov ax, [bx+4]"),
    (&[0x8B, 0x80, 0x34, 0x12], "mov ax, [bx+si+0x1234]"),
    (&[0x66, 0x01, 0xD8], "operand-size override: add eax, ebx"),
    (&[0x67, 0x8B, 0x00], "address-size override: mov ax, [eax]"),
    (&[0x26, 0x8B, 0x07], "es: mov ax, [bx]"),
    (&[0xF2, 0xA6], "repne cmpsb"),
    (&[0x0F, 0xC8], "bswap eax"),
    (&[0x0F, 0xB6, 0xC0], "movzx ax, al"),
    (&[0xE8, 0x05, 0x00], "call rel16"),
    (&[0xC3], "ret"),
    (&[0x74, 0x10], "je rel8"),
    (&[0x9A, 0x00, 0x00, 0x00, 0x10], "call far 0x1000:0x0000"),
    (&[0x37], "aaa"),
    (&[0x27], "daa"),
];

#[test]
fn parsed_length_matches_iced_x86_in_16_bit_mode() {
    for (bytes, label) in CASES {
        let mut window = bytes.to_vec();
        window.resize(16, 0x90); // pad with NOPs so trailing reads never truncate
        let ours = parse(&window, SegmentedAddress::new(0, 0), false, false);

        let mut decoder = Decoder::with_ip(16, &window, 0, DecoderOptions::NONE);
        let iced_instr = decoder.decode();

        assert_eq!(
            ours.length as u32,
            iced_instr.len() as u32,
            "length mismatch for {label}: ours={}, iced={}",
            ours.length,
            iced_instr.len()
        );
    }
}

#[test]
fn parsed_length_matches_capstone_in_16_bit_mode() {
    let cs = Capstone::new()
        .x86()
        .mode(arch::x86::ArchMode::Mode16)
        .syntax(arch::x86::ArchSyntax::Intel)
        .detail(false)
        .build()
        .expect("capstone init");

    for (bytes, label) in CASES {
        let mut window = bytes.to_vec();
        window.resize(16, 0x90);
        let ours = parse(&window, SegmentedAddress::new(0, 0), false, false);

        let insns = cs.disasm_count(&window, 0, 1).expect("capstone disasm");
        let cap_instr = insns.iter().next().expect("at least one instruction");

        assert_eq!(
            ours.length as u32,
            cap_instr.bytes().len() as u32,
            "length mismatch for {label}: ours={}, capstone={}",
            ours.length,
            cap_instr.bytes().len()
        );
    }
}
