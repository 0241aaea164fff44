use crate::cursor::Cursor;
use crate::error::DecodeError;
use cfgcpu_types::{Reg32, SegReg};

/// The 16-bit-addressing base/index combinations encoded by `rm` when
/// `mod != 11`. This predates SIB: each combination is a fixed pair of
/// registers (or a single one, or none for the disp16-only form).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base16 {
    BxSi,
    BxDi,
    BpSi,
    BpDi,
    Si,
    Di,
    Bp,
    Bx,
}

impl Base16 {
    fn from_rm(rm: u8) -> Option<Self> {
        Some(match rm {
            0 => Base16::BxSi,
            1 => Base16::BxDi,
            2 => Base16::BpSi,
            3 => Base16::BpDi,
            4 => Base16::Si,
            5 => Base16::Di,
            6 => Base16::Bp,
            7 => Base16::Bx,
            _ => return None,
        })
    }

    /// `true` when the formula includes BP, which defaults the operand's
    /// segment to SS instead of DS.
    fn uses_bp(self) -> bool {
        matches!(self, Base16::BpSi | Base16::BpDi | Base16::Bp)
    }
}

/// A decoded ModRM (+ optional SIB, + optional displacement), carrying
/// enough information for both the effective-address resolver (`cfgcpu-cpu`)
/// and the assembly/AST printers (`cfgcpu-isa`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModRmContext {
    pub raw: u8,
    pub mod_bits: u8,
    /// The "reg" field: either a register operand or, for Grp1-5 opcodes, an
    /// opcode-extension selector.
    pub reg_field: u8,
    pub rm_field: u8,
    pub is_memory: bool,
    pub base16: Option<Base16>,
    pub base32: Option<Reg32>,
    pub index32: Option<(Reg32, u8)>,
    pub disp: i32,
    pub disp_size: u8,
    pub addr_size_32: bool,
    pub segment_override: Option<SegReg>,
    /// Total bytes consumed by ModRM + SIB + displacement.
    pub byte_len: u8,
}

impl ModRmContext {
    /// The segment an unqualified memory operand defaults to, honouring an
    /// explicit prefix override first.
    pub fn effective_segment(&self) -> SegReg {
        if let Some(s) = self.segment_override {
            return s;
        }
        if self.addr_size_32 {
            matches!(self.base32, Some(Reg32::Esp) | Some(Reg32::Ebp))
                .then_some(SegReg::Ss)
                .unwrap_or(SegReg::Ds)
        } else {
            self.base16
                .map(Base16::uses_bp)
                .unwrap_or(false)
                .then_some(SegReg::Ss)
                .unwrap_or(SegReg::Ds)
        }
    }
}

/// Parses a ModRM byte (and any SIB/displacement it implies) at the cursor's
/// current position.
pub fn parse_modrm(
    cursor: &mut Cursor<'_>,
    addr_size_32: bool,
    segment_override: Option<SegReg>,
) -> Result<ModRmContext, DecodeError> {
    let raw = cursor.read_u8()?;
    let mod_bits = raw >> 6;
    let reg_field = (raw >> 3) & 0b111;
    let rm_field = raw & 0b111;
    let mut byte_len = 1u8;

    if mod_bits == 0b11 {
        return Ok(ModRmContext {
            raw,
            mod_bits,
            reg_field,
            rm_field,
            is_memory: false,
            base16: None,
            base32: None,
            index32: None,
            disp: 0,
            disp_size: 0,
            addr_size_32,
            segment_override,
            byte_len,
        });
    }

    let mut base16 = None;
    let mut base32 = None;
    let mut index32 = None;
    let disp_size;

    if addr_size_32 {
        if rm_field == 0b100 {
            let sib = cursor.read_u8()?;
            byte_len += 1;
            let scale = 1u8 << (sib >> 6);
            let index = (sib >> 3) & 0b111;
            let base = sib & 0b111;
            if index != 0b100 {
                index32 = Some((Reg32::from_index(index), scale));
            }
            if !(base == 0b101 && mod_bits == 0b00) {
                base32 = Some(Reg32::from_index(base));
            }
        } else if !(rm_field == 0b101 && mod_bits == 0b00) {
            base32 = Some(Reg32::from_index(rm_field));
        }
        disp_size = match mod_bits {
            0b00 => {
                if rm_field == 0b101 || (rm_field == 0b100 && base32.is_none()) {
                    4
                } else {
                    0
                }
            }
            0b01 => 1,
            _ => 4,
        };
    } else {
        if mod_bits == 0b00 && rm_field == 0b110 {
            base16 = None;
            disp_size = 2;
        } else {
            base16 = Base16::from_rm(rm_field);
            disp_size = match mod_bits {
                0b00 => 0,
                0b01 => 1,
                _ => 2,
            };
        }
    }

    let disp = match disp_size {
        0 => 0,
        1 => cursor.read_u8()? as i8 as i32,
        2 => cursor.read_u16()? as i16 as i32,
        4 => cursor.read_u32()? as i32,
        _ => unreachable!(),
    };
    byte_len += disp_size;

    Ok(ModRmContext {
        raw,
        mod_bits,
        reg_field,
        rm_field,
        is_memory: true,
        base16,
        base32,
        index32,
        disp,
        disp_size,
        addr_size_32,
        segment_override,
        byte_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_direct_mode_has_no_memory_fields() {
        // mod=11 reg=000 rm=001 -> register-direct, e.g. `mov ax, cx`.
        let bytes = [0b11_000_001];
        let mut c = Cursor::new(&bytes);
        let ctx = parse_modrm(&mut c, false, None).unwrap();
        assert!(!ctx.is_memory);
        assert_eq!(ctx.reg_field, 0);
        assert_eq!(ctx.rm_field, 1);
        assert_eq!(ctx.byte_len, 1);
    }

    #[test]
    fn sixteen_bit_disp16_only_form() {
        // mod=00 rm=110 -> disp16 direct, e.g. `mov ax, [1234h]`.
        let bytes = [0b00_000_110, 0x34, 0x12];
        let mut c = Cursor::new(&bytes);
        let ctx = parse_modrm(&mut c, false, None).unwrap();
        assert!(ctx.is_memory);
        assert_eq!(ctx.base16, None);
        assert_eq!(ctx.disp, 0x1234);
        assert_eq!(ctx.byte_len, 3);
        assert_eq!(ctx.effective_segment(), SegReg::Ds);
    }

    #[test]
    fn sixteen_bit_bp_plus_si_defaults_to_ss() {
        // mod=01 rm=010 -> [BP+SI+disp8].
        let bytes = [0b01_000_010, 0x05];
        let mut c = Cursor::new(&bytes);
        let ctx = parse_modrm(&mut c, false, None).unwrap();
        assert_eq!(ctx.base16, Some(Base16::BpSi));
        assert_eq!(ctx.disp, 5);
        assert_eq!(ctx.effective_segment(), SegReg::Ss);
    }

    #[test]
    fn thirty_two_bit_sib_with_no_index_and_disp32_base() {
        // mod=00 rm=100 (SIB) ; SIB: scale=00 index=100 (none) base=101 -> disp32, no base.
        let bytes = [0b00_000_100, 0b00_100_101, 0x78, 0x56, 0x34, 0x12];
        let mut c = Cursor::new(&bytes);
        let ctx = parse_modrm(&mut c, true, None).unwrap();
        assert_eq!(ctx.base32, None);
        assert_eq!(ctx.index32, None);
        assert_eq!(ctx.disp, 0x1234_5678);
        assert_eq!(ctx.byte_len, 6);
    }

    #[test]
    fn thirty_two_bit_sib_scaled_index() {
        // SIB: scale=10 (x4) index=001 (ecx) base=011 (ebx), mod=01 -> disp8.
        let bytes = [0b01_000_100, 0b10_001_011, 0x10];
        let mut c = Cursor::new(&bytes);
        let ctx = parse_modrm(&mut c, true, None).unwrap();
        assert_eq!(ctx.base32, Some(Reg32::Ebx));
        assert_eq!(ctx.index32, Some((Reg32::Ecx, 4)));
        assert_eq!(ctx.disp, 0x10);
    }
}
