use crate::cursor::Cursor;
use crate::error::DecodeError;
use cfgcpu_types::SegReg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepPrefix {
    /// `F3` on non-CMPS/SCAS instructions; plain REP.
    Rep,
    /// `F3` on CMPS/SCAS: repeat while ZF=1.
    RepE,
    /// `F2`: repeat while ZF=0.
    RepNe,
}

/// The aggregated legacy prefix chain. Later prefixes
/// of the same class overwrite earlier ones, matching real decoder
/// behaviour (e.g. two segment overrides: the last one wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrefixSet {
    pub lock: bool,
    pub rep: Option<RepPrefix>,
    pub segment_override: Option<SegReg>,
    pub operand_size_override: bool,
    pub address_size_override: bool,
    /// Number of prefix bytes consumed, for `InstructionField` bookkeeping.
    pub byte_len: u8,
}

/// Consumes zero or more legacy prefix bytes from the front of `cursor`.
pub fn parse_prefixes(cursor: &mut Cursor<'_>) -> Result<PrefixSet, DecodeError> {
    let mut set = PrefixSet::default();
    loop {
        let b = match cursor.peek_u8() {
            Ok(b) => b,
            Err(_) => break,
        };
        let matched = match b {
            0xF0 => {
                set.lock = true;
                true
            }
            0xF2 => {
                set.rep = Some(RepPrefix::RepNe);
                true
            }
            0xF3 => {
                set.rep = Some(RepPrefix::Rep);
                true
            }
            0x2E => {
                set.segment_override = Some(SegReg::Cs);
                true
            }
            0x36 => {
                set.segment_override = Some(SegReg::Ss);
                true
            }
            0x3E => {
                set.segment_override = Some(SegReg::Ds);
                true
            }
            0x26 => {
                set.segment_override = Some(SegReg::Es);
                true
            }
            0x64 => {
                set.segment_override = Some(SegReg::Fs);
                true
            }
            0x65 => {
                set.segment_override = Some(SegReg::Gs);
                true
            }
            0x66 => {
                set.operand_size_override = true;
                true
            }
            0x67 => {
                set.address_size_override = true;
                true
            }
            _ => false,
        };
        if !matched {
            break;
        }
        cursor.read_u8()?;
        set.byte_len += 1;
    }
    Ok(set)
}

/// `F3` resolved against the instruction that follows: CMPS/SCAS treat `F3`
/// as REPE rather than plain REP.
pub fn resolve_rep_for_compare(rep: Option<RepPrefix>) -> Option<RepPrefix> {
    match rep {
        Some(RepPrefix::Rep) => Some(RepPrefix::RepE),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_segment_and_size_prefixes() {
        let bytes = [0x66, 0x3E, 0xB8, 0x34, 0x12];
        let mut c = Cursor::new(&bytes);
        let p = parse_prefixes(&mut c).unwrap();
        assert!(p.operand_size_override);
        assert_eq!(p.segment_override, Some(SegReg::Ds));
        assert_eq!(p.byte_len, 2);
        assert_eq!(c.position(), 2);
    }

    #[test]
    fn last_segment_override_wins() {
        let bytes = [0x2E, 0x36, 0x90];
        let mut c = Cursor::new(&bytes);
        let p = parse_prefixes(&mut c).unwrap();
        assert_eq!(p.segment_override, Some(SegReg::Ss));
    }

    #[test]
    fn no_prefixes_consumes_nothing() {
        let bytes = [0x90];
        let mut c = Cursor::new(&bytes);
        let p = parse_prefixes(&mut c).unwrap();
        assert_eq!(p.byte_len, 0);
        assert_eq!(c.position(), 0);
    }
}
