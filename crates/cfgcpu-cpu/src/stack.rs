//! 16/32-bit-aware stack push/pop. `SS:SP`/`SS:ESP`
//! is the only stack this core ever addresses — there is no separate stack
//! segment selector validation since real mode has none.

use cfgcpu_types::{Reg16, Reg32, SegReg, SegmentedAddress, State};

use crate::bus::MemoryBus;

/// `true` selects the 32-bit stack pointer (`ESP`), matching the operand-size
/// prefix the instruction that's pushing/popping was decoded with.
pub fn push(state: &mut State, bus: &mut dyn MemoryBus, use_32: bool, value: u32) {
    let ss = state.segment(SegReg::Ss);
    if use_32 {
        let sp = state.get32(Reg32::Esp).wrapping_sub(4);
        state.set32(Reg32::Esp, sp);
        bus.write_u32(SegmentedAddress::new(ss, sp as u16).linear(), value);
    } else {
        let sp = state.get16(Reg16::Sp).wrapping_sub(2);
        state.set16(Reg16::Sp, sp);
        bus.write_u16(SegmentedAddress::new(ss, sp).linear(), value as u16);
    }
}

pub fn pop(state: &mut State, bus: &mut dyn MemoryBus, use_32: bool) -> u32 {
    let ss = state.segment(SegReg::Ss);
    if use_32 {
        let sp = state.get32(Reg32::Esp);
        let value = bus.read_u32(SegmentedAddress::new(ss, sp as u16).linear());
        state.set32(Reg32::Esp, sp.wrapping_add(4));
        value
    } else {
        let sp = state.get16(Reg16::Sp);
        let value = bus.read_u16(SegmentedAddress::new(ss, sp).linear());
        state.set16(Reg16::Sp, sp.wrapping_add(2));
        value as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::VecMemoryBus;

    #[test]
    fn push_decrements_sp_by_two_in_16_bit_mode() {
        let mut state = State::new();
        state.set16(Reg16::Sp, 0x0100);
        let mut bus = VecMemoryBus::new(0x10000);
        push(&mut state, &mut bus, false, 0x1234);
        assert_eq!(state.get16(Reg16::Sp), 0x00FE);
        assert_eq!(pop(&mut state, &mut bus, false), 0x1234);
        assert_eq!(state.get16(Reg16::Sp), 0x0100);
    }

    #[test]
    fn push_32_moves_esp_by_four() {
        let mut state = State::new();
        state.set32(Reg32::Esp, 0x2000);
        let mut bus = VecMemoryBus::new(0x10000);
        push(&mut state, &mut bus, true, 0x1122_3344);
        assert_eq!(state.get32(Reg32::Esp), 0x1FFC);
        assert_eq!(pop(&mut state, &mut bus, true), 0x1122_3344);
    }
}
