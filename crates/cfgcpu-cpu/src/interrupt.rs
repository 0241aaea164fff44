//! Real-mode interrupt dispatch.
//! The IVT is just the first 1 KiB of guest memory — 256 far pointers, four
//! bytes apiece, `offset` then `segment` — so there is no separate storage
//! for it, only read/write helpers over the bus already in scope.

use cfgcpu_types::{Flags, SegReg, State};

use crate::bus::MemoryBus;
use crate::stack;

pub struct InterruptVectorTable;

impl InterruptVectorTable {
    /// `(segment, offset)` of `vector`'s handler. Uses the sneaky path: a
    /// dispatch's own IVT read is a CPU-internal fetch, not a guest data
    /// access, and must not itself trip a memory-read breakpoint.
    pub fn get_vector(bus: &dyn MemoryBus, vector: u8) -> (u16, u16) {
        let base = vector as u32 * 4;
        let offset = bus.read_u8_sneaky(base) as u16 | ((bus.read_u8_sneaky(base + 1) as u16) << 8);
        let segment = bus.read_u8_sneaky(base + 2) as u16 | ((bus.read_u8_sneaky(base + 3) as u16) << 8);
        (segment, offset)
    }

    pub fn set_vector(bus: &mut dyn MemoryBus, vector: u8, segment: u16, offset: u16) {
        let base = vector as u32 * 4;
        bus.write_u16(base, offset);
        bus.write_u16(base + 2, segment);
    }
}

/// Lets the embedding host service an interrupt itself — a BIOS/DOS call
/// trapped at the emulator boundary — instead of dispatching through the
/// guest's (possibly never-installed) IVT entry.
pub trait CallbackHandler {
    /// Returns `true` if the callback fully handled `vector`; `false` tells
    /// the caller to fall through to the normal IVT dispatch.
    fn handle(&mut self, vector: u8, state: &mut State, bus: &mut dyn MemoryBus) -> bool;

    /// `IN`: this core has no device model of its own, so port reads are
    /// routed to the host unconditionally. Defaults to an unpopulated bus
    /// (all ones), the usual floating-bus read of an unmapped port.
    fn port_in(&mut self, _port: u16, width_bits: u32) -> u32 {
        (1u64 << width_bits) as u32 - 1
    }

    /// `OUT`: defaults to discarding the write.
    fn port_out(&mut self, _port: u16, _width_bits: u32, _value: u32) {}
}

/// The default handler: every interrupt dispatches through the guest's IVT
/// and every port access hits the floating-bus/no-op default.
pub struct NullCallbackHandler;

impl CallbackHandler for NullCallbackHandler {
    fn handle(&mut self, _vector: u8, _state: &mut State, _bus: &mut dyn MemoryBus) -> bool {
        false
    }
}

/// Pushes FLAGS:CS:IP, clears IF and TF, and loads CS:IP from the vector's
/// IVT entry.
pub fn deliver(state: &mut State, bus: &mut dyn MemoryBus, vector: u8) {
    let flags_value = (state.flags.0 & 0xFFFF) as u32;
    stack::push(state, bus, false, flags_value);
    stack::push(state, bus, false, state.segment(SegReg::Cs) as u32);
    stack::push(state, bus, false, state.ip() as u32);
    state.flags.set_interrupt(false);
    state.flags.set_trap(false);
    let (segment, offset) = InterruptVectorTable::get_vector(bus, vector);
    state.set_segment(SegReg::Cs, segment);
    state.set_ip(offset);
}

/// Pops IP:CS:FLAGS, honouring `width32` for `IRETD`'s wider stack frame.
pub fn return_from_interrupt(state: &mut State, bus: &mut dyn MemoryBus, width32: bool) {
    let ip = stack::pop(state, bus, width32);
    let cs = stack::pop(state, bus, width32);
    let flags = stack::pop(state, bus, width32);
    if width32 {
        state.eip = ip;
        state.flags = Flags(flags);
    } else {
        state.set_ip(ip as u16);
        state.flags = Flags((state.flags.0 & 0xFFFF_0000) | (flags & 0xFFFF));
    }
    state.set_segment(SegReg::Cs, cs as u16);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::VecMemoryBus;
    use cfgcpu_types::Reg16;

    #[test]
    fn deliver_then_return_restores_the_original_context() {
        let mut state = State::new();
        state.set_segment(SegReg::Cs, 0x1000);
        state.set_ip(0x0050);
        state.set16(Reg16::Sp, 0x2000);
        state.flags.set_carry(true);
        let mut bus = VecMemoryBus::new(0x10000);
        InterruptVectorTable::set_vector(&mut bus, 0x21, 0x0700, 0x0200);

        deliver(&mut state, &mut bus, 0x21);
        assert_eq!(state.segment(SegReg::Cs), 0x0700);
        assert_eq!(state.ip(), 0x0200);
        assert!(!state.flags.interrupt());

        return_from_interrupt(&mut state, &mut bus, false);
        assert_eq!(state.segment(SegReg::Cs), 0x1000);
        assert_eq!(state.ip(), 0x0050);
        assert!(state.flags.carry());
    }
}
