use cfgcpu_types::SegmentedAddress;

/// Byte-addressed flat memory, consumed by the core. An
/// implementation is expected to call into a `BreakpointsManager`'s
/// `monitor_read`/`monitor_write` on every access made through `read_u8`/
/// `write_u8` and friends — the core itself only ever calls these plain
/// accessors, never the manager directly, which keeps `MemoryBus`
/// implementors (peripherals, test doubles) free to wire monitoring however
/// they like, including not at all.
///
/// `read_u8_sneaky` is the one path guaranteed to bypass monitoring: the
/// breakpoint condition-expression evaluator uses it exclusively, so that
/// reading memory while deciding *whether* to trigger a read breakpoint can
/// never itself trigger one.
pub trait MemoryBus {
    fn read_u8(&mut self, linear: u32) -> u8;
    fn write_u8(&mut self, linear: u32, value: u8);

    /// Bypasses any breakpoint monitoring a `read_u8` implementation
    /// performs. Default implementations that don't monitor at all may
    /// simply delegate; host implementations that do monitor must not.
    fn read_u8_sneaky(&self, linear: u32) -> u8;

    fn read_u16(&mut self, linear: u32) -> u16 {
        let lo = self.read_u8(linear) as u16;
        let hi = self.read_u8(linear.wrapping_add(1)) as u16;
        lo | (hi << 8)
    }

    fn read_u32(&mut self, linear: u32) -> u32 {
        let lo = self.read_u16(linear) as u32;
        let hi = self.read_u16(linear.wrapping_add(2)) as u32;
        lo | (hi << 16)
    }

    fn write_u16(&mut self, linear: u32, value: u16) {
        self.write_u8(linear, value as u8);
        self.write_u8(linear.wrapping_add(1), (value >> 8) as u8);
    }

    fn write_u32(&mut self, linear: u32, value: u32) {
        self.write_u16(linear, value as u16);
        self.write_u16(linear.wrapping_add(2), (value >> 16) as u16);
    }

    /// A read/write of `width` bits (8/16/32) at a segmented address,
    /// resolved to linear via `SegmentedAddress::linear`.
    fn read_sized(&mut self, addr: SegmentedAddress, width_bits: u32) -> u32 {
        match width_bits {
            8 => self.read_u8(addr.linear()) as u32,
            16 => self.read_u16(addr.linear()) as u32,
            32 => self.read_u32(addr.linear()),
            _ => unreachable!("operand width is always 8/16/32"),
        }
    }

    fn write_sized(&mut self, addr: SegmentedAddress, width_bits: u32, value: u32) {
        match width_bits {
            8 => self.write_u8(addr.linear(), value as u8),
            16 => self.write_u16(addr.linear(), value as u16),
            32 => self.write_u32(addr.linear(), value),
            _ => unreachable!("operand width is always 8/16/32"),
        }
    }

    /// A read-only slice view for the instruction fetch window. Default
    /// implementation reads byte-by-byte through `read_u8_sneaky` (a fetch
    /// must not trip a *data* read breakpoint).
    fn slice(&self, linear: u32, len: usize) -> Vec<u8> {
        (0..len as u32).map(|i| self.read_u8_sneaky(linear.wrapping_add(i))).collect()
    }
}
