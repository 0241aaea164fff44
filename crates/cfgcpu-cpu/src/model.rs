/// Describes the emulated CPU model: an 80386DX-class core with no FPU, no
/// paging, and no `CPUID`. Consulted by `CPUID`'s
/// invalid-opcode path and by the FPU-stub instructions when deciding what
/// control/status words to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CpuModelInfo {
    pub has_cpuid: bool,
    pub has_fpu: bool,
    pub gpr_width_bits: u32,
    pub has_paging: bool,
    /// Value `FNSTCW` reports when no FPU is present: all exceptions
    /// masked, 64-bit precision, round-to-nearest.
    pub fpu_stub_control_word: u16,
    /// Value `FNSTSW` reports when no FPU is present: all exception and
    /// busy bits set, signalling "not present" to code that probes for one.
    pub fpu_stub_status_word: u8,
}

impl Default for CpuModelInfo {
    fn default() -> Self {
        CpuModelInfo {
            has_cpuid: false,
            has_fpu: false,
            gpr_width_bits: 32,
            has_paging: false,
            fpu_stub_control_word: 0x037F,
            fpu_stub_status_word: 0xFF,
        }
    }
}
