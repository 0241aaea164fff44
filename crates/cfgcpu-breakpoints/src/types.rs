use crate::expr::CompiledExpr;

/// Monotonic identifier handed out by `BreakpointsManager::add`, used for
/// `toggle`/removal and to correlate a fired breakpoint back to its caller.
pub type BreakPointId = u64;

/// The breakpoint kinds this engine tracks. `MemoryAccess`/`IoAccess`
/// register with both the read and write holder of their address space, per
/// `toggle`'s fan-out contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BreakPointType {
    CpuExecutionAddress,
    CpuCycles,
    CpuInterrupt,
    MemoryRead,
    MemoryWrite,
    MemoryAccess,
    IoRead,
    IoWrite,
    IoAccess,
    MachineStart,
    MachineStop,
}

impl BreakPointType {
    /// `true` for the two "both directions" umbrella types that `toggle`
    /// must fan out to the read *and* write holder of their address space.
    pub fn is_combined_access(self) -> bool {
        matches!(self, BreakPointType::MemoryAccess | BreakPointType::IoAccess)
    }
}

/// One breakpoint. Carries its own `on_reached` callback (boxed so the
/// owner — typically the debugger glue in the facade crate — can capture
/// whatever state it needs, e.g. a pause handle) and `remove_on_trigger`.
pub struct BreakPoint {
    pub id: BreakPointId,
    pub bp_type: BreakPointType,
    pub kind: BreakPointKind,
    pub enabled: bool,
    pub user_visible: bool,
    pub remove_on_trigger: bool,
    pub on_reached: Option<Box<dyn FnMut(u64) + Send>>,
}

/// The three breakpoint shapes. `address`/`start`/`end` are widened to
/// `u64` so the same holder shape can carry linear memory/IO addresses,
/// cycle counts, and interrupt vector numbers without a separate type per
/// `BreakPointType`.
pub enum BreakPointKind {
    /// Matches `address` exactly; may carry a compiled condition predicate.
    Address {
        address: u64,
        condition: Option<CompiledExpr>,
        condition_source: Option<String>,
    },
    /// Matches any address of this breakpoint's type (e.g. "stop on any
    /// memory write").
    Unconditional,
    /// Matches any address in `start..=end` (inclusive span).
    Range { start: u64, end: u64 },
}

impl BreakPoint {
    pub fn matches_address(&self, address: u64) -> bool {
        match &self.kind {
            BreakPointKind::Address { address: a, .. } => *a == address,
            BreakPointKind::Unconditional => true,
            BreakPointKind::Range { start, end } => address >= *start && address <= *end,
        }
    }

    pub fn condition(&self) -> Option<&CompiledExpr> {
        match &self.kind {
            BreakPointKind::Address { condition, .. } => condition.as_ref(),
            _ => None,
        }
    }
}

impl std::fmt::Debug for BreakPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreakPoint")
            .field("id", &self.id)
            .field("bp_type", &self.bp_type)
            .field("enabled", &self.enabled)
            .field("user_visible", &self.user_visible)
            .field("remove_on_trigger", &self.remove_on_trigger)
            .finish_non_exhaustive()
    }
}

/// The external serialization record: `end_trigger == trigger` denotes a
/// single-address breakpoint, otherwise an inclusive range.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BreakPointRecord {
    pub trigger: i64,
    pub end_trigger: i64,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub bp_type: BreakPointType,
    pub is_enabled: bool,
    pub condition: Option<String>,
}
