//! Execution counters. Not part of the emulated guest's observable state —
//! a real embedding runtime always wants *some* telemetry out of its CPU
//! core, as a small `serde`-serializable stats struct rather than a bespoke
//! metrics surface.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stats {
    pub instructions_executed: u64,
    pub instructions_parsed: u64,
    pub cache_hits: u64,
    pub smc_evictions: u64,
    pub discriminator_reductions: u64,
    pub breakpoint_hits: u64,
    pub interrupts_dispatched: u64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_all_zero() {
        assert_eq!(Stats::new(), Stats::default());
        assert_eq!(Stats::new().instructions_executed, 0);
    }
}
