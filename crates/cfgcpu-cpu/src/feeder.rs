//! The instruction cache/feeder. `fetch` is the single entry
//! point the execution loop uses to turn "I'm about to run whatever is at
//! this address" into a `CfgInstruction` — reusing a cached parse whenever
//! the underlying bytes haven't moved, and always staying the ground truth
//! for what actually runs next (the CFG's `DiscriminatedNode` edges are a
//! bookkeeping view on top of this, not an alternate source of truth).

use std::collections::HashMap;

use cfgcpu_isa::{parse, CfgInstruction};
use cfgcpu_types::SegmentedAddress;

use crate::bus::MemoryBus;
use crate::cfg::{CfgArena, NodeId};
use crate::stats::Stats;

/// Instruction cache keyed by guest address, backed by a [`CfgArena`].
pub struct InstructionsFeeder {
    arena: CfgArena,
    /// The address's currently-believed-valid parse, if any. An address is
    /// only ever in here while its bytes are known to match what is cached.
    current: HashMap<SegmentedAddress, NodeId>,
    /// Every shape ever observed at an address, most recent last. Consulted
    /// on a `current` miss before re-parsing, so a write that flips a byte
    /// back and forth (a common SMC pattern — encrypt/decrypt-in-place
    /// loaders) doesn't re-allocate a fresh node each time.
    previous: HashMap<SegmentedAddress, Vec<NodeId>>,
}

impl Default for InstructionsFeeder {
    fn default() -> Self {
        Self::new()
    }
}

impl InstructionsFeeder {
    pub fn new() -> Self {
        InstructionsFeeder {
            arena: CfgArena::new(),
            current: HashMap::new(),
            previous: HashMap::new(),
        }
    }

    pub fn arena(&self) -> &CfgArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut CfgArena {
        &mut self.arena
    }

    /// Returns the node to execute at `addr`, parsing fresh bytes only if no
    /// historical candidate's full byte pattern still matches memory.
    ///
    /// Resurrection (the "previous" lookup) requires an *exact* match of
    /// every byte the instruction was parsed from, not just its final
    /// (identity) fields — matching only final fields would let a live
    /// immediate/displacement edit go unnoticed and hand back a node whose
    /// operand values are stale relative to memory. Exact-byte matching is
    /// what makes the SMC round-trip invariant hold: flipping
    /// bytes away and then restoring them exactly resurrects the original
    /// node, pointer-identical, because nothing else in `previous` can ever
    /// have those same bytes.
    pub fn fetch(
        &mut self,
        addr: SegmentedAddress,
        bus: &dyn MemoryBus,
        default_operand_size_32: bool,
        default_address_size_32: bool,
        stats: &mut Stats,
    ) -> NodeId {
        if let Some(&id) = self.current.get(&addr) {
            return id;
        }

        if let Some(candidates) = self.previous.get(&addr).cloned() {
            for id in &candidates {
                if self.instruction_matches_memory(*id, addr, bus) {
                    self.current.insert(addr, *id);
                    stats.cache_hits += 1;
                    return *id;
                }
            }
        }

        let window = bus.slice(addr.linear(), 16);
        let parsed = parse(&window, addr, default_operand_size_32, default_address_size_32);

        // No previous candidate's bytes matched exactly, so this is a
        // genuinely new instance and gets its own node — reusing (mutating)
        // an existing node here would destroy the very identity the SMC
        // round-trip invariant depends on (a later restore of an old node's
        // bytes must still find that old node, untouched, in `previous`).
        // We still count a "discriminator reduction" whenever the new parse
        // shares final-field shape with something already on file: it is
        // the same signal the CFG layer uses to decide a predecessor's edge
        // needs a `DiscriminatedNode` rather than pointing
        // at a single successor.
        if let Some(candidates) = self.previous.get(&addr) {
            if candidates
                .iter()
                .filter_map(|id| self.arena.instruction(*id))
                .any(|existing| final_bytes_equal(existing, &parsed))
            {
                stats.discriminator_reductions += 1;
            }
        }

        stats.instructions_parsed += 1;
        let id = self.arena.alloc_instruction(parsed);
        self.previous.entry(addr).or_default().push(id);
        self.current.insert(addr, id);
        id
    }

    /// Full-byte-identity check used for resurrection: every byte the
    /// cached instruction was parsed from must still read back unchanged.
    fn instruction_matches_memory(&self, id: NodeId, addr: SegmentedAddress, bus: &dyn MemoryBus) -> bool {
        let Some(instr) = self.arena.instruction(id) else {
            return false;
        };
        for (i, &cached) in instr.raw_bytes.iter().enumerate() {
            let live = bus.read_u8_sneaky(addr.advance(i as u16).linear());
            if live != cached {
                return false;
            }
        }
        true
    }

    /// A guest write landed in `[linear, linear + len)`: drop any `current`
    /// cache entry whose instruction bytes overlap the write so the next
    /// `fetch` re-validates against live memory. A linear scan of `current` — the cache is sized
    /// to the working set of recently-executed addresses, not the whole
    /// guest image, so this stays cheap in practice.
    pub fn notify_write(&mut self, linear: u32, len: u32, stats: &mut Stats) {
        let write_start = linear as u64;
        let write_end = write_start + len as u64;
        let mut evicted = Vec::new();
        for (&addr, &id) in self.current.iter() {
            if let Some(instr) = self.arena.instruction(id) {
                let start = addr.linear() as u64;
                let end = start + instr.length as u64;
                if start < write_end && write_start < end {
                    evicted.push(addr);
                }
            }
        }
        for addr in evicted {
            self.current.remove(&addr);
            stats.smc_evictions += 1;
        }
    }
}

/// Two parses share a "shape" when their final (identity) fields cover the
/// same byte ranges and hold the same bytes — differing only in whatever
/// non-final immediate/displacement values self-modifying code likes to
/// patch in place.
fn final_bytes_equal(a: &CfgInstruction, b: &CfgInstruction) -> bool {
    let sa = a.final_byte_spans();
    let sb = b.final_byte_spans();
    if sa != sb {
        return false;
    }
    sa.iter().all(|&(off, len)| {
        let off = off as usize;
        let len = len as usize;
        a.raw_bytes.get(off..off + len) == b.raw_bytes.get(off..off + len)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::VecMemoryBus;

    #[test]
    fn fetching_the_same_address_twice_reuses_the_node() {
        let mut feeder = InstructionsFeeder::new();
        let mut bus = VecMemoryBus::new(0x10000);
        bus.seed(0, &[0x90]); // NOP
        let mut stats = Stats::new();
        let addr = SegmentedAddress::new(0, 0);
        let a = feeder.fetch(addr, &bus, false, false, &mut stats);
        let b = feeder.fetch(addr, &bus, false, false, &mut stats);
        assert_eq!(a, b);
        assert_eq!(stats.instructions_parsed, 1);
    }

    #[test]
    fn a_write_to_the_cached_bytes_forces_a_reparse() {
        let mut feeder = InstructionsFeeder::new();
        let mut bus = VecMemoryBus::new(0x10000);
        bus.seed(0, &[0xB0, 0x01]); // MOV AL, 1
        let mut stats = Stats::new();
        let addr = SegmentedAddress::new(0, 0);
        let first = feeder.fetch(addr, &bus, false, false, &mut stats);

        feeder.notify_write(0, 2, &mut stats);
        bus.seed(0, &[0xB0, 0x02]); // MOV AL, 2 -- same shape, different immediate
        let second = feeder.fetch(addr, &bus, false, false, &mut stats);

        assert_ne!(
            first, second,
            "a genuinely different immediate gets its own node, so a later restore of the \
             first instance's exact bytes can still find it"
        );
        assert_eq!(stats.discriminator_reductions, 1, "same final-byte shape was still observed before");
        assert_eq!(stats.smc_evictions, 1);
        assert_eq!(stats.instructions_parsed, 2);
    }

    /// `MOV AX, 0x1234` at `0x1000:0x0100`, overwritten with `MOV AX,
    /// 0x5678`, then restored — the feeder must hand back the *original*
    /// node, pointer-identical, not a third parse.
    #[test]
    fn self_modifying_code_round_trip_resurrects_the_original_node() {
        let mut feeder = InstructionsFeeder::new();
        let mut bus = VecMemoryBus::new(0x20000);
        let addr = SegmentedAddress::new(0x1000, 0x0100);
        let original = [0xB8, 0x34, 0x12]; // MOV AX, 0x1234
        let patched = [0xB8, 0x78, 0x56]; // MOV AX, 0x5678
        bus.seed(addr.linear(), &original);
        let mut stats = Stats::new();

        let node_a = feeder.fetch(addr, &bus, false, false, &mut stats);

        feeder.notify_write(addr.linear(), 3, &mut stats);
        bus.seed(addr.linear(), &patched);
        let node_b = feeder.fetch(addr, &bus, false, false, &mut stats);
        assert_ne!(node_a, node_b);

        feeder.notify_write(addr.linear(), 3, &mut stats);
        bus.seed(addr.linear(), &original);
        let resurrected = feeder.fetch(addr, &bus, false, false, &mut stats);
        assert_eq!(
            resurrected, node_a,
            "restoring the exact original bytes must resurrect the original node"
        );
        assert_eq!(stats.instructions_parsed, 2);
    }

    #[test]
    fn an_untouched_cache_entry_survives_an_unrelated_write() {
        let mut feeder = InstructionsFeeder::new();
        let mut bus = VecMemoryBus::new(0x10000);
        bus.seed(0, &[0x90]);
        bus.seed(0x100, &[0x90]);
        let mut stats = Stats::new();
        let addr = SegmentedAddress::new(0, 0);
        let id = feeder.fetch(addr, &bus, false, false, &mut stats);

        feeder.notify_write(0x100, 1, &mut stats);
        let again = feeder.fetch(addr, &bus, false, false, &mut stats);
        assert_eq!(id, again);
        assert_eq!(stats.instructions_parsed, 1);
    }
}
