use std::collections::HashMap;

use crate::expr::EvalContext;
use crate::types::{BreakPoint, BreakPointId, BreakPointKind};

/// Address-keyed breakpoint storage for one [`crate::BreakPointType`].
/// Holds a fast "has any enabled" flag so the hot execution and
/// memory-access paths can skip straight past an empty holder without
/// touching the map.
#[derive(Default)]
pub struct BreakPointHolder {
    by_address: HashMap<u64, Vec<BreakPoint>>,
    ranges: Vec<BreakPoint>,
    unconditional: Vec<BreakPoint>,
    has_any_enabled: bool,
}

impl BreakPointHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_any_enabled(&self) -> bool {
        self.has_any_enabled
    }

    pub fn insert(&mut self, bp: BreakPoint) {
        match &bp.kind {
            BreakPointKind::Address { address, .. } => {
                self.by_address.entry(*address).or_default().push(bp);
            }
            BreakPointKind::Range { .. } => self.ranges.push(bp),
            BreakPointKind::Unconditional => self.unconditional.push(bp),
        }
        self.recompute_has_any_enabled();
    }

    pub fn remove(&mut self, id: BreakPointId) -> Option<BreakPoint> {
        let found = self
            .by_address
            .values_mut()
            .find_map(|v| v.iter().position(|b| b.id == id).map(|i| v.remove(i)))
            .or_else(|| {
                self.ranges
                    .iter()
                    .position(|b| b.id == id)
                    .map(|i| self.ranges.remove(i))
            })
            .or_else(|| {
                self.unconditional
                    .iter()
                    .position(|b| b.id == id)
                    .map(|i| self.unconditional.remove(i))
            });
        self.by_address.retain(|_, v| !v.is_empty());
        self.recompute_has_any_enabled();
        found
    }

    pub fn get_mut(&mut self, id: BreakPointId) -> Option<&mut BreakPoint> {
        self.by_address
            .values_mut()
            .flatten()
            .chain(self.ranges.iter_mut())
            .chain(self.unconditional.iter_mut())
            .find(|b| b.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BreakPoint> {
        self.by_address
            .values()
            .flatten()
            .chain(self.ranges.iter())
            .chain(self.unconditional.iter())
    }

    fn recompute_has_any_enabled(&mut self) {
        self.has_any_enabled = self.iter().any(|b| b.enabled);
    }

    /// Evaluates every breakpoint that could match `address`, fires
    /// `on_reached` for each match whose condition (if any) passes, drops
    /// any with `remove_on_trigger`, and returns whether anything fired.
    pub fn check_and_fire(&mut self, address: u64, ctx: &dyn EvalContext) -> bool {
        if !self.has_any_enabled {
            return false;
        }
        let mut fired = false;
        let mut to_remove = Vec::new();

        let mut check_group = |group: &mut Vec<BreakPoint>, to_remove: &mut Vec<BreakPointId>| {
            for bp in group.iter_mut() {
                if !bp.enabled || !bp.matches_address(address) {
                    continue;
                }
                let passes = match bp.condition() {
                    Some(expr) => expr.evaluate(ctx),
                    None => true,
                };
                if !passes {
                    continue;
                }
                if let Some(cb) = bp.on_reached.as_mut() {
                    cb(address);
                }
                fired = true;
                if bp.remove_on_trigger {
                    to_remove.push(bp.id);
                }
            }
        };

        if let Some(group) = self.by_address.get_mut(&address) {
            check_group(group, &mut to_remove);
        }
        check_group(&mut self.ranges, &mut to_remove);
        check_group(&mut self.unconditional, &mut to_remove);

        for id in to_remove {
            self.remove(id);
        }
        if fired {
            self.recompute_has_any_enabled();
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BreakPointType;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct NullCtx;
    impl EvalContext for NullCtx {
        fn register(&self, _name: &str) -> Option<i64> {
            None
        }
        fn read_memory_sneaky(&self, _address: u32, _width: u8) -> u32 {
            0
        }
    }

    #[test]
    fn empty_holder_is_the_fast_path() {
        let h = BreakPointHolder::new();
        assert!(!h.has_any_enabled());
    }

    #[test]
    fn unconditional_matches_any_address_and_can_self_remove() {
        let hits = Arc::new(AtomicU32::new(0));
        let hits2 = hits.clone();
        let mut h = BreakPointHolder::new();
        h.insert(BreakPoint {
            id: 1,
            bp_type: BreakPointType::CpuExecutionAddress,
            kind: BreakPointKind::Unconditional,
            enabled: true,
            user_visible: true,
            remove_on_trigger: true,
            on_reached: Some(Box::new(move |_| {
                hits2.fetch_add(1, Ordering::SeqCst);
            })),
        });
        assert!(h.check_and_fire(0x1234, &NullCtx));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        // Removed after firing once.
        assert!(!h.check_and_fire(0x1234, &NullCtx));
    }

    #[test]
    fn disabled_breakpoint_never_fires() {
        let mut h = BreakPointHolder::new();
        h.insert(BreakPoint {
            id: 1,
            bp_type: BreakPointType::CpuExecutionAddress,
            kind: BreakPointKind::Address {
                address: 0x100,
                condition: None,
                condition_source: None,
            },
            enabled: false,
            user_visible: true,
            remove_on_trigger: false,
            on_reached: None,
        });
        assert!(!h.has_any_enabled());
        assert!(!h.check_and_fire(0x100, &NullCtx));
    }
}
