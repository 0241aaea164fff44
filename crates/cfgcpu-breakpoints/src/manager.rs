use crate::expr::EvalContext;
use crate::holder::BreakPointHolder;
use crate::types::{BreakPoint, BreakPointId, BreakPointKind, BreakPointRecord, BreakPointType};

/// One holder per `BreakPointType`, plus the monotonic id counter `add`
/// hands out.
pub struct BreakpointsManager {
    execution: BreakPointHolder,
    cycles: BreakPointHolder,
    interrupt: BreakPointHolder,
    memory_read: BreakPointHolder,
    memory_write: BreakPointHolder,
    io_read: BreakPointHolder,
    io_write: BreakPointHolder,
    machine_start: BreakPointHolder,
    machine_stop: BreakPointHolder,
    next_id: BreakPointId,
}

impl Default for BreakpointsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakpointsManager {
    pub fn new() -> Self {
        BreakpointsManager {
            execution: BreakPointHolder::new(),
            cycles: BreakPointHolder::new(),
            interrupt: BreakPointHolder::new(),
            memory_read: BreakPointHolder::new(),
            memory_write: BreakPointHolder::new(),
            io_read: BreakPointHolder::new(),
            io_write: BreakPointHolder::new(),
            machine_start: BreakPointHolder::new(),
            machine_stop: BreakPointHolder::new(),
            next_id: 1,
        }
    }

    fn holder_mut(&mut self, t: BreakPointType) -> &mut BreakPointHolder {
        match t {
            BreakPointType::CpuExecutionAddress => &mut self.execution,
            BreakPointType::CpuCycles => &mut self.cycles,
            BreakPointType::CpuInterrupt => &mut self.interrupt,
            BreakPointType::MemoryRead => &mut self.memory_read,
            BreakPointType::MemoryWrite => &mut self.memory_write,
            BreakPointType::MemoryAccess => unreachable!("fanned out by toggle/add"),
            BreakPointType::IoRead => &mut self.io_read,
            BreakPointType::IoWrite => &mut self.io_write,
            BreakPointType::IoAccess => unreachable!("fanned out by toggle/add"),
            BreakPointType::MachineStart => &mut self.machine_start,
            BreakPointType::MachineStop => &mut self.machine_stop,
        }
    }

    fn holder(&self, t: BreakPointType) -> &BreakPointHolder {
        match t {
            BreakPointType::CpuExecutionAddress => &self.execution,
            BreakPointType::CpuCycles => &self.cycles,
            BreakPointType::CpuInterrupt => &self.interrupt,
            BreakPointType::MemoryRead => &self.memory_read,
            BreakPointType::MemoryWrite => &self.memory_write,
            BreakPointType::MemoryAccess => unreachable!("fanned out by toggle/add"),
            BreakPointType::IoRead => &self.io_read,
            BreakPointType::IoWrite => &self.io_write,
            BreakPointType::IoAccess => unreachable!("fanned out by toggle/add"),
            BreakPointType::MachineStart => &self.machine_start,
            BreakPointType::MachineStop => &self.machine_stop,
        }
    }

    /// Allocates an id and routes `bp` to the holder(s) matching its type;
    /// `MemoryAccess`/`IoAccess` register a copy with both the read and
    /// write holder of their address space.
    pub fn add(
        &mut self,
        bp_type: BreakPointType,
        kind: BreakPointKind,
        enabled: bool,
        user_visible: bool,
        remove_on_trigger: bool,
        on_reached: Option<Box<dyn FnMut(u64) + Send>>,
    ) -> BreakPointId {
        let id = self.next_id;
        self.next_id += 1;
        self.insert_routed(id, bp_type, kind, enabled, user_visible, remove_on_trigger, on_reached);
        id
    }

    fn insert_routed(
        &mut self,
        id: BreakPointId,
        bp_type: BreakPointType,
        kind: BreakPointKind,
        enabled: bool,
        user_visible: bool,
        remove_on_trigger: bool,
        on_reached: Option<Box<dyn FnMut(u64) + Send>>,
    ) {
        if bp_type == BreakPointType::MemoryAccess {
            let kind_copy = kind.clone_shallow();
            self.memory_read.insert(BreakPoint {
                id,
                bp_type,
                kind,
                enabled,
                user_visible,
                remove_on_trigger,
                on_reached,
            });
            self.memory_write.insert(BreakPoint {
                id,
                bp_type,
                kind: kind_copy,
                enabled,
                user_visible,
                remove_on_trigger,
                on_reached: None,
            });
            return;
        }
        if bp_type == BreakPointType::IoAccess {
            let kind_copy = kind.clone_shallow();
            self.io_read.insert(BreakPoint {
                id,
                bp_type,
                kind,
                enabled,
                user_visible,
                remove_on_trigger,
                on_reached,
            });
            self.io_write.insert(BreakPoint {
                id,
                bp_type,
                kind: kind_copy,
                enabled,
                user_visible,
                remove_on_trigger,
                on_reached: None,
            });
            return;
        }
        self.holder_mut(bp_type).insert(BreakPoint {
            id,
            bp_type,
            kind,
            enabled,
            user_visible,
            remove_on_trigger,
            on_reached,
        });
    }

    /// Enables/disables a breakpoint across every holder it was routed to.
    pub fn toggle(&mut self, id: BreakPointId, on: bool) {
        for t in ALL_TYPES {
            if t == BreakPointType::MemoryAccess || t == BreakPointType::IoAccess {
                continue;
            }
            if let Some(bp) = self.holder_mut(t).get_mut(id) {
                bp.enabled = on;
            }
        }
    }

    pub fn remove(&mut self, id: BreakPointId) {
        for t in ALL_TYPES {
            if t == BreakPointType::MemoryAccess || t == BreakPointType::IoAccess {
                continue;
            }
            self.holder_mut(t).remove(id);
        }
    }

    /// Called once per instruction before `execute`. Loops
    /// because a fired execution breakpoint's callback may have changed IP
    /// (e.g. the debugger repositioned it) — the new location must also be
    /// checked before the CPU is allowed to fetch/execute.
    pub fn check_execution(&mut self, mut read_ip: impl FnMut() -> u64, cycles: u64, ctx: &dyn EvalContext) {
        loop {
            let ip_before = read_ip();
            let fired_exec = self.execution.has_any_enabled() && self.execution.check_and_fire(ip_before, ctx);
            let fired_cycles = self.cycles.has_any_enabled() && self.cycles.check_and_fire(cycles, ctx);
            if !fired_exec && !fired_cycles {
                return;
            }
            if read_ip() == ip_before {
                return;
            }
        }
    }

    pub fn check_interrupt(&mut self, vector: u8, ctx: &dyn EvalContext) {
        if self.interrupt.has_any_enabled() {
            self.interrupt.check_and_fire(vector as u64, ctx);
        }
    }

    pub fn monitor_read(&mut self, address: u64, ctx: &dyn EvalContext) {
        if self.memory_read.has_any_enabled() {
            self.memory_read.check_and_fire(address, ctx);
        }
    }

    pub fn monitor_write(&mut self, address: u64, ctx: &dyn EvalContext) {
        if self.memory_write.has_any_enabled() {
            self.memory_write.check_and_fire(address, ctx);
        }
    }

    pub fn monitor_access(&mut self, address: u64, ctx: &dyn EvalContext) {
        self.monitor_read(address, ctx);
        self.monitor_write(address, ctx);
    }

    pub fn monitor_io_read(&mut self, port: u16, ctx: &dyn EvalContext) {
        if self.io_read.has_any_enabled() {
            self.io_read.check_and_fire(port as u64, ctx);
        }
    }

    pub fn monitor_io_write(&mut self, port: u16, ctx: &dyn EvalContext) {
        if self.io_write.has_any_enabled() {
            self.io_write.check_and_fire(port as u64, ctx);
        }
    }

    pub fn fire_machine_start(&mut self, ctx: &dyn EvalContext) {
        self.machine_start.check_and_fire(0, ctx);
    }

    pub fn fire_machine_stop(&mut self, ctx: &dyn EvalContext) {
        self.machine_stop.check_and_fire(0, ctx);
    }

    /// Exports every user-visible, enabled-or-not breakpoint of `bp_type` as
    /// the external record format. Consecutive memory/IO
    /// breakpoints sitting at adjacent addresses with an identical
    /// condition and enabled flag are merged into a single range record.
    pub fn export(&self, bp_type: BreakPointType) -> Vec<BreakPointRecord> {
        let mut points: Vec<(u64, u64, bool, Option<String>)> = self
            .holder(bp_type)
            .iter()
            .filter(|b| b.user_visible)
            .filter_map(|b| match &b.kind {
                BreakPointKind::Address {
                    address,
                    condition_source,
                    ..
                } => Some((*address, *address, b.enabled, condition_source.clone())),
                BreakPointKind::Range { start, end } => Some((*start, *end, b.enabled, None)),
                // Unconditional breakpoints have no trigger address to
                // serialize against the §6 record format; debugger UIs
                // surface these separately (e.g. a "break on any write"
                // toggle), not as an address record.
                BreakPointKind::Unconditional => None,
            })
            .collect();
        points.sort_by_key(|(start, _, _, _)| *start);

        let mut records = Vec::new();
        for (start, end, enabled, condition) in points {
            if let Some(last) = records.last_mut() {
                let last: &mut BreakPointRecord = last;
                if last.is_enabled == enabled && last.condition == condition && last.end_trigger + 1 == start as i64 {
                    last.end_trigger = end as i64;
                    continue;
                }
            }
            records.push(BreakPointRecord {
                trigger: start as i64,
                end_trigger: end as i64,
                bp_type,
                is_enabled: enabled,
                condition,
            });
        }
        records
    }

    /// Reloads breakpoints from the external record format, replacing
    /// whatever user-visible breakpoints of that type previously existed.
    pub fn import(
        &mut self,
        records: &[BreakPointRecord],
    ) -> Result<Vec<BreakPointId>, crate::expr::BreakpointExprError> {
        let mut ids = Vec::with_capacity(records.len());
        for rec in records {
            let condition = match &rec.condition {
                Some(src) => Some(crate::expr::CompiledExpr::parse(src)?),
                None => None,
            };
            let kind = if rec.trigger == rec.end_trigger {
                BreakPointKind::Address {
                    address: rec.trigger as u64,
                    condition,
                    condition_source: rec.condition.clone(),
                }
            } else {
                BreakPointKind::Range {
                    start: rec.trigger as u64,
                    end: rec.end_trigger as u64,
                }
            };
            let id = self.add(rec.bp_type, kind, rec.is_enabled, true, false, None);
            ids.push(id);
        }
        Ok(ids)
    }
}

const ALL_TYPES: [BreakPointType; 11] = [
    BreakPointType::CpuExecutionAddress,
    BreakPointType::CpuCycles,
    BreakPointType::CpuInterrupt,
    BreakPointType::MemoryRead,
    BreakPointType::MemoryWrite,
    BreakPointType::MemoryAccess,
    BreakPointType::IoRead,
    BreakPointType::IoWrite,
    BreakPointType::IoAccess,
    BreakPointType::MachineStart,
    BreakPointType::MachineStop,
];

impl BreakPointKind {
    fn clone_shallow(&self) -> Self {
        match self {
            BreakPointKind::Address {
                address,
                condition,
                condition_source,
            } => BreakPointKind::Address {
                address: *address,
                condition: condition.clone(),
                condition_source: condition_source.clone(),
            },
            BreakPointKind::Unconditional => BreakPointKind::Unconditional,
            BreakPointKind::Range { start, end } => BreakPointKind::Range {
                start: *start,
                end: *end,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn execution_breakpoint_fires_exactly_at_its_address() {
        let mut m = BreakpointsManager::new();
        let id = m.add(
            BreakPointType::CpuExecutionAddress,
            BreakPointKind::Address {
                address: 0x1000,
                condition: None,
                condition_source: None,
            },
            true,
            true,
            false,
            None,
        );
        assert!(id > 0);
        let mut ip = 0x0500u64;
        m.check_execution(|| ip, 0, &NullCtx);
        ip = 0x1000;
        m.check_execution(|| ip, 0, &NullCtx);
    }

    #[test]
    fn memory_access_registers_with_both_read_and_write_holders() {
        let mut m = BreakpointsManager::new();
        m.add(
            BreakPointType::MemoryAccess,
            BreakPointKind::Address {
                address: 0x2000,
                condition: None,
                condition_source: None,
            },
            true,
            true,
            false,
            None,
        );
        assert!(m.memory_read.has_any_enabled());
        assert!(m.memory_write.has_any_enabled());
    }

    #[test]
    fn export_merges_consecutive_identical_range_breakpoints() {
        let mut m = BreakpointsManager::new();
        for addr in [0x100u64, 0x101, 0x102] {
            m.add(
                BreakPointType::MemoryWrite,
                BreakPointKind::Address {
                    address: addr,
                    condition: None,
                    condition_source: None,
                },
                true,
                true,
                false,
                None,
            );
        }
        let records = m.export(BreakPointType::MemoryWrite);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].trigger, 0x100);
        assert_eq!(records[0].end_trigger, 0x102);
    }

    #[test]
    fn import_round_trips_condition_source() {
        let mut m = BreakpointsManager::new();
        let records = vec![BreakPointRecord {
            trigger: 0x10,
            end_trigger: 0x10,
            bp_type: BreakPointType::CpuExecutionAddress,
            is_enabled: true,
            condition: Some("ax == 0x1".to_string()),
        }];
        let ids = m.import(&records).unwrap();
        assert_eq!(ids.len(), 1);
        let exported = m.export(BreakPointType::CpuExecutionAddress);
        assert_eq!(exported, records);
    }
}
