//! The CFG arena. Nodes are owned by a flat `Vec` and referenced by
//! index everywhere else — no node ever holds an owning reference to
//! another, which is what makes the inherently cyclic graph (loops,
//! recursive calls) representable without `Rc`/`RefCell` bookkeeping.

use cfgcpu_isa::{CfgInstruction, SuccessorType};
use cfgcpu_types::SegmentedAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

/// A node used when two incompatible instructions have been observed at the
/// same target address over time. Created
/// lazily by [`CfgArena::record_successor`] the moment a predecessor's
/// outgoing edge would otherwise need to point at two different places.
#[derive(Debug, Clone)]
pub struct DiscriminatedNode {
    pub candidates: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub enum CfgNodeKind {
    Instruction(CfgInstruction),
    Discriminated(DiscriminatedNode),
}

#[derive(Debug, Clone)]
pub struct CfgNode {
    pub kind: CfgNodeKind,
    /// `(type, target address, successor node)`. A flat list rather than two
    /// separate maps: `successors_per_type` and `successors_per_address` are
    /// just different projections of the same edge set, and keeping one
    /// source of truth avoids the two ever drifting apart.
    edges: Vec<(SuccessorType, SegmentedAddress, NodeId)>,
}

impl CfgNode {
    pub fn successors_per_type(&self, ty: SuccessorType) -> impl Iterator<Item = NodeId> + '_ {
        self.edges.iter().filter(move |(t, _, _)| *t == ty).map(|(_, _, n)| *n)
    }

    pub fn successor_at(&self, addr: SegmentedAddress) -> Option<NodeId> {
        self.edges.iter().find(|(_, a, _)| *a == addr).map(|(_, _, n)| *n)
    }

    fn set_edge(&mut self, ty: SuccessorType, addr: SegmentedAddress, node: NodeId) {
        if let Some(e) = self.edges.iter_mut().find(|(_, a, _)| *a == addr) {
            *e = (ty, addr, node);
        } else {
            self.edges.push((ty, addr, node));
        }
    }
}

#[derive(Debug, Default)]
pub struct CfgArena {
    nodes: Vec<CfgNode>,
}

impl CfgArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_instruction(&mut self, instr: CfgInstruction) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(CfgNode {
            kind: CfgNodeKind::Instruction(instr),
            edges: Vec::new(),
        });
        id
    }

    fn alloc_discriminated(&mut self, candidates: Vec<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(CfgNode {
            kind: CfgNodeKind::Discriminated(DiscriminatedNode { candidates }),
            edges: Vec::new(),
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &CfgNode {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut CfgNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn instruction(&self, id: NodeId) -> Option<&CfgInstruction> {
        match &self.node(id).kind {
            CfgNodeKind::Instruction(i) => Some(i),
            CfgNodeKind::Discriminated(_) => None,
        }
    }

    /// Records that executing `from` can transfer control to `to` (the node
    /// at `target_addr`) via a `ty` edge. If an edge to `target_addr`
    /// already points somewhere else, the edge is upgraded in place to a
    /// `DiscriminatedNode` holding both destinations rather than silently
    /// overwriting one with the other.
    pub fn record_successor(&mut self, from: NodeId, ty: SuccessorType, target_addr: SegmentedAddress, to: NodeId) {
        let existing = self.node(from).successor_at(target_addr);
        let new_target = match existing {
            None => to,
            Some(existing_id) if existing_id == to => to,
            Some(existing_id) => match &self.node(existing_id).kind {
                CfgNodeKind::Discriminated(d) if d.candidates.contains(&to) => existing_id,
                CfgNodeKind::Discriminated(d) => {
                    let mut candidates = d.candidates.clone();
                    candidates.push(to);
                    if let CfgNodeKind::Discriminated(d) = &mut self.node_mut(existing_id).kind {
                        d.candidates = candidates;
                    }
                    existing_id
                }
                CfgNodeKind::Instruction(_) => self.alloc_discriminated(vec![existing_id, to]),
            },
        };
        self.node_mut(from).set_edge(ty, target_addr, new_target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfgcpu_isa::{parse, InstructionKind};

    fn nop_at(addr: SegmentedAddress) -> CfgInstruction {
        let bytes = [0x90u8];
        parse(&bytes, addr, false, false)
    }

    #[test]
    fn recording_the_same_target_twice_does_not_create_a_discriminated_node() {
        let mut arena = CfgArena::new();
        let a = arena.alloc_instruction(nop_at(SegmentedAddress::new(0, 0)));
        let b = arena.alloc_instruction(nop_at(SegmentedAddress::new(0, 1)));
        let target = SegmentedAddress::new(0, 1);
        arena.record_successor(a, SuccessorType::Normal, target, b);
        arena.record_successor(a, SuccessorType::Normal, target, b);
        assert_eq!(arena.node(a).successor_at(target), Some(b));
        assert!(matches!(arena.node(b).kind, CfgNodeKind::Instruction(_)));
    }

    #[test]
    fn a_second_distinct_destination_creates_a_discriminated_node() {
        let mut arena = CfgArena::new();
        let a = arena.alloc_instruction(nop_at(SegmentedAddress::new(0, 0)));
        let b = arena.alloc_instruction(nop_at(SegmentedAddress::new(0, 1)));
        let c = arena.alloc_instruction(nop_at(SegmentedAddress::new(0, 1)));
        let target = SegmentedAddress::new(0, 1);
        arena.record_successor(a, SuccessorType::Normal, target, b);
        arena.record_successor(a, SuccessorType::Normal, target, c);
        let resolved = arena.node(a).successor_at(target).unwrap();
        match &arena.node(resolved).kind {
            CfgNodeKind::Discriminated(d) => {
                assert!(d.candidates.contains(&b));
                assert!(d.candidates.contains(&c));
            }
            CfgNodeKind::Instruction(_) => panic!("expected a discriminated node"),
        }
    }

    #[test]
    fn instruction_mismatches_invalid_opcode_family() {
        assert!(matches!(
            parse(&[], SegmentedAddress::new(0, 0), false, false).kind,
            InstructionKind::InvalidOpcode { .. }
        ));
    }
}
