//! The SSA graph.
//!
//! Nodes live in a dense per-graph arena and reference each other by
//! `Node` id, so the cycles created by phis and loops are unproblematic.
//! The graph maintains reverse edges (use lists) and a member list per
//! block; both are kept current by every mutation, so passes can walk
//! users without a separate edge-activation step.

use anvil_entity::packed_option::PackedOption;
use anvil_entity::{entity_impl, Keys, PrimaryMap, SecondaryMap};

use crate::ir::{Attr, Entity, Mode, Op};
use crate::regs::{RegReq, Register};

/// A reference to a node in the graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node(u32);
entity_impl!(Node, "n");

/// Output numbers of the tuple-mode generic nodes.
pub mod pn {
    /// `Load`/`Store`/`Div`/`Mod`/`Call`: the memory result.
    pub const MEM: i64 = 0;
    /// `Load`/`Div`/`Mod`: the value result.
    pub const RES: i64 = 1;
    /// `DivMod`: the quotient.
    pub const DIVMOD_DIV: i64 = 1;
    /// `DivMod`: the remainder.
    pub const DIVMOD_MOD: i64 = 2;
    /// `Cond`: exit taken when the selector is false.
    pub const COND_FALSE: i64 = 0;
    /// `Cond`: exit taken when the selector is true.
    pub const COND_TRUE: i64 = 1;
    /// `Start`: the initial memory state.
    pub const START_MEM: i64 = 0;
    /// `Start`: first parameter; parameter `i` is `START_ARGS + i`.
    pub const START_ARGS: i64 = 1;
    /// `Call`: first result; result `i` is `CALL_RES + i`.
    pub const CALL_RES: i64 = 1;
    /// `Start`: the incoming stack pointer (a fixed ignore register).
    pub const START_SP: i64 = -2;
    /// `Start`: the incoming frame pointer (a fixed ignore register, only
    /// present when the frame pointer is kept).
    pub const START_FP: i64 = -3;
}

/// How a use edge reaches its target: as a value operand or as an explicit
/// ordering dependency.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UseKind {
    /// A data predecessor.
    Data,
    /// An ordering-only dependency edge.
    Dep,
}

/// One use of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Use {
    /// The using node.
    pub user: Node,
    /// Input position within the user.
    pub pos: u32,
    /// Data or dependency edge.
    pub kind: UseKind,
}

/// The per-node data.
#[derive(Clone)]
pub struct NodeData {
    op: Op,
    mode: Mode,
    block: PackedOption<Node>,
    ins: Vec<Node>,
    deps: Vec<Node>,
    attr: Attr,
    in_reqs: Vec<RegReq>,
    out_reqs: Vec<RegReq>,
}

/// An SSA graph for one function.
pub struct Graph {
    /// The function entity this graph belongs to.
    pub entity: Entity,
    nodes: PrimaryMap<Node, NodeData>,
    uses: SecondaryMap<Node, Vec<Use>>,
    members: SecondaryMap<Node, Vec<Node>>,
    regs: SecondaryMap<Node, Option<&'static Register>>,

    /// The entry block.
    pub start_block: Node,
    /// The exit block; `Return`s are its control predecessors.
    pub end_block: Node,
    /// The `Start` node producing the initial memory state and parameters.
    pub start: Node,
    /// The `End` node; its inputs are kept alive.
    pub end: Node,
    /// The unique `NoMem` node.
    pub no_mem: Node,
}

impl Graph {
    /// Create a graph for `entity` with empty start and end blocks.
    pub fn new(entity: Entity) -> Graph {
        let mut g = Graph {
            entity,
            nodes: PrimaryMap::new(),
            uses: SecondaryMap::new(),
            members: SecondaryMap::new(),
            regs: SecondaryMap::new(),
            start_block: Node(0),
            end_block: Node(0),
            start: Node(0),
            end: Node(0),
            no_mem: Node(0),
        };
        g.start_block = g.add_block(&[]);
        g.end_block = g.add_block(&[]);
        g.start = g.add_node(g.start_block, Op::Start, Mode::T, &[]);
        g.end = g.add_node(g.end_block, Op::End, Mode::Any, &[]);
        g.no_mem = g.add_node(g.start_block, Op::NoMem, Mode::M, &[]);
        g
    }

    /// Number of node ids ever created (including dead ones).
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate over all node ids, dead ones included.
    pub fn nodes(&self) -> Keys<Node> {
        self.nodes.keys()
    }

    /// Iterate over all block nodes in creation order.
    pub fn blocks(&self) -> Vec<Node> {
        self.nodes
            .keys()
            .filter(|&n| self.nodes[n].op == Op::Block)
            .collect()
    }

    /// Create a new basic block with the given control predecessors.
    pub fn add_block(&mut self, preds: &[Node]) -> Node {
        let block = self.nodes.push(NodeData {
            op: Op::Block,
            mode: Mode::X,
            block: None.into(),
            ins: preds.to_vec(),
            deps: Vec::new(),
            attr: Attr::None,
            in_reqs: Vec::new(),
            out_reqs: Vec::new(),
        });
        for (i, &p) in preds.iter().enumerate() {
            self.uses[p].push(Use {
                user: block,
                pos: i as u32,
                kind: UseKind::Data,
            });
        }
        block
    }

    /// Create a node without an attribute payload.
    pub fn add_node(&mut self, block: Node, op: Op, mode: Mode, ins: &[Node]) -> Node {
        self.add_node_attr(block, op, mode, ins, Attr::None)
    }

    /// Create a node with an attribute payload.
    pub fn add_node_attr(
        &mut self,
        block: Node,
        op: Op,
        mode: Mode,
        ins: &[Node],
        attr: Attr,
    ) -> Node {
        debug_assert_eq!(self.nodes[block].op, Op::Block);
        let node = self.nodes.push(NodeData {
            op,
            mode,
            block: block.into(),
            ins: ins.to_vec(),
            deps: Vec::new(),
            attr,
            in_reqs: Vec::new(),
            out_reqs: Vec::new(),
        });
        for (i, &p) in ins.iter().enumerate() {
            self.uses[p].push(Use {
                user: node,
                pos: i as u32,
                kind: UseKind::Data,
            });
        }
        self.members[block].push(node);
        node
    }

    /// Create a projection selecting output `pn` of `pred`.
    pub fn proj(&mut self, pred: Node, mode: Mode, pn: i64) -> Node {
        debug_assert_eq!(self.mode(pred), Mode::T);
        let block = self.block_of(pred);
        self.add_node_attr(block, Op::Proj, mode, &[pred], Attr::Proj(pn))
    }

    /// Find the projection of `pred` with number `pn`, if one exists.
    pub fn find_proj(&self, pred: Node, pn: i64) -> Option<Node> {
        self.uses[pred]
            .iter()
            .map(|u| u.user)
            .find(|&u| self.nodes[u].op == Op::Proj && self.nodes[u].attr.proj() == pn)
    }

    /// All projections of `pred`.
    pub fn projs(&self, pred: Node) -> Vec<Node> {
        self.uses[pred]
            .iter()
            .map(|u| u.user)
            .filter(|&u| self.nodes[u].op == Op::Proj)
            .collect()
    }

    /// The operation of a node.
    pub fn op(&self, node: Node) -> Op {
        self.nodes[node].op
    }

    /// The mode of a node.
    pub fn mode(&self, node: Node) -> Mode {
        self.nodes[node].mode
    }

    /// Change the mode of a node (used when a node is retrofitted into a
    /// tuple producer).
    pub fn set_mode(&mut self, node: Node, mode: Mode) {
        self.nodes[node].mode = mode;
    }

    /// The block containing `node`. For a block, the block itself.
    pub fn block_of(&self, node: Node) -> Node {
        if self.nodes[node].op == Op::Block {
            node
        } else {
            self.nodes[node].block.expect("node without block")
        }
    }

    /// Move `node` into `block`.
    pub fn set_block(&mut self, node: Node, block: Node) {
        debug_assert_ne!(self.nodes[node].op, Op::Block);
        let old = self.nodes[node].block.expect("node without block");
        if old == block {
            return;
        }
        self.members[old].retain(|&m| m != node);
        self.nodes[node].block = block.into();
        self.members[block].push(node);
    }

    /// The attribute of a node.
    pub fn attr(&self, node: Node) -> &Attr {
        &self.nodes[node].attr
    }

    /// The attribute of a node, mutable edition.
    pub fn attr_mut(&mut self, node: Node) -> &mut Attr {
        &mut self.nodes[node].attr
    }

    /// The data predecessors of a node.
    pub fn ins(&self, node: Node) -> &[Node] {
        &self.nodes[node].ins
    }

    /// The `i`-th data predecessor.
    pub fn in_at(&self, node: Node, i: usize) -> Node {
        self.nodes[node].ins[i]
    }

    /// Number of data predecessors.
    pub fn n_ins(&self, node: Node) -> usize {
        self.nodes[node].ins.len()
    }

    /// Replace the `i`-th data predecessor.
    pub fn set_in(&mut self, node: Node, i: usize, new: Node) {
        let old = self.nodes[node].ins[i];
        if old == new {
            return;
        }
        self.remove_use(old, node, i as u32, UseKind::Data);
        self.nodes[node].ins[i] = new;
        self.uses[new].push(Use {
            user: node,
            pos: i as u32,
            kind: UseKind::Data,
        });
    }

    /// Append a data predecessor (used to extend keeps).
    pub fn add_in(&mut self, node: Node, new: Node) {
        let pos = self.nodes[node].ins.len() as u32;
        self.nodes[node].ins.push(new);
        self.uses[new].push(Use {
            user: node,
            pos,
            kind: UseKind::Data,
        });
    }

    /// The dependency predecessors of a node.
    pub fn deps(&self, node: Node) -> &[Node] {
        &self.nodes[node].deps
    }

    /// Add an ordering-only dependency edge.
    pub fn add_dep(&mut self, node: Node, dep: Node) {
        if self.nodes[node].deps.contains(&dep) {
            return;
        }
        let pos = self.nodes[node].deps.len() as u32;
        self.nodes[node].deps.push(dep);
        self.uses[dep].push(Use {
            user: node,
            pos,
            kind: UseKind::Dep,
        });
    }

    /// Data and dependency predecessors, chained.
    pub fn ins_and_deps(&self, node: Node) -> impl Iterator<Item = Node> + '_ {
        self.nodes[node]
            .ins
            .iter()
            .chain(self.nodes[node].deps.iter())
            .copied()
    }

    /// All uses of a node.
    pub fn uses(&self, node: Node) -> &[Use] {
        &self.uses[node]
    }

    /// Number of uses (data and dependency).
    pub fn n_uses(&self, node: Node) -> usize {
        self.uses[node].len()
    }

    /// The nodes placed in `block`, in creation order.
    pub fn block_members(&self, block: Node) -> &[Node] {
        &self.members[block]
    }

    /// The control-flow predecessor blocks of a block.
    pub fn cfg_pred_block(&self, block: Node, i: usize) -> Node {
        self.block_of(self.nodes[block].ins[i])
    }

    /// Keep `node` alive by making it an input of the `End` node.
    pub fn keep_alive(&mut self, node: Node) {
        let end = self.end;
        if !self.nodes[end].ins.contains(&node) {
            self.add_in(end, node);
        }
    }

    /// Rewire every use of `old` to `new` and kill `old`.
    pub fn exchange(&mut self, old: Node, new: Node) {
        debug_assert_ne!(old, new);
        let uses = std::mem::take(&mut self.uses[old]);
        for u in uses {
            match u.kind {
                UseKind::Data => self.nodes[u.user].ins[u.pos as usize] = new,
                UseKind::Dep => self.nodes[u.user].deps[u.pos as usize] = new,
            }
            self.uses[new].push(u);
        }
        self.kill(old);
    }

    /// Remove a node from the graph, leaving a tombstone. The node must be
    /// unused.
    pub fn kill(&mut self, node: Node) {
        debug_assert!(
            self.uses[node].is_empty(),
            "killing node {:?} which still has uses",
            node
        );
        let ins = std::mem::take(&mut self.nodes[node].ins);
        for (i, p) in ins.into_iter().enumerate() {
            self.remove_use(p, node, i as u32, UseKind::Data);
        }
        let deps = std::mem::take(&mut self.nodes[node].deps);
        for (i, p) in deps.into_iter().enumerate() {
            self.remove_use(p, node, i as u32, UseKind::Dep);
        }
        if let Some(block) = self.nodes[node].block.expand() {
            self.members[block].retain(|&m| m != node);
        }
        self.nodes[node].op = Op::Deleted;
        self.nodes[node].attr = Attr::None;
        self.nodes[node].block = None.into();
    }

    fn remove_use(&mut self, of: Node, user: Node, pos: u32, kind: UseKind) {
        let uses = &mut self.uses[of];
        let idx = uses
            .iter()
            .position(|u| u.user == user && u.pos == pos && u.kind == kind)
            .expect("use edge missing");
        uses.swap_remove(idx);
    }

    /// The register assigned to `node` by the allocator, if any.
    pub fn reg(&self, node: Node) -> Option<&'static Register> {
        self.regs[node]
    }

    /// Record the allocator's register assignment for `node`.
    pub fn set_reg(&mut self, node: Node, reg: &'static Register) {
        self.regs[node] = Some(reg);
    }

    /// The register assigned to the `i`-th input of `node`.
    pub fn in_reg(&self, node: Node, i: usize) -> Option<&'static Register> {
        self.regs[self.nodes[node].ins[i]]
    }

    /// Set the register requirements of a node's inputs and outputs.
    pub fn set_reqs(&mut self, node: Node, ins: Vec<RegReq>, outs: Vec<RegReq>) {
        let data = &mut self.nodes[node];
        data.in_reqs = ins;
        data.out_reqs = outs;
    }

    /// The input register requirements.
    pub fn in_reqs(&self, node: Node) -> &[RegReq] {
        &self.nodes[node].in_reqs
    }

    /// The output register requirements.
    pub fn out_reqs(&self, node: Node) -> &[RegReq] {
        &self.nodes[node].out_reqs
    }

    /// Check the structural invariants: phi arities match block predecessor
    /// counts, projections select from tuple nodes, and tuple nodes are only
    /// consumed through projections.
    pub fn verify(&self) -> crate::CodegenResult<()> {
        for node in self.nodes.keys() {
            let data = &self.nodes[node];
            match data.op {
                Op::Deleted => continue,
                Op::Phi => {
                    let block = self.block_of(node);
                    let n_preds = self.nodes[block].ins.len();
                    if data.ins.len() != n_preds {
                        return Err(crate::CodegenError::Constraint(format!(
                            "phi {:?} has arity {} but its block has {} predecessors",
                            node,
                            data.ins.len(),
                            n_preds
                        )));
                    }
                }
                Op::Proj => {
                    let pred = data.ins[0];
                    if self.mode(pred) != Mode::T {
                        return Err(crate::CodegenError::Constraint(format!(
                            "proj {:?} of non-tuple node {:?}",
                            node, pred
                        )));
                    }
                }
                _ => {}
            }
            if data.mode == Mode::T && data.op != Op::Start {
                for u in &self.uses[node] {
                    if u.kind == UseKind::Data
                        && self.nodes[u.user].op != Op::Proj
                        && self.nodes[u.user].op != Op::Keep
                        && self.nodes[u.user].op != Op::End
                    {
                        return Err(crate::CodegenError::Constraint(format!(
                            "tuple node {:?} used directly by {:?}",
                            node, u.user
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::TarVal;
    use anvil_entity::EntityRef;

    fn fresh() -> Graph {
        Graph::new(Entity::new(0))
    }

    #[test]
    fn build_and_use_lists() {
        let mut g = fresh();
        let b = g.start_block;
        let c1 = g.add_node_attr(
            b,
            Op::Const,
            Mode::I32,
            &[],
            Attr::Const(TarVal::new(Mode::I32, 1)),
        );
        let c2 = g.add_node_attr(
            b,
            Op::Const,
            Mode::I32,
            &[],
            Attr::Const(TarVal::new(Mode::I32, 2)),
        );
        let add = g.add_node(b, Op::Add, Mode::I32, &[c1, c2]);
        assert_eq!(g.ins(add), &[c1, c2]);
        assert_eq!(g.n_uses(c1), 1);
        assert_eq!(g.uses(c1)[0].user, add);

        g.set_in(add, 0, c2);
        assert_eq!(g.n_uses(c1), 0);
        assert_eq!(g.n_uses(c2), 2);
        assert!(g.block_members(b).contains(&add));
    }

    #[test]
    fn exchange_rewires_users() {
        let mut g = fresh();
        let b = g.start_block;
        let c1 = g.add_node_attr(
            b,
            Op::Const,
            Mode::I32,
            &[],
            Attr::Const(TarVal::new(Mode::I32, 1)),
        );
        let c2 = g.add_node_attr(
            b,
            Op::Const,
            Mode::I32,
            &[],
            Attr::Const(TarVal::new(Mode::I32, 1)),
        );
        let neg = g.add_node(b, Op::Minus, Mode::I32, &[c1]);
        g.exchange(c1, c2);
        assert_eq!(g.ins(neg), &[c2]);
        assert_eq!(g.op(c1), Op::Deleted);
    }

    #[test]
    fn phi_arity_verified() {
        let mut g = fresh();
        let jmp = g.add_node(g.start_block, Op::Jmp, Mode::X, &[]);
        let b = g.add_block(&[jmp]);
        let c = g.add_node_attr(
            g.start_block,
            Op::Const,
            Mode::I32,
            &[],
            Attr::Const(TarVal::new(Mode::I32, 1)),
        );
        let _phi = g.add_node(b, Op::Phi, Mode::I32, &[c, c]);
        assert!(g.verify().is_err());
    }
}
