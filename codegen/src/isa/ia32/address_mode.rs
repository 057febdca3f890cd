//! Address mode matching.
//!
//! An x86 memory operand can compute `symbol ± offset + base + index·2^scale`
//! on the side. The matcher folds a pointer-shaped subtree of the generic
//! graph into such a descriptor; the transformer then builds the rest of
//! the tree into the instruction itself.

use rustc_hash::FxHashSet;

use crate::ir::{Attr, Entity, Graph, Mode, Node, Op};

/// The matched description of a memory operand.
#[derive(Clone, Debug, Default)]
pub struct AddressMode {
    /// Base register value.
    pub base: Option<Node>,
    /// Index register value, scaled by `2^scale`.
    pub index: Option<Node>,
    /// Scale exponent, 0..3.
    pub scale: u8,
    /// Constant displacement.
    pub offset: i32,
    /// Symbolic displacement.
    pub symbol: Option<Entity>,
    /// The symbolic displacement is subtracted.
    pub symbol_sign: bool,
    /// The address is relative to the stack frame.
    pub use_frame: bool,
    /// The frame slot of a frame-relative address.
    pub frame_entity: Option<Entity>,
}

impl AddressMode {
    /// A degenerate mode: just the value in the base register.
    pub fn base_only(node: Node) -> AddressMode {
        AddressMode {
            base: Some(node),
            ..Default::default()
        }
    }

    /// Does the descriptor describe anything but a plain base register?
    pub fn is_trivial(&self) -> bool {
        self.index.is_none() && self.offset == 0 && self.symbol.is_none() && !self.use_frame
    }
}

/// Fold the pointer expression `ptr` into an address mode.
///
/// Without `force`, a descriptor consisting only of constants (no base, no
/// index) is declined and the plain base form is returned instead; with
/// `force` the degenerate descriptor is allowed.
pub fn create_address_mode(graph: &Graph, ptr: Node, force: bool) -> AddressMode {
    let mut am = AddressMode::default();
    if eat(graph, &mut am, ptr, 0) {
        if !force && am.base.is_none() && am.index.is_none() && !am.use_frame {
            return AddressMode::base_only(ptr);
        }
        am
    } else {
        AddressMode::base_only(ptr)
    }
}

/// Greedily absorb `node` into the descriptor. Returns false when the
/// subtree can not be represented; the descriptor may be partially filled
/// then and must be discarded.
fn eat(graph: &Graph, am: &mut AddressMode, node: Node, depth: u32) -> bool {
    // Keep the match bounded; address trees are shallow.
    if depth > 4 {
        return put_reg(am, node);
    }
    match graph.op(node) {
        Op::Const => {
            let tv = graph.attr(node).constant();
            match i32::try_from(tv.as_i64()) {
                Ok(v) => match am.offset.checked_add(v) {
                    Some(sum) => {
                        am.offset = sum;
                        true
                    }
                    None => false,
                },
                Err(_) => false,
            }
        }
        Op::SymConst if am.symbol.is_none() && !am.use_frame => {
            match graph.attr(node) {
                Attr::SymConst(ent) => {
                    am.symbol = Some(*ent);
                    am.symbol_sign = false;
                    true
                }
                _ => false,
            }
        }
        Op::FrameAddr if !am.use_frame && am.symbol.is_none() => match graph.attr(node) {
            Attr::FrameAddr(ent) => {
                am.use_frame = true;
                am.frame_entity = Some(*ent);
                true
            }
            _ => false,
        },
        Op::Add => {
            let l = graph.in_at(node, 0);
            let r = graph.in_at(node, 1);
            eat(graph, am, l, depth + 1) && eat(graph, am, r, depth + 1)
        }
        Op::Shl if am.index.is_none() => {
            let count = graph.in_at(node, 1);
            if graph.op(count) == Op::Const {
                let k = graph.attr(count).constant().as_i64();
                if (0..=3).contains(&k) {
                    am.index = Some(graph.in_at(node, 0));
                    am.scale = k as u8;
                    return true;
                }
            }
            put_reg(am, node)
        }
        _ => put_reg(am, node),
    }
}

fn put_reg(am: &mut AddressMode, node: Node) -> bool {
    if am.base.is_none() {
        am.base = Some(node);
        true
    } else if am.index.is_none() && am.scale == 0 {
        am.index = Some(node);
        true
    } else {
        false
    }
}

/// Is `value` (an operand of a node in `block`) a load result that can be
/// folded into the consumer as a source memory operand?
///
/// `other` and `other2` are the consumer's remaining operands; folding is
/// refused when one of them reaches the load, which would cycle through
/// the memory edge.
pub fn use_source_address_mode(
    graph: &Graph,
    block: Node,
    value: Node,
    other: Option<Node>,
    other2: Option<Node>,
    double_use: bool,
) -> bool {
    let load = match load_of(graph, value) {
        Some(l) => l,
        None => return false,
    };
    // The load must live where the consumer lives; hoisting it across the
    // block boundary would change trap behaviour.
    if graph.block_of(load) != block {
        return false;
    }
    // Only fold single-use loads. With `double_use` a second user is
    // tolerated to support read-modify-write destination forms.
    let res_uses = graph.n_uses(value);
    let allowed = if double_use { 2 } else { 1 };
    if res_uses > allowed {
        return false;
    }
    let mode = graph.mode(value);
    if !mode.is_data() {
        return false;
    }
    if let Some(o) = other {
        if prevents_am(graph, load, o) {
            return false;
        }
    }
    if let Some(o) = other2 {
        if prevents_am(graph, load, o) {
            return false;
        }
    }
    true
}

/// The load behind a `Proj(res)`.
pub fn load_of(graph: &Graph, value: Node) -> Option<Node> {
    if graph.op(value) != Op::Proj {
        return None;
    }
    let pred = graph.in_at(value, 0);
    if graph.op(pred) == Op::Load && graph.attr(value).proj() == crate::ir::pn::RES {
        Some(pred)
    } else {
        None
    }
}

/// Does `from` transitively depend on `load` (through value edges)? If so,
/// fusing the load into a consumer of both would create a cycle.
fn prevents_am(graph: &Graph, load: Node, from: Node) -> bool {
    if graph.block_of(from) != graph.block_of(load) {
        return false;
    }
    let mut visited: FxHashSet<Node> = FxHashSet::default();
    let mut stack = vec![from];
    while let Some(n) = stack.pop() {
        if n == load {
            return true;
        }
        if !visited.insert(n) {
            continue;
        }
        if graph.op(n) == Op::Block {
            continue;
        }
        if graph.block_of(n) != graph.block_of(load) {
            continue;
        }
        for i in graph.ins_and_deps(n) {
            stack.push(i);
        }
    }
    false
}

/// Reconstruct the pointer value of a descriptor, for checking: the sum of
/// all matched parts as written.
#[cfg(test)]
pub fn describe(am: &AddressMode) -> String {
    format!(
        "sym={:?}{} off={} base={:?} index={:?} scale={} frame={}",
        am.symbol,
        if am.symbol_sign { "-" } else { "" },
        am.offset,
        am.base,
        am.index,
        am.scale,
        am.use_frame
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::TarVal;
    use anvil_entity::EntityRef;

    fn graph() -> Graph {
        Graph::new(Entity::new(0))
    }

    fn cnst(g: &mut Graph, v: i64) -> Node {
        let b = g.start_block;
        g.add_node_attr(b, Op::Const, Mode::I32, &[], Attr::Const(TarVal::new(Mode::I32, v)))
    }

    fn param(g: &mut Graph, i: i64) -> Node {
        let start = g.start;
        g.proj(start, Mode::P32, crate::ir::pn::START_ARGS + i)
    }

    #[test]
    fn base_index_scale_disp() {
        let mut g = graph();
        let b = g.start_block;
        let base = param(&mut g, 0);
        let idx = param(&mut g, 1);
        let four = cnst(&mut g, 2);
        let scaled = g.add_node(b, Op::Shl, Mode::P32, &[idx, four]);
        let disp = cnst(&mut g, 12);
        let sum1 = g.add_node(b, Op::Add, Mode::P32, &[base, scaled]);
        let ptr = g.add_node(b, Op::Add, Mode::P32, &[sum1, disp]);

        let am = create_address_mode(&g, ptr, false);
        assert_eq!(am.base, Some(base));
        assert_eq!(am.index, Some(idx));
        assert_eq!(am.scale, 2);
        assert_eq!(am.offset, 12);
        assert!(am.symbol.is_none());
    }

    #[test]
    fn const_only_needs_force() {
        let mut g = graph();
        let ptr = cnst(&mut g, 0x1000);
        let am = create_address_mode(&g, ptr, false);
        // Declined: the constant stays a plain base value.
        assert_eq!(am.base, Some(ptr));
        assert_eq!(am.offset, 0);

        let am = create_address_mode(&g, ptr, true);
        assert_eq!(am.base, None);
        assert_eq!(am.offset, 0x1000);
    }

    #[test]
    fn two_plain_operands_use_base_and_index() {
        let mut g = graph();
        let b = g.start_block;
        let x = param(&mut g, 0);
        let y = param(&mut g, 1);
        let ptr = g.add_node(b, Op::Add, Mode::P32, &[x, y]);
        let am = create_address_mode(&g, ptr, false);
        assert_eq!(am.base, Some(x));
        assert_eq!(am.index, Some(y));
        assert_eq!(am.scale, 0);
    }

    #[test]
    fn am_refused_when_other_operand_reaches_load() {
        let mut g = graph();
        let b = g.start_block;
        let p = param(&mut g, 0);
        let load = g.add_node_attr(
            b,
            Op::Load,
            Mode::T,
            &[g.no_mem, p],
            Attr::MemAccess { mode: Mode::I32 },
        );
        let value = g.proj(load, Mode::I32, crate::ir::pn::RES);
        // other = value + 1 depends on the load.
        let one = cnst(&mut g, 1);
        let other = g.add_node(b, Op::Add, Mode::I32, &[value, one]);

        assert!(!use_source_address_mode(&g, b, value, Some(other), None, true));
        // With an independent other operand the fold is fine.
        let indep = cnst(&mut g, 7);
        assert!(use_source_address_mode(&g, b, value, Some(indep), None, true));
    }

    #[test]
    fn multi_use_load_needs_double_use() {
        let mut g = graph();
        let b = g.start_block;
        let p = param(&mut g, 0);
        let load = g.add_node_attr(
            b,
            Op::Load,
            Mode::T,
            &[g.no_mem, p],
            Attr::MemAccess { mode: Mode::I32 },
        );
        let value = g.proj(load, Mode::I32, crate::ir::pn::RES);
        let c = cnst(&mut g, 3);
        let _u1 = g.add_node(b, Op::Add, Mode::I32, &[value, c]);
        let _u2 = g.add_node(b, Op::Sub, Mode::I32, &[value, c]);

        assert!(!use_source_address_mode(&g, b, value, None, None, false));
        assert!(use_source_address_mode(&g, b, value, None, None, true));
    }
}
