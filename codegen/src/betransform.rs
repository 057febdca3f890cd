//! Shared driver for the IR transformers.
//!
//! Builds the target graph alongside the source graph. Nodes are
//! transformed on demand and memoised in an old-to-new table, so node
//! identity is preserved across shared subtrees. Phis (and the block
//! predecessor lists) are pre-created and patched afterwards, which breaks
//! the cycles loops introduce.

use anvil_entity::packed_option::PackedOption;
use anvil_entity::SecondaryMap;
use log::trace;

use crate::ir::{Graph, Mode, Node, Op};
use crate::CodegenResult;

/// The transformation state: source graph, target graph under
/// construction, and the memo table.
pub struct TransformEnv<'a> {
    /// The generic input graph.
    pub src: &'a Graph,
    /// The target graph being built.
    pub dst: Graph,
    memo: SecondaryMap<Node, PackedOption<Node>>,
}

/// Per-target transformation rules.
pub trait TransformHandler {
    /// Lower one source node into target nodes, returning the target node
    /// standing for its value. Operands are obtained through
    /// `TransformEnv::transform`.
    fn transform(
        &mut self,
        env: &mut TransformEnv,
        node: Node,
    ) -> CodegenResult<Node>;

    /// The mode phi nodes of `mode` should carry in the target graph
    /// (e.g. all ia32 integer phis live in 32-bit registers).
    fn phi_mode(&self, mode: Mode) -> Mode {
        mode
    }
}

impl<'a> TransformEnv<'a> {
    /// The target block corresponding to a source block.
    pub fn block(&self, src_block: Node) -> Node {
        self.memo[src_block].expect("block not mapped")
    }

    /// The target block holding the transformed version of `node`.
    pub fn block_of(&self, node: Node) -> Node {
        self.block(self.src.block_of(node))
    }

    /// Record the target node standing for a source node. Used when a
    /// lowering produces its result before its operands are final.
    pub fn set_transformed(&mut self, src: Node, dst: Node) {
        self.memo[src] = dst.into();
    }

    /// Has `node` been transformed already?
    pub fn transformed(&self, node: Node) -> Option<Node> {
        self.memo[node].expand()
    }

    /// Transform `node`, memoised.
    pub fn transform(
        &mut self,
        handler: &mut dyn TransformHandler,
        node: Node,
    ) -> CodegenResult<Node> {
        if let Some(t) = self.memo[node].expand() {
            return Ok(t);
        }
        trace!("transform {:?} ({:?})", node, self.src.op(node));
        let new = match self.src.op(node) {
            Op::Block => self.block(node),
            Op::Phi => {
                // Pre-create with placeholders, then resolve the operands;
                // the memo entry breaks the cycle through loop back-edges.
                let mode = handler.phi_mode(self.src.mode(node));
                let block = self.block_of(node);
                let placeholder =
                    self.dst
                        .add_node(self.dst.start_block, Op::Unknown, mode, &[]);
                let ins = vec![placeholder; self.src.n_ins(node)];
                let phi = self.dst.add_node(block, Op::Phi, mode, &ins);
                self.memo[node] = phi.into();
                for i in 0..self.src.n_ins(node) {
                    let op = self.transform(handler, self.src.in_at(node, i))?;
                    self.dst.set_in(phi, i, op);
                }
                if self.dst.n_uses(placeholder) == 0 {
                    self.dst.kill(placeholder);
                }
                phi
            }
            _ => handler.transform(self, node)?,
        };
        // A lowering may have registered the node itself (loads fused into
        // address modes do).
        if self.memo[node].is_none() {
            self.memo[node] = new.into();
        }
        Ok(self.memo[node].unwrap())
    }
}

/// Transform `src` into a new target graph using `handler`.
pub fn transform_graph(
    src: &Graph,
    handler: &mut dyn TransformHandler,
) -> CodegenResult<Graph> {
    let mut env = TransformEnv {
        src,
        dst: Graph::new(src.entity),
        memo: SecondaryMap::new(),
    };

    // Pre-map the fixed infrastructure.
    env.memo[src.start_block] = env.dst.start_block.into();
    env.memo[src.end_block] = env.dst.end_block.into();
    env.memo[src.start] = env.dst.start.into();
    env.memo[src.end] = env.dst.end.into();
    env.memo[src.no_mem] = env.dst.no_mem.into();

    // Pre-create the remaining blocks so nodes always have a home.
    for block in src.blocks() {
        if env.memo[block].is_none() {
            let b = env.dst.add_block(&[]);
            env.memo[block] = b.into();
        }
    }

    // Drive the transformation from the control sinks: the end block's
    // predecessors (returns) and the explicitly kept-alive nodes.
    let mut roots: Vec<Node> = src.ins(src.end_block).to_vec();
    roots.extend(src.ins(src.end).iter().copied());
    // Every block's control predecessors are transformed too, so all
    // reachable control flow exists in the target graph.
    for block in src.blocks() {
        roots.extend(src.ins(block).iter().copied());
    }
    for root in roots {
        env.transform(handler, root)?;
    }

    // Patch the block predecessor lists and the end node.
    for block in src.blocks() {
        let dst_block = env.block(block);
        for i in 0..src.n_ins(block) {
            let pred = env.transform(handler, src.in_at(block, i))?;
            env.dst.add_in(dst_block, pred);
        }
    }
    for i in 0..src.n_ins(src.end) {
        let kept = env.transform(handler, src.in_at(src.end, i))?;
        let end = env.dst.end;
        env.dst.add_in(end, kept);
    }

    Ok(env.dst)
}
