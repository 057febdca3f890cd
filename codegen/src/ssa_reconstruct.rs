//! SSA reconstruction for a set of nodes.
//!
//! The problem: given a value and a set of "copies" known to represent the
//! same abstract value (copies, spills and reloads, rematerialisations),
//! rewire every use of the original value to its closest copy, introducing
//! phis as necessary.
//!
//! Algorithm: mark all blocks in the iterated dominance frontier of the
//! blocks containing copies. Link the copies of each block ordered by
//! dominance. Then search, for each use, the reaching definition in its
//! block; if none dominates the use, ascend to the immediate dominator. A
//! block in the dominance frontier gets a phi whose operands are found by
//! the same search over the predecessors.

use std::collections::VecDeque;

use anvil_entity::SecondaryMap;
use log::debug;
use rustc_hash::FxHashMap;

use crate::domtree::DomTree;
use crate::ir::{Graph, Mode, Node, Op};
use crate::sched::Schedule;

/// State of one reconstruction run.
pub struct SsaConstruction<'a> {
    graph: &'a mut Graph,
    sched: &'a mut Schedule,
    dt: &'a DomTree,
    mode: Option<Mode>,
    /// Blocks that may need a phi.
    in_idf: SecondaryMap<Node, bool>,
    /// Blocks whose definition chain (or value-at-end cache) exists.
    visited: SecondaryMap<Node, bool>,
    /// Chain links: block -> dominance-deepest def, def -> next def. The
    /// last def of a chain has no entry.
    link: FxHashMap<Node, Node>,
    worklist: VecDeque<Node>,
    idf_done: bool,
    new_phis: Vec<Node>,
}

impl<'a> SsaConstruction<'a> {
    /// Start a reconstruction over `graph`.
    pub fn new(graph: &'a mut Graph, sched: &'a mut Schedule, dt: &'a DomTree) -> Self {
        SsaConstruction {
            graph,
            sched,
            dt,
            mode: None,
            in_idf: SecondaryMap::new(),
            visited: SecondaryMap::new(),
            link: FxHashMap::default(),
            worklist: VecDeque::new(),
            idf_done: false,
            new_phis: Vec::new(),
        }
    }

    /// Register one copy of the value.
    pub fn add_copy(&mut self, copy: Node) {
        assert!(!self.idf_done, "copies must be added before fixing users");
        let mode = self.graph.mode(copy);
        match self.mode {
            None => self.mode = Some(mode),
            Some(m) => assert_eq!(m, mode, "copies with mixed modes"),
        }
        let block = self.graph.block_of(copy);
        if !self.visited[block] {
            self.worklist.push_back(block);
        }
        self.introduce_def_at_block(block, copy);
    }

    /// Register several copies at once.
    pub fn add_copies(&mut self, copies: &[Node]) {
        for &c in copies {
            self.add_copy(c);
        }
    }

    /// The phis synthesised so far.
    pub fn new_phis(&self) -> &[Node] {
        &self.new_phis
    }

    /// Reroute all uses of `value` to the dominating copies.
    pub fn fix_users(&mut self, value: Node) {
        self.fix_users_array(&[value]);
    }

    /// Reroute all uses of each of `values` to the dominating copies.
    pub fn fix_users_array(&mut self, values: &[Node]) {
        if !self.idf_done {
            self.mark_iterated_dominance_frontiers();
            self.idf_done = true;
        }

        for &value in values {
            let uses = self.graph.uses(value).to_vec();
            for u in uses {
                let user = u.user;
                match self.graph.op(user) {
                    Op::End | Op::Deleted => continue,
                    _ => {}
                }
                // The value flowing into a phi must be available at the end
                // of the corresponding predecessor block.
                let at = if self.graph.op(user) == Op::Phi {
                    let block = self.graph.block_of(user);
                    let pred_block = self.graph.cfg_pred_block(block, u.pos as usize);
                    match self.sched.last(pred_block) {
                        Some(last) => last,
                        None => pred_block,
                    }
                } else {
                    user
                };

                let def = self.search_def(at);
                debug!("\t{:?}({}) -> {:?}", user, u.pos, def);
                match u.kind {
                    crate::ir::UseKind::Data => {
                        self.graph.set_in(user, u.pos as usize, def);
                    }
                    crate::ir::UseKind::Dep => {}
                }
            }
        }
    }

    /// Mark the iterated dominance frontier of the blocks holding copies.
    fn mark_iterated_dominance_frontiers(&mut self) {
        debug!("dominance frontier:");
        while let Some(block) = self.worklist.pop_front() {
            for &y in self.dt.frontier(block) {
                if self.in_idf[y] {
                    continue;
                }
                if !self.visited[y] {
                    self.worklist.push_back(y);
                }
                debug!(" {:?}", y);
                self.in_idf[y] = true;
            }
        }
    }

    /// Insert `def` into the definition chain of `block`, keeping the chain
    /// ordered by dominance (deepest first).
    fn introduce_def_at_block(&mut self, block: Node, def: Node) {
        if self.visited[block] {
            let mut node = block;
            loop {
                match self.link.get(&node).copied() {
                    Some(current) if current == def => return,
                    Some(current) => {
                        if self
                            .sched
                            .value_dominates(self.dt, self.graph, current, def)
                        {
                            self.link.insert(node, def);
                            self.link.insert(def, current);
                            return;
                        }
                        node = current;
                    }
                    None => {
                        self.link.insert(node, def);
                        self.link.remove(&def);
                        return;
                    }
                }
            }
        } else {
            self.link.insert(block, def);
            self.link.remove(&def);
            self.visited[block] = true;
        }
    }

    fn get_def_at_idom(&mut self, block: Node) -> Node {
        let dom = self
            .dt
            .idom(block)
            .filter(|&d| d != block)
            .expect("no definition found above the start block");
        self.search_def_end_of_block(dom)
    }

    /// The value live at the end of `block`.
    fn search_def_end_of_block(&mut self, block: Node) -> Node {
        if self.visited[block] {
            self.link[&block]
        } else if self.in_idf[block] {
            self.create_phi(block, block)
        } else {
            let def = self.get_def_at_idom(block);
            self.visited[block] = true;
            self.link.insert(block, def);
            def
        }
    }

    /// The definition reaching the program point `at`.
    fn search_def(&mut self, at: Node) -> Node {
        let block = self.graph.block_of(at);
        debug!("\t...searching def at {:?}", at);

        // No defs in the current block: the normal search applies.
        if !self.visited[block] && !self.in_idf[block] {
            return self.get_def_at_idom(block);
        }

        // There are defs in the block; walk the chain for the first one
        // above the use.
        let mut node = block;
        while let Some(def) = self.link.get(&node).copied() {
            if !self.sched.value_dominates(self.dt, self.graph, at, def) {
                debug!("\t...found dominating def {:?}", def);
                return def;
            }
            node = def;
        }

        // Block in the dominance frontier? Create a phi then.
        if self.in_idf[block] {
            debug!("\t...create phi at block {:?}", block);
            return self.create_phi(block, node);
        }

        self.get_def_at_idom(block)
    }

    /// Synthesise a phi in `block`, linked behind `link_with`, and resolve
    /// its operands recursively.
    fn create_phi(&mut self, block: Node, link_with: Node) -> Node {
        let n_preds = self.graph.n_ins(block);
        assert!(n_preds > 1, "phi in a block with {} predecessors", n_preds);
        let mode = self.mode.expect("no copies added");

        let placeholder = self
            .graph
            .add_node(self.graph.start_block, Op::Unknown, mode, &[]);
        let ins = vec![placeholder; n_preds];
        let phi = self.graph.add_node(block, Op::Phi, mode, &ins);
        self.new_phis.push(phi);

        if mode != Mode::M {
            self.sched.add_front(self.graph, block, phi);
        }

        debug!("\tcreating phi {:?} in {:?}", phi, block);
        self.link.insert(link_with, phi);
        self.link.remove(&phi);
        self.visited[block] = true;

        for i in 0..n_preds {
            let pred_block = self.graph.cfg_pred_block(block, i);
            let pred_def = self.search_def_end_of_block(pred_block);
            self.graph.set_in(phi, i, pred_def);
        }

        if self.graph.n_uses(placeholder) == 0 {
            self.graph.kill(placeholder);
        }
        phi
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domtree::DomTree;
    use crate::ir::{Attr, Entity, TarVal};
    use crate::sched::listsched::list_schedule;
    use crate::sched::select::TrivialSelector;
    use anvil_entity::EntityRef;

    /// Copies in both arms of a diamond get merged by a phi at the join, and
    /// the use below the join is rewired to the phi.
    #[test]
    fn diamond_gets_phi() {
        let mut g = Graph::new(Entity::new(0));
        let b0 = g.start_block;
        let v = g.add_node_attr(
            b0,
            Op::Const,
            Mode::I32,
            &[],
            Attr::Const(TarVal::new(Mode::I32, 42)),
        );
        let cond = g.add_node(b0, Op::Cond, Mode::T, &[]);
        let pf = g.proj(cond, Mode::X, 0);
        let pt = g.proj(cond, Mode::X, 1);

        let ba = g.add_block(&[pf]);
        let copy_a = g.add_node(ba, Op::Copy, Mode::I32, &[v]);
        let ja = g.add_node(ba, Op::Jmp, Mode::X, &[]);

        let bb = g.add_block(&[pt]);
        let copy_b = g.add_node(bb, Op::Copy, Mode::I32, &[v]);
        let jb = g.add_node(bb, Op::Jmp, Mode::X, &[]);

        let join = g.add_block(&[ja, jb]);
        let user = g.add_node(join, Op::Minus, Mode::I32, &[v]);

        let dt = DomTree::compute(&g);
        let mut sched = list_schedule(&g, &dt, &mut TrivialSelector);

        let mut ssa = SsaConstruction::new(&mut g, &mut sched, &dt);
        ssa.add_copies(&[v, copy_a, copy_b]);
        ssa.fix_users(v);
        let phis = ssa.new_phis().to_vec();

        assert_eq!(phis.len(), 1);
        let phi = phis[0];
        assert_eq!(g.block_of(phi), join);
        let mut phi_ins = g.ins(phi).to_vec();
        phi_ins.sort();
        let mut copies = vec![copy_a, copy_b];
        copies.sort();
        assert_eq!(phi_ins, copies);
        assert_eq!(g.ins(user), &[phi]);
        // The copies themselves still read the original value.
        assert_eq!(g.ins(copy_a), &[v]);
    }

    /// Running the reconstruction again on the result creates no new phis.
    #[test]
    fn idempotent() {
        let mut g = Graph::new(Entity::new(0));
        let b0 = g.start_block;
        let v = g.add_node_attr(
            b0,
            Op::Const,
            Mode::I32,
            &[],
            Attr::Const(TarVal::new(Mode::I32, 7)),
        );
        let cond = g.add_node(b0, Op::Cond, Mode::T, &[]);
        let pf = g.proj(cond, Mode::X, 0);
        let pt = g.proj(cond, Mode::X, 1);
        let ba = g.add_block(&[pf]);
        let copy_a = g.add_node(ba, Op::Copy, Mode::I32, &[v]);
        let ja = g.add_node(ba, Op::Jmp, Mode::X, &[]);
        let bb = g.add_block(&[pt]);
        let copy_b = g.add_node(bb, Op::Copy, Mode::I32, &[v]);
        let jb = g.add_node(bb, Op::Jmp, Mode::X, &[]);
        let join = g.add_block(&[ja, jb]);
        let _user = g.add_node(join, Op::Minus, Mode::I32, &[v]);

        let dt = DomTree::compute(&g);
        let mut sched = list_schedule(&g, &dt, &mut TrivialSelector);

        let mut ssa = SsaConstruction::new(&mut g, &mut sched, &dt);
        ssa.add_copies(&[v, copy_a, copy_b]);
        ssa.fix_users(v);
        drop(ssa);

        // Second run with the same copies: all uses already reach a
        // dominating definition, so no phi may appear.
        let mut ssa2 = SsaConstruction::new(&mut g, &mut sched, &dt);
        ssa2.add_copies(&[v, copy_a, copy_b]);
        ssa2.fix_users(v);
        assert!(ssa2.new_phis().is_empty());
    }
}
