//! Property tests for the quantified invariants of the low-level pieces.

use proptest::prelude::*;

use anvil_codegen::rbitset::RBitSet;

const SIZE: usize = 97;

fn arb_set() -> impl Strategy<Value = (RBitSet, Vec<bool>)> {
    proptest::collection::vec(any::<bool>(), SIZE).prop_map(|bits| {
        let mut s = RBitSet::new(SIZE);
        for (i, &b) in bits.iter().enumerate() {
            if b {
                s.set(i);
            }
        }
        (s, bits)
    })
}

proptest! {
    /// popcount equals the number of set indices.
    #[test]
    fn popcount_counts_bits((s, bits) in arb_set()) {
        let expected = bits.iter().filter(|&&b| b).count();
        prop_assert_eq!(s.popcount(), expected);
    }

    /// Word-level equality is bit-level equality.
    #[test]
    fn equality_is_bitwise((a, abits) in arb_set(), (b, bbits) in arb_set()) {
        let bitwise_equal = abits == bbits;
        prop_assert_eq!(a == b, bitwise_equal);
    }

    /// set_range sets exactly [from, to) and nothing else.
    #[test]
    fn set_range_exact((mut s, bits) in arb_set(),
                       from in 0usize..SIZE - 1,
                       len in 1usize..SIZE) {
        let to = (from + len).min(SIZE);
        let value = len % 2 == 0;
        s.set_range(from, to, value);
        for i in 0..SIZE {
            let expected = if (from..to).contains(&i) { value } else { bits[i] };
            prop_assert_eq!(s.is_set(i), expected, "bit {}", i);
        }
    }

    /// Iteration visits exactly the set bits, ascending.
    #[test]
    fn iteration_matches((s, bits) in arb_set()) {
        let expected: Vec<usize> = bits
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| if b { Some(i) } else { None })
            .collect();
        let got: Vec<usize> = s.iter().collect();
        prop_assert_eq!(got, expected);
    }

    /// minus1 is decrement on the little-endian number view.
    #[test]
    fn minus1_decrements(v in 1u64..u64::MAX) {
        let mut s = RBitSet::new(64);
        for i in 0..64 {
            if v & (1 << i) != 0 {
                s.set(i);
            }
        }
        s.minus1();
        let w = v - 1;
        for i in 0..64 {
            prop_assert_eq!(s.is_set(i), w & (1 << i) != 0, "bit {}", i);
        }
    }

    /// The setcc planner computes the requested select for arbitrary
    /// constant arms.
    #[test]
    fn setcc_plans_are_correct(t in -1000i64..1000, f in -1000i64..1000) {
        prop_assume!(t != f);
        let plan = anvil_codegen::isa::ia32::setcc::find_const_transform(t, f);
        prop_assert!(plan.steps.len() <= 5);

        for cond in [false, true] {
            let eff = cond != plan.negate;
            let mut r: i64 = if eff { 1 } else { 0 };
            for step in &plan.steps {
                use anvil_codegen::isa::ia32::setcc::Step;
                r = match *step {
                    Step::Set => r,
                    Step::Add(i) => (r as i32).wrapping_add(i) as i64,
                    Step::Lea { base, scale, offset } => {
                        let b = if base { r } else { 0 };
                        (b as i32).wrapping_add(((r << scale) as i32).wrapping_add(offset)) as i64
                    }
                    Step::Shl(k) => ((r as i32) << k) as i64,
                    Step::Neg => -(r as i32) as i64,
                    Step::Not => !(r as i32) as i64,
                    Step::And(m) => ((r as u32) & m) as i32 as i64,
                };
            }
            let expected = if cond { t } else { f };
            prop_assert_eq!(r as i32 as i64, expected);
        }
    }
}

mod address_modes {
    use anvil_codegen::ir::{Attr, Entity, Graph, Mode, Node, Op, TarVal};
    use anvil_codegen::isa::ia32::address_mode::create_address_mode;
    use proptest::prelude::*;

    fn entity0() -> Entity {
        Entity::from_u32(0)
    }

    /// Interpret a matched descriptor against an environment assigning a
    /// value to every leaf node.
    fn eval_am(
        graph: &Graph,
        am: &anvil_codegen::isa::ia32::address_mode::AddressMode,
        leaf: impl Fn(Node) -> i64,
    ) -> i64 {
        let mut v = am.offset as i64;
        if let Some(b) = am.base {
            v += eval_expr(graph, b, &leaf);
        }
        if let Some(i) = am.index {
            v += eval_expr(graph, i, &leaf) << am.scale;
        }
        v
    }

    fn eval_expr(graph: &Graph, node: Node, leaf: &impl Fn(Node) -> i64) -> i64 {
        match graph.op(node) {
            Op::Const => graph.attr(node).constant().as_i64(),
            Op::Add => {
                eval_expr(graph, graph.in_at(node, 0), leaf)
                    + eval_expr(graph, graph.in_at(node, 1), leaf)
            }
            Op::Shl => {
                let count = eval_expr(graph, graph.in_at(node, 1), leaf);
                eval_expr(graph, graph.in_at(node, 0), leaf) << count
            }
            _ => leaf(node),
        }
    }

    proptest! {
        /// Matching never changes the computed address: the descriptor
        /// evaluates to the same value as the original expression tree.
        #[test]
        fn match_preserves_address(
            base_val in -1000i64..1000,
            idx_val in -1000i64..1000,
            scale in 0u8..4,
            disp in -500i32..500,
            with_index in any::<bool>(),
        ) {
            let mut g = Graph::new(entity0());
            let b = g.start_block;
            let start = g.start;
            let base = g.proj(start, Mode::P32, 1);
            let mut expr = base;
            let idx = g.proj(start, Mode::P32, 2);
            if with_index {
                let k = g.add_node_attr(
                    b, Op::Const, Mode::I32, &[],
                    Attr::Const(TarVal::new(Mode::I32, scale as i64)),
                );
                let scaled = g.add_node(b, Op::Shl, Mode::P32, &[idx, k]);
                expr = g.add_node(b, Op::Add, Mode::P32, &[expr, scaled]);
            }
            if disp != 0 {
                let c = g.add_node_attr(
                    b, Op::Const, Mode::I32, &[],
                    Attr::Const(TarVal::new(Mode::I32, disp as i64)),
                );
                expr = g.add_node(b, Op::Add, Mode::P32, &[expr, c]);
            }

            let leaf = |n: Node| {
                if n == base { base_val } else if n == idx { idx_val } else { 0 }
            };
            let am = create_address_mode(&g, expr, true);
            let original = eval_expr(&g, expr, &leaf);
            let matched = eval_am(&g, &am, leaf);
            prop_assert_eq!(original, matched);
        }
    }
}
