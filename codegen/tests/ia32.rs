//! End-to-end tests for the ia32 pipeline: build a generic graph, run it
//! through transform/schedule/peephole/emission and check the text.
//!
//! Register allocation is an external collaborator of the backend; these
//! tests stand one in with a greedy single-pass assigner that is good
//! enough for graphs without spills.

mod support;

use anvil_codegen::abi::AbiSignature;
use anvil_codegen::gas::GasEmitter;
use anvil_codegen::ir::{pn, Attr, Graph, Mode, Op, Relation, SymbolTable, TarVal, Visibility};
use anvil_codegen::isa;
use anvil_codegen::sched::select::TrivialSelector;
use anvil_codegen::Ctx;

use support::GreedyAllocator;

fn compile(
    symbols: &mut SymbolTable,
    graph: &Graph,
    sig: &AbiSignature,
) -> String {
    let target = isa::lookup_by_name("ia32").unwrap().finish();
    let mut em = GasEmitter::new(target.object_format());
    let mut ctx = Ctx::new(&*target, symbols);
    ctx.compile_function(graph, sig, &mut TrivialSelector, &mut GreedyAllocator, &mut em)
        .expect("compilation failed");
    em.buf
}

fn new_func(symbols: &mut SymbolTable, name: &str) -> Graph {
    let ent = symbols.define_function(name, Visibility::Global);
    Graph::new(ent)
}

fn param(g: &mut Graph, i: i64, mode: Mode) -> anvil_codegen::ir::Node {
    let start = g.start;
    g.proj(start, mode, pn::START_ARGS + i)
}

fn initial_mem(g: &mut Graph) -> anvil_codegen::ir::Node {
    let start = g.start;
    g.proj(start, Mode::M, pn::START_MEM)
}

fn int_const(g: &mut Graph, v: i64) -> anvil_codegen::ir::Node {
    let b = g.start_block;
    g.add_node_attr(
        b,
        Op::Const,
        Mode::I32,
        &[],
        Attr::Const(TarVal::new(Mode::I32, v)),
    )
}

fn ret(g: &mut Graph, mem: anvil_codegen::ir::Node, vals: &[anvil_codegen::ir::Node]) {
    let mut ins = vec![mem];
    ins.extend_from_slice(vals);
    let r = g.add_node(g.start_block, Op::Return, Mode::X, &ins);
    let end_block = g.end_block;
    g.add_in(end_block, r);
}

/// Scenario: add a constant to a stack parameter.
#[test]
fn add_constant() {
    let mut symbols = SymbolTable::new();
    let mut g = new_func(&mut symbols, "add7");
    let x = param(&mut g, 0, Mode::I32);
    let c = int_const(&mut g, 7);
    let y = g.add_node(g.start_block, Op::Add, Mode::I32, &[x, c]);
    let mem = initial_mem(&mut g);
    ret(&mut g, mem, &[y]);

    let sig = AbiSignature::cdecl(vec![Mode::I32], vec![Mode::I32]);
    let asm = compile(&mut symbols, &g, &sig);

    assert!(asm.contains("add7:"), "missing function label:\n{}", asm);
    assert!(
        asm.contains("\tmovl 4(%esp), %eax"),
        "missing parameter load:\n{}",
        asm
    );
    assert!(asm.contains("\taddl $7, %eax"), "missing add:\n{}", asm);
    assert!(asm.contains("\tret"), "missing return:\n{}", asm);
    // The lea never survives to the output; the peephole turns it back
    // into an add.
    assert!(!asm.contains("lea"), "unexpected lea:\n{}", asm);
}

/// Scenario: signed division by a constant.
#[test]
fn signed_divide() {
    let mut symbols = SymbolTable::new();
    let mut g = new_func(&mut symbols, "div3");
    let x = param(&mut g, 0, Mode::I32);
    let c = int_const(&mut g, 3);
    let mem = initial_mem(&mut g);
    let div = g.add_node(g.start_block, Op::Div, Mode::T, &[mem, x, c]);
    let q = g.proj(div, Mode::I32, pn::RES);
    let div_mem = g.proj(div, Mode::M, pn::MEM);
    ret(&mut g, div_mem, &[q]);

    let sig = AbiSignature::cdecl(vec![Mode::I32], vec![Mode::I32]);
    let asm = compile(&mut symbols, &g, &sig);

    assert!(asm.contains("\tcltd"), "missing sign extension:\n{}", asm);
    assert!(asm.contains("\tidivl %"), "missing idiv:\n{}", asm);
    assert!(asm.contains("\tmovl $3, %"), "missing constant:\n{}", asm);
    assert!(asm.contains("\tret"), "missing return:\n{}", asm);
}

/// Scenario: a small switch with three cases becomes a jump table.
#[test]
fn small_switch() {
    let mut symbols = SymbolTable::new();
    let mut g = new_func(&mut symbols, "dispatch");
    let x = param(&mut g, 0, Mode::I32);
    let sw = g.add_node_attr(
        g.start_block,
        Op::Switch,
        Mode::T,
        &[x],
        Attr::Switch { default_pn: 3 },
    );
    let mem = initial_mem(&mut g);

    let mut case_blocks = Vec::new();
    for pnr in [0i64, 1, 2, 3] {
        let proj = g.proj(sw, Mode::X, pnr);
        let block = g.add_block(&[proj]);
        case_blocks.push(block);
    }
    for (i, &block) in case_blocks.iter().enumerate() {
        let c = int_const(&mut g, (i * 10) as i64);
        let r = g.add_node(block, Op::Return, Mode::X, &[mem, c]);
        let end_block = g.end_block;
        g.add_in(end_block, r);
    }

    let sig = AbiSignature::cdecl(vec![Mode::I32], vec![Mode::I32]);
    let asm = compile(&mut symbols, &g, &sig);

    assert!(asm.contains("\tcmpl $2, %eax"), "missing range check:\n{}", asm);
    assert!(asm.contains("\tja .LG"), "missing default branch:\n{}", asm);
    assert!(
        asm.contains("\tjmp *.LJT0(,%eax,4)"),
        "missing table jump:\n{}",
        asm
    );
    assert!(asm.contains(".LJT0:"), "missing table label:\n{}", asm);
    assert!(asm.contains("\t.p2align 2"), "missing table alignment:\n{}", asm);
    assert_eq!(
        asm.matches("\t.long .LG").count(),
        3,
        "expected three table entries:\n{}",
        asm
    );
    assert!(asm.contains(".section\t.rodata"), "table not in rodata:\n{}", asm);
}

/// Scenario: Mux of the constants 1/0 becomes setcc + zero extension.
#[test]
fn mux_to_setcc() {
    let mut symbols = SymbolTable::new();
    let mut g = new_func(&mut symbols, "less");
    let x = param(&mut g, 0, Mode::I32);
    let y = param(&mut g, 1, Mode::I32);
    let cmp = g.add_node_attr(
        g.start_block,
        Op::Cmp,
        Mode::B,
        &[x, y],
        Attr::Cmp {
            relation: Relation::LT,
        },
    );
    let one = int_const(&mut g, 1);
    let zero = int_const(&mut g, 0);
    let mux = g.add_node(g.start_block, Op::Mux, Mode::I32, &[cmp, zero, one]);
    let mem = initial_mem(&mut g);
    ret(&mut g, mem, &[mux]);

    let sig = AbiSignature::cdecl(vec![Mode::I32, Mode::I32], vec![Mode::I32]);
    let asm = compile(&mut symbols, &g, &sig);

    assert!(
        asm.contains("\tcmpl %ecx, %eax"),
        "missing compare:\n{}",
        asm
    );
    assert!(asm.contains("\tsetl %al"), "missing setcc:\n{}", asm);
    assert!(
        asm.contains("\tmovzbl %al, %eax"),
        "missing zero extension:\n{}",
        asm
    );
}

/// Scenario: a store into freshly allocated stack space becomes a push.
#[test]
fn incsp_store_to_push() {
    use anvil_codegen::isa::ia32::{self, attrs::AttrVariant, attrs::Ia32Attr, Ia32Op};
    use anvil_codegen::sched::Schedule;
    use anvil_entity_shim::entity0;

    let mut g = Graph::new(entity0());
    let b = g.start_block;
    let sp = g.proj(g.start, Mode::U32, pn::START_SP);
    g.set_reg(sp, ia32::regs::esp_reg());

    let incsp = g.add_node_attr(b, Op::IncSp, Mode::U32, &[sp], Attr::IncSp { offset: 4 });
    g.set_reg(incsp, ia32::regs::esp_reg());

    let val = g.add_node_attr(
        b,
        Op::Ia32(Ia32Op::Const),
        Mode::U32,
        &[],
        Attr::Ia32(Box::new(Ia32Attr::with_variant(AttrVariant::Immediate {
            ent: None,
            sign: false,
            offset: 42,
        }))),
    );
    g.set_reg(val, ia32::regs::gp_reg(3));

    let noreg = g.add_node_attr(
        b,
        Op::Ia32(Ia32Op::NoRegGp),
        Mode::U32,
        &[],
        Attr::Ia32(Box::new(Ia32Attr::new())),
    );
    g.set_reg(noreg, ia32::regs::gp_noreg());

    let mut st_attr = Ia32Attr::new();
    st_attr.ls_mode = Some(Mode::U32);
    let no_mem = g.no_mem;
    let store = g.add_node_attr(
        b,
        Op::Ia32(Ia32Op::Store),
        Mode::M,
        &[incsp, noreg, no_mem, val],
        Attr::Ia32(Box::new(st_attr)),
    );

    let mut sched = Schedule::new();
    sched.append(b, g.start);
    sched.append(b, val);
    sched.append(b, incsp);
    sched.append(b, store);

    let features = anvil_codegen::isa::CpuFeatures::default();
    ia32::peephole::run(&features, &mut g, &mut sched);

    // The store is gone; a push replaced it and the adjustment shrank to
    // nothing.
    assert_eq!(g.op(store), Op::Deleted);
    let has_push = g
        .nodes()
        .any(|n| g.op(n) == Op::Ia32(Ia32Op::Push));
    assert!(has_push, "no push created");
    match g.attr(incsp) {
        Attr::IncSp { offset } => assert_eq!(*offset, 0),
        _ => panic!("incsp lost its attribute"),
    }
}

/// A module-level smoke test: globals and a function in one stream.
#[test]
fn module_with_globals() {
    use anvil_codegen::ir::{DataType, EntityData, EntityKind, Initializer};

    let mut symbols = SymbolTable::new();
    symbols.define(EntityData {
        name: "counter".to_string(),
        visibility: Visibility::Global,
        alignment: 0,
        kind: EntityKind::Global {
            ty: DataType::Scalar(Mode::U32),
            init: Some(Initializer::Tarval(TarVal::new(Mode::U32, 9))),
            readonly: false,
            tls: false,
        },
    });

    let mut g = new_func(&mut symbols, "get");
    let c = int_const(&mut g, 1);
    let mem = initial_mem(&mut g);
    ret(&mut g, mem, &[c]);
    let sig = AbiSignature::cdecl(vec![], vec![Mode::I32]);

    let target = isa::lookup_by_name("ia32").unwrap().finish();
    let mut em = GasEmitter::new(target.object_format());
    let mut ctx = Ctx::new(&*target, &mut symbols);
    ctx.compile_function(&g, &sig, &mut TrivialSelector, &mut GreedyAllocator, &mut em)
        .unwrap();
    ctx.emit_globals(&mut em);
    let asm = em.buf;

    assert!(asm.contains("\t.type get, @function"));
    assert!(asm.contains("\t.size get, .-get"));
    assert!(asm.contains("counter:"));
    assert!(asm.contains("\t.long 9"));
}

/// Keep a tiny shim so the hand-built graphs can name a function entity
/// without a symbol table.
mod anvil_entity_shim {
    use anvil_codegen::ir::Entity;

    pub fn entity0() -> Entity {
        Entity::from_u32(0)
    }
}
