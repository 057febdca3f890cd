//! The compilation context and pass pipeline.
//!
//! One `Ctx` compiles the functions of a module against a fixed target.
//! The pass order per graph is: transform, keep repair, list scheduling,
//! register allocation (an external collaborator behind `RegAllocator`),
//! prologue/epilogue insertion, peephole rewriting, target finalisation
//! (frame resolution, fp stack simulation), emission.

use crate::abi::AbiSignature;
use crate::domtree::DomTree;
use crate::gas::GasEmitter;
use crate::ir::{Graph, SymbolTable};
use crate::isa::TargetIsa;
use crate::keeps::add_missing_keeps;
use crate::sched::blocksched::block_schedule;
use crate::sched::listsched::list_schedule;
use crate::sched::select::Selector;
use crate::sched::Schedule;
use crate::CodegenResult;

/// The register allocator interface.
///
/// The allocator receives the scheduled graph with the register
/// requirements in place and must fill the assignment side-table
/// (`Graph::set_reg`), inserting spills, reloads and permutations as it
/// sees fit (keeping the schedule in step).
pub trait RegAllocator {
    /// Allocate registers for one function.
    fn run(
        &mut self,
        isa: &dyn TargetIsa,
        graph: &mut Graph,
        sched: &mut Schedule,
        domtree: &DomTree,
    ) -> CodegenResult<()>;
}

/// An allocator that does nothing: for inputs that already carry their
/// assignments (tests, pre-colored graphs).
pub struct PreassignedAllocator;

impl RegAllocator for PreassignedAllocator {
    fn run(
        &mut self,
        _isa: &dyn TargetIsa,
        _graph: &mut Graph,
        _sched: &mut Schedule,
        _domtree: &DomTree,
    ) -> CodegenResult<()> {
        Ok(())
    }
}

/// Per-module compilation state.
pub struct Ctx<'a> {
    /// The selected target.
    pub isa: &'a dyn TargetIsa,
    /// The module's symbol table.
    pub symbols: &'a mut SymbolTable,
}

impl<'a> Ctx<'a> {
    /// Create a context.
    pub fn new(isa: &'a dyn TargetIsa, symbols: &'a mut SymbolTable) -> Ctx<'a> {
        Ctx { isa, symbols }
    }

    /// Run the whole pipeline for one function and print it into `em`.
    pub fn compile_function(
        &mut self,
        graph: &Graph,
        sig: &AbiSignature,
        selector: &mut dyn Selector,
        regalloc: &mut dyn RegAllocator,
        em: &mut GasEmitter,
    ) -> CodegenResult<()> {
        graph.verify()?;
        let mut lowered = self.isa.transform(self.symbols, graph, sig)?;
        add_missing_keeps(&mut lowered, self.isa.reg_classes());

        let domtree = DomTree::compute(&lowered);
        let mut sched = list_schedule(&lowered, &domtree, selector);

        regalloc.run(self.isa, &mut lowered, &mut sched, &domtree)?;

        self.isa
            .introduce_prologue_epilogue(self.symbols, &mut lowered, &mut sched, sig)?;
        self.isa.peephole(&mut lowered, &mut sched);
        self.isa.finalize(self.symbols, &mut lowered, &mut sched)?;

        let blocks = block_schedule(&lowered, &domtree);
        self.isa
            .emit_function(em, self.symbols, &lowered, &sched, &blocks)?;
        Ok(())
    }

    /// Emit the module's data entities.
    pub fn emit_globals(&mut self, em: &mut GasEmitter) {
        em.emit_globals(self.symbols);
    }
}
