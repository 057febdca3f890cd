//! Instruction set architectures.
//!
//! Each target implements `TargetIsa`; the rest of the pipeline only talks
//! to that trait. Targets are looked up by triple or by name and configured
//! through an `IsaBuilder` carrying the CPU feature set and the object-file
//! format.

pub mod amd64;
pub mod arm;
pub mod ia32;
pub mod template;

use target_lexicon::{Architecture, Triple};

use crate::abi::AbiSignature;
use crate::gas::{GasEmitter, ObjectFormat};
use crate::ir::{Graph, Mode, SymbolTable};
use crate::regs::RegClass;
use crate::sched::blocksched::BlockSchedule;
use crate::sched::Schedule;
use crate::{CodegenError, CodegenResult};

/// The ARM floating point unit variants (`-mfpu=`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArmFpu {
    /// No FPU; float operations become runtime calls.
    SoftFloat,
    /// Kernel-emulated FPA.
    Fpe,
    /// Hardware FPA.
    Fpa,
    /// Single-precision-only VFPv1.
    Vfp1xd,
    /// VFPv1.
    Vfp1,
    /// VFPv2.
    Vfp2,
}

/// CPU feature configuration.
///
/// The booleans gate individual instruction selections and peephole
/// rewrites; the numeric fields configure label and function alignment.
#[derive(Clone, Debug)]
pub struct CpuFeatures {
    /// SSE2 available (float code uses xmm registers instead of x87).
    pub use_sse2: bool,
    /// `cmov` available.
    pub use_cmov: bool,
    /// `fucomi` available (P6) for float compares.
    pub use_fucomi: bool,
    /// Prefer `mov reg, 0` over `xor reg, reg`.
    pub use_mov_0: bool,
    /// Use `inc`/`dec` (avoided on P4 for the flags stall).
    pub use_incdec: bool,
    /// `fisttp` available (SSE3).
    pub use_fisttp: bool,
    /// Pad returns that are branch targets (Athlon).
    pub use_pad_return: bool,
    /// Use `bt` for single-bit tests.
    pub use_bt: bool,
    /// `popcnt` available (SSE4.2).
    pub use_popcnt: bool,
    /// Prefer the short `cwtl`/`cltd` forms on eax.
    pub use_short_sex_eax: bool,
    /// `leave` is fast on this CPU.
    pub use_leave: bool,
    /// `imul mem, imm32` is fast on this CPU.
    pub use_imul_mem_imm32: bool,
    /// Try to materialise compare results without a jump.
    pub optimize_cc: bool,
    /// `sub esp, 4` preferred over a push-style adjustment.
    pub use_sub_esp_4: bool,
    /// `sub esp, 8` preferred.
    pub use_sub_esp_8: bool,
    /// `add esp, 4` preferred over `pop`.
    pub use_add_esp_4: bool,
    /// `add esp, 8` preferred.
    pub use_add_esp_8: bool,
    /// The i486 instructions (`bswap`) are available.
    pub use_i486: bool,
    /// Leave the frame pointer out of the prologue; frame accesses go
    /// through the stack pointer.
    pub omit_frame_pointer: bool,
    /// Position independent code.
    pub pic: bool,
    /// Emit `xchg` markers around spills and reloads (debug aid).
    pub mark_spill_reload: bool,

    /// Alignment of branch-target labels (power of two exponent).
    pub label_alignment: u32,
    /// Maximum bytes to skip for label alignment.
    pub label_alignment_max_skip: u32,
    /// Only align labels of blocks at least this execution-frequency
    /// factor hotter than their predecessor.
    pub label_alignment_factor: u32,
    /// Alignment of function entries (power of two exponent).
    pub function_alignment: u32,
    /// Stack alignment in bytes (`-mstackalign`).
    pub stack_alignment: u32,

    /// The ARM FPU variant.
    pub arm_fpu: ArmFpu,
}

impl Default for CpuFeatures {
    fn default() -> Self {
        CpuFeatures {
            use_sse2: true,
            use_cmov: true,
            use_fucomi: true,
            use_mov_0: false,
            use_incdec: true,
            use_fisttp: false,
            use_pad_return: false,
            use_bt: true,
            use_popcnt: false,
            use_short_sex_eax: true,
            use_leave: true,
            use_imul_mem_imm32: true,
            optimize_cc: true,
            use_sub_esp_4: false,
            use_sub_esp_8: false,
            use_add_esp_4: false,
            use_add_esp_8: false,
            use_i486: true,
            omit_frame_pointer: true,
            pic: false,
            mark_spill_reload: false,
            label_alignment: 4,
            label_alignment_max_skip: 15,
            label_alignment_factor: 2,
            function_alignment: 4,
            stack_alignment: 4,
            arm_fpu: ArmFpu::SoftFloat,
        }
    }
}

/// A target instruction set architecture.
pub trait TargetIsa {
    /// The target name (`ia32`, `amd64`, `arm`, `TEMPLATE`).
    fn name(&self) -> &'static str;

    /// The pointer mode of the target.
    fn pointer_mode(&self) -> Mode;

    /// The configured CPU features.
    fn features(&self) -> &CpuFeatures;

    /// The object-file format assembled from the output.
    fn object_format(&self) -> ObjectFormat;

    /// The register classes of the target.
    fn reg_classes(&self) -> &'static [RegClass];

    /// Rewrite the generic graph into target instructions.
    fn transform(
        &self,
        symbols: &mut SymbolTable,
        graph: &Graph,
        sig: &AbiSignature,
    ) -> CodegenResult<Graph>;

    /// Insert prologue and epilogue code and lay out the stack frame.
    fn introduce_prologue_epilogue(
        &self,
        symbols: &mut SymbolTable,
        graph: &mut Graph,
        sched: &mut Schedule,
        sig: &AbiSignature,
    ) -> CodegenResult<()>;

    /// Run the target's register-aware peephole rewrites.
    fn peephole(&self, graph: &mut Graph, sched: &mut Schedule);

    /// Final fixups before emission (frame offsets, x87 simulation).
    fn finalize(
        &self,
        symbols: &mut SymbolTable,
        graph: &mut Graph,
        sched: &mut Schedule,
    ) -> CodegenResult<()>;

    /// Print one scheduled function as assembler text.
    fn emit_function(
        &self,
        em: &mut GasEmitter,
        symbols: &SymbolTable,
        graph: &Graph,
        sched: &Schedule,
        blocks: &BlockSchedule,
    ) -> CodegenResult<()>;
}

/// A builder collecting the configuration for a target.
pub struct IsaBuilder {
    name: &'static str,
    features: CpuFeatures,
    format: ObjectFormat,
}

impl IsaBuilder {
    /// Set the CPU features.
    pub fn features(mut self, features: CpuFeatures) -> Self {
        self.features = features;
        self
    }

    /// Set the object-file format.
    pub fn object_format(mut self, format: ObjectFormat) -> Self {
        self.format = format;
        self
    }

    /// Construct the target.
    pub fn finish(self) -> Box<dyn TargetIsa> {
        match self.name {
            "ia32" => Box::new(ia32::Ia32Isa::new(self.features, self.format)),
            "amd64" => Box::new(amd64::Amd64Isa::new(self.features, self.format)),
            "arm" => Box::new(arm::ArmIsa::new(self.features, self.format)),
            "TEMPLATE" => Box::new(template::TemplateIsa::new(self.features, self.format)),
            _ => unreachable!("builder with unknown target"),
        }
    }
}

/// Look up a target by name.
pub fn lookup_by_name(name: &str) -> CodegenResult<IsaBuilder> {
    let name = match name {
        "ia32" => "ia32",
        "amd64" => "amd64",
        "arm" => "arm",
        "TEMPLATE" => "TEMPLATE",
        _ => {
            return Err(CodegenError::Unsupported(format!(
                "no back-end for target {}",
                name
            )))
        }
    };
    Ok(IsaBuilder {
        name,
        features: CpuFeatures::default(),
        format: ObjectFormat::Elf,
    })
}

/// Look up a target for a triple.
pub fn lookup(triple: Triple) -> CodegenResult<IsaBuilder> {
    let name = match triple.architecture {
        Architecture::X86_32(_) => "ia32",
        Architecture::X86_64 => "amd64",
        Architecture::Arm(_) => "arm",
        other => {
            return Err(CodegenError::Unsupported(format!(
                "no back-end for architecture {}",
                other
            )))
        }
    };
    lookup_by_name(name)
}
