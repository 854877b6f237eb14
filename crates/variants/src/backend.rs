//! Seam between the pipeline and whichever compiler turns preprocessed
//! source text into target bytecode. The pool only ever talks to the
//! `BackendCompiler` trait, so tests run against an in-process fake while
//! the CLI wires in a real external compiler.
use crate::ShaderStage;

/// Shading-model tier selected once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderModel {
    Sm2,
    Sm3,
}

impl ShaderModel {
    /// Tier code stored in the packed container header.
    pub fn tier(self) -> u16 {
        match self {
            Self::Sm2 => 2,
            Self::Sm3 => 3,
        }
    }

    pub fn from_tier(tier: u16) -> Option<Self> {
        match tier {
            2 => Some(Self::Sm2),
            3 => Some(Self::Sm3),
            _ => None,
        }
    }

    /// Backend profile string for a stage at this tier.
    pub fn profile(self, stage: ShaderStage) -> &'static str {
        match (self, stage) {
            (Self::Sm2, ShaderStage::Vertex) => "vs_2_0",
            (Self::Sm2, ShaderStage::Fragment) => "ps_2_0",
            (Self::Sm3, ShaderStage::Vertex) => "vs_3_0",
            (Self::Sm3, ShaderStage::Fragment) => "ps_3_0",
        }
    }
}

/// Everything a backend needs for one compilation: the shared source text,
/// the stage/profile selection, and the job-local plus global defines.
#[derive(Debug)]
pub struct CompileRequest<'a> {
    pub stage: ShaderStage,
    pub entry_point: &'a str,
    pub profile: &'a str,
    pub defines: &'a [String],
    pub source: &'a str,
}

/// A declared-parameter table entry as the backend reports it, marker
/// prefix and all; classification happens pipeline-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawParameter {
    pub name: String,
    pub register: u32,
}

#[derive(Debug, Clone, Default)]
pub struct BackendOutput {
    pub bytecode: Vec<u8>,
    pub parameters: Vec<RawParameter>,
}

/// External backend compiler. `Err` carries the backend's diagnostic text
/// verbatim; it ends up in the failing job's error slot and is reported
/// with the shader and variation names.
pub trait BackendCompiler: Sync {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<BackendOutput, String>;
}
