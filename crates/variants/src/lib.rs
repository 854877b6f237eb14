mod backend;
mod pack;
mod pool;
mod registry;
mod resolve;
mod spec;

pub use backend::{BackendCompiler, BackendOutput, CompileRequest, RawParameter, ShaderModel};
pub use pack::{
    pack_batch, read_container, strip_debug_comments, write_container, PackError, PackedBatch,
    PackedJob, CONTAINER_MAGIC,
};
pub use pool::{compile_batch, worker_count};
pub use registry::{classify_parameter, ParamKind, ParamRegistry, Parameter};
pub use resolve::{resolve_combinations, ResolveError};
pub use spec::{CompileJob, ShaderSpec, VariationDef};

/// Pipeline stage a base shader is compiled for. A definition entry may ask
/// for both stages; by the time a `ShaderSpec` exists the stage is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn entry_point(self) -> &'static str {
        match self {
            Self::Vertex => "VS",
            Self::Fragment => "PS",
        }
    }

    /// Stage code stored in the packed container header.
    pub fn code(self) -> u16 {
        match self {
            Self::Vertex => 0,
            Self::Fragment => 1,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0 => Some(Self::Vertex),
            1 => Some(Self::Fragment),
            _ => None,
        }
    }

    /// Output file extension stem (`.vs2`, `.ps3`, ...).
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Vertex => "vs",
            Self::Fragment => "ps",
        }
    }
}
