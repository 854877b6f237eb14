//! In-memory description of a base shader and the mutable per-combination
//! compile job that flows through the pipeline. `VariationDef` and
//! `ShaderSpec` are immutable once loaded from the definition document;
//! `CompileJob` is created by the resolver, mutated by exactly one worker,
//! and read by the packer afterwards.
use std::collections::BTreeSet;

use crate::registry::Parameter;
use crate::ShaderStage;

/// One named variation or option of a base shader.
///
/// A *variation* is mutually exclusive with every other variation: at most
/// one may be active per combination. An *option* toggles freely and may
/// combine with anything. Each definition occupies one bit of the 32-bit
/// activation mask, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct VariationDef {
    pub name: String,
    pub is_option: bool,
    pub defines: Vec<String>,
    pub excludes: Vec<String>,
    pub includes: Vec<String>,
    pub requires: Vec<String>,
}

impl VariationDef {
    pub fn new(name: impl Into<String>, is_option: bool) -> Self {
        Self {
            name: name.into(),
            is_option,
            ..Self::default()
        }
    }
}

/// A base shader for one pipeline stage, with its declared variations.
#[derive(Debug, Clone)]
pub struct ShaderSpec {
    pub name: String,
    pub stage: ShaderStage,
    pub variations: Vec<VariationDef>,
}

impl ShaderSpec {
    pub fn new(name: impl Into<String>, stage: ShaderStage) -> Self {
        Self {
            name: name.into(),
            stage,
            variations: Vec::new(),
        }
    }
}

/// One resolved combination awaiting (or holding the result of)
/// compilation. `name` concatenates the active entries' names in
/// declaration order; `defines` is the union of their define lists.
#[derive(Debug, Clone)]
pub struct CompileJob {
    pub stage: ShaderStage,
    pub name: String,
    pub defines: Vec<String>,
    pub bytecode: Vec<u8>,
    pub constants: BTreeSet<Parameter>,
    pub texture_units: BTreeSet<Parameter>,
    pub error: Option<String>,
}

impl CompileJob {
    pub fn new(stage: ShaderStage, name: String, defines: Vec<String>) -> Self {
        Self {
            stage,
            name,
            defines,
            bytecode: Vec::new(),
            constants: BTreeSet::new(),
            texture_units: BTreeSet::new(),
            error: None,
        }
    }
}
