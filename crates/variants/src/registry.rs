//! Shader parameters discovered from compiled variations and the
//! per-base-shader registry that turns them into the shared index tables
//! written once per output container.
//!
//! Types:
//!
//! - `Parameter` is a `(name, register)` pair ordered by register first and
//!   name second so `BTreeSet` storage yields deterministic, deduplicated
//!   tables.
//! - `ParamRegistry` accumulates every job's constants and texture units
//!   after the worker pool joins; the packer freezes it into the global
//!   tables.
//!
//! Functions:
//!
//! - `classify_parameter` maps a backend-reported name to constant or
//!   texture-unit kind via the leading marker byte, dropping reserved
//!   render-target samplers the engine never exposes.
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::spec::CompileJob;

/// Marker substring of sampler names bound to internal render targets;
/// these are wired up by the engine, not exposed as material parameters.
const RESERVED_SAMPLER_MARKER: &str = "Buffer";

/// Leading byte of a sampler parameter name in the backend's table.
const SAMPLER_MARKER: char = 's';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub register: u32,
}

impl Parameter {
    pub fn new(name: impl Into<String>, register: u32) -> Self {
        Self {
            name: name.into(),
            register,
        }
    }
}

impl Ord for Parameter {
    fn cmp(&self, other: &Self) -> Ordering {
        self.register
            .cmp(&other.register)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for Parameter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Constant,
    TextureUnit,
}

/// Classifies a backend constant-table entry and strips its type marker.
///
/// Names carry a one-byte hungarian marker (`sDiffMap`, `cMatDiffColor`);
/// the marker decides sampler versus scalar constant and is not part of the
/// exposed parameter name. Returns `None` for empty names and for reserved
/// render-target samplers.
pub fn classify_parameter(name: &str, register: u32) -> Option<(ParamKind, Parameter)> {
    let mut chars = name.chars();
    let marker = chars.next()?;
    let stripped: String = chars.collect();

    if marker == SAMPLER_MARKER {
        if stripped.contains(RESERVED_SAMPLER_MARKER) {
            return None;
        }
        Some((ParamKind::TextureUnit, Parameter::new(stripped, register)))
    } else {
        Some((ParamKind::Constant, Parameter::new(stripped, register)))
    }
}

/// Deduplicated accumulation of every parameter discovered across all
/// variations of one base shader. Reset per batch, frozen for packing.
#[derive(Debug, Clone, Default)]
pub struct ParamRegistry {
    pub constants: BTreeSet<Parameter>,
    pub texture_units: BTreeSet<Parameter>,
}

impl ParamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one job's discovered parameters into the registry.
    pub fn absorb(&mut self, job: &CompileJob) {
        self.constants.extend(job.constants.iter().cloned());
        self.texture_units.extend(job.texture_units.iter().cloned());
    }

    /// Single-threaded reduction over a finished batch. Running this after
    /// the pool joins keeps the registry lock-free.
    pub fn merge_jobs<'a>(jobs: impl IntoIterator<Item = &'a CompileJob>) -> Self {
        let mut registry = Self::new();
        for job in jobs {
            registry.absorb(job);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ShaderStage;

    #[test]
    fn parameters_order_by_register_then_name() {
        let mut set = BTreeSet::new();
        set.insert(Parameter::new("Zeta", 0));
        set.insert(Parameter::new("Alpha", 2));
        set.insert(Parameter::new("Alpha", 0));

        let ordered: Vec<_> = set.iter().map(|p| (p.name.as_str(), p.register)).collect();
        assert_eq!(ordered, vec![("Alpha", 0), ("Zeta", 0), ("Alpha", 2)]);
    }

    #[test]
    fn classifies_constants_and_samplers() {
        let (kind, param) = classify_parameter("cMatDiffColor", 3).unwrap();
        assert_eq!(kind, ParamKind::Constant);
        assert_eq!(param, Parameter::new("MatDiffColor", 3));

        let (kind, param) = classify_parameter("sDiffMap", 0).unwrap();
        assert_eq!(kind, ParamKind::TextureUnit);
        assert_eq!(param, Parameter::new("DiffMap", 0));
    }

    #[test]
    fn skips_reserved_render_target_samplers() {
        assert!(classify_parameter("sNormalBuffer", 1).is_none());
        assert!(classify_parameter("", 0).is_none());
    }

    #[test]
    fn registry_dedups_across_jobs() {
        let mut first = CompileJob::new(ShaderStage::Vertex, "A".into(), Vec::new());
        let mut second = CompileJob::new(ShaderStage::Vertex, "B".into(), Vec::new());
        first.constants.insert(Parameter::new("Model", 0));
        second.constants.insert(Parameter::new("Model", 0));
        second.constants.insert(Parameter::new("ViewProj", 4));
        first.texture_units.insert(Parameter::new("DiffMap", 0));
        second.texture_units.insert(Parameter::new("DiffMap", 0));

        let registry = ParamRegistry::merge_jobs([&first, &second]);
        assert_eq!(registry.constants.len(), 2);
        assert_eq!(registry.texture_units.len(), 1);
    }
}
