//! Schema for the TOML definition document that enumerates base shaders
//! and their variations. Entries tolerate sparse markup: both a scalar
//! attribute form (`define = "X"`) and a list form (`defines = ["X", "Y"]`)
//! are accepted and merged in order, and a shader without a stage compiles
//! for both stages.
//!
//! Types:
//!
//! - `DefinitionDoc` is the parsed document root.
//! - `ShaderEntry` carries one base shader's name, stage selector, and
//!   ordered variation/option entries (order assigns activation-mask bits).
//! - `VariationEntry` mirrors one `[[shaders.variations]]` table and
//!   lowers into the pipeline's `VariationDef`.
//!
//! Functions:
//!
//! - `load_definition` reads and parses the document.
//! - `DefinitionDoc::validate` returns human-readable issues (dangling
//!   include/exclude references) so the caller can warn without aborting.
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use variants::{ShaderSpec, ShaderStage, VariationDef};

#[derive(Debug, Deserialize)]
pub struct DefinitionDoc {
    #[serde(default)]
    pub shaders: Vec<ShaderEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ShaderEntry {
    pub name: String,
    #[serde(default)]
    pub stage: StageSelector,
    #[serde(default)]
    pub variations: Vec<VariationEntry>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StageSelector {
    Vs,
    Ps,
    Both,
}

impl Default for StageSelector {
    fn default() -> Self {
        Self::Both
    }
}

impl StageSelector {
    pub fn stages(self) -> &'static [ShaderStage] {
        match self {
            Self::Vs => &[ShaderStage::Vertex],
            Self::Ps => &[ShaderStage::Fragment],
            Self::Both => &[ShaderStage::Vertex, ShaderStage::Fragment],
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Variation,
    Option,
}

impl Default for EntryKind {
    fn default() -> Self {
        Self::Variation
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct VariationEntry {
    /// Options commonly leave this empty; they then contribute no text to
    /// combination names.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: EntryKind,

    #[serde(default)]
    pub define: Option<String>,
    #[serde(default)]
    pub defines: Vec<String>,
    #[serde(default)]
    pub exclude: Option<String>,
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub include: Option<String>,
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub require: Option<String>,
    #[serde(default)]
    pub requires: Vec<String>,
}

fn merged(scalar: &Option<String>, list: &[String]) -> Vec<String> {
    let mut values: Vec<String> = Vec::with_capacity(list.len() + 1);
    if let Some(value) = scalar {
        values.push(value.clone());
    }
    values.extend(list.iter().cloned());
    values
}

impl VariationEntry {
    pub fn to_def(&self) -> VariationDef {
        let mut def = VariationDef::new(self.name.clone(), self.kind == EntryKind::Option);
        def.defines = merged(&self.define, &self.defines);
        def.excludes = merged(&self.exclude, &self.excludes);
        def.includes = merged(&self.include, &self.includes);
        def.requires = merged(&self.require, &self.requires);
        def
    }
}

impl ShaderEntry {
    /// Lowers this entry into one `ShaderSpec` per requested stage.
    pub fn specs(&self) -> Vec<ShaderSpec> {
        self.stage
            .stages()
            .iter()
            .map(|&stage| ShaderSpec {
                name: self.name.clone(),
                stage,
                variations: self.variations.iter().map(VariationEntry::to_def).collect(),
            })
            .collect()
    }
}

impl DefinitionDoc {
    /// Dangling include/exclude targets are silently ignored at resolution
    /// time, which usually means a typo in the definition; surface them.
    /// `require` targets may legitimately name defines, so they are not
    /// checked.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for shader in &self.shaders {
            let known: Vec<&str> = shader
                .variations
                .iter()
                .map(|entry| entry.name.as_str())
                .collect();
            for entry in &shader.variations {
                for target in merged(&entry.include, &entry.includes)
                    .iter()
                    .chain(merged(&entry.exclude, &entry.excludes).iter())
                {
                    if !known.contains(&target.as_str()) {
                        issues.push(format!(
                            "shader '{}': entry '{}' references undeclared variation '{}'",
                            shader.name, entry.name, target
                        ));
                    }
                }
            }
        }
        issues
    }
}

pub fn load_definition(path: &Path) -> Result<DefinitionDoc> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not open definition file {}", path.display()))?;
    let doc: DefinitionDoc = toml::from_str(&raw)
        .with_context(|| format!("could not parse definition file {}", path.display()))?;
    Ok(doc)
}
