//! External `fxc` backend. Each compilation writes the shared source text
//! into a scratch directory, invokes the compiler with the job's profile,
//! entry point, and defines, and reads back the object bytes plus the
//! assembly listing, whose register table becomes the job's declared
//! parameters. Failures surface the compiler's stderr verbatim as the
//! diagnostic string.
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;
use variants::{BackendCompiler, BackendOutput, CompileRequest, RawParameter};

/// Environment override for the compiler executable path.
const FXC_ENV: &str = "SHADERBATCH_FXC";

pub struct FxcBackend {
    compiler: PathBuf,
    /// Directory `#include` directives resolve against, i.e. where the
    /// definition file and HLSL sources live.
    include_dir: PathBuf,
}

impl FxcBackend {
    pub fn new(include_dir: PathBuf) -> Self {
        let compiler = env::var_os(FXC_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("fxc"));
        Self {
            compiler,
            include_dir,
        }
    }

    fn run(&self, request: &CompileRequest<'_>) -> Result<BackendOutput> {
        let scratch = tempfile::tempdir().context("could not create scratch directory")?;
        let source_path = scratch.path().join("input.hlsl");
        let object_path = scratch.path().join("output.bin");
        let listing_path = scratch.path().join("listing.txt");
        fs::write(&source_path, request.source).context("could not stage shader source")?;

        let mut command = Command::new(&self.compiler);
        command
            .arg("/nologo")
            .arg("/T")
            .arg(request.profile)
            .arg("/E")
            .arg(request.entry_point)
            .arg("/I")
            .arg(&self.include_dir)
            .arg("/Fo")
            .arg(&object_path)
            .arg("/Fc")
            .arg(&listing_path);
        // Prefer flow control over unrolling on the SM3 fragment profile.
        if request.profile == "ps_3_0" {
            command.arg("/Gfp");
        }
        for define in request.defines {
            command.arg("/D").arg(format!("{define}=1"));
        }
        command.arg(&source_path);

        debug!(compiler = %self.compiler.display(), profile = request.profile, "invoking backend compiler");
        let output = command
            .output()
            .with_context(|| format!("could not launch compiler {}", self.compiler.display()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{}", stderr.trim());
        }

        let bytecode = fs::read(&object_path).context("compiler produced no object file")?;
        let listing = fs::read_to_string(&listing_path).unwrap_or_default();
        Ok(BackendOutput {
            bytecode,
            parameters: parse_register_table(&listing),
        })
    }
}

impl BackendCompiler for FxcBackend {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<BackendOutput, String> {
        self.run(request)
            .map_err(|err| format!("{err:#}"))
            .and_then(|output| {
                if output.bytecode.is_empty() {
                    Err(anyhow!("compiler produced empty bytecode").to_string())
                } else {
                    Ok(output)
                }
            })
    }
}

/// Extracts the `// Registers:` table fxc prints into its assembly
/// listing. Rows look like:
///
/// ```text
/// // Registers:
/// //
/// //   Name          Reg   Size
/// //   ------------- ----- ----
/// //   cMatDiffColor c0       1
/// //   sDiffMap      s0       1
/// ```
///
/// The register index is the numeric part of the `Reg` column; the leading
/// class letter is dropped (the name's own marker byte classifies the
/// parameter later).
fn parse_register_table(listing: &str) -> Vec<RawParameter> {
    let mut parameters = Vec::new();
    let mut in_table = false;

    for line in listing.lines() {
        let Some(body) = line.strip_prefix("//") else {
            // The table lives entirely inside the leading comment block.
            if in_table {
                break;
            }
            continue;
        };
        let body = body.trim();

        if !in_table {
            in_table = body.starts_with("Registers:");
            continue;
        }
        if body.is_empty() || body.starts_with("Name") || body.starts_with('-') {
            continue;
        }

        let mut columns = body.split_whitespace();
        let (Some(name), Some(register)) = (columns.next(), columns.next()) else {
            break;
        };
        let Ok(index) = register.trim_start_matches(char::is_alphabetic).parse::<u32>() else {
            break;
        };
        parameters.push(RawParameter {
            name: name.to_string(),
            register: index,
        });
    }

    parameters
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
//
// Generated by Microsoft (R) HLSL Shader Compiler
//
// Parameters:
//
//   float4 cMatDiffColor;
//   sampler2D sDiffMap;
//
// Registers:
//
//   Name          Reg   Size
//   ------------- ----- ----
//   cMatDiffColor c0       1
//   cLightDir     c4       1
//   sDiffMap      s0       1
//
    ps_3_0
    def c5, 1, 0, 0, 0
";

    #[test]
    fn parses_register_rows() {
        let parameters = parse_register_table(LISTING);
        assert_eq!(
            parameters,
            vec![
                RawParameter {
                    name: "cMatDiffColor".into(),
                    register: 0,
                },
                RawParameter {
                    name: "cLightDir".into(),
                    register: 4,
                },
                RawParameter {
                    name: "sDiffMap".into(),
                    register: 0,
                },
            ]
        );
    }

    #[test]
    fn listing_without_table_yields_no_parameters() {
        assert!(parse_register_table("    ps_2_0\n    mov oC0, c0\n").is_empty());
    }
}
