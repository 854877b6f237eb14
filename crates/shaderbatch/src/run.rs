//! Orchestrates a whole batch run: parse the definition document, then for
//! every base shader and requested stage load the HLSL source once, resolve
//! the variation combinations, drain them through the worker pool, and pack
//! the validated batch into its output container. Any failure aborts the
//! run with a message naming the offending shader and variation.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use variants::{
    compile_batch, pack_batch, resolve_combinations, worker_count, BackendCompiler, ParamRegistry,
    ShaderModel, ShaderSpec, ShaderStage,
};

use crate::backend::FxcBackend;
use crate::cli::{self, Cli};
use crate::definition;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run(cli: Cli) -> Result<()> {
    let (model, global_defines) = cli::resolve_globals(&cli.defines);
    let doc = definition::load_definition(&cli.definition)?;
    for issue in doc.validate() {
        warn!("{issue}");
    }

    let in_dir = cli
        .definition
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .to_path_buf();
    let backend = FxcBackend::new(in_dir.clone());
    let workers = worker_count();

    for shader in &doc.shaders {
        for spec in shader.specs() {
            compile_base_shader(
                &spec,
                &in_dir,
                &cli.output_dir,
                model,
                &global_defines,
                &backend,
                workers,
            )?;
        }
    }

    Ok(())
}

fn compile_base_shader(
    spec: &ShaderSpec,
    in_dir: &Path,
    out_dir: &Path,
    model: ShaderModel,
    global_defines: &[String],
    backend: &dyn BackendCompiler,
    workers: usize,
) -> Result<()> {
    let source_path = in_dir.join(format!("{}.hlsl", spec.name));
    let source = fs::read_to_string(&source_path)
        .with_context(|| format!("could not open input file {}", source_path.display()))?;

    let jobs = resolve_combinations(spec, global_defines)?;
    info!(
        shader = %spec.name,
        stage = ?spec.stage,
        combinations = jobs.len(),
        "resolved shader variations"
    );

    let jobs = compile_batch(jobs, &source, global_defines, model, backend, workers);
    for job in &jobs {
        if let Some(diagnostic) = &job.error {
            bail!(
                "failed to compile shader {}_{}: {}",
                spec.name,
                job.name,
                diagnostic
            );
        }
    }

    let registry = ParamRegistry::merge_jobs(&jobs);
    let out_path = output_path(out_dir, in_dir, &spec.name, spec.stage, model);
    pack_batch(&out_path, spec.stage, model, &registry, &jobs, true)
        .with_context(|| format!("could not write output file {}", out_path.display()))?;
    info!(
        path = %out_path.display(),
        jobs = jobs.len(),
        constants = registry.constants.len(),
        texture_units = registry.texture_units.len(),
        "packed shader container"
    );

    Ok(())
}

/// `<out_dir>/<relative definition dir>/<name>.{vs|ps}{2|3}`. An absolute
/// definition directory does not get mirrored; those containers land
/// directly in the output directory.
fn output_path(
    out_dir: &Path,
    in_dir: &Path,
    name: &str,
    stage: ShaderStage,
    model: ShaderModel,
) -> PathBuf {
    let file_name = format!("{name}.{}{}", stage.suffix(), model.tier());
    let rel: &Path = if in_dir.is_absolute() {
        Path::new("")
    } else {
        in_dir
    };
    out_dir.join(rel).join(file_name)
}
