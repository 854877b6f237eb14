//! Bounded concurrent compilation of a resolved job batch.
//!
//! The queue is a mutex-guarded deque shared by scoped worker threads;
//! workers pop under the lock, release it, and only then invoke the backend
//! compiler. The first backend failure raises a shared flag and later pops
//! drain the queue without compiling, so in-flight work finishes but no new
//! backend invocation starts. Finished jobs land in a slot vector indexed by
//! resolution order, which is what the packer iterates afterwards.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::{debug, info};

use crate::backend::{BackendCompiler, CompileRequest, ShaderModel};
use crate::registry::{classify_parameter, ParamKind};
use crate::spec::CompileJob;

/// Worker count for a compilation pass: every core but one, so the host
/// machine stays responsive during large batches.
pub fn worker_count() -> usize {
    let cores = thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1);
    cores.saturating_sub(1).max(1)
}

/// Compiles every job in the batch, each claimed by exactly one worker.
///
/// Returns the jobs in their original resolution order, each in a terminal
/// state: bytecode and discovered parameters on success, a backend
/// diagnostic in `error` on failure, or untouched if the batch failed
/// before the job was claimed. The caller decides whether the batch as a
/// whole survived by scanning for errors.
pub fn compile_batch(
    jobs: Vec<CompileJob>,
    source: &str,
    global_defines: &[String],
    model: ShaderModel,
    backend: &dyn BackendCompiler,
    workers: usize,
) -> Vec<CompileJob> {
    let total = jobs.len();
    let queue: Mutex<VecDeque<(usize, CompileJob)>> =
        Mutex::new(jobs.into_iter().enumerate().collect());
    let finished: Mutex<Vec<Option<CompileJob>>> = Mutex::new((0..total).map(|_| None).collect());
    let failed = AtomicBool::new(false);

    let workers = workers.max(1);
    debug!(jobs = total, workers, "starting compilation pass");

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let claimed = relock(&queue).pop_front();
                let Some((index, mut job)) = claimed else {
                    return;
                };

                if failed.load(Ordering::SeqCst) {
                    // Batch already failed; record the job uncompiled so the
                    // slot vector stays complete, then keep draining.
                    relock(&finished)[index] = Some(job);
                    continue;
                }

                if job.name.is_empty() {
                    info!("compiling base shader variation");
                } else {
                    info!(variation = %job.name, "compiling shader variation");
                }

                run_job(&mut job, source, global_defines, model, backend);
                if job.error.is_some() {
                    failed.store(true, Ordering::SeqCst);
                }
                relock(&finished)[index] = Some(job);
            });
        }
    });

    finished
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .into_iter()
        .flatten()
        .collect()
}

/// A poisoned lock means a sibling worker panicked; the panic propagates
/// out of the thread scope anyway, so the guard itself is still usable.
fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn run_job(
    job: &mut CompileJob,
    source: &str,
    global_defines: &[String],
    model: ShaderModel,
    backend: &dyn BackendCompiler,
) {
    let mut defines = job.defines.clone();
    defines.extend(global_defines.iter().cloned());

    let request = CompileRequest {
        stage: job.stage,
        entry_point: job.stage.entry_point(),
        profile: model.profile(job.stage),
        defines: &defines,
        source,
    };

    match backend.compile(&request) {
        Ok(output) => {
            job.bytecode = output.bytecode;
            for raw in &output.parameters {
                match classify_parameter(&raw.name, raw.register) {
                    Some((ParamKind::Constant, parameter)) => {
                        job.constants.insert(parameter);
                    }
                    Some((ParamKind::TextureUnit, parameter)) => {
                        job.texture_units.insert(parameter);
                    }
                    None => {}
                }
            }
        }
        Err(diagnostic) => job.error = Some(diagnostic),
    }
}
