//! Execution engine - runs a stage on a bounded worker pool

use crate::context::ProgressCallback;
use crate::error::ProvisionError;
use crate::provisioner::{BoxedProvisioner, Provisioner};
use crate::stage::Stage;
use crate::types::{ExecuteOptions, ProvisionResult, Provisioned};
use anyhow::Result;
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Provision,
    Lookup,
}

/// Execute one stage and return one result per provisioner
///
/// Active provisioners run first, then lookup-only ones. Within each group
/// results keep the order the provisioners were pushed in. A failing or
/// panicking provisioner yields a failed result; the stage always finishes.
///
/// # Arguments
/// * `stage` - The stage to run
/// * `ctx` - Shared installation context
/// * `opts` - Execution options (dry_run, jobs)
/// * `progress` - Progress callback
pub fn execute_stage<C, P>(
    stage: &Stage<C>,
    ctx: &C,
    opts: &ExecuteOptions,
    progress: &mut P,
) -> Result<Vec<ProvisionResult>>
where
    C: Sync + ?Sized,
    P: ProgressCallback,
{
    let mut results = Vec::with_capacity(stage.total());
    if stage.is_empty() {
        return Ok(results);
    }

    progress.on_stage_start(&stage.name, stage.total());

    let mode = if opts.dry_run {
        Mode::Lookup
    } else {
        Mode::Provision
    };
    results.extend(execute_batch(&stage.active, ctx, mode, opts.jobs, progress)?);
    results.extend(execute_batch(
        &stage.lookup_only,
        ctx,
        Mode::Lookup,
        opts.jobs,
        progress,
    )?);

    progress.on_stage_complete(&stage.name);
    Ok(results)
}

/// Execute a batch of provisioners
fn execute_batch<C, P>(
    provisioners: &[BoxedProvisioner<C>],
    ctx: &C,
    mode: Mode,
    jobs: usize,
    progress: &mut P,
) -> Result<Vec<ProvisionResult>>
where
    C: Sync + ?Sized,
    P: ProgressCallback,
{
    if jobs <= 1 || provisioners.len() <= 1 {
        // Sequential execution
        let mut results = Vec::with_capacity(provisioners.len());
        for provisioner in provisioners {
            progress.on_resource_start(
                provisioner.kind(),
                &provisioner.logical_id(),
                &provisioner.description(),
            );
            let result = run_one(provisioner.as_ref(), ctx, mode);
            progress.on_resource_complete(&result);
            results.push(result);
        }
        return Ok(results);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create thread pool: {e}"))?;

    // Progress callbacks are not thread-safe: every start is reported
    // before the pool runs, completions after the join.
    for provisioner in provisioners {
        progress.on_resource_start(
            provisioner.kind(),
            &provisioner.logical_id(),
            &provisioner.description(),
        );
    }
    let results: Vec<ProvisionResult> = pool.install(|| {
        provisioners
            .par_iter()
            .map(|provisioner| run_one(provisioner.as_ref(), ctx, mode))
            .collect()
    });

    for result in &results {
        progress.on_resource_complete(result);
    }

    Ok(results)
}

/// Run a single provisioner, converting errors and panics into failed results
fn run_one<C: ?Sized>(provisioner: &dyn Provisioner<C>, ctx: &C, mode: Mode) -> ProvisionResult {
    let kind = provisioner.kind();
    let id = provisioner.logical_id();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match mode {
        Mode::Provision => provisioner.provision(ctx),
        Mode::Lookup => provisioner.lookup(ctx).map(|found| match found {
            Some(uid) => Provisioned::reused(uid).meta("lookup_only", "true"),
            None => Provisioned::skipped("not selected and no existing resource found"),
        }),
    }))
    .unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(ProvisionError::new(format!("provisioner panicked: {reason}")))
    });

    if let Err(err) = &outcome {
        log::warn!("{kind} '{id}' failed: {err}");
    }

    ProvisionResult::from_outcome(kind, id, outcome)
}
