// 全ジョブ実行: ジョブ単位でrayonのスレッドプールに分配する

use rayon::prelude::*;

use crate::error::MaskError;
use crate::pipeline::job_runner::{JobConfig, JobContext, JobResult, run_job};

/// Run multiple jobs, collecting results in input order.
/// One job failure does NOT prevent other jobs from running.
///
/// `workers == 0` uses rayon's default thread count.
pub fn run_all_jobs(
    jobs: &[JobConfig],
    ctx: &JobContext,
    workers: usize,
) -> crate::error::Result<Vec<crate::error::Result<JobResult>>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| MaskError::config(format!("failed to build worker pool: {e}")))?;

    Ok(pool.install(|| jobs.par_iter().map(|job| run_job(job, ctx)).collect()))
}
