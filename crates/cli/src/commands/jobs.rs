//! `hearth jobs`: registered workers and this process's jobs.

use hearth::Runtime;
use hearth_config::AppConfig;

pub async fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::build(config).await?;

    println!("Workers");
    for worker in runtime.workers.workers() {
        println!(
            "  {:<20} category={} priority={:?} retries={}",
            worker.name, worker.category, worker.priority, worker.max_retries
        );
    }

    let jobs = runtime.workers.list_jobs();
    println!();
    if jobs.is_empty() {
        println!("No jobs. Jobs live only as long as the process that queued them.");
        return Ok(());
    }
    println!("Jobs");
    for job in jobs {
        println!(
            "  {}  {:<20} {:<9} {}",
            job.id,
            job.worker,
            job.status,
            job.error.as_deref().unwrap_or("")
        );
    }
    Ok(())
}
