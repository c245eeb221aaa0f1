//! Background job tool: queue, list and cancel worker jobs.

use std::sync::Arc;

use async_trait::async_trait;
use hearth_core::context::ToolExecutionContext;
use hearth_core::error::ToolError;
use hearth_core::job::{Job, JobScheduler};
use hearth_core::tool::Tool;
use serde_json::{Value, json};

pub struct BackgroundJobTool {
    scheduler: Arc<dyn JobScheduler>,
}

impl BackgroundJobTool {
    pub fn new(scheduler: Arc<dyn JobScheduler>) -> Self {
        Self { scheduler }
    }

    fn summarize(job: &Job) -> Value {
        json!({
            "id": job.id,
            "worker": job.worker,
            "status": job.status,
            "created_at": job.created_at.to_rfc3339(),
            "error": job.error,
        })
    }
}

#[async_trait]
impl Tool for BackgroundJobTool {
    fn name(&self) -> &str {
        "background_job"
    }

    fn description(&self) -> &str {
        "Start a background job on a named worker, list jobs, or cancel a queued job."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["enqueue", "list", "cancel"]
                },
                "worker": {
                    "type": "string",
                    "description": "Worker name, required for enqueue"
                },
                "args": {
                    "type": "object",
                    "description": "Arguments passed to the worker"
                },
                "job_id": {
                    "type": "string",
                    "description": "Job ID, required for cancel"
                }
            },
            "required": ["action"]
        })
    }

    fn examples(&self) -> Vec<Value> {
        vec![
            json!({"action": "enqueue", "worker": "memory_compaction", "args": {"mode": "full"}}),
            json!({"action": "list"}),
        ]
    }

    async fn execute(&self, args: Value, ctx: &ToolExecutionContext) -> Result<Value, ToolError> {
        let action = args["action"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("missing 'action' argument".into()))?;

        match action {
            "enqueue" => {
                let worker = args["worker"].as_str().ok_or_else(|| {
                    ToolError::InvalidArguments("missing 'worker' argument".into())
                })?;
                let job_args = args.get("args").cloned().unwrap_or_else(|| json!({}));
                let job = self
                    .scheduler
                    .enqueue(worker, job_args, ctx.clone())
                    .await
                    .map_err(|e| ToolError::Failed(e.to_string()))?;
                Ok(json!({ "job": Self::summarize(&job) }))
            }
            "list" => {
                let jobs: Vec<Value> = self
                    .scheduler
                    .list_jobs()
                    .iter()
                    .map(Self::summarize)
                    .collect();
                Ok(json!({ "jobs": jobs }))
            }
            "cancel" => {
                let id = args["job_id"].as_str().ok_or_else(|| {
                    ToolError::InvalidArguments("missing 'job_id' argument".into())
                })?;
                let cancelled = self.scheduler.cancel_job(id).await;
                Ok(json!({ "job_id": id, "cancelled": cancelled }))
            }
            other => Err(ToolError::InvalidArguments(format!(
                "unknown action '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::error::WorkerError;
    use hearth_core::message::SourceDescriptor;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeScheduler {
        jobs: Mutex<Vec<Job>>,
    }

    #[async_trait]
    impl JobScheduler for FakeScheduler {
        async fn enqueue(
            &self,
            worker: &str,
            args: Value,
            ctx: ToolExecutionContext,
        ) -> Result<Job, WorkerError> {
            if worker != "memory_compaction" {
                return Err(WorkerError::UnknownWorker(worker.into()));
            }
            let job = Job::new(worker, args, ctx);
            self.jobs.lock().unwrap().push(job.clone());
            Ok(job)
        }

        fn list_jobs(&self) -> Vec<Job> {
            self.jobs.lock().unwrap().clone()
        }

        async fn cancel_job(&self, id: &str) -> bool {
            let mut jobs = self.jobs.lock().unwrap();
            let before = jobs.len();
            jobs.retain(|j| j.id != id);
            jobs.len() < before
        }
    }

    fn ctx() -> ToolExecutionContext {
        ToolExecutionContext::new("u1", "c1", SourceDescriptor::cli())
    }

    #[tokio::test]
    async fn enqueue_list_cancel() {
        let tool = BackgroundJobTool::new(Arc::new(FakeScheduler::default()));

        let out = tool
            .execute(json!({"action": "enqueue", "worker": "memory_compaction"}), &ctx())
            .await
            .unwrap();
        assert_eq!(out["job"]["status"], "queued");
        let id = out["job"]["id"].as_str().unwrap().to_string();

        let listed = tool.execute(json!({"action": "list"}), &ctx()).await.unwrap();
        assert_eq!(listed["jobs"].as_array().unwrap().len(), 1);

        let cancelled = tool
            .execute(json!({"action": "cancel", "job_id": id}), &ctx())
            .await
            .unwrap();
        assert_eq!(cancelled["cancelled"], true);
    }

    #[tokio::test]
    async fn unknown_worker_is_failure() {
        let tool = BackgroundJobTool::new(Arc::new(FakeScheduler::default()));
        let err = tool
            .execute(json!({"action": "enqueue", "worker": "nope"}), &ctx())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }
}
