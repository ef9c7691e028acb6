//! Cron job scheduling.
//!
//! Wraps `tokio_cron_scheduler` behind [`JobSchedulerTrait`] so the services that register jobs
//! can be driven by a different scheduler in tests.

use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, instrument};

use crate::{
	services::blockchain::ConnectionPool,
	utils::logging::error::{ErrorContext, TraceableError},
};

/// Errors raised while registering jobs
#[derive(Debug, Error)]
pub enum SchedulerError {
	#[error("Scheduler error: {0}")]
	SchedulerError(Box<ErrorContext>),
}

impl SchedulerError {
	pub fn scheduler_error(
		msg: impl Into<String>,
		source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
		metadata: Option<HashMap<String, String>>,
	) -> Self {
		Self::SchedulerError(Box::new(ErrorContext::new_with_log(msg, source, metadata)))
	}
}

impl TraceableError for SchedulerError {
	fn trace_id(&self) -> String {
		match self {
			Self::SchedulerError(context) => context.trace_id.clone(),
		}
	}
}

/// Trait for job scheduler
///
/// This trait is used to abstract the job scheduler implementation.
#[async_trait::async_trait]
pub trait JobSchedulerTrait: Send + Sync + Sized {
	async fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>>;
	async fn add(&self, job: Job) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
	async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
	async fn shutdown(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Implementation of the job scheduler trait for the JobScheduler struct
#[async_trait::async_trait]
impl JobSchedulerTrait for JobScheduler {
	async fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
		Self::new().await.map_err(Into::into)
	}

	async fn add(&self, job: Job) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
		self.add(job).await.map(|_| ()).map_err(Into::into)
	}

	async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
		self.start().await.map(|_| ()).map_err(Into::into)
	}

	async fn shutdown(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
		self.shutdown().await.map(|_| ()).map_err(Into::into)
	}
}

/// Registers the periodic re-probe that moves the pool back to a higher priority endpoint.
///
/// # Arguments
/// * `scheduler` - Scheduler the job is added to
/// * `pool` - Pool to re-probe
/// * `cron_schedule` - Six or seven field cron expression
///
/// # Returns
/// * `Result<(), SchedulerError>` - Error if the schedule is invalid or the job cannot be added
#[instrument(skip(scheduler, pool))]
pub async fn schedule_reprobe<J: JobSchedulerTrait>(
	scheduler: &J,
	pool: Arc<ConnectionPool>,
	cron_schedule: &str,
) -> Result<(), SchedulerError> {
	let metadata = || {
		Some(HashMap::from([(
			"cron_schedule".to_string(),
			cron_schedule.to_string(),
		)]))
	};

	let job = Job::new_async(cron_schedule, move |_uuid, _l| {
		let pool = pool.clone();
		Box::pin(async move {
			debug!("Re-probing upstream endpoints");
			pool.reprobe().await;
		})
	})
	.map_err(|e| {
		SchedulerError::scheduler_error(
			"Invalid re-probe schedule",
			Some(Box::new(e)),
			metadata(),
		)
	})?;

	scheduler.add(job).await.map_err(|e| {
		SchedulerError::scheduler_error("Failed to schedule re-probe", Some(e), metadata())
	})
}
