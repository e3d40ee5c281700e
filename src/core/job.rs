use std::time::{Duration, Instant};

use log::info;
use uuid::Uuid;

use crate::BatchError;

use super::{
    build_name,
    step::{Step, StepExecution},
};

/// Type alias for job execution results.
type JobResult<T> = Result<T, BatchError>;

/// Represents a job that can be executed.
///
/// A job is a container for a sequence of steps executed in order. The first
/// failing step aborts the job.
pub trait Job {
    /// Runs the job and returns the result of the job execution.
    ///
    /// # Returns
    /// - `Ok(JobExecution)` when every step succeeded
    /// - `Err(BatchError::Step)` naming the first step that failed
    fn run(&self) -> JobResult<JobExecution>;
}

/// Timing information and step details of a successful job run.
#[derive(Debug)]
pub struct JobExecution {
    /// The time when the job started executing
    pub start: Instant,
    /// The time when the job finished executing
    pub end: Instant,
    /// The total duration of the job execution
    pub duration: Duration,
    /// Executions of the job's steps, in run order
    pub step_executions: Vec<StepExecution>,
}

/// A configured job: an id, a name and the steps to run.
pub struct JobInstance<'a> {
    /// Unique identifier for this job instance
    id: Uuid,
    /// Human-readable name for the job
    name: String,
    /// Collection of steps that make up this job, in execution order
    steps: Vec<&'a dyn Step>,
}

impl JobInstance<'_> {
    /// Returns the job name, generated when none was given to the builder.
    pub fn get_name(&self) -> &str {
        &self.name
    }
}

impl Job for JobInstance<'_> {
    fn run(&self) -> JobResult<JobExecution> {
        let start = Instant::now();

        info!("Start of job: {}, id: {}", self.name, self.id);

        let mut step_executions = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let mut step_execution = StepExecution::new(step.get_name());
            let result = step.execute(&mut step_execution);

            if result.is_err() {
                info!(
                    "Job {} aborted at step {} ({:?})",
                    self.name, step_execution.name, step_execution.status
                );
                return Err(BatchError::Step(step.get_name().to_owned()));
            }

            step_executions.push(step_execution);
        }

        info!("End of job: {}, id: {}", self.name, self.id);

        Ok(JobExecution {
            start,
            end: Instant::now(),
            duration: start.elapsed(),
            step_executions,
        })
    }
}

/// Builder for creating a job instance.
///
/// ```rust,ignore
/// let job = JobBuilder::new()
///     .name("socket-close-job".to_string())
///     .start(&read_step)
///     .next(&report_step)
///     .build();
/// ```
#[derive(Default)]
pub struct JobBuilder<'a> {
    /// Optional name for the job (generated randomly if not specified)
    name: Option<String>,
    /// Collection of steps to be executed, in order
    steps: Vec<&'a dyn Step>,
}

impl<'a> JobBuilder<'a> {
    /// Creates a builder with no name and no steps.
    pub fn new() -> Self {
        Self {
            name: None,
            steps: Vec::new(),
        }
    }

    /// Sets the name of the job, used in every job log line.
    ///
    /// # Arguments
    ///
    /// * `name` - The job name
    ///
    /// # Examples
    ///
    /// ```
    /// use paging_batch_rs::core::job::JobBuilder;
    ///
    /// let job = JobBuilder::new().name("socket-close".to_string()).build();
    ///
    /// assert_eq!(job.get_name(), "socket-close");
    /// ```
    pub fn name(mut self, name: String) -> JobBuilder<'a> {
        self.name = Some(name);
        self
    }

    /// Sets the first step of the job.
    ///
    /// Same as `next()`, reads better for the initial step.
    ///
    /// # Arguments
    ///
    /// * `step` - The step to run first
    pub fn start(mut self, step: &'a dyn Step) -> JobBuilder<'a> {
        self.steps.push(step);
        self
    }

    /// Adds a step to the job. Steps run in the order they are added.
    ///
    /// # Arguments
    ///
    /// * `step` - The step to run after the ones already added
    pub fn next(mut self, step: &'a dyn Step) -> JobBuilder<'a> {
        self.steps.push(step);
        self
    }

    /// Builds the job. A random name is generated if none was provided.
    pub fn build(self) -> JobInstance<'a> {
        JobInstance {
            id: Uuid::new_v4(),
            name: self.name.unwrap_or_else(build_name),
            steps: self.steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::core::step::StepStatus;

    struct FixedStep {
        name: &'static str,
        succeed: bool,
        runs: Cell<usize>,
    }

    impl FixedStep {
        fn new(name: &'static str, succeed: bool) -> Self {
            Self {
                name,
                succeed,
                runs: Cell::new(0),
            }
        }
    }

    impl Step for FixedStep {
        fn get_name(&self) -> &str {
            self.name
        }

        fn execute(&self, step_execution: &mut StepExecution) -> Result<(), BatchError> {
            self.runs.set(self.runs.get() + 1);
            if self.succeed {
                step_execution.status = StepStatus::Success;
                Ok(())
            } else {
                step_execution.status = StepStatus::ReadError;
                Err(BatchError::Step(self.name.to_string()))
            }
        }
    }

    #[test]
    fn should_run_steps_in_order() {
        let first = FixedStep::new("first", true);
        let second = FixedStep::new("second", true);

        let job = JobBuilder::new()
            .name("ordered".to_string())
            .start(&first)
            .next(&second)
            .build();

        let execution = job.run().unwrap();

        assert_eq!(job.get_name(), "ordered");
        let names: Vec<&str> = execution
            .step_executions
            .iter()
            .map(|step| step.name.as_str())
            .collect();
        assert_eq!(names, vec!["first", "second"]);
        assert!(execution.start <= execution.end);
    }

    #[test]
    fn should_stop_at_first_failed_step() {
        let failing = FixedStep::new("failing", false);
        let skipped = FixedStep::new("skipped", true);

        let job = JobBuilder::new().start(&failing).next(&skipped).build();

        let result = job.run();

        assert_eq!(result.unwrap_err(), BatchError::Step("failing".to_string()));
        assert_eq!(failing.runs.get(), 1);
        assert_eq!(skipped.runs.get(), 0);
        assert_eq!(job.get_name().len(), 8);
    }
}
