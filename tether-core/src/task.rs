// ABOUTME: Agent task model and the lifecycle state machine that derives it from events.
// ABOUTME: pending -> planning -> executing -> {completed, failed}; terminal states absorb.

use crate::error::{SessionError, SessionResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Planning,
    Executing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Planning => "planning",
            TaskStatus::Executing => "executing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Parse the status the backend reports on its own task objects
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(TaskStatus::Pending),
            "planning" => Some(TaskStatus::Planning),
            "executing" | "running" | "awaiting_input" => Some(TaskStatus::Executing),
            "completed" | "done" => Some(TaskStatus::Completed),
            "failed" | "error" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl StepStatus {
    /// Parse a wire status, accepting the spellings backends actually send
    pub fn from_wire(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "planning" | "queued" => Some(StepStatus::Pending),
            "executing" | "running" | "in_progress" | "started" => Some(StepStatus::Executing),
            "completed" | "done" | "success" => Some(StepStatus::Completed),
            "failed" | "error" => Some(StepStatus::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Executing => "executing",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub description: String,
    pub status: StepStatus,
}

impl PlanStep {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            status: StepStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    /// Fixed order, set once at planning time
    pub steps: Vec<PlanStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failed because the operator's stop was acknowledged
    #[serde(default)]
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl AgentTask {
    fn new(id: String, description: String, steps: Vec<PlanStep>) -> Self {
        Self {
            id,
            description,
            status: TaskStatus::Pending,
            steps,
            output: None,
            error: None,
            cancelled: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// (completed, total) step counts for progress display
    pub fn progress(&self) -> (usize, usize) {
        let done = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        (done, self.steps.len())
    }

    fn transition(&mut self, to: TaskStatus) -> Applied {
        let from = self.status;
        self.status = to;
        if to.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        tracing::debug!(task_id = %self.id, from = %from, to = %to, "Task transition");
        Applied::Transitioned { from, to }
    }
}

/// Lifecycle events the router extracts from the channel
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Started {
        task_id: String,
        description: String,
        steps: Vec<PlanStep>,
    },
    PlanReady {
        task_id: Option<String>,
        steps: Vec<PlanStep>,
    },
    Completed {
        task_id: Option<String>,
        output: Option<String>,
        /// Status carried on the backend's own task object, if it sent one
        reported: Option<TaskStatus>,
    },
    Failed {
        task_id: Option<String>,
        error: Option<String>,
    },
    /// Backend confirmed the operator's stop request
    StopAcknowledged { task_id: Option<String> },
}

impl TaskEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::Started { .. } => "task_started",
            TaskEvent::PlanReady { .. } => "plan_ready",
            TaskEvent::Completed { .. } => "task_completed",
            TaskEvent::Failed { .. } => "task_failed",
            TaskEvent::StopAcknowledged { .. } => "task_stopped",
        }
    }

    fn task_id(&self) -> Option<&str> {
        match self {
            TaskEvent::Started { task_id, .. } => Some(task_id),
            TaskEvent::PlanReady { task_id, .. }
            | TaskEvent::Completed { task_id, .. }
            | TaskEvent::Failed { task_id, .. }
            | TaskEvent::StopAcknowledged { task_id } => task_id.as_deref(),
        }
    }
}

/// A status change for one plan step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepUpdate {
    pub task_id: Option<String>,
    pub step_id: String,
    pub status: StepStatus,
}

/// Why an event left the task untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NoTask,
    /// Event names a different task than the current one
    StaleTask,
    /// Task already completed or failed
    Terminal,
    /// Event not valid from the current state
    InvalidTransition,
    UnknownStep,
}

/// Result of feeding one event to the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// A new task replaced whatever was there
    Replaced,
    Transitioned { from: TaskStatus, to: TaskStatus },
    StepChanged { step_id: String, status: StepStatus },
    Ignored(IgnoreReason),
}

impl Applied {
    pub fn changed(&self) -> bool {
        !matches!(self, Applied::Ignored(_))
    }
}

/// Derives the current AgentTask from lifecycle and plan-step events.
///
/// Holds at most one task. Completed and failed are absorbing for a given
/// task id; only a `Started` event for a different id replaces the task.
#[derive(Debug, Default)]
pub struct TaskStateMachine {
    task: Option<AgentTask>,
}

impl TaskStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&AgentTask> {
        self.task.as_ref()
    }

    /// Err if a non-terminal task exists, i.e. a new one must not be started
    pub fn ensure_idle(&self) -> SessionResult<()> {
        match &self.task {
            Some(task) if !task.status.is_terminal() => Err(SessionError::TaskInProgress {
                task_id: task.id.clone(),
                status: task.status.to_string(),
            }),
            _ => Ok(()),
        }
    }

    pub fn apply(&mut self, event: TaskEvent) -> Applied {
        let name = event.name();

        if let TaskEvent::Started {
            task_id,
            description,
            steps,
        } = event
        {
            return self.start(task_id, description, steps);
        }

        let task = match self.target(event.task_id()) {
            Ok(task) => task,
            Err(reason) => {
                tracing::debug!(event = name, reason = ?reason, "Ignoring lifecycle event");
                return Applied::Ignored(reason);
            }
        };

        if task.status.is_terminal() {
            tracing::warn!(
                task_id = %task.id,
                status = %task.status,
                event = name,
                "Unexpected lifecycle event for finished task"
            );
            return Applied::Ignored(IgnoreReason::Terminal);
        }

        match (task.status, event) {
            (TaskStatus::Planning, TaskEvent::PlanReady { steps, .. }) => {
                if !steps.is_empty() {
                    task.steps = steps;
                }
                task.transition(TaskStatus::Executing)
            }
            // Backends that never announce a plan finish straight from planning;
            // only trusted when their own task object says completed.
            (
                TaskStatus::Planning,
                TaskEvent::Completed {
                    output,
                    reported: Some(TaskStatus::Completed),
                    ..
                },
            ) => {
                task.transition(TaskStatus::Executing);
                task.output = output;
                task.transition(TaskStatus::Completed);
                Applied::Transitioned {
                    from: TaskStatus::Planning,
                    to: TaskStatus::Completed,
                }
            }
            (TaskStatus::Executing, TaskEvent::Completed { output, .. }) => {
                task.output = output;
                task.transition(TaskStatus::Completed)
            }
            (TaskStatus::Planning | TaskStatus::Executing, TaskEvent::Failed { error, .. }) => {
                task.error = error;
                task.transition(TaskStatus::Failed)
            }
            (_, TaskEvent::StopAcknowledged { .. }) => {
                task.cancelled = true;
                task.error.get_or_insert_with(|| "stopped by operator".to_string());
                task.transition(TaskStatus::Failed)
            }
            (status, _) => {
                tracing::warn!(
                    task_id = %task.id,
                    status = %status,
                    event = name,
                    "Lifecycle event not valid from current state"
                );
                Applied::Ignored(IgnoreReason::InvalidTransition)
            }
        }
    }

    pub fn apply_step(&mut self, update: StepUpdate) -> Applied {
        let task = match self.target(update.task_id.as_deref()) {
            Ok(task) => task,
            Err(reason) => {
                tracing::debug!(step_id = %update.step_id, reason = ?reason, "Ignoring step update");
                return Applied::Ignored(reason);
            }
        };

        if task.status.is_terminal() {
            tracing::debug!(
                task_id = %task.id,
                step_id = %update.step_id,
                "Ignoring step update for finished task"
            );
            return Applied::Ignored(IgnoreReason::Terminal);
        }

        match task.steps.iter_mut().find(|s| s.id == update.step_id) {
            Some(step) => {
                step.status = update.status;
                Applied::StepChanged {
                    step_id: update.step_id,
                    status: update.status,
                }
            }
            None => {
                tracing::warn!(
                    task_id = %task.id,
                    step_id = %update.step_id,
                    "Step update for unknown step (stale event?)"
                );
                Applied::Ignored(IgnoreReason::UnknownStep)
            }
        }
    }

    fn start(&mut self, task_id: String, description: String, steps: Vec<PlanStep>) -> Applied {
        if let Some(task) = self.task.as_ref().filter(|t| t.id == task_id) {
            tracing::warn!(
                task_id = %task.id,
                status = %task.status,
                "Duplicate task_started ignored"
            );
            let reason = if task.status.is_terminal() {
                IgnoreReason::Terminal
            } else {
                IgnoreReason::InvalidTransition
            };
            return Applied::Ignored(reason);
        }

        if let Some(previous) = self.task.as_ref().filter(|t| !t.status.is_terminal()) {
            tracing::warn!(
                previous = %previous.id,
                status = %previous.status,
                next = %task_id,
                "Replacing unfinished task"
            );
        }

        let mut task = AgentTask::new(task_id, description, steps);
        task.transition(TaskStatus::Planning);
        tracing::info!(task_id = %task.id, steps = task.steps.len(), "Task started");
        self.task = Some(task);
        Applied::Replaced
    }

    fn target(&mut self, task_id: Option<&str>) -> Result<&mut AgentTask, IgnoreReason> {
        let task = self.task.as_mut().ok_or(IgnoreReason::NoTask)?;
        match task_id {
            Some(id) if id != task.id => Err(IgnoreReason::StaleTask),
            _ => Ok(task),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(id: &str) -> TaskEvent {
        TaskEvent::Started {
            task_id: id.to_string(),
            description: "fix the build".to_string(),
            steps: vec![],
        }
    }

    #[test]
    fn test_started_enters_planning() {
        let mut machine = TaskStateMachine::new();
        assert_eq!(machine.apply(started("t1")), Applied::Replaced);
        assert_eq!(machine.current().unwrap().status, TaskStatus::Planning);
    }

    #[test]
    fn test_ensure_idle() {
        let mut machine = TaskStateMachine::new();
        assert!(machine.ensure_idle().is_ok());

        machine.apply(started("t1"));
        let err = machine.ensure_idle().unwrap_err();
        assert!(err.is_caller_misuse());

        machine.apply(TaskEvent::Failed {
            task_id: None,
            error: None,
        });
        assert!(machine.ensure_idle().is_ok());
    }

    #[test]
    fn test_step_status_aliases() {
        assert_eq!(StepStatus::from_wire("Running"), Some(StepStatus::Executing));
        assert_eq!(StepStatus::from_wire("done"), Some(StepStatus::Completed));
        assert_eq!(StepStatus::from_wire("bogus"), None);
    }

    #[test]
    fn test_progress_counts_completed_steps() {
        let mut machine = TaskStateMachine::new();
        machine.apply(started("t1"));
        machine.apply(TaskEvent::PlanReady {
            task_id: None,
            steps: vec![PlanStep::new("a", "A"), PlanStep::new("b", "B")],
        });
        machine.apply_step(StepUpdate {
            task_id: None,
            step_id: "a".to_string(),
            status: StepStatus::Completed,
        });
        assert_eq!(machine.current().unwrap().progress(), (1, 2));
    }
}
