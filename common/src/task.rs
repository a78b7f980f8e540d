use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type TaskId = String;

/// Estado de la tarea tal como lo reporta RunningHub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
    Unknown,
}

impl TaskStatus {
    /// Interpreta el string remoto sin distinguir mayúsculas
    /// ("SUCCESS", "success", "QUEUED", ...).
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" | "created" => TaskStatus::Pending,
            "running" | "processing" => TaskStatus::Running,
            "success" | "succeeded" | "completed" => TaskStatus::Success,
            "failed" | "failure" | "error" | "cancelled" | "canceled" => TaskStatus::Failed,
            _ => TaskStatus::Unknown,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Posición de una petición dentro de la máquina de estados:
/// created -> validated -> (compressed|uncompressed) -> uploaded -> task_created
/// -> polling -> {succeeded -> results_fetched -> downloaded} | failed | timed_out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStage {
    Created,
    Validated,
    Compressed,
    Uncompressed,
    Uploaded,
    TaskCreated,
    Polling,
    Succeeded,
    ResultsFetched,
    Downloaded,
    Failed,
    TimedOut,
}

impl RequestStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStage::Downloaded | RequestStage::Failed | RequestStage::TimedOut
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("no se puede registrar la tarea {task_id}: falta la referencia de la imagen subida")]
    MissingReference { task_id: TaskId },
}

/// Un trabajo remoto de RunningHub. Vive solo en memoria mientras dura la petición.
#[derive(Debug, Clone)]
pub struct Task {
    task_id: Option<TaskId>,
    uploaded_reference: Option<String>,

    pub workflow_id: String,
    pub status: TaskStatus,
    pub stage: RequestStage,

    pub created_at: DateTime<Utc>,
    /// Límite del polling; se fija al empezar a esperar.
    pub deadline: Option<DateTime<Utc>>,

    /// true en cuanto se pidió la lista de resultados al menos una vez
    pub results_requested: bool,
}

impl Task {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            task_id: None,
            uploaded_reference: None,
            workflow_id: workflow_id.into(),
            status: TaskStatus::Pending,
            stage: RequestStage::Created,
            created_at: Utc::now(),
            deadline: None,
            results_requested: false,
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn uploaded_reference(&self) -> Option<&str> {
        self.uploaded_reference.as_deref()
    }

    pub fn advance(&mut self, stage: RequestStage) {
        self.stage = stage;
    }

    pub fn mark_uploaded(&mut self, reference: impl Into<String>) {
        self.uploaded_reference = Some(reference.into());
        self.stage = RequestStage::Uploaded;
    }

    pub fn mark_created(&mut self, task_id: impl Into<TaskId>) -> Result<(), TaskError> {
        let task_id = task_id.into();
        if self.uploaded_reference.is_none() {
            return Err(TaskError::MissingReference { task_id });
        }
        self.task_id = Some(task_id);
        self.stage = RequestStage::TaskCreated;
        Ok(())
    }

    pub fn start_polling(&mut self, max_wait: std::time::Duration) {
        let now = Utc::now();
        self.deadline = chrono::Duration::from_std(max_wait)
            .ok()
            .and_then(|d| now.checked_add_signed(d));
        self.stage = RequestStage::Polling;
    }

    pub fn record_status(&mut self, status: TaskStatus) {
        self.status = status;
        match status {
            TaskStatus::Success => self.stage = RequestStage::Succeeded,
            TaskStatus::Failed => self.stage = RequestStage::Failed,
            _ => {}
        }
    }

    pub fn mark_results_requested(&mut self) {
        self.results_requested = true;
    }

    /// Terminal de error: timeout si se agotó el polling, failed en cualquier otro caso.
    pub fn fail(&mut self, timed_out: bool) {
        self.stage = if timed_out {
            RequestStage::TimedOut
        } else {
            RequestStage::Failed
        };
    }

    /// Éxito real: el remoto dijo success y además se intentó traer resultados.
    pub fn is_successful(&self) -> bool {
        self.status == TaskStatus::Success && self.results_requested
    }
}
