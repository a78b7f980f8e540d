use std::time::Duration;

use common::{ConfigError, TaskError, TaskId};
use thiserror::Error;

/// Por qué falló (o falló a medias) una petición contra RunningHub.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Validación previa: nunca se reintenta
    #[error("entrada inválida: {0}")]
    InvalidInput(String),

    #[error("configuración inválida: {0}")]
    Configuration(#[from] ConfigError),

    #[error("error de red en {context}: {source}")]
    Transport {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Respuesta bien formada pero con `code != 0`
    #[error("RunningHub rechazó {context} (code={code}): {msg}")]
    RemoteRejected {
        context: &'static str,
        code: i64,
        msg: String,
    },

    #[error("respuesta inesperada en {context}: {detail}")]
    MalformedResponse {
        context: &'static str,
        detail: String,
    },

    #[error("la tarea {task_id} no terminó en {waited:?}")]
    Timeout { task_id: TaskId, waited: Duration },

    #[error("la tarea {task_id} terminó con estado failed")]
    TaskFailed { task_id: TaskId },

    #[error("la tarea {task_id} terminó sin resultados")]
    NoResults { task_id: TaskId },

    #[error("descarga incompleta: {saved} guardados, {failed} fallidos")]
    PartialDownloadFailure { saved: usize, failed: usize },

    #[error(transparent)]
    TaskState(#[from] TaskError),

    #[error("error de E/S: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    pub(crate) fn transport(context: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| ProcessError::Transport { context, source }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProcessError::Timeout { .. })
    }
}
