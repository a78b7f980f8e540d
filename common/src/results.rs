use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::TaskId;

/// Un artefacto de salida devuelto por una tarea terminada.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDescriptor {
    /// Posición dentro de la lista de resultados (la asignamos nosotros)
    #[serde(default)]
    pub index: usize,

    #[serde(default, alias = "fileUrl")]
    pub url: Option<String>,

    /// "image", "video", ...
    #[serde(default, rename = "type", alias = "fileType")]
    pub kind: Option<String>,
}

impl ResultDescriptor {
    /// URL descargable, si la hay.
    pub fn locator(&self) -> Option<&str> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputState {
    Saved,
    Failed,
    /// Sin URL: no había nada que bajar
    Skipped,
}

/// Lo que pasó con cada resultado al intentar guardarlo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub index: usize,
    pub url: Option<String>,
    pub kind: Option<String>,
    pub state: OutputState,
    pub path: Option<PathBuf>,
    pub attempts: u32,
    pub error: Option<String>,
}

/// Registro JSON que se escribe junto a las salidas de una tarea.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputMetadata {
    pub task_id: TaskId,
    pub workflow_id: String,
    pub uploaded_reference: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub result_count: usize,
    pub saved_paths: Vec<PathBuf>,
    pub results: Vec<ResultDescriptor>,
    pub outputs: Vec<OutputRecord>,
}

impl OutputMetadata {
    pub fn failed_count(&self) -> usize {
        self.outputs
            .iter()
            .filter(|o| o.state == OutputState::Failed)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn descriptor_acepta_nombres_alternativos() {
        let a: ResultDescriptor =
            serde_json::from_value(json!({"type": "image", "url": "https://x/a.png"})).unwrap();
        let b: ResultDescriptor =
            serde_json::from_value(json!({"fileType": "png", "fileUrl": "https://x/b.png"}))
                .unwrap();

        assert_eq!(a.kind.as_deref(), Some("image"));
        assert_eq!(a.locator(), Some("https://x/a.png"));
        assert_eq!(b.kind.as_deref(), Some("png"));
        assert_eq!(b.locator(), Some("https://x/b.png"));
    }

    #[test]
    fn locator_vacio_no_cuenta() {
        let d: ResultDescriptor = serde_json::from_value(json!({"url": "  "})).unwrap();
        assert_eq!(d.locator(), None);

        let d: ResultDescriptor = serde_json::from_value(json!({"type": "image"})).unwrap();
        assert_eq!(d.locator(), None);
    }

    #[test]
    fn metadata_cuenta_fallidos() {
        let meta = OutputMetadata {
            task_id: "t".into(),
            workflow_id: "wf".into(),
            uploaded_reference: Some("ref".into()),
            timestamp: Utc::now(),
            result_count: 2,
            saved_paths: vec![PathBuf::from("out/pose_corrected.png")],
            results: vec![],
            outputs: vec![
                OutputRecord {
                    index: 0,
                    url: Some("u0".into()),
                    kind: None,
                    state: OutputState::Saved,
                    path: Some(PathBuf::from("out/pose_corrected.png")),
                    attempts: 1,
                    error: None,
                },
                OutputRecord {
                    index: 1,
                    url: Some("u1".into()),
                    kind: None,
                    state: OutputState::Failed,
                    path: None,
                    attempts: 3,
                    error: Some("500".into()),
                },
            ],
        };

        assert_eq!(meta.failed_count(), 1);
        let v = serde_json::to_value(&meta).unwrap();
        assert_eq!(v["outputs"][1]["state"], json!("failed"));
    }
}
