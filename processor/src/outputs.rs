use std::path::{Path, PathBuf};

use common::{OutputMetadata, OutputRecord, OutputState, TaskId};
use reqwest::Url;

/// Primer resultado del workflow: la prenda con la pose corregida.
pub const PRIMARY_OUTPUT_NAME: &str = "pose_corrected.png";
/// Segundo resultado: la referencia de pose usada.
pub const SECONDARY_OUTPUT_NAME: &str = "pose_reference.png";

/// Nombre local del resultado `index`. Los dos primeros son fijos; el resto
/// se deriva de la URL con un uuid para no pisarse.
pub fn output_filename(index: usize, url: &str) -> String {
    match index {
        0 => PRIMARY_OUTPUT_NAME.to_string(),
        1 => SECONDARY_OUTPUT_NAME.to_string(),
        _ => {
            let stem = remote_stem(url).unwrap_or_else(|| "output".to_string());
            format!("result_{}_{}_{}.png", index, uuid::Uuid::new_v4().simple(), stem)
        }
    }
}

fn remote_stem(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let stem = Path::new(last).file_stem()?.to_string_lossy();
    let clean: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if clean.is_empty() {
        None
    } else {
        Some(clean)
    }
}

pub fn metadata_filename(task_id: &str) -> String {
    let safe: String = task_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{safe}_metadata.json")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    /// Todo lo descargable quedó guardado
    Complete,
    Partial,
    /// No se guardó nada
    Failed,
}

/// Resultado de guardar las salidas de una tarea.
#[derive(Debug, Clone)]
pub struct SaveReport {
    pub task_id: TaskId,
    pub saved: Vec<PathBuf>,
    pub outputs: Vec<OutputRecord>,
    pub metadata_path: PathBuf,
}

impl SaveReport {
    pub fn failed(&self) -> Vec<&OutputRecord> {
        self.outputs
            .iter()
            .filter(|o| o.state == OutputState::Failed)
            .collect()
    }

    pub fn failed_count(&self) -> usize {
        self.failed().len()
    }

    pub fn status(&self) -> SaveStatus {
        match (self.saved.is_empty(), self.failed_count()) {
            (true, _) => SaveStatus::Failed,
            (false, 0) => SaveStatus::Complete,
            (false, _) => SaveStatus::Partial,
        }
    }
}

pub async fn write_metadata(
    output_dir: &Path,
    metadata: &OutputMetadata,
) -> std::io::Result<PathBuf> {
    let path = output_dir.join(metadata_filename(&metadata.task_id));
    let json = serde_json::to_vec_pretty(metadata)?;
    tokio::fs::write(&path, json).await?;
    Ok(path)
}
