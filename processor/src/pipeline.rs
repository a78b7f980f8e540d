use std::path::{Path, PathBuf};

use common::{OutputRecord, RequestStage, Task};
use tracing::{info, warn};

use crate::client::{RemoteTaskClient, WaitOutcome};
use crate::compress::{compress_if_needed, Compression, COMPRESSION_THRESHOLD_BYTES};
use crate::error::ProcessError;
use crate::outputs::{SaveReport, SaveStatus};
use crate::staging::StagingArea;
use crate::validate::validate_input;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Completed,
    /// Algunas salidas no se pudieron bajar
    Partial,
}

/// Resultado de una petición completa.
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub task: Task,
    pub status: ProcessStatus,
    pub saved: Vec<PathBuf>,
    pub failed: Vec<OutputRecord>,
    pub metadata_path: PathBuf,
}

impl ProcessReport {
    /// Exige que todo se haya guardado.
    pub fn into_complete(self) -> Result<Vec<PathBuf>, ProcessError> {
        match self.status {
            ProcessStatus::Completed => Ok(self.saved),
            ProcessStatus::Partial => Err(ProcessError::PartialDownloadFailure {
                saved: self.saved.len(),
                failed: self.failed.len(),
            }),
        }
    }
}

impl RemoteTaskClient {
    /// Lleva una imagen por todo el flujo: validar, comprimir, subir, crear
    /// tarea, esperar, traer resultados y guardarlos en `output_dir`.
    ///
    /// Todo lo intermedio vive en un staging que se borra al salir.
    pub async fn process_image(
        &self,
        image_path: &Path,
        prompt: &str,
        output_dir: &Path,
    ) -> Result<ProcessReport, ProcessError> {
        let mut task = Task::new(self.config().workflow_id.clone());
        let staging = StagingArea::create()?;

        let result = self
            .run_stages(&mut task, &staging, image_path, prompt, output_dir)
            .await;

        if let Err(e) = staging.close() {
            warn!("no se pudo borrar el staging: {}", e);
        }

        match result {
            Ok(save) => self.finish(task, save),
            Err(e) => {
                let from = task.stage;
                task.fail(e.is_timeout());
                warn!(
                    "petición abortada en {:?} -> {:?}: {}",
                    from, task.stage, e
                );
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        task: &mut Task,
        staging: &StagingArea,
        image_path: &Path,
        prompt: &str,
        output_dir: &Path,
    ) -> Result<SaveReport, ProcessError> {
        let codec = self.codec();

        // 1) validar (sin red)
        let input = image_path.to_path_buf();
        let check_codec = codec.clone();
        let size =
            tokio::task::spawn_blocking(move || validate_input(&input, check_codec.as_deref()))
                .await
                .map_err(|e| ProcessError::Io(std::io::Error::other(e)))??;
        task.advance(RequestStage::Validated);
        info!("{} validado ({} bytes)", image_path.display(), size);

        // 2) comprimir si hace falta, siempre sobre la copia del staging
        let staged = staging.stage_input(image_path).await?;
        let compression = self.compress_staged(staged).await;
        task.advance(if compression.compressed {
            RequestStage::Compressed
        } else {
            RequestStage::Uncompressed
        });

        // 3) subir
        let reference = self.upload_image(&compression.path).await?;
        task.mark_uploaded(reference.clone());

        // 4) crear tarea
        let task_id = self.create_task(&reference, prompt).await?;
        task.mark_created(task_id.clone())?;

        // 5) esperar
        task.start_polling(self.config().poll.max_wait);
        let wait = self.wait_for_completion(&task_id).await;
        task.record_status(wait.last_status);
        match wait.outcome {
            WaitOutcome::Succeeded => {}
            WaitOutcome::Failed => return Err(ProcessError::TaskFailed { task_id }),
            WaitOutcome::TimedOut => {
                return Err(ProcessError::Timeout {
                    task_id,
                    waited: wait.elapsed,
                })
            }
        }

        // 6) resultados
        task.mark_results_requested();
        let results = self.get_task_results(&task_id).await?;
        task.advance(RequestStage::ResultsFetched);

        // 7) descargar
        let report = self
            .save_results(&task_id, Some(&reference), &results, output_dir)
            .await?;
        Ok(report)
    }

    /// Si la compresión falla se sigue con el archivo sin comprimir.
    async fn compress_staged(&self, staged: PathBuf) -> Compression {
        let codec = self.codec();
        let target = staged.clone();
        let joined = tokio::task::spawn_blocking(move || {
            compress_if_needed(&target, codec.as_deref(), COMPRESSION_THRESHOLD_BYTES)
        })
        .await;

        match joined {
            Ok(Ok(c)) => c,
            Ok(Err(e)) => {
                warn!("falló la compresión, se sube el original: {}", e);
                uncompressed(staged)
            }
            Err(e) => {
                warn!("la compresión terminó con panic o join error: {:?}", e);
                uncompressed(staged)
            }
        }
    }

    fn finish(&self, mut task: Task, save: SaveReport) -> Result<ProcessReport, ProcessError> {
        let status = match save.status() {
            SaveStatus::Complete => ProcessStatus::Completed,
            SaveStatus::Partial => ProcessStatus::Partial,
            SaveStatus::Failed => {
                task.fail(false);
                warn!(
                    "tarea {} sin ninguna salida guardada (metadata en {})",
                    save.task_id,
                    save.metadata_path.display()
                );
                // ningún resultado traía URL: no hubo nada que bajar
                if save.failed_count() == 0 {
                    return Err(ProcessError::NoResults {
                        task_id: save.task_id,
                    });
                }
                return Err(ProcessError::PartialDownloadFailure {
                    saved: 0,
                    failed: save.failed_count(),
                });
            }
        };

        task.advance(RequestStage::Downloaded);
        let failed: Vec<OutputRecord> = save.failed().into_iter().cloned().collect();
        if status == ProcessStatus::Partial {
            warn!(
                "tarea {}: éxito parcial, {} salidas fallaron",
                save.task_id,
                failed.len()
            );
        }

        Ok(ProcessReport {
            task,
            status,
            saved: save.saved,
            failed,
            metadata_path: save.metadata_path,
        })
    }
}

fn uncompressed(path: PathBuf) -> Compression {
    let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    Compression::untouched(&path, size)
}
