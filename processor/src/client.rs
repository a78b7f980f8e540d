use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::Utc;
use common::{
    ApiEnvelope, ApiReply, CancelRequest, ClientConfig, CreateTaskData, CreateTaskRequest,
    OutputMetadata, OutputRecord, OutputState, ResultData, ResultDescriptor, SlotValue,
    StatusData, TaskId, TaskStatus, UploadData,
};
use reqwest::{
    multipart::{Form, Part},
    Client, Response,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::ProcessError;
use crate::imaging::{self, ImageCodec};
use crate::outputs::{output_filename, write_metadata, SaveReport};
use crate::retry::{poll_until, retry_async, Attempted};

pub const API_KEY_HEADER: &str = "x-api-key";
const USER_AGENT: &str = concat!("armario-runninghub/", env!("CARGO_PKG_VERSION"));

const UPLOAD_PATH: &str = "/file/upload";
const CREATE_PATH: &str = "/task/openapi/create";
const STATUS_PATH: &str = "/task/openapi/status";
const RESULT_PATH: &str = "/task/openapi/result";
const CANCEL_PATH: &str = "/task/openapi/cancel";

/// Cómo terminó la espera de una tarea.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Succeeded,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct WaitReport {
    pub outcome: WaitOutcome,
    /// Último estado que se pudo leer (Unknown si ninguna consulta salió bien)
    pub last_status: TaskStatus,
    pub attempts: u32,
    pub elapsed: Duration,
}

impl WaitReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == WaitOutcome::Succeeded
    }
}

/// Cliente de RunningHub: sube una imagen, crea la tarea, espera, trae
/// resultados y los baja a disco.
///
/// Solo guarda su configuración y el id de la última tarea creada (para
/// `cancel_task(None)`), así que se puede compartir entre peticiones.
pub struct RemoteTaskClient {
    config: ClientConfig,
    http: Client,
    codec: Option<Arc<dyn ImageCodec>>,
    last_task: Mutex<Option<TaskId>>,
}

impl RemoteTaskClient {
    pub fn new(config: ClientConfig) -> Result<Self, ProcessError> {
        config.validate()?;
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(ProcessError::transport("crear cliente HTTP"))?;

        info!(
            "cliente RunningHub listo (base={}, workflow={}, nodo imagen={}, api_key={})",
            config.base_url,
            config.workflow_id,
            config.image_node_id,
            config.masked_api_key()
        );

        Ok(Self {
            config,
            http,
            codec: imaging::default_codec(),
            last_task: Mutex::new(None),
        })
    }

    /// Reemplaza el codec de imágenes (`None` = modo degradado).
    pub fn with_codec(mut self, codec: Option<Arc<dyn ImageCodec>>) -> Self {
        self.codec = codec;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn codec(&self) -> Option<Arc<dyn ImageCodec>> {
        self.codec.clone()
    }

    pub fn last_task_id(&self) -> Option<TaskId> {
        self.last_task.lock().ok().and_then(|g| g.as_ref().cloned())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    /* ---------------- paso 3: upload ---------------- */

    /// Sube la imagen y devuelve la referencia que usa RunningHub para ella.
    pub async fn upload_image(&self, image_path: &Path) -> Result<String, ProcessError> {
        info!("subiendo {} a RunningHub...", image_path.display());

        let bytes = tokio::fs::read(image_path).await?;
        let file_name = image_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());
        let mime = mime_guess::from_path(image_path).first_or_octet_stream();

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime.essence_str())
            .map_err(ProcessError::transport("upload"))?;
        let form = Form::new().part("file", part);

        let resp = self
            .http
            .post(self.endpoint(UPLOAD_PATH))
            .header(API_KEY_HEADER, &self.config.api_key)
            .multipart(form)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(ProcessError::transport("upload"))?;

        let data: UploadData = decode_required("upload", resp).await?;
        if data.filename.trim().is_empty() {
            return Err(ProcessError::MalformedResponse {
                context: "upload",
                detail: "filename vacío".to_string(),
            });
        }

        info!("imagen subida, referencia = {}", data.filename);
        Ok(data.filename)
    }

    /* ---------------- paso 4: crear tarea ---------------- */

    /// Crea la tarea enlazando la imagen al nodo de entrada y el prompt al nodo de texto.
    pub async fn create_task(
        &self,
        uploaded_reference: &str,
        prompt: &str,
    ) -> Result<TaskId, ProcessError> {
        debug!(
            "creando tarea con imagen {} y prompt '{}'",
            uploaded_reference, prompt
        );

        let mut workflow_input = BTreeMap::new();
        workflow_input.insert(
            self.config.image_node_id.clone(),
            SlotValue::Image {
                filename: uploaded_reference.to_string(),
            },
        );
        workflow_input.insert(
            self.config.prompt_node_id.clone(),
            SlotValue::Text {
                text: prompt.to_string(),
            },
        );

        let req = CreateTaskRequest {
            workflow_id: self.config.workflow_id.clone(),
            workflow_input,
        };

        let resp = self
            .http
            .post(self.endpoint(CREATE_PATH))
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&req)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(ProcessError::transport("crear tarea"))?;

        let data: CreateTaskData = decode_required("crear tarea", resp).await?;

        if let Ok(mut last) = self.last_task.lock() {
            *last = Some(data.task_id.clone());
        }
        info!("tarea creada, id = {}", data.task_id);
        Ok(data.task_id)
    }

    /* ---------------- paso 5: estado / polling ---------------- */

    pub async fn check_task_status(&self, task_id: &str) -> Result<TaskStatus, ProcessError> {
        self.status_with_timeout(task_id, self.config.status_timeout)
            .await
    }

    async fn status_with_timeout(
        &self,
        task_id: &str,
        timeout: Duration,
    ) -> Result<TaskStatus, ProcessError> {
        let resp = self
            .http
            .get(self.endpoint(STATUS_PATH))
            .query(&[("taskId", task_id)])
            .header(API_KEY_HEADER, &self.config.api_key)
            .timeout(timeout)
            .send()
            .await
            .map_err(ProcessError::transport("estado"))?;

        let data: StatusData = decode_required("estado", resp).await?;
        Ok(TaskStatus::parse(data.raw()))
    }

    /// Consulta el estado cada `poll.interval` hasta success/failed o hasta
    /// agotar `poll.max_wait`. Los errores de una consulta se loguean y se
    /// sigue esperando; siempre se hace al menos una consulta.
    pub async fn wait_for_completion(&self, task_id: &str) -> WaitReport {
        let policy = self.config.poll;
        let status_timeout = self.config.status_timeout;
        info!(
            "esperando la tarea {} (máximo {:?}, cada {:?})",
            task_id, policy.max_wait, policy.interval
        );

        let label = format!("estado de {task_id}");
        let polled = poll_until(
            &policy,
            &label,
            move |remaining| {
                // con el plazo vencido igual se hace la consulta final
                let call_timeout = if remaining.is_zero() {
                    status_timeout
                } else {
                    status_timeout.min(remaining)
                };
                async move { self.status_with_timeout(task_id, call_timeout).await }
            },
            |status: &TaskStatus| status.is_terminal(),
        )
        .await;

        let last_status = polled.last.unwrap_or(TaskStatus::Unknown);
        let outcome = match (polled.finished, last_status) {
            (true, TaskStatus::Success) => {
                info!("tarea {} terminó bien", task_id);
                WaitOutcome::Succeeded
            }
            (true, _) => {
                warn!("tarea {} falló en RunningHub", task_id);
                WaitOutcome::Failed
            }
            (false, _) => WaitOutcome::TimedOut,
        };

        WaitReport {
            outcome,
            last_status,
            attempts: polled.attempts,
            elapsed: polled.elapsed,
        }
    }

    /* ---------------- paso 6: resultados ---------------- */

    pub async fn get_task_results(
        &self,
        task_id: &str,
    ) -> Result<Vec<ResultDescriptor>, ProcessError> {
        debug!("pidiendo resultados de {}", task_id);

        let resp = self
            .http
            .get(self.endpoint(RESULT_PATH))
            .query(&[("taskId", task_id)])
            .header(API_KEY_HEADER, &self.config.api_key)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(ProcessError::transport("resultados"))?;

        let results = decode_optional::<ResultData>("resultados", resp)
            .await?
            .map(ResultData::into_descriptors)
            .unwrap_or_default();

        if results.is_empty() {
            return Err(ProcessError::NoResults {
                task_id: task_id.to_string(),
            });
        }

        info!("tarea {}: {} resultados", task_id, results.len());
        Ok(results)
    }

    /* ---------------- paso 7: descargas ---------------- */

    /// Un solo intento de descarga, escribiendo a disco por trozos.
    pub async fn download_image(&self, url: &str, save_path: &Path) -> Result<u64, ProcessError> {
        debug!("descargando {} -> {}", url, save_path.display());

        let mut resp = self
            .http
            .get(url)
            .timeout(self.config.request_timeout)
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(ProcessError::transport("descarga"))?;

        let mut file = tokio::fs::File::create(save_path).await?;
        let mut written = 0u64;
        while let Some(chunk) = resp
            .chunk()
            .await
            .map_err(ProcessError::transport("descarga"))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }

    /// Descarga con la política de reintentos de la configuración.
    /// Si todos los intentos fallan no queda archivo a medias.
    pub async fn download_with_retry(
        &self,
        url: &str,
        save_path: &Path,
    ) -> Attempted<u64, ProcessError> {
        let label = format!("descarga de {url}");
        let out = retry_async(&self.config.download_retry, &label, move |_| async move {
            let res = self.download_image(url, save_path).await;
            if res.is_err() {
                let _ = tokio::fs::remove_file(save_path).await;
            }
            res
        })
        .await;

        if out.result.is_ok() {
            info!("guardado {}", save_path.display());
        }
        out
    }

    /// Baja todos los resultados con URL a `output_dir` y escribe el JSON de
    /// metadata. Un resultado que falla no corta el resto.
    pub async fn save_results(
        &self,
        task_id: &str,
        uploaded_reference: Option<&str>,
        results: &[ResultDescriptor],
        output_dir: &Path,
    ) -> Result<SaveReport, ProcessError> {
        tokio::fs::create_dir_all(output_dir).await?;

        let mut saved: Vec<PathBuf> = Vec::new();
        let mut outputs: Vec<OutputRecord> = Vec::with_capacity(results.len());

        for res in results {
            let Some(url) = res.locator() else {
                debug!("resultado {} sin URL, se omite", res.index);
                outputs.push(OutputRecord {
                    index: res.index,
                    url: res.url.clone(),
                    kind: res.kind.clone(),
                    state: OutputState::Skipped,
                    path: None,
                    attempts: 0,
                    error: None,
                });
                continue;
            };

            let save_path = output_dir.join(output_filename(res.index, url));
            let Attempted { result, attempts } = self.download_with_retry(url, &save_path).await;

            let record = match result {
                Ok(_) => {
                    saved.push(save_path.clone());
                    OutputRecord {
                        index: res.index,
                        url: Some(url.to_string()),
                        kind: res.kind.clone(),
                        state: OutputState::Saved,
                        path: Some(save_path),
                        attempts,
                        error: None,
                    }
                }
                Err(e) => OutputRecord {
                    index: res.index,
                    url: Some(url.to_string()),
                    kind: res.kind.clone(),
                    state: OutputState::Failed,
                    path: None,
                    attempts,
                    error: Some(e.to_string()),
                },
            };
            outputs.push(record);
        }

        let metadata = OutputMetadata {
            task_id: task_id.to_string(),
            workflow_id: self.config.workflow_id.clone(),
            uploaded_reference: uploaded_reference.map(str::to_string),
            timestamp: Utc::now(),
            result_count: results.len(),
            saved_paths: saved.clone(),
            results: results.to_vec(),
            outputs: outputs.clone(),
        };
        let metadata_path = write_metadata(output_dir, &metadata).await?;

        let report = SaveReport {
            task_id: task_id.to_string(),
            saved,
            outputs,
            metadata_path,
        };
        info!(
            "tarea {}: {} guardados, {} fallidos (metadata en {})",
            task_id,
            report.saved.len(),
            report.failed_count(),
            report.metadata_path.display()
        );
        Ok(report)
    }

    /* ---------------- paso 8: cancelar ---------------- */

    /// Pide cancelar la tarea (por defecto la última creada). `true` solo
    /// significa que RunningHub aceptó el pedido.
    pub async fn cancel_task(&self, task_id: Option<&str>) -> bool {
        let task_id = match task_id.map(str::to_string).or_else(|| self.last_task_id()) {
            Some(id) => id,
            None => {
                warn!("no hay tarea para cancelar");
                return false;
            }
        };

        let req = CancelRequest {
            api_key: self.config.api_key.clone(),
            task_id: task_id.clone(),
        };

        let resp = match self
            .http
            .post(self.endpoint(CANCEL_PATH))
            .json(&req)
            .timeout(self.config.cancel_timeout)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                warn!("error pidiendo cancelar {}: {}", task_id, e);
                return false;
            }
        };

        match decode_optional::<Value>("cancelar", resp).await {
            Ok(_) => {
                info!("tarea {} cancelada", task_id);
                true
            }
            Err(e) => {
                warn!("no se pudo cancelar {}: {}", task_id, e);
                false
            }
        }
    }
}

/// Decodifica el envoltorio `{code, msg, data}`; `Ok(None)` si code == 0 sin data.
async fn decode_optional<T: DeserializeOwned>(
    context: &'static str,
    resp: Response,
) -> Result<Option<T>, ProcessError> {
    let resp = resp
        .error_for_status()
        .map_err(ProcessError::transport(context))?;
    let body = resp
        .text()
        .await
        .map_err(ProcessError::transport(context))?;

    let malformed = |e: serde_json::Error| ProcessError::MalformedResponse {
        context,
        detail: e.to_string(),
    };

    let envelope: ApiEnvelope = serde_json::from_str(&body).map_err(malformed)?;
    match envelope.into_reply::<T>().map_err(malformed)? {
        ApiReply::Accepted(data) => Ok(Some(data)),
        ApiReply::Empty => Ok(None),
        ApiReply::Rejected { code, msg } => {
            Err(ProcessError::RemoteRejected { context, code, msg })
        }
    }
}

async fn decode_required<T: DeserializeOwned>(
    context: &'static str,
    resp: Response,
) -> Result<T, ProcessError> {
    decode_optional(context, resp)
        .await?
        .ok_or_else(|| ProcessError::MalformedResponse {
            context,
            detail: "respuesta sin data".to_string(),
        })
}
