//! Formas de las peticiones y respuestas de la API de RunningHub.
//!
//! Todas las respuestas vienen envueltas en `{ "code", "msg", "data" }`;
//! `code == 0` es éxito. Se decodifican aquí a tipos concretos para que
//! el resto del código no tenga que buscar claves a mano.

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::results::ResultDescriptor;
use crate::task::TaskId;

/* --------- Envoltorio común --------- */

/// `data` queda sin interpretar hasta mirar `code`: un rechazo puede traer
/// cualquier cosa en `data` y sigue siendo un rechazo.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope {
    pub code: i64,
    #[serde(default, alias = "message")]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Respuesta ya clasificada.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiReply<T> {
    Accepted(T),
    /// code != 0
    Rejected { code: i64, msg: String },
    /// code == 0 pero sin `data`
    Empty,
}

impl ApiEnvelope {
    /// Clasifica por `code` y recién después decodifica `data` como `T`.
    pub fn into_reply<T: DeserializeOwned>(self) -> Result<ApiReply<T>, serde_json::Error> {
        if self.code != 0 {
            return Ok(ApiReply::Rejected {
                code: self.code,
                msg: self.msg.unwrap_or_else(|| "error desconocido".to_string()),
            });
        }
        match self.data {
            None | Some(Value::Null) => Ok(ApiReply::Empty),
            Some(data) => serde_json::from_value(data).map(ApiReply::Accepted),
        }
    }
}

/* --------- Upload --------- */

#[derive(Debug, Clone, Deserialize)]
pub struct UploadData {
    #[serde(alias = "fileName")]
    pub filename: String,
}

/* --------- Crear tarea --------- */

/// Valor enlazado a un slot (nodo) del workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SlotValue {
    Image { filename: String },
    Text { text: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateTaskRequest {
    #[serde(rename = "workflowId")]
    pub workflow_id: String,
    /// slot id -> valor
    #[serde(rename = "workflowInput")]
    pub workflow_input: BTreeMap<String, SlotValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskData {
    #[serde(rename = "taskId", deserialize_with = "id_as_string")]
    pub task_id: TaskId,
}

/* --------- Estado --------- */

/// Algunas versiones devuelven `data: {"status": ".."}`, otras `data: ".."`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StatusData {
    Object { status: String },
    Plain(String),
}

impl StatusData {
    pub fn raw(&self) -> &str {
        match self {
            StatusData::Object { status } => status,
            StatusData::Plain(status) => status,
        }
    }
}

/* --------- Resultados --------- */

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ResultData {
    Listed {
        #[serde(rename = "resultList", default)]
        result_list: Vec<ResultDescriptor>,
    },
    Bare(Vec<ResultDescriptor>),
}

impl ResultData {
    /// Descriptores en el orden del remoto, con su índice asignado.
    pub fn into_descriptors(self) -> Vec<ResultDescriptor> {
        let mut list = match self {
            ResultData::Listed { result_list } => result_list,
            ResultData::Bare(list) => list,
        };
        for (i, d) in list.iter_mut().enumerate() {
            d.index = i;
        }
        list
    }
}

/* --------- Cancelar --------- */

#[derive(Debug, Clone, Serialize)]
pub struct CancelRequest {
    #[serde(rename = "apiKey")]
    pub api_key: String,
    #[serde(rename = "taskId")]
    pub task_id: TaskId,
}

/// Los ids llegan como string o como número según el endpoint.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "id inesperado: {other}"
        ))),
    }
}
