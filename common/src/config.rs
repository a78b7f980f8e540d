use std::{env, time::Duration};

use thiserror::Error;

pub const ENV_API_KEY: &str = "RUNNINGHUB_API_KEY";
pub const ENV_WORKFLOW_ID: &str = "RUNNINGHUB_WORKFLOW_ID";
pub const ENV_IMAGE_NODE_ID: &str = "RUNNINGHUB_IMAGE_NODE_ID";
pub const ENV_PROMPT_NODE_ID: &str = "RUNNINGHUB_PROMPT_NODE_ID";
pub const ENV_BASE_URL: &str = "RUNNINGHUB_BASE_URL";

/// Nodo de texto del workflow de corrección de pose.
pub const DEFAULT_PROMPT_NODE_ID: &str = "13";

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CANCEL_TIMEOUT: Duration = Duration::from_secs(15);

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(300);
pub const DEFAULT_DOWNLOAD_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("falta {0} (no hay valor por defecto)")]
    Missing(&'static str),
    #[error("{field} inválido: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Cada cuánto preguntar el estado y cuánto esperar como máximo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

/// Reintentos acotados (intentos totales, pausa entre intentos).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::immediate(DEFAULT_DOWNLOAD_ATTEMPTS)
    }
}

/// Valores que vienen de fuera del entorno (flags de la CLI, tests).
/// Un `Some` pisa la variable de entorno correspondiente.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_key: Option<String>,
    pub workflow_id: Option<String>,
    pub image_node_id: Option<String>,
    pub prompt_node_id: Option<String>,
    pub base_url: Option<String>,
}

/// Configuración fija del cliente de RunningHub.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_key: String,
    pub workflow_id: String,
    /// Nodo "Load Image" del workflow
    pub image_node_id: String,
    pub prompt_node_id: String,
    /// Sin barra final, ej: "https://www.runninghub.ai"
    pub base_url: String,

    pub request_timeout: Duration,
    pub status_timeout: Duration,
    pub cancel_timeout: Duration,

    pub poll: PollPolicy,
    pub download_retry: RetryPolicy,
}

impl ClientConfig {
    pub fn new(
        api_key: impl Into<String>,
        workflow_id: impl Into<String>,
        image_node_id: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            api_key: api_key.into().trim().to_string(),
            workflow_id: workflow_id.into().trim().to_string(),
            image_node_id: image_node_id.into().trim().to_string(),
            prompt_node_id: DEFAULT_PROMPT_NODE_ID.to_string(),
            base_url: base_url.into().trim().trim_end_matches('/').to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            status_timeout: DEFAULT_STATUS_TIMEOUT,
            cancel_timeout: DEFAULT_CANCEL_TIMEOUT,
            poll: PollPolicy::default(),
            download_retry: RetryPolicy::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(ConfigOverrides::default())
    }

    pub fn from_env_with(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        Self::resolve(overrides, |key| env::var(key).ok())
    }

    /// Junta overrides y `lookup` (normalmente el entorno). Vacío cuenta como ausente.
    pub fn resolve<F>(overrides: ConfigOverrides, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |value: Option<String>, key: &'static str| -> Result<String, ConfigError> {
            value
                .or_else(|| lookup(key))
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let api_key = pick(overrides.api_key, ENV_API_KEY)?;
        let workflow_id = pick(overrides.workflow_id, ENV_WORKFLOW_ID)?;
        let image_node_id = pick(overrides.image_node_id, ENV_IMAGE_NODE_ID)?;
        let base_url = pick(overrides.base_url, ENV_BASE_URL)?;

        let mut config = Self::new(api_key, workflow_id, image_node_id, base_url)?;
        if let Some(prompt) = overrides
            .prompt_node_id
            .or_else(|| lookup(ENV_PROMPT_NODE_ID))
            .filter(|v| !v.trim().is_empty())
        {
            config.prompt_node_id = prompt.trim().to_string();
        }
        Ok(config)
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_download_retry(mut self, retry: RetryPolicy) -> Self {
        self.download_retry = retry;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_empty() {
            return Err(ConfigError::Missing(ENV_API_KEY));
        }
        if self.workflow_id.is_empty() {
            return Err(ConfigError::Missing(ENV_WORKFLOW_ID));
        }
        if self.image_node_id.is_empty() {
            return Err(ConfigError::Missing(ENV_IMAGE_NODE_ID));
        }
        if self.base_url.is_empty() {
            return Err(ConfigError::Missing(ENV_BASE_URL));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                field: ENV_BASE_URL,
                reason: format!("se esperaba http(s)://, vino {}", self.base_url),
            });
        }
        if self.download_retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "download_retry",
                reason: "max_attempts debe ser >= 1".to_string(),
            });
        }
        if self.poll.interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "poll",
                reason: "el intervalo de polling no puede ser 0".to_string(),
            });
        }
        Ok(())
    }

    /// Lo que se puede mostrar en logs: la API key va recortada.
    pub fn masked_api_key(&self) -> String {
        let visible: String = self.api_key.chars().take(8).collect();
        format!("{visible}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn new_normaliza_y_pone_defaults() {
        let c = ClientConfig::new(" key ", "wf", "65", "https://api.runninghub.ai/").unwrap();
        assert_eq!(c.api_key, "key");
        assert_eq!(c.base_url, "https://api.runninghub.ai");
        assert_eq!(c.prompt_node_id, DEFAULT_PROMPT_NODE_ID);
        assert_eq!(c.poll, PollPolicy::default());
        assert_eq!(c.download_retry.max_attempts, 3);
        assert_eq!(c.masked_api_key(), "key...");
    }

    #[test]
    fn credencial_vacia_es_error_de_configuracion() {
        let err = ClientConfig::new("", "wf", "65", "https://x").unwrap_err();
        assert_eq!(err, ConfigError::Missing(ENV_API_KEY));

        let err = ClientConfig::new("k", "wf", "65", "ftp://x").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: ENV_BASE_URL, .. }));
    }

    #[test]
    fn resolve_prefiere_overrides_sobre_entorno() {
        let lookup = lookup_from(&[
            (ENV_API_KEY, "env-key"),
            (ENV_WORKFLOW_ID, "env-wf"),
            (ENV_IMAGE_NODE_ID, "65"),
            (ENV_BASE_URL, "https://env.example"),
            (ENV_PROMPT_NODE_ID, "20"),
        ]);

        let overrides = ConfigOverrides {
            api_key: Some("flag-key".into()),
            ..Default::default()
        };
        let c = ClientConfig::resolve(overrides, lookup).unwrap();

        assert_eq!(c.api_key, "flag-key");
        assert_eq!(c.workflow_id, "env-wf");
        assert_eq!(c.base_url, "https://env.example");
        assert_eq!(c.prompt_node_id, "20");
    }

    #[test]
    fn resolve_sin_credencial_no_sigue() {
        let lookup = lookup_from(&[
            (ENV_WORKFLOW_ID, "wf"),
            (ENV_IMAGE_NODE_ID, "65"),
            (ENV_BASE_URL, "https://x"),
            (ENV_API_KEY, "   "),
        ]);
        let err = ClientConfig::resolve(ConfigOverrides::default(), lookup).unwrap_err();
        assert_eq!(err, ConfigError::Missing(ENV_API_KEY));
    }

    #[test]
    fn politicas_invalidas() {
        let c = ClientConfig::new("k", "wf", "65", "https://x")
            .unwrap()
            .with_download_retry(RetryPolicy::immediate(0));
        assert!(c.validate().is_err());

        let c = ClientConfig::new("k", "wf", "65", "https://x")
            .unwrap()
            .with_poll_policy(PollPolicy {
                interval: Duration::ZERO,
                max_wait: Duration::from_secs(1),
            });
        assert!(c.validate().is_err());
    }
}
