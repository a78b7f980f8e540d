use std::{env, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::{
    config::{DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL, ENV_IMAGE_NODE_ID},
    ClientConfig, ConfigOverrides, OutputState, PollPolicy,
};
use processor::{
    default_codec, describe_image, format_file_size, ProcessReport, ProcessStatus, RemoteTaskClient,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Nodo "Load Image" del workflow de pose si no se indica otro.
const DEFAULT_IMAGE_NODE: &str = "65";
const DEFAULT_LOG_FILTER: &str = "client=info,processor=debug,reqwest=info";
/// Código de salida al cortar con Ctrl-C.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI para corregir la pose de prendas con un workflow de RunningHub")]
struct Cli {
    /// API key (si no, RUNNINGHUB_API_KEY)
    #[arg(short = 'k', long, global = true)]
    api_key: Option<String>,

    /// Id del workflow (si no, RUNNINGHUB_WORKFLOW_ID)
    #[arg(short = 'w', long, global = true)]
    workflow_id: Option<String>,

    /// Nodo de la imagen de entrada (si no, RUNNINGHUB_IMAGE_NODE_ID o "65")
    #[arg(short = 'n', long = "node-id", global = true)]
    node_id: Option<String>,

    #[arg(long, global = true)]
    prompt_node_id: Option<String>,

    /// URL base de la API (si no, RUNNINGHUB_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Logs en nivel debug
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Procesa una imagen de principio a fin
    Process {
        #[arg(value_name = "IMAGEN")]
        image: PathBuf,

        #[arg(short, long, default_value = "姿勢矯正")]
        prompt: String,

        /// Carpeta donde dejar los resultados
        #[arg(short, long, default_value = "outputs")]
        output: PathBuf,

        /// Espera máxima en segundos
        #[arg(long, default_value_t = DEFAULT_MAX_WAIT.as_secs())]
        max_wait: u64,

        /// Segundos entre consultas de estado
        #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_secs())]
        poll_interval: u64,
    },
    /// Consulta el estado de una tarea
    Status {
        #[arg(value_name = "TASK_ID")]
        task_id: String,
    },
    /// Descarga los resultados de una tarea ya terminada
    Results {
        #[arg(value_name = "TASK_ID")]
        task_id: String,

        #[arg(short, long, default_value = "outputs")]
        output: PathBuf,
    },
    /// Pide cancelar una tarea
    Cancel {
        #[arg(value_name = "TASK_ID")]
        task_id: String,
    },
    /// Muestra datos de una imagen local (no usa la red)
    Info {
        #[arg(value_name = "IMAGEN")]
        image: PathBuf,

        /// Salida en JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("client=debug,processor=debug,reqwest=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            api_key: self.api_key.clone(),
            workflow_id: self.workflow_id.clone(),
            image_node_id: self
                .node_id
                .clone()
                .or_else(|| env::var(ENV_IMAGE_NODE_ID).ok())
                .or_else(|| Some(DEFAULT_IMAGE_NODE.to_string())),
            prompt_node_id: self.prompt_node_id.clone(),
            base_url: self.base_url.clone(),
        }
    }

    fn remote_client(&self, poll: Option<PollPolicy>) -> Result<RemoteTaskClient> {
        let mut config =
            ClientConfig::from_env_with(self.overrides()).context("configuración incompleta")?;
        if let Some(poll) = poll {
            config = config.with_poll_policy(poll);
        }
        Ok(RemoteTaskClient::new(config)?)
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Process {
            image,
            prompt,
            output,
            max_wait,
            poll_interval,
        } => {
            let poll = PollPolicy {
                interval: Duration::from_secs(*poll_interval),
                max_wait: Duration::from_secs(*max_wait),
            };
            let client = cli.remote_client(Some(poll))?;

            tokio::select! {
                res = client.process_image(image, prompt, output) => {
                    let report = res?;
                    print_report(&report);
                    if report.status == ProcessStatus::Partial {
                        report.into_complete()?;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    warn!("interrumpido, cancelando la tarea en curso...");
                    if client.last_task_id().is_some() && !client.cancel_task(None).await {
                        warn!("no se pudo confirmar la cancelación");
                    }
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
            }
        }

        Commands::Status { task_id } => {
            let client = cli.remote_client(None)?;
            let status = client.check_task_status(task_id).await?;
            println!("Tarea:");
            println!("  id: {}", task_id);
            println!("  estado: {}", status);
        }

        Commands::Results { task_id, output } => {
            let client = cli.remote_client(None)?;
            let results = client.get_task_results(task_id).await?;
            let report = client.save_results(task_id, None, &results, output).await?;

            println!("Resultados de {}:", task_id);
            for o in &report.outputs {
                match (&o.state, &o.path) {
                    (OutputState::Saved, Some(p)) => println!("  [{}] {}", o.index, p.display()),
                    (OutputState::Failed, _) => println!(
                        "  [{}] falló tras {} intentos: {}",
                        o.index,
                        o.attempts,
                        o.error.as_deref().unwrap_or("-")
                    ),
                    _ => println!("  [{}] sin URL, omitido", o.index),
                }
            }
            println!("  metadata: {}", report.metadata_path.display());
        }

        Commands::Cancel { task_id } => {
            let client = cli.remote_client(None)?;
            if client.cancel_task(Some(task_id.as_str())).await {
                println!("Cancelación aceptada para {}", task_id);
            } else {
                anyhow::bail!("RunningHub no aceptó cancelar {}", task_id);
            }
        }

        Commands::Info { image, json } => {
            let codec = default_codec();
            let info = describe_image(image, codec.as_deref())
                .with_context(|| format!("no se pudo leer {}", image.display()))?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&info)?);
                return Ok(());
            }

            println!("Imagen:");
            println!("  archivo: {}", info.filename);
            println!("  tamaño: {}", format_file_size(info.file_size));
            println!("  formato: {} ({})", info.format, info.mime_type);
            if let (Some(w), Some(h)) = (info.width, info.height) {
                println!("  dimensiones: {}x{}", w, h);
            }
            if let Some(mode) = &info.color_mode {
                println!("  modo de color: {}", mode);
            }
            if let Some(ratio) = &info.aspect_ratio {
                println!("  relación de aspecto: {}", ratio);
            }
        }
    }

    Ok(())
}

fn print_report(report: &ProcessReport) {
    info!(
        "tarea {} terminada: {:?}",
        report.task.task_id().unwrap_or("-"),
        report.status
    );

    println!("Procesado:");
    println!("  tarea: {}", report.task.task_id().unwrap_or("-"));
    for path in &report.saved {
        println!("  guardado: {}", path.display());
    }
    for failed in &report.failed {
        println!(
            "  falló [{}]: {}",
            failed.index,
            failed.error.as_deref().unwrap_or("-")
        );
    }
    println!("  metadata: {}", report.metadata_path.display());
}
