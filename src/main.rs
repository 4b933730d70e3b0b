use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use palmreader::config::{ClientConfig, ConfigError, ServerConfig};
use palmreader::error::ErrorCode;
use palmreader::gallery::{GalleryPage, GalleryView};
use palmreader::llm::LlmClient;
use palmreader::services::analyze_client::AnalyzeClient;
use palmreader::services::detection::{DetectorError, HandValidator, LandmarkerOptions, SidecarLoader};
use palmreader::services::reading::{GenerationError, ReadingService};
use palmreader::state::AppState;
use palmreader::store::{FileSlots, ReadingStore, SharedStore, StorageError};
use palmreader::workflow::{WorkflowDriver, WorkflowError, WorkflowState};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("server io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("workflow: {0}")]
    Workflow(#[from] WorkflowError),
    #[error("hand detector setup failed: {0}")]
    Detector(#[from] DetectorError),
    #[error("analyze client setup failed: {0}")]
    Generator(#[from] GenerationError),
    #[error("gallery: {0}")]
    Storage(#[from] StorageError),
    #[error("readings are numbered from 1")]
    InvalidNumber,
    #[error("no reading numbered {0}")]
    NoSuchReading(usize),
    #[error("{0}")]
    Rejected(String),
}

#[derive(Parser, Debug)]
#[command(name = "palmreader", about = "Palm photo readings from the command line")]
struct Cli {
    /// Directory holding `pastReadings.json`.
    #[arg(long, env = "PALM_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the analyze HTTP server.
    Serve(ServeArgs),
    /// Validate a palm photo, fetch a reading, and save it to the gallery.
    Read(ReadArgs),
    Gallery(GalleryCommand),
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    #[arg(long, env = "BIND_ADDR")]
    bind: Option<String>,
}

#[derive(Args, Debug)]
struct ReadArgs {
    image: PathBuf,

    #[arg(long, env = "PALM_API_URL")]
    api_url: Option<String>,

    #[arg(long, env = "HAND_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    #[arg(long, env = "HAND_DETECTOR_URL")]
    detector_url: Option<String>,
}

#[derive(Args, Debug)]
struct GalleryCommand {
    #[command(subcommand)]
    command: GallerySubcommand,
}

#[derive(Subcommand, Debug)]
enum GallerySubcommand {
    List,
    Show { number: usize },
    Delete { number: usize },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Read(args) => run_read(client_config(cli.data_dir)?, args).await,
        Command::Gallery(gallery) => run_gallery(&client_config(cli.data_dir)?, gallery).await,
    }
}

fn client_config(data_dir: Option<PathBuf>) -> Result<ClientConfig, CliError> {
    let mut config = ClientConfig::from_env()?;
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    Ok(config)
}

async fn run_serve(args: ServeArgs) -> Result<(), CliError> {
    let mut config = ServerConfig::from_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    let reading = match LlmClient::from_env() {
        Ok(llm) => {
            info!(model = llm.model(), "llm configured");
            Some(Arc::new(ReadingService::new(Arc::new(llm), config.reading_max_tokens)))
        }
        Err(e) => {
            warn!(code = e.error_code(), error = %e, "llm not configured; /api/analyze will answer 503");
            None
        }
    };

    let state = AppState::new(reading, config.analyze_timeout());
    let app = palmreader::routes::app(state, config.body_limit_bytes);
    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(%addr, "palmreader listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn open_store(config: &ClientConfig) -> SharedStore {
    ReadingStore::load_shared(Arc::new(FileSlots::new(&config.data_dir))).await
}

async fn run_read(mut config: ClientConfig, args: ReadArgs) -> Result<(), CliError> {
    if let Some(url) = args.api_url {
        config.api_url = url.trim_end_matches('/').to_string();
    }
    if let Some(dir) = args.model_dir {
        config.model_dir = dir;
    }
    if let Some(url) = args.detector_url {
        config.detector_url = url;
    }

    let loader = SidecarLoader::new(&config.detector_url, config.validate_timeout_secs)?;
    let validator = Arc::new(HandValidator::new(Arc::new(loader), LandmarkerOptions::new(&config.model_dir)));
    let generator = Arc::new(AnalyzeClient::new(&config.api_url, config.submit_timeout_secs)?);
    let driver = WorkflowDriver::new(validator, generator, open_store(&config).await, config.timeouts());

    driver.capture_file(&args.image).await?;
    let validated = driver.validate().await?;
    if let WorkflowState::Validated { hand_found: false, error } = validated.state {
        return Err(CliError::Rejected(error.unwrap_or_default()));
    }

    match driver.submit().await?.state {
        WorkflowState::Complete { text } => {
            println!("{text}");
            Ok(())
        }
        WorkflowState::Failed { reason } => Err(CliError::Rejected(reason)),
        other => Err(CliError::Rejected(format!("reading ended while {}", other.name()))),
    }
}

async fn run_gallery(config: &ClientConfig, gallery: GalleryCommand) -> Result<(), CliError> {
    let view = GalleryView::new(open_store(config).await);
    match gallery.command {
        GallerySubcommand::List => {
            match view.page().await {
                GalleryPage::Empty { title, hint } => {
                    println!("{title}");
                    println!("{hint}");
                }
                GalleryPage::Entries(entries) => {
                    for entry in entries {
                        println!("{:>3}. {}  {}", entry.index + 1, entry.display_date, entry.preview);
                    }
                }
            }
            Ok(())
        }
        GallerySubcommand::Show { number } => {
            let index = number.checked_sub(1).ok_or(CliError::InvalidNumber)?;
            let entry = view.entry(index).await.ok_or(CliError::NoSuchReading(number))?;
            println!("{}", entry.title);
            println!("{}", entry.display_date);
            println!();
            println!("{}", entry.text);
            Ok(())
        }
        GallerySubcommand::Delete { number } => {
            let index = number.checked_sub(1).ok_or(CliError::InvalidNumber)?;
            view.delete(index).await?;
            println!("Deleted reading {number}.");
            Ok(())
        }
    }
}
