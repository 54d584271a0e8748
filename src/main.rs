use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use text_spotter::models::{AnalyzeRequest, AnalyzeResponse};
use text_spotter::services::config_store::{AppConfig, ConfigStore};
use text_spotter::services::detection::ZoneThresholds;
use text_spotter::{init_logging, Detector};

#[derive(Parser, Debug)]
#[command(name = "text-spotter")]
#[command(about = "Sentence-level AI vs. human text provenance classifier")]
#[command(version)]
struct Cli {
    /// Directory holding config.json (defaults to the user config dir)
    #[arg(long, env = "TEXT_SPOTTER_CONFIG_DIR", global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Classify every sentence of a document
    Analyze {
        /// Input file, or `-` for stdin
        #[arg(default_value = "-")]
        input: String,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,

        /// Target chunk count for the embedding spread
        #[arg(long)]
        chunks: Option<usize>,

        /// Skip the document-level embedding signal
        #[arg(long)]
        no_embedding: bool,

        /// Skip the external judge and use fallback voting
        #[arg(long)]
        no_arbitration: bool,
    },

    /// Report component readiness
    Health {
        /// Load lazily initialized backends before reporting
        #[arg(long)]
        warm_up: bool,
    },

    /// Inspect zone calibration data
    Calibration {
        #[command(subcommand)]
        action: CalibrationAction,
    },

    /// Manage stored API keys
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Derive zone calibration from labeled directories of .txt documents
    Calibrate {
        #[arg(long)]
        human: PathBuf,

        #[arg(long)]
        ai: PathBuf,

        #[arg(long)]
        out: PathBuf,

        /// Version label recorded in the calibration file
        #[arg(long, default_value = "custom")]
        label: String,

        #[arg(long)]
        chunks: Option<usize>,
    },
}

#[derive(Subcommand, Debug)]
enum CalibrationAction {
    /// Print the active calibration (or the one at --path)
    Show {
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Store an API key (groq, huggingface, embedding)
    SetKey { provider: String, key: String },
    /// Remove a stored API key
    DeleteKey { provider: String },
}

fn config_store(config_dir: Option<PathBuf>) -> Option<ConfigStore> {
    config_dir
        .or_else(ConfigStore::default_config_dir)
        .map(ConfigStore::new)
}

fn load_config(config_dir: Option<PathBuf>) -> Result<AppConfig> {
    let Some(store) = config_store(config_dir) else {
        return Ok(AppConfig::default());
    };
    store
        .load()
        .with_context(|| format!("loading {}", store.config_file().display()))
}

fn run_config_action(store: &ConfigStore, action: ConfigAction) -> Result<String> {
    let file = store.config_file();
    match action {
        ConfigAction::SetKey { provider, key } => {
            store
                .set_api_key(&provider, key.trim())
                .with_context(|| format!("updating {}", file.display()))?;
            Ok(format!("API key for {} saved to {}", provider, file.display()))
        }
        ConfigAction::DeleteKey { provider } => {
            store
                .delete_api_key(&provider)
                .with_context(|| format!("updating {}", file.display()))?;
            Ok(format!("API key for {} removed from {}", provider, file.display()))
        }
    }
}

fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading stdin")?;
        return Ok(buf);
    }
    std::fs::read_to_string(input).with_context(|| format!("reading {}", input))
}

fn print_report(response: &AnalyzeResponse) {
    for s in &response.sentences {
        println!(
            "[{:>3}] {:<10} {:.2}  {}",
            s.index,
            s.classification.as_str(),
            s.confidence,
            s.text
        );
    }

    let stats = &response.overall_stats;
    println!();
    println!(
        "Sentences: {}  human {} ({:.2}%)  suspicious {} ({:.2}%)  ai {} ({:.2}%)",
        stats.total_sentences,
        stats.human_count,
        stats.human_percentage,
        stats.suspicious_count,
        stats.suspicious_percentage,
        stats.ai_count,
        stats.ai_percentage
    );
    match &response.document {
        Some(doc) => println!(
            "Document: zone {} ({}) confidence {:.4}, spread {:.6} over {} chunks [{}]",
            doc.zone,
            doc.label.as_str(),
            doc.confidence,
            doc.spread,
            doc.chunk_count,
            doc.calibration_version
        ),
        None => println!("Document: embedding signal unavailable"),
    }
    if response.truncated {
        println!("Note: input was truncated to the configured maximum length");
    }
}

fn txt_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading directory {}", dir.display()))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    files.sort();
    Ok(files)
}

async fn corpus_spreads(detector: &Detector, dir: &Path, num_chunks: usize) -> Result<Vec<f64>> {
    let mut spreads = Vec::new();
    for path in txt_files(dir)? {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        match detector.measure_spread(&text, num_chunks).await {
            Ok(report) => spreads.push(report.spread),
            Err(e) if e.is_input_error() => {
                warn!("[CALIBRATE] Skipping {}: {}", path.display(), e)
            }
            Err(e) => return Err(e).with_context(|| format!("embedding {}", path.display())),
        }
    }
    Ok(spreads)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    if let Command::Config { action } = cli.command {
        let store = config_store(cli.config_dir).context("no config directory available")?;
        println!("{}", run_config_action(&store, action)?);
        return Ok(());
    }
    let config = load_config(cli.config_dir)?;

    match cli.command {
        Command::Analyze {
            input,
            json,
            chunks,
            no_embedding,
            no_arbitration,
        } => {
            let text = read_input(&input)?;
            let detector = Detector::from_config(config)?;
            let mut request = AnalyzeRequest::new(text);
            request.num_chunks = chunks;
            request.use_embedding = !no_embedding;
            request.use_arbitration = !no_arbitration;

            let response = detector.analyze(request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_report(&response);
            }
        }
        Command::Health { warm_up } => {
            let detector = Detector::from_config(config)?;
            let report = if warm_up {
                detector.warm_up().await
            } else {
                detector.health()
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Calibration {
            action: CalibrationAction::Show { path },
        } => {
            let thresholds = match path.or(config.calibration_path) {
                Some(p) => ZoneThresholds::load_file(&p)
                    .with_context(|| format!("loading calibration {}", p.display()))?,
                None => ZoneThresholds::default(),
            };
            println!("{}", serde_json::to_string_pretty(&thresholds)?);
            let [b1, b2, b3, b4] = thresholds.boundaries();
            println!("Boundaries: {:.6} | {:.6} | {:.6} | {:.6}", b1, b2, b3, b4);
        }
        Command::Calibrate {
            human,
            ai,
            out,
            label,
            chunks,
        } => {
            let num_chunks = chunks.unwrap_or(config.num_chunks).max(1);
            let detector = Detector::from_config(config)?;
            let (model, dimensions) = detector
                .embedding_model()
                .await
                .context("calibration needs the embedding backend")?;

            let human_spreads = corpus_spreads(&detector, &human, num_chunks).await?;
            let ai_spreads = corpus_spreads(&detector, &ai, num_chunks).await?;
            info!(
                "[CALIBRATE] {} human and {} AI documents measured",
                human_spreads.len(),
                ai_spreads.len()
            );

            let thresholds =
                ZoneThresholds::derive(&label, &model, dimensions, &human_spreads, &ai_spreads)?;
            thresholds
                .save_file(&out)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("{}", serde_json::to_string_pretty(&thresholds)?);
            println!("Calibration written to {}", out.display());
        }
        Command::Config { .. } => {}
    }

    Ok(())
}
