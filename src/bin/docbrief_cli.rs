use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use docbrief::{
    config::Config,
    logging,
    pipeline::{PipelineApi, SummaryPipeline, Upload},
    staging,
    summarization::OpenAiGenerator,
};

#[derive(Parser)]
#[command(
    name = "docbrief-cli",
    about = "Summarize or inspect a local .pptx/.pdf file with the docbrief pipeline"
)]
struct Cli {
    /// Log pipeline stages at debug level on stderr.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline and write `{stem}_summary.docx`.
    Simplify {
        input: PathBuf,
        /// Output file; defaults to `{stem}_summary.docx` next to the input.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Print the extracted slide/page texts as JSON.
    Parse { input: PathBuf },
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    logging::init_cli_tracing(cli.verbose);
    let config = Config::from_env().context("Invalid configuration")?;

    let generator = OpenAiGenerator::new(config.generator_config())
        .context("Failed to build generation client")?;
    let pipeline = SummaryPipeline::new(config.pipeline_settings(), Arc::new(generator));
    staging::ensure_upload_dir(&pipeline.settings().upload_dir)
        .context("Failed to prepare upload directory")?;

    match cli.command {
        Command::Simplify { input, output } => {
            let upload = read_upload(&input)?;
            let artifact = pipeline
                .simplify(upload)
                .await
                .with_context(|| format!("Failed to summarize {}", input.display()))?;
            let target = match output {
                Some(path) => {
                    fs::write(&path, &artifact.bytes)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    path
                }
                None => {
                    let dir = input
                        .parent()
                        .filter(|parent| !parent.as_os_str().is_empty())
                        .unwrap_or_else(|| Path::new("."));
                    artifact
                        .write_to(dir)
                        .with_context(|| format!("Failed to write into {}", dir.display()))?
                }
            };
            println!("{}", target.display());
        }
        Command::Parse { input } => {
            let upload = read_upload(&input)?;
            let document = pipeline
                .extract(upload)
                .await
                .with_context(|| format!("Failed to parse {}", input.display()))?;
            let json = serde_json::to_string_pretty(&document)?;
            println!("{json}");
        }
    }
    Ok(())
}

fn read_upload(input: &Path) -> Result<Upload> {
    let Some(file_name) = input.file_name().and_then(|name| name.to_str()) else {
        bail!("Input path has no usable file name: {}", input.display());
    };
    let bytes = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    Ok(Upload {
        file_name: file_name.to_string(),
        bytes,
    })
}
