use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pims_core::detector::SCRFD_MODEL_FILE;
use pims_core::{ingest, PersonStore, ScrfdDetector};
use std::path::PathBuf;

const DATASET_HELP: &str = "The path to the dataset with face images.
Dataset format:
|--root/
    |--1
        |--somename.jpg
    |--2
        |--somename.jpg
    ...
    |--N
        |--somename.jpg
Directory N is paired with row N of the metadata file.";

const METADATA_HELP: &str = "The path to a CSV file with person metadata.
The file must contain a 'Name' column in one of the forms:
 - 'Name_Surname'
 - 'Surname'
 - 'Firstname_Secondname_Surname'";

#[derive(Parser)]
#[command(name = "pims", about = "Person Info Microservice administration CLI")]
struct Cli {
    /// Store connection string, used when DATABASE_URL is unset
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the person_info table if it does not exist
    Init,
    /// Fill the store from a face image dataset and a metadata CSV
    Ingest {
        #[arg(value_name = "path/to/dataset", long_help = DATASET_HELP)]
        dataset: PathBuf,
        #[arg(value_name = "path/to/metadata.csv", long_help = METADATA_HELP)]
        metadata: PathBuf,
        /// SCRFD model file (default: $PIMS_MODEL_DIR/det_10g.onnx)
        #[arg(long)]
        model: Option<PathBuf>,
    },
    /// Print a stored person record
    Show {
        id: i64,
        /// Print only id, name and surname
        #[arg(long)]
        brief: bool,
    },
}

fn open_store(cli_url: Option<String>) -> Result<PersonStore> {
    let url = std::env::var("DATABASE_URL")
        .ok()
        .or(cli_url)
        .context("set DATABASE_URL or pass --database-url")?;
    Ok(PersonStore::open(&url)?)
}

fn default_model_path() -> PathBuf {
    std::env::var("PIMS_MODEL_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("models"))
        .join(SCRFD_MODEL_FILE)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            let store = open_store(cli.database_url)?;
            store.create_schema()?;
            println!("{}", pims_core::store::TABLE_NAME);
        }
        Commands::Ingest {
            dataset,
            metadata,
            model,
        } => {
            ingest::check_paths(&dataset, &metadata)?;
            let store = open_store(cli.database_url)?;

            let model = model.unwrap_or_else(default_model_path);
            let mut detector = ScrfdDetector::load(&model)
                .with_context(|| format!("loading face detector from {}", model.display()))?;

            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template("{bar:40} {pos}/{len} [{elapsed_precise}]")?,
            );
            let report = ingest::run(&store, &mut detector, &dataset, &metadata, |done, total| {
                bar.set_length(total as u64);
                bar.set_position(done as u64);
            });
            bar.finish_and_clear();

            let report = report?;
            println!("Inserted {} records", report.inserted.len());
        }
        Commands::Show { id, brief } => {
            let store = open_store(cli.database_url)?;
            let Some(record) = store.connect_read_only()?.get_by_id(id)? else {
                bail!("no person with id {id}");
            };
            if brief {
                println!("{record}");
            } else {
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
        }
    }

    Ok(())
}
