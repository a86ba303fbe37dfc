//! Subcommand definitions and dispatch — one arm per façade operation, the
//! same shape the teacher's `db::cli::Commands` enum uses for its own
//! `Run` variant, just with one variant per in-process call instead of one
//! variant per server mode.
use clap::{Parser, Subcommand};
use vex_core::options::{AddInput, AddOptions, DeleteOptions, SearchOptions};
use vex_core::Database;
use vex_storage::StorageBackend;
use vex_types::{DbConfig, Error, NounId, Result, VerbKind};

fn json_err(err: serde_json::Error) -> Error {
    Error::InvalidInput(err.to_string())
}

fn io_err(err: std::io::Error) -> Error {
    Error::StoragePermanent(err.to_string())
}

#[derive(Parser, Debug)]
#[command(name = "vex", version, about = "Embeddable vector-and-graph database")]
pub struct Cli {
    #[command(flatten)]
    pub config: DbConfig,

    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initializes storage at the configured backend/root and exits.
    Init,
    /// Embeds or stores `value` as a noun. `value` is read as a JSON payload
    /// unless `--vector` is passed.
    Add {
        value: String,
        #[arg(long)]
        vector: bool,
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Searches for the `limit` nearest nouns to `value`.
    Search {
        value: String,
        #[arg(long)]
        vector: bool,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Prints the stored noun with the given id.
    Get { id: String },
    /// Deletes the noun with the given id.
    Delete { id: String },
    /// Creates a typed edge between two nouns.
    AddVerb {
        source: String,
        target: String,
        kind: String,
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Lists every verb touching the given noun (as source or target).
    GetVerbs { id: String },
    /// Prints backend status and counters.
    Status,
    /// Prints accumulated statistics.
    Stats,
    /// Wipes all stored nouns, verbs, and in-memory state.
    Clear {
        #[arg(long)]
        force: bool,
    },
    /// Writes a full backup to `path` as JSON.
    Backup { path: std::path::PathBuf },
    /// Restores a backup written by `backup`.
    Restore {
        path: std::path::PathBuf,
        #[arg(long)]
        clear_existing: bool,
    },
}

pub async fn dispatch<B: StorageBackend + 'static>(db: &Database<B>, command: Commands) -> Result<()> {
    match command {
        Commands::Init => {
            println!("initialized");
        }
        Commands::Add { value, vector, metadata } => {
            let metadata = metadata.map(|m| serde_json::from_str(&m)).transpose().map_err(json_err)?;
            let input = parse_input(&value, vector)?;
            let id = db.add(input, metadata, AddOptions::default()).await?;
            println!("{id}");
        }
        Commands::Search { value, vector, limit } => {
            let input = parse_input(&value, vector)?;
            let results = db.search(input, limit, SearchOptions::default()).await?;
            for result in results {
                println!("{}\t{}", result.id, result.score);
            }
        }
        Commands::Get { id } => {
            let id = NounId::from(id);
            match db.get(&id).await? {
                Some(noun) => println!("{}", serde_json::to_string_pretty(&noun.metadata).map_err(json_err)?),
                None => println!("not found"),
            }
        }
        Commands::Delete { id } => {
            let id = NounId::from(id);
            let existed = db.delete(&id, DeleteOptions::default()).await?;
            println!("{existed}");
        }
        Commands::AddVerb { source, target, kind, metadata } => {
            let metadata = metadata.map(|m| serde_json::from_str(&m)).transpose().map_err(json_err)?;
            let id = db
                .relate(NounId::from(source), NounId::from(target), VerbKind::from(kind.as_str()), metadata)
                .await?;
            println!("{id}");
        }
        Commands::GetVerbs { id } => {
            let id = NounId::from(id);
            let mut verbs = db.get_verbs_by_source(&id).await?;
            verbs.extend(db.get_verbs_by_target(&id).await?);
            for verb in verbs {
                println!("{}\t{}\t{}\t{}", verb.id, verb.source, verb.target, verb.kind);
            }
        }
        Commands::Status => {
            let status = db.status().await?;
            println!("{} used={} quota={:?}", status.backend_kind, status.used_bytes, status.quota_bytes);
        }
        Commands::Stats => {
            let stats = db.get_statistics(Default::default()).await?;
            println!("{}", serde_json::to_string_pretty(&stats).map_err(json_err)?);
        }
        Commands::Clear { force } => {
            if !force {
                println!("pass --force to confirm clearing all data");
                return Ok(());
            }
            db.clear().await?;
            println!("cleared");
        }
        Commands::Backup { path } => {
            let data = db.backup().await?;
            let file = std::fs::File::create(&path).map_err(io_err)?;
            serde_json::to_writer(file, &data).map_err(json_err)?;
            println!("backed up to {}", path.display());
        }
        Commands::Restore { path, clear_existing } => {
            let file = std::fs::File::open(&path).map_err(io_err)?;
            let data = serde_json::from_reader(file).map_err(json_err)?;
            db.restore(data, clear_existing).await?;
            println!("restored from {}", path.display());
        }
    }
    Ok(())
}

fn parse_input(value: &str, as_vector: bool) -> Result<AddInput> {
    if as_vector {
        let values: Vec<f32> = serde_json::from_str(value).map_err(json_err)?;
        Ok(AddInput::Vector(vex_types::Vector::new(values)))
    } else {
        let payload = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        Ok(AddInput::Payload(payload))
    }
}
