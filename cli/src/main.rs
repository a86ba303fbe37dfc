mod backend;
mod commands;

use clap::Parser;

use backend::AnyBackend;
use commands::Cli;
use vex_core::Database;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();
    vex_tracer::init_tracing("vex", Some(cli.log_level.as_str()), "");

    let result = run(cli).await;

    vex_tracer::shutdown_tracing();
    result.map_err(std::io::Error::other)
}

async fn run(cli: Cli) -> vex_types::Result<()> {
    let backend = AnyBackend::from_config(&cli.config)?;
    let db = Database::new(cli.config, backend)?;
    db.init().await?;

    commands::dispatch(&db, cli.command).await?;

    db.shut_down().await
}
