//! Courtside - caching proxy core for a fantasy sports data API

use clap::Parser;

use courtside::Result;
use courtside::cli::{self, Cli, CommandContext, Commands, GlobalOptions};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let env = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(env);
    if debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let opts = GlobalOptions::from_cli(&cli);

    match cli.command {
        Commands::Version => {
            println!("courtside version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Run => cli::serve::run(&CommandContext::new(&opts)?).await,
        Commands::Refresh => cli::refresh::run(&CommandContext::new(&opts)?).await,
        Commands::Status => cli::status::run(&CommandContext::new(&opts)?),
        Commands::Dataset { ref id } => cli::dataset::run(&CommandContext::new(&opts)?, id).await,
    }
}
