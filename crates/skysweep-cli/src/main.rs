use clap::Parser;

mod args;
mod commands;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = args::Cli::parse();
    let code = commands::run(cli.command).await;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
