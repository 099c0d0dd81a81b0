use tracing::info;
use tracing_subscriber::EnvFilter;

use kachi_push::config::ClientConfig;
use kachi_push::profile::ProfilePlatform;
use kachi_push::state::AppState;

mod cli;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli::run().await {
        cli::RunOutcome::Listen(config) => {
            if let Err(err) = listen(config).await {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
        cli::RunOutcome::Exit(code) => std::process::exit(code),
    }
}

async fn listen(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let profile = ProfilePlatform::load(
        &config.profile_path,
        &config.push_endpoint,
        config.prompt,
    )?;
    let state = AppState::start(profile).await?;
    info!(
        endpoint = %config.push_endpoint,
        worker = state.worker.is_some(),
        "push receiver ready"
    );
    kachi_push::app::serve(config.listen_addr, state).await?;
    Ok(())
}
