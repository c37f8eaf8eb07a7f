use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use aws_exec::{init_tracing, AwsCommandServer, Config, ServerError};

#[derive(Parser)]
#[command(name = "aws-exec")]
#[command(about = "Run AWS CLI commands over HTTP under a fixed credential profile")]
struct Cli {
    /// Address to listen on
    #[arg(long, env = "AWS_EXEC_LISTEN")]
    listen: Option<String>,

    /// Config file (otherwise searched in the standard locations)
    #[arg(long, env = "AWS_EXEC_CONFIG")]
    config: Option<PathBuf>,

    /// AWS profile injected as AWS_PROFILE
    #[arg(long, env = "AWS_EXEC_PROFILE")]
    profile: Option<String>,

    /// Region injected as AWS_DEFAULT_REGION
    #[arg(long, env = "AWS_EXEC_REGION")]
    region: Option<String>,

    /// Kill commands running longer than this many seconds
    #[arg(long, env = "AWS_EXEC_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,
}

impl Cli {
    fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from_path(path)?,
            None => Config::load(),
        };

        if let Some(listen) = &self.listen {
            config.server.listen_addr = listen.clone();
        }
        if let Some(profile) = &self.profile {
            config.profile.name = profile.clone();
        }
        if let Some(region) = &self.region {
            config.profile.region = region.clone();
        }
        if self.timeout_secs.is_some() {
            config.execution.timeout_secs = self.timeout_secs;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;

    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    let mut server = AwsCommandServer::from_config(&config);
    server
        .start(&config.server.listen_addr)
        .await
        .context("server failed to start")?;

    let signal = wait_for_shutdown().await?;
    tracing::info!("Received {}, stopping server", signal);

    match server.stop().await {
        Ok(()) => {}
        Err(ServerError::ShutdownTimeout(grace)) => {
            tracing::warn!("In-flight requests did not finish within {:?}", grace);
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            Ok("SIGINT")
        }
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl-C")
}
