use std::{sync::Arc, time::Duration};

use clap::{CommandFactory, Parser};
use nbcontainer::{
    cli::{NbContainerArgs, NbContainerSubcommand, RepoSubcommand},
    config::{LogConfig, NbContainerConfig},
    coordinator::Containerizer,
    kernel::KernelSpecResolver,
    registry::{DistributionRegistry, Registry, RepositoryCatalog},
    runtime::DockerRuntime,
    server::NbContainerServer,
    NbContainerResult,
};
use nbutils::RotatingLog;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const LOG_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> NbContainerResult<()> {
    let args = NbContainerArgs::parse();
    let mut config = NbContainerConfig::load(args.config.as_deref()).await?;

    match args.subcommand {
        Some(NbContainerSubcommand::Serve {
            host,
            port,
            base_url,
        }) => {
            let (log, guard) = init_tracing(Some(config.get_log())).await?;
            config.override_server(host, port, base_url);
            tracing::trace!("serving: server={:?}", config.get_server());

            let registry: Arc<dyn Registry> =
                Arc::new(DistributionRegistry::new(config.get_registry()));
            let kernels = Arc::new(KernelSpecResolver::new(config.get_kernel_spec_dirs().clone()));
            let runtime = Arc::new(DockerRuntime::connect()?);

            let containerizer = Containerizer::new(config, runtime, registry, kernels);
            let result = NbContainerServer::new(containerizer).serve().await;

            drop(guard);
            if let Some(log) = log {
                let _ = tokio::time::timeout(LOG_CLOSE_TIMEOUT, log.close()).await;
            }
            result?;
        }
        Some(NbContainerSubcommand::Repo { action }) => {
            init_tracing(None).await?;
            let registry = DistributionRegistry::new(config.get_registry());
            match action {
                RepoSubcommand::Create { name } => {
                    tracing::trace!("creating repository: name={name}");
                    registry.create_repository(&name).await?;
                    println!("{name}");
                }
                RepoSubcommand::List { next_token } => {
                    let page = registry.list_repositories(next_token.as_deref()).await?;
                    for repository in &page.repositories {
                        println!("{repository}");
                    }
                    if let Some(token) = page.next_token {
                        println!("next token: {token}");
                    }
                }
            }
        }
        None => {
            NbContainerArgs::command().print_help()?;
        }
    }

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions: *
//--------------------------------------------------------------------------------------------------

/// Logs to stderr, filtered by `RUST_LOG`, and to the rotating process log when one is given.
async fn init_tracing(
    log: Option<&LogConfig>,
) -> NbContainerResult<(Option<RotatingLog>, Option<WorkerGuard>)> {
    let (rotating, file_layer, guard) = match log {
        Some(log) => {
            let rotating =
                RotatingLog::new(log.get_path(), Some(*log.get_max_bytes()), *log.get_backups())
                    .await?;
            let (writer, guard) = tracing_appender::non_blocking(rotating.get_sync_writer());
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(rotating), Some(layer), Some(guard))
        }
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    Ok((rotating, guard))
}
