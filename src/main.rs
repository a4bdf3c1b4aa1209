//! Binary entry point for the fleeting-scaleway CLI.

mod cli;

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use fleeting_scaleway::{
    ConfigError, ExponentialBackoff, FleetConfig, GroupError, Instance, InstanceGroup, Limiter,
    RateLimitedProvider, ScaleOutcome, ScalewayProvider,
};

use cli::Cli;

/// Failures per provider call before the limiter starts delaying it.
const BACKOFF_AFTER: u32 = 3;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Group(#[from] GroupError),
    #[error("{failed} of {requested} requested instances failed:\n{details}")]
    Partial {
        requested: usize,
        failed: usize,
        details: String,
    },
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupt received, cancelling");
                cancel.cancel();
            }
            Err(err) => warn!(error = %err, "cannot listen for interrupts"),
        }
    });
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = FleetConfig::load_without_cli_args()?;
    let group_config = config.group_config()?;

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let limiter = Arc::new(Limiter::new(BACKOFF_AFTER, ExponentialBackoff::default()));
    let scaleway = ScalewayProvider::new(config.credentials(), config.zone.clone());
    let provider = RateLimitedProvider::new(scaleway, limiter, cancel.clone());
    let mut group = InstanceGroup::new(config.name.clone(), group_config, Arc::new(provider));
    group.init(&cancel).await?;

    match cli {
        Cli::Increase(command) => {
            let outcome = group.increase(&cancel, command.count).await?;
            write_created(io::stdout().lock(), &group, &outcome)?;
            ensure_complete(command.count, &outcome)
        }
        Cli::Decrease(command) => {
            let outcome = group.decrease(&cancel, &command.instances).await?;
            write_ids(io::stdout().lock(), &outcome)?;
            ensure_complete(command.instances.len(), &outcome)
        }
        Cli::List => {
            let instances = group.list(&cancel).await?;
            write_instances(io::stdout().lock(), &instances)?;
            Ok(())
        }
        Cli::Sanity => {
            writeln!(
                io::stdout().lock(),
                "group {}: {} instances",
                group.name(),
                group.size()
            )?;
            Ok(())
        }
    }
}

fn write_created(
    mut target: impl Write,
    group: &InstanceGroup,
    outcome: &ScaleOutcome,
) -> io::Result<()> {
    for iid in &outcome.ids {
        let name = iid.split_once(':').map_or(iid.as_str(), |(name, _)| name);
        match group.credential(name) {
            Some(password) => writeln!(target, "{iid}\t{password}")?,
            None => writeln!(target, "{iid}")?,
        }
    }
    Ok(())
}

fn write_ids(mut target: impl Write, outcome: &ScaleOutcome) -> io::Result<()> {
    for iid in &outcome.ids {
        writeln!(target, "{iid}")?;
    }
    Ok(())
}

fn write_instances(mut target: impl Write, instances: &[Instance]) -> io::Result<()> {
    for instance in instances {
        let status = instance
            .server
            .as_ref()
            .map_or("unknown", |server| server.status.as_str());
        writeln!(target, "{}\t{status}", instance.iid())?;
    }
    Ok(())
}

fn ensure_complete(requested: usize, outcome: &ScaleOutcome) -> Result<(), CliError> {
    match outcome.joined() {
        None => Ok(()),
        Some(joined) => Err(CliError::Partial {
            requested,
            failed: requested.saturating_sub(outcome.ids.len()),
            details: joined.to_string(),
        }),
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use fleeting_scaleway::ServerRecord;
    use fleeting_scaleway::provider::ServerId;
    use rstest::rstest;

    use super::*;

    fn server(id: &str, name: &str, status: &str) -> ServerRecord {
        ServerRecord {
            id: ServerId::new(id),
            name: name.to_owned(),
            status: status.to_owned(),
            labels: fleeting_scaleway::provider::Labels::new(),
            public_ipv4: None,
            public_ipv6: None,
        }
    }

    #[rstest]
    fn instances_are_listed_with_status() {
        let instances = vec![
            Instance::from_server(server("srv-1", "ci-0", "running")),
            Instance::from_server(server("srv-2", "ci-1", "starting")),
        ];
        let mut buffer = Vec::new();
        write_instances(&mut buffer, &instances).expect("write");

        assert_eq!(
            String::from_utf8(buffer).expect("utf-8"),
            "ci-0:srv-1\trunning\nci-1:srv-2\tstarting\n"
        );
    }

    #[rstest]
    fn complete_outcomes_succeed() {
        let outcome = ScaleOutcome {
            ids: vec![String::from("ci-0:srv-1")],
            failures: Vec::new(),
        };
        assert!(ensure_complete(1, &outcome).is_ok());
    }

    #[rstest]
    fn partial_outcomes_report_every_failure() {
        let outcome = ScaleOutcome {
            ids: vec![String::from("ci-0:srv-1")],
            failures: vec![
                GroupError::InvalidIid {
                    value: String::from("bogus"),
                },
                GroupError::Cancelled,
            ],
        };
        let err = ensure_complete(3, &outcome).expect_err("failures recorded");
        let message = err.to_string();

        assert!(message.starts_with("2 of 3 requested instances failed"));
        assert!(message.contains("invalid instance id: bogus"));
        assert!(message.contains("instance group operation cancelled"));
    }

    #[rstest]
    fn errors_are_written_on_one_line_each() {
        let mut buffer = Vec::new();
        write_error(&mut buffer, &CliError::Group(GroupError::NotInitialized));
        assert_eq!(
            String::from_utf8(buffer).expect("utf-8"),
            "instance group is not initialized\n"
        );
    }
}
