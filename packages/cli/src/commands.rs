//! Subcommands and their execution.

use std::time::Duration;

use clap::Subcommand;
use serde::Serialize;

use xbus_client::{
    CancellationToken, Client, ClientConfig, LeaseId, ServiceDescriptor, ServiceEndpoint,
    WatchOutcome,
};

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Client(#[from] xbus_client::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read and write configuration values
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Register and discover services
    #[command(subcommand)]
    Service(ServiceCommand),

    /// Keep leases alive or revoke them
    #[command(subcommand)]
    Lease(LeaseCommand),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the current value of a key
    Get { key: String },

    /// Write a value; with --revision the write only succeeds if the stored
    /// version still matches
    Put {
        key: String,
        value: String,
        #[arg(long, default_value_t = 0)]
        revision: i64,
    },

    /// Wait for the value to move past a revision
    Watch {
        key: String,
        #[arg(long, default_value_t = 0)]
        revision: i64,
        /// Seconds to wait per poll; 0 waits forever
        #[arg(long, default_value_t = 60)]
        timeout: u64,
        /// Keep watching until interrupted
        #[arg(long)]
        follow: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ServiceCommand {
    /// Print one service version with its endpoints
    Get { name: String, version: String },

    /// Print every version of a service
    List { name: String },

    /// Wait for the endpoint set of a service version to change
    Watch {
        name: String,
        version: String,
        #[arg(long, default_value_t = 60)]
        timeout: u64,
        #[arg(long)]
        follow: bool,
    },

    /// Register an endpoint
    Plug {
        name: String,
        version: String,
        address: String,
        #[arg(long = "type", default_value = "rpc")]
        kind: String,
        #[arg(long)]
        proto: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Opaque endpoint configuration
        #[arg(long = "endpoint-config")]
        endpoint_config: Option<String>,
        /// Lease TTL in seconds; 0 lets the server pick
        #[arg(long, default_value_t = 0)]
        ttl: u64,
        /// Attach to an existing lease instead of creating one
        #[arg(long)]
        lease: Option<i64>,
        /// Keep the lease alive until interrupted, then revoke it
        #[arg(long)]
        keep_alive: bool,
    },

    /// Remove an endpoint
    Unplug {
        name: String,
        version: String,
        address: String,
    },

    /// Replace the stored configuration of an endpoint
    Update {
        name: String,
        version: String,
        address: String,
        #[arg(long = "endpoint-config")]
        endpoint_config: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum LeaseCommand {
    /// Reset the TTL of a lease once
    Keepalive { lease: i64 },

    /// Revoke a lease and everything bound to it
    Revoke { lease: i64 },
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn secs_or_none(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// A token that fires on Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

pub async fn run(config: ClientConfig, command: Command) -> Result<(), CliError> {
    let client = Client::new(config)?;
    match command {
        Command::Config(command) => run_config(&client, command).await,
        Command::Service(command) => run_service(&client, command).await,
        Command::Lease(command) => run_lease(&client, command).await,
    }
}

async fn run_config(client: &Client, command: ConfigCommand) -> Result<(), CliError> {
    let configs = client.configs();
    match command {
        ConfigCommand::Get { key } => print_json(&configs.get(&key).await?),
        ConfigCommand::Put {
            key,
            value,
            revision,
        } => {
            let revision = configs.put_revision(&key, &value, revision).await?;
            print_json(&serde_json::json!({ "revision": revision }))
        }
        ConfigCommand::Watch {
            key,
            mut revision,
            timeout,
            follow,
        } => {
            let cancel = interrupt_token();
            loop {
                let outcome = match configs
                    .watch(&key, revision, secs_or_none(timeout), &cancel)
                    .await
                {
                    Err(e) if e.is_cancelled() => return Ok(()),
                    other => other?,
                };
                match outcome {
                    WatchOutcome::Changed(item) => {
                        revision = item.version;
                        print_json(&item)?;
                    }
                    WatchOutcome::Timeout if !follow => {
                        return Err(CliError::Usage("timed out without a change".to_string()))
                    }
                    WatchOutcome::Timeout => {}
                }
                if !follow {
                    return Ok(());
                }
            }
        }
    }
}

async fn run_service(client: &Client, command: ServiceCommand) -> Result<(), CliError> {
    let services = client.services();
    match command {
        ServiceCommand::Get { name, version } => print_json(&services.get(&name, &version).await?),
        ServiceCommand::List { name } => print_json(&services.get_all(&name).await?),
        ServiceCommand::Watch {
            name,
            version,
            timeout,
            follow,
        } => {
            let cancel = interrupt_token();
            loop {
                let outcome = match services
                    .watch(&name, &version, secs_or_none(timeout), &cancel)
                    .await
                {
                    Err(e) if e.is_cancelled() => return Ok(()),
                    other => other?,
                };
                match outcome {
                    WatchOutcome::Changed(service) => print_json(&service)?,
                    WatchOutcome::Timeout if !follow => {
                        return Err(CliError::Usage("timed out without a change".to_string()))
                    }
                    WatchOutcome::Timeout => {}
                }
                if !follow {
                    return Ok(());
                }
            }
        }
        ServiceCommand::Plug {
            name,
            version,
            address,
            kind,
            proto,
            description,
            endpoint_config,
            ttl,
            lease,
            keep_alive,
        } => {
            let descriptor = ServiceDescriptor {
                name,
                version,
                kind,
                proto,
                description,
            };
            let endpoint = ServiceEndpoint {
                address,
                config: endpoint_config,
            };
            let lease = services
                .plug_lease(
                    &descriptor,
                    &endpoint,
                    secs_or_none(ttl),
                    lease.map(LeaseId),
                )
                .await?;
            print_json(&lease)?;

            if keep_alive {
                keep_lease_alive(client, lease).await?;
            }
            Ok(())
        }
        ServiceCommand::Unplug {
            name,
            version,
            address,
        } => Ok(services.unplug(&name, &version, &address).await?),
        ServiceCommand::Update {
            name,
            version,
            address,
            endpoint_config,
        } => {
            let endpoint = ServiceEndpoint {
                address: address.clone(),
                config: endpoint_config,
            };
            Ok(services.update(&name, &version, &address, &endpoint).await?)
        }
    }
}

/// Drive keep-alives until Ctrl-C, then revoke the lease.
async fn keep_lease_alive(client: &Client, lease: xbus_client::Lease) -> Result<(), CliError> {
    let cancel = interrupt_token();
    let leases = client.leases();
    let mut ticker = tokio::time::interval(lease.keep_alive_interval());
    // The first tick completes immediately; the plug just refreshed the lease.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = leases.keep_alive(lease.lease_id).await {
                    if e.is_lease_gone() {
                        return Err(CliError::Usage(format!(
                            "lease {} expired; endpoint is no longer registered",
                            lease.lease_id
                        )));
                    }
                    eprintln!("keep-alive failed: {}", e);
                }
            }
        }
    }

    leases.revoke(lease.lease_id).await?;
    Ok(())
}

async fn run_lease(client: &Client, command: LeaseCommand) -> Result<(), CliError> {
    let leases = client.leases();
    match command {
        LeaseCommand::Keepalive { lease } => Ok(leases.keep_alive(LeaseId(lease)).await?),
        LeaseCommand::Revoke { lease } => Ok(leases.revoke(LeaseId(lease)).await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct TestArgs {
        #[command(subcommand)]
        command: Command,
    }

    #[test]
    fn parses_conditional_put() {
        let args =
            TestArgs::try_parse_from(["xbus", "config", "put", "db.url", "x", "--revision", "3"])
                .unwrap();
        match args.command {
            Command::Config(ConfigCommand::Put { key, revision, .. }) => {
                assert_eq!(key, "db.url");
                assert_eq!(revision, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parses_plug_with_keep_alive() {
        let args = TestArgs::try_parse_from([
            "xbus",
            "service",
            "plug",
            "auth",
            "1.0",
            "10.0.0.1:9000",
            "--ttl",
            "30",
            "--keep-alive",
        ])
        .unwrap();
        match args.command {
            Command::Service(ServiceCommand::Plug {
                kind,
                ttl,
                keep_alive,
                lease,
                ..
            }) => {
                assert_eq!(kind, "rpc");
                assert_eq!(ttl, 30);
                assert!(keep_alive);
                assert_eq!(lease, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn zero_seconds_is_none() {
        assert_eq!(secs_or_none(0), None);
        assert_eq!(secs_or_none(5), Some(Duration::from_secs(5)));
    }
}
