// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

mod cli;
mod config;
mod error;
mod event;
mod kubernetes;
mod output;
mod registration;
mod router;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use cli::{Args, Command, LogFormat, OutputFormat};
use config::Config;
use kubernetes::ResourceMapper;
use registration::{ChannelDispatcher, Notification};
use router::RouteTableHandle;

/// Initialize logging to stderr; stdout carries notifications
fn init_logging(verbose: bool, format: LogFormat) {
    let filter = if verbose { "k8sroute=debug" } else { "k8sroute=info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider (aws-lc-rs); fails only if one is already set
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let args = Args::parse();
    init_logging(args.verbose, args.log_format);

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::default_path()?,
    };
    let config = Config::load(&config_path)?;

    if args.command == Some(Command::Validate) {
        return print_summary(&config);
    }

    run(&args, config_path, config).await
}

fn print_summary(config: &Config) -> Result<()> {
    let table = config.route_table()?;
    println!("source: {}", config.name);
    for (resource, event_type, count) in table.summary() {
        println!("  {:<40} {:<8} {}", resource, event_type.as_str(), count);
    }
    println!("{} routes", table.len());
    Ok(())
}

async fn run(args: &Args, config_path: PathBuf, config: Config) -> Result<()> {
    let client = kubernetes::connect(args.context.as_deref()).await?;

    let mapper = Arc::new(ResourceMapper::core());
    if let Err(e) = mapper.refresh(&client).await {
        warn!(error = %e, "Resource discovery failed, only core resources are known");
    }
    mapper.clone().spawn_refresh(client.clone());

    let table = Arc::new(RouteTableHandle::new(config.route_table()?));
    let (dispatcher, mut notifications) = ChannelDispatcher::new();
    let informers = registration::register(&config.name, &table, &mapper, Arc::new(dispatcher));
    if informers.is_empty() {
        warn!("No resources to watch");
    }
    for informer in informers {
        tokio::spawn(informer.run(client.clone()));
    }

    #[cfg(unix)]
    tokio::spawn(reload_on_hangup(config_path, table.clone()));
    #[cfg(not(unix))]
    let _ = config_path;

    let printed = print_notifications(
        &mut notifications,
        args.output,
        tokio::signal::ctrl_c(),
        &mut std::io::stdout(),
    )
    .await?;
    info!(printed, "Shutting down");
    Ok(())
}

/// Write notifications until the channel closes or `shutdown` completes
async fn print_notifications<F, W>(
    notifications: &mut UnboundedReceiver<Notification>,
    format: OutputFormat,
    shutdown: F,
    out: &mut W,
) -> Result<usize>
where
    F: Future,
    W: Write,
{
    tokio::pin!(shutdown);
    let mut printed = 0;

    loop {
        tokio::select! {
            notification = notifications.recv() => {
                let Some(notification) = notification else {
                    break;
                };
                match notification.format(format) {
                    Ok(formatted) => {
                        writeln!(out, "{}", formatted).context("Failed to write notification")?;
                        printed += 1;
                    }
                    Err(e) => warn!(error = %e, "Failed to format notification"),
                }
            }
            _ = &mut shutdown => break,
        }
    }
    Ok(printed)
}

/// Rebuild the route table from the config file on every SIGHUP
///
/// Routes and constraints change in place. Newly watched resources or event
/// types need a restart, since informers are registered once.
#[cfg(unix)]
async fn reload_on_hangup(path: PathBuf, table: Arc<RouteTableHandle>) {
    use tokio::signal::unix::{SignalKind, signal};

    fn subscriptions(table: &router::RouteTable) -> Vec<(String, event::EventType)> {
        table
            .summary()
            .into_iter()
            .map(|(resource, event_type, _)| (resource, event_type))
            .collect()
    }

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGHUP handler, reload disabled");
            return;
        }
    };

    while hangup.recv().await.is_some() {
        info!(path = %path.display(), "Reloading configuration");
        let reloaded = Config::load(&path).and_then(|c| Ok(c.route_table()?));
        match reloaded {
            Ok(new_table) => {
                if subscriptions(&new_table) != subscriptions(&table.load()) {
                    warn!("Watched resources or event types changed, restart to apply them");
                }
                table.swap(new_table);
            }
            Err(e) => {
                let error = format!("{:#}", e);
                warn!(error = %error, "Failed to reload configuration, keeping current routes");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::fixtures::notification;
    use tokio::sync::{mpsc, oneshot};

    #[tokio::test]
    async fn test_prints_until_channel_closes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        for _ in 0..3 {
            tx.send(notification(Vec::new())).unwrap();
        }
        drop(tx);

        // Shutdown never fires; the same future is polled on every turn
        let (_keep, shutdown) = oneshot::channel::<()>();
        let mut out = Vec::new();
        let printed = print_notifications(&mut rx, OutputFormat::Json, shutdown, &mut out)
            .await
            .unwrap();

        assert_eq!(printed, 3);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 3);
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
        let mut out = Vec::new();
        let printed =
            print_notifications(&mut rx, OutputFormat::Yaml, std::future::ready(()), &mut out)
                .await
                .unwrap();

        assert_eq!(printed, 0);
        assert!(out.is_empty());
        drop(tx);
    }
}
