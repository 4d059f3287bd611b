// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use anyhow::{Context, Result, anyhow};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::time::Duration;
use tracing::info;

/// Timeout for connecting to K8s API
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Create a client for the given kubeconfig context.
///
/// Without a context the configuration is inferred: in-cluster service
/// account first, then the kubeconfig current context.
pub async fn connect(context: Option<&str>) -> Result<Client> {
    let mut config = match context {
        Some(context) => {
            let kubeconfig = Kubeconfig::read().context("Failed to read kubeconfig")?;
            if !kubeconfig.contexts.iter().any(|c| c.name == context) {
                return Err(anyhow!("Context '{}' not found in kubeconfig", context));
            }
            Config::from_custom_kubeconfig(
                kubeconfig,
                &KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..Default::default()
                },
            )
            .await
            .with_context(|| format!("Failed to load kubeconfig for context '{}'", context))?
        }
        None => Config::infer()
            .await
            .context("Failed to infer Kubernetes configuration")?,
    };

    // Watches hold the connection open, so only the connect phase is bounded
    config.connect_timeout = Some(CONNECT_TIMEOUT);

    let cluster_url = config.cluster_url.to_string();
    let client = Client::try_from(config).context("Failed to create Kubernetes client")?;
    info!(cluster = %cluster_url, "Connected to cluster");
    Ok(client)
}
