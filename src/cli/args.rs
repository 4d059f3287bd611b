// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "k8sroute")]
#[command(author, version, about = "Route Kubernetes resource changes to notifications")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Routing configuration file [default: ~/.k8sroute/config.yaml]
    #[arg(long, env = "K8SROUTE_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Kubernetes context to use (default: in-cluster or current context)
    #[arg(short, long, value_name = "CONTEXT")]
    pub context: Option<String>,

    /// Notification output format
    #[arg(short, long, value_enum, default_value = "json")]
    pub output: OutputFormat,

    /// Log format on stderr
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Load the configuration, print the route table and exit
    Validate,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// YAML documents separated by ---
    Yaml,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
