// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pinas::api::run_api_mode;
use pinas::cli::{Cli, Commands, ConfigCommand};
use pinas::mount::{MountOutcome, SimulatedMountSystem, UnmountOutcome};
use pinas::network::ScanOptions;
use pinas::service::{AutoMountOutcome, NetworkStorage};
use pinas::storage::StorageStats;
use pinas::utils::{format_bytes, warn_if_unprivileged};

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "pinas=debug,tower_http=debug"
    } else {
        "pinas=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Print `value` as pretty JSON, or hand it to `human` for text output.
fn emit<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T)) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

fn describe_stats(stats: &StorageStats) -> String {
    format!(
        "{} used of {} ({:.1}%), {} free",
        format_bytes(stats.used_bytes),
        format_bytes(stats.total_bytes),
        stats.usage_percent,
        format_bytes(stats.free_bytes)
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let storage = if cli.simulate {
        tracing::info!("simulation mode: mounts exist only in this process");
        NetworkStorage::simulated(&cli.config, Arc::new(SimulatedMountSystem::new()))
    } else {
        NetworkStorage::system(&cli.config, cli.sudo)
    };
    let json = cli.json;

    match cli.command {
        Commands::Config(ConfigCommand::Show) => {
            let config = storage.load_config();
            emit(json, &config, |c| {
                println!("Configuration: {}", storage.store().path().display());
                println!("  enabled:       {}", c.enabled);
                println!("  server:        {}", c.server_address);
                println!("  share:         {}", c.share_name);
                println!("  username:      {}", c.username);
                println!("  mount point:   {}", c.mount_point);
                println!("  protocol:      {} (port {})", c.protocol, c.port);
                println!("  timeout:       {}s", c.mount_timeout_seconds);
                println!("  auto-mount:    {}", c.auto_mount_on_startup);
            })?;
        }
        Commands::Config(ConfigCommand::Set(args)) => {
            let mut config = storage.load_config();
            args.apply(&mut config);
            storage.save_config(&config)?;
            emit(json, &config, |_| {
                println!("Saved {}", storage.store().path().display());
            })?;
        }
        Commands::Test(args) => {
            let mut config = storage.load_config();
            args.overrides.apply(&mut config);
            if config.server_address.trim().is_empty() {
                bail!("no server configured, pass --server or run `pinas config set`");
            }
            let report = storage.test_connection(&config, None).await?;
            emit(json, &report, |r| {
                if r.reachable {
                    println!("{}:{} is reachable", config.server_address, config.port);
                }
                if let Some(shares) = &r.shares {
                    if shares.is_empty() {
                        println!("No shares enumerated");
                    }
                    for share in shares {
                        let marker = if share.eq_ignore_ascii_case(&config.share_name) { "*" } else { " " };
                        println!(" {marker} {share}");
                    }
                }
            })?;
            if let Some(failure) = report.error {
                bail!("{}", failure.message);
            }
        }
        Commands::Mount => {
            warn_if_unprivileged(cli.sudo || cli.simulate);
            let outcome = storage.mount_configured(None).await?;
            emit(json, &outcome, |o| match o {
                MountOutcome::Mounted => println!("Mounted"),
                MountOutcome::AlreadyMounted => println!("Already mounted"),
            })?;
        }
        Commands::Unmount(args) => {
            warn_if_unprivileged(cli.sudo || cli.simulate);
            let outcome = match args.path {
                Some(path) => storage.manager().unmount(&path).await?,
                None => storage.unmount_configured().await?,
            };
            emit(json, &outcome, |o| match o {
                UnmountOutcome::Unmounted => println!("Unmounted"),
                UnmountOutcome::ForceUnmounted => println!("Unmounted (forced)"),
                UnmountOutcome::NotMounted => println!("Not mounted"),
            })?;
        }
        Commands::Status => {
            let status = storage.connection_status().await;
            emit(json, &status, |s| {
                println!("State:       {}", s.state);
                println!("Server:      {}", s.server_address);
                println!("Mount point: {}", s.mount_point);
                if let Some(stats) = &s.stats {
                    println!("Usage:       {}", describe_stats(stats));
                }
                if let Some(message) = &s.message {
                    println!("Note:        {message}");
                }
            })?;
        }
        Commands::Shares => {
            let shares = storage.list_mounted_shares().await;
            emit(json, &shares, |list| {
                if list.is_empty() {
                    println!("No network shares mounted");
                }
                for share in list {
                    let usage = share
                        .usage
                        .as_ref()
                        .map(describe_stats)
                        .unwrap_or_else(|| "usage unavailable".to_string());
                    println!(
                        "{} on {} type {} ({usage})",
                        share.source,
                        share.mount_point.display(),
                        share.filesystem_type
                    );
                }
            })?;
        }
        Commands::Scan(args) => {
            let scanner = storage.scanner().clone().with_options(ScanOptions {
                concurrency: args.concurrency,
                timeout: Duration::from_secs(args.timeout),
                ..ScanOptions::default()
            });
            let report = scanner.scan(&args.range).await?;
            emit(json, &report, |r| {
                println!(
                    "Scanned {} of {} hosts in {} in {:.1}s",
                    r.probed,
                    r.total_hosts,
                    r.range,
                    r.elapsed_ms as f64 / 1000.0
                );
                if r.timed_out {
                    println!("Scan deadline reached, results are partial");
                }
                for device in &r.devices {
                    println!(
                        "{:<15}  {:<30}  {:<17}  {}",
                        device.address,
                        device.hostname_or_unknown(),
                        device.mac_address.as_deref().unwrap_or("-"),
                        if device.smb_available { "SMB" } else { "" }
                    );
                }
            })?;
        }
        Commands::AutoMount => {
            let outcome = storage.auto_mount().await;
            emit(json, &outcome, |o| match o {
                AutoMountOutcome::Disabled => println!("Auto-mount disabled"),
                AutoMountOutcome::Incomplete { missing } => {
                    println!("Configuration incomplete, missing: {}", missing.join(", "))
                }
                AutoMountOutcome::AlreadyMounted => println!("Already mounted"),
                AutoMountOutcome::Mounted => println!("Mounted"),
                AutoMountOutcome::Failed { error } => println!("Auto-mount failed: {}", error.message),
            })?;
            if let AutoMountOutcome::Failed { error } = outcome {
                bail!("{}", error.message);
            }
        }
        Commands::Sync(args) => {
            let summary = storage
                .sync_media(&args.local_dir)
                .await
                .with_context(|| format!("failed to sync {}", args.local_dir.display()))?;
            emit(json, &summary, |s| {
                println!(
                    "Copied {} files ({}), {} already up to date",
                    s.copied,
                    format_bytes(s.bytes_copied),
                    s.skipped
                );
            })?;
        }
        Commands::Api(args) => {
            warn_if_unprivileged(cli.sudo || cli.simulate);
            run_api_mode(storage, &args).await?;
        }
    }

    Ok(())
}
