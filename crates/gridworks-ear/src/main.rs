//! `gear` - CLI for the GridWorks ear
//!
//! Runs the ear service and inspects what it has archived.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;

use gridworks_ear::cache::LocalCache;
use gridworks_ear::cli::{Cli, Command, ConfigCommand, RecentCommand};
use gridworks_ear::cron::modified_at;
use gridworks_ear::store::open_store;
use gridworks_ear::subscriptions::subscriptions;
use gridworks_ear::{daemon, init_logging, watchdog, Ear, EarSettings, Journal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    match cli.command {
        Command::Config(config_cmd) => handle_config(cli.config, config_cmd),
        command => {
            let settings = EarSettings::load_from(cli.config).context("loading settings")?;
            run_command(command, settings).await
        }
    }
}

async fn run_command(command: Command, settings: EarSettings) -> anyhow::Result<()> {
    match command {
        Command::Run => daemon::run(settings).await?,
        Command::Status(status_cmd) => handle_status(&settings, status_cmd.json)?,
        Command::Flush => handle_flush(settings).await?,
        Command::Topics => handle_topics(&settings),
        Command::Recent(recent_cmd) => handle_recent(&settings, &recent_cmd)?,
        Command::Watchdog => {
            let outcome = watchdog::check(&settings, Utc::now()).await?;
            println!("{outcome}");
        }
        Command::Config(config_cmd) => handle_config(None, config_cmd)?,
    }
    Ok(())
}

fn handle_status(settings: &EarSettings, json: bool) -> anyhow::Result<()> {
    let journal = Journal::open(settings.journal_path())?;
    let stats = journal.stats()?;
    let cache = LocalCache::open(settings.cache_dir())?;
    let cached_files = cache.len()?;
    let cached_bytes = cache.size_bytes()?;
    let last_minute = modified_at(&settings.minute_cron_file())?;
    let last_hour = modified_at(&settings.hour_cron_file())?;
    let last_day = modified_at(&settings.day_cron_file())?;

    if json {
        let status = serde_json::json!({
            "g_node_alias": settings.g_node_alias,
            "world_instance_alias": settings.world_instance_alias,
            "universe_type": settings.universe_type,
            "journal": stats,
            "cache": {
                "dir": settings.cache_dir(),
                "files": cached_files,
                "bytes": cached_bytes,
            },
            "cron": {
                "minute": last_minute,
                "hour": last_hour,
                "day": last_day,
            },
            "alarm_raised": settings.alarm_file().exists(),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let show = |at: Option<chrono::DateTime<Utc>>| {
        at.map_or_else(|| "never".to_string(), |at| at.to_rfc3339())
    };

    println!("gear status");
    println!("-----------");
    println!("Ear:           {}", settings.g_node_alias);
    println!(
        "World:         {} ({})",
        settings.world_instance_alias, settings.universe_type
    );
    println!("Journal:       {}", settings.journal_path().display());
    println!("  Messages:    {}", stats.total_messages);
    println!("  Uploaded:    {}", stats.uploaded);
    println!("  Cached:      {}", stats.cached);
    println!("  Payloads:    {} bytes", stats.payload_bytes);
    println!("  Newest:      {}", show(stats.newest_message));
    println!("Cache:         {}", settings.cache_dir().display());
    println!("  Waiting:     {cached_files} files, {cached_bytes} bytes");
    println!("Last minute:   {}", show(last_minute));
    println!("Last hour:     {}", show(last_hour));
    println!("Last day:      {}", show(last_day));
    if settings.alarm_file().exists() {
        println!();
        println!("Watchdog alarm is raised ({})", settings.alarm_file().display());
    }
    Ok(())
}

async fn handle_flush(settings: EarSettings) -> anyhow::Result<()> {
    let now = Utc::now();
    let store = open_store(&settings).await?;
    let mut ear = Ear::new(settings, store, now)?;

    if ear.cache().is_empty()? {
        println!("Cache is empty.");
        return Ok(());
    }
    if !ear.heartbeat(now).await {
        bail!("object store is unreachable; nothing uploaded");
    }

    let report = ear.try_to_empty_cache(now).await?;
    println!(
        "Uploaded {} files, {} still cached.",
        report.uploaded, report.remaining
    );
    Ok(())
}

fn handle_topics(settings: &EarSettings) {
    let subs = subscriptions(&settings.tracking);
    if subs.is_empty() {
        println!("No tracked aliases configured.");
        return;
    }
    for sub in subs {
        println!("{} ({:?})", sub.topic, sub.qos);
    }
}

fn handle_recent(settings: &EarSettings, cmd: &RecentCommand) -> anyhow::Result<()> {
    let journal = Journal::open(settings.journal_path())?;
    let entries = journal.recent(cmd.limit)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("No messages journaled yet.");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{}  {:<8}  {:>7} B  {}",
            entry.received_at.format("%Y-%m-%d %H:%M:%S%.3f"),
            entry.status.to_string(),
            entry.size_bytes,
            entry.file_name
        );
    }
    Ok(())
}

fn handle_config(
    config_path: Option<std::path::PathBuf>,
    cmd: ConfigCommand,
) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let settings = EarSettings::load_from(config_path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&settings.redacted())?);
            } else {
                println!("Current Settings");
                println!("================");
                println!();
                println!("  GNode alias:        {}", settings.g_node_alias);
                println!("  World instance:     {}", settings.world_instance_alias);
                println!("  Universe:           {}", settings.universe_type);
                println!("  FQDN:               {}", settings.my_fqdn);
                println!("  Output dir:         {}", settings.output_dir.display());
                println!();
                println!("[MQTT]");
                println!("  Broker:             {}:{}", settings.mqtt.host, settings.mqtt.port);
                println!("  Keep alive (secs):  {}", settings.mqtt.keep_alive_secs);
                println!();
                println!("[Tracking]");
                println!("  ATNs:               {}", settings.tracking.atn_aliases.len());
                println!("  SCADAs:             {}", settings.tracking.scada_aliases.len());
                println!(
                    "  Local sensors:      {}",
                    settings.tracking.local_sensor_aliases.len()
                );
                println!();
                println!("[Store]");
                println!("  Kind:               {:?}", settings.store.kind);
                println!("  Bucket:             {}", settings.store.bucket_name);
                println!("  Region:             {}", settings.store.region_name);
                println!();
                println!("[Alerts]");
                println!(
                    "  Slack:              {}",
                    if settings.slack.web_hook_url.is_empty() { "off" } else { "on" }
                );
                println!("  Dead after (secs):  {}", settings.watchdog.dead_after_secs);
            }
        }
        ConfigCommand::Path => {
            println!("{}", EarSettings::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .or(config_path)
                .unwrap_or_else(EarSettings::default_config_path);
            println!("Validating configuration: {}", path.display());
            match EarSettings::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}
