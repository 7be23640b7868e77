//! Voicebed CLI Application

mod render;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use render::{parse_key_value, BatchFile, RenderJob, RenderReport};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use voicebed_core::{PresetManager, RenderSettings};

#[derive(Parser)]
#[command(name = "voicebed")]
#[command(about = "Voice cleanup, vocal presets and background-music mixing", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Preset directory (defaults to the platform config dir)
    #[arg(long, global = true, value_name = "DIR")]
    preset_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process one voice recording, optionally over a music bed
    Render(RenderArgs),
    /// Run every job of a TOML batch file concurrently
    Batch {
        jobs: PathBuf,
        /// Print the reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage named settings presets
    Presets {
        #[command(subcommand)]
        action: PresetAction,
    },
    /// Print the default settings as TOML
    Defaults,
}

#[derive(Args)]
struct RenderArgs {
    #[arg(long)]
    voice: PathBuf,
    #[arg(long)]
    music: Option<PathBuf>,
    #[arg(long, short)]
    out: PathBuf,
    /// Settings file (TOML)
    #[arg(long, conflicts_with = "preset")]
    settings: Option<PathBuf>,
    #[arg(long)]
    preset: Option<String>,
    /// Form-style override, e.g. `--set enable_nr=true --set val_nr=40`
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    overrides: Vec<(String, String)>,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum PresetAction {
    List,
    Show {
        name: String,
    },
    /// Save a preset from a settings file and/or overrides
    Save {
        name: String,
        #[arg(long)]
        from: Option<PathBuf>,
        #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        overrides: Vec<(String, String)>,
    },
    Delete {
        name: String,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn preset_manager(dir: Option<PathBuf>) -> anyhow::Result<PresetManager> {
    let dir = match dir {
        Some(dir) => dir,
        None => PresetManager::default_dir()?,
    };
    Ok(PresetManager::new(dir))
}

fn print_report(report: &RenderReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        info!(
            output = %report.output.display(),
            duration_secs = report.output_duration_secs,
            channels = report.channels,
            stages = ?report.stages,
            "Render finished"
        );
    }
    Ok(())
}

async fn render_command(args: RenderArgs, presets: &PresetManager) -> anyhow::Result<()> {
    let inline = match &args.settings {
        Some(path) => Some(
            RenderSettings::load_from_file(path)
                .await
                .with_context(|| format!("loading settings {}", path.display()))?,
        ),
        None => None,
    };

    let job = RenderJob {
        voice: args.voice,
        music: args.music,
        out: args.out,
        settings: inline,
        preset: args.preset,
        set: args
            .overrides
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect(),
    };

    let settings = job.resolve_settings(presets).await?;
    let report = render::run_job(job, settings).await?;
    print_report(&report, args.json)
}

async fn batch(path: PathBuf, json: bool, presets: &PresetManager) -> anyhow::Result<()> {
    let contents = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let file: BatchFile =
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    let base = path.parent().map(PathBuf::from).unwrap_or_default();

    let outcome = render::run_batch(file.jobs, &base, presets).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.reports)?);
    } else {
        for report in &outcome.reports {
            print_report(report, false)?;
        }
    }

    if outcome.failures > 0 {
        anyhow::bail!("{} job(s) failed", outcome.failures);
    }
    Ok(())
}

async fn presets_command(action: PresetAction, presets: &PresetManager) -> anyhow::Result<()> {
    match action {
        PresetAction::List => {
            for name in presets.list_presets().await? {
                println!("{name}");
            }
        }
        PresetAction::Show { name } => {
            let settings = presets.load_preset(&name).await?;
            print!("{}", settings.to_toml()?);
        }
        PresetAction::Save {
            name,
            from,
            overrides,
        } => {
            let mut settings = match from {
                Some(path) => RenderSettings::load_from_file(&path).await?,
                None => RenderSettings::default(),
            };
            settings.apply_form(overrides);
            presets.save_preset(&name, &settings).await?;
            info!(name = %name, dir = %presets.preset_dir().display(), "Preset saved");
        }
        PresetAction::Delete { name } => {
            presets.delete_preset(&name).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Command::Render(args) => render_command(args, &preset_manager(cli.preset_dir)?).await,
        Command::Batch { jobs, json } => batch(jobs, json, &preset_manager(cli.preset_dir)?).await,
        Command::Presets { action } => {
            presets_command(action, &preset_manager(cli.preset_dir)?).await
        }
        Command::Defaults => {
            print!("{}", RenderSettings::default().to_toml()?);
            Ok(())
        }
    }
}
