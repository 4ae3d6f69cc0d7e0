//! love-fragment - CLI
//!
//! Plays the host container: starts a headless engine session, delivers
//! pause/resume/quit on a timeline and prints what the engine observed.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use love_fragment::util::logger::{self, LogLevel};
use love_fragment::{run_headless, FragmentConfig, HeadlessRun, RunReport, NAME, VERSION};

/// Drive an embedded engine session the way a host container would
#[derive(Parser, Debug)]
#[command(name = "love-fragment")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to $LOVE_FRAGMENT_CONFIG, then ./love-fragment.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a resource in the headless engine
    Run {
        /// Resource path handed to the engine as its first argument
        #[arg(value_name = "RESOURCE")]
        resource: String,

        /// Stop after this many frames
        #[arg(long, value_name = "N")]
        frames: Option<u64>,

        /// Send pause after this many milliseconds
        #[arg(long, value_name = "MS")]
        pause_after_ms: Option<u64>,

        /// Send resume after this many milliseconds
        #[arg(long, value_name = "MS")]
        resume_after_ms: Option<u64>,

        /// Call quit after this many milliseconds
        #[arg(long, value_name = "MS")]
        quit_after_ms: Option<u64>,

        /// Bound the quit wait (overrides the config file)
        #[arg(long, value_name = "MS")]
        quit_timeout_ms: Option<u64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the resolved configuration
    Config,
}

fn main() -> Result<()> {
    let args = Args::parse();

    logger::init_with_level(if args.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Warn
    });

    let mut config = FragmentConfig::load(args.config.as_deref()).context("Failed to load config")?;

    match args.command {
        Commands::Run {
            resource,
            frames,
            pause_after_ms,
            resume_after_ms,
            quit_after_ms,
            quit_timeout_ms,
            json,
        } => {
            if quit_timeout_ms.is_some() {
                config.quit_timeout_ms = quit_timeout_ms;
            }
            let run = HeadlessRun {
                max_frames: frames,
                pause_after: pause_after_ms.map(Duration::from_millis),
                resume_after: resume_after_ms.map(Duration::from_millis),
                quit_after: quit_after_ms.map(Duration::from_millis),
                ..HeadlessRun::new(resource.as_str())
            };
            let report =
                run_headless(&run, config).with_context(|| format!("Failed to run: {}", resource))?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to encode report")?
                );
            } else {
                print_report(&report);
            }
        }
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
        }
    }

    Ok(())
}

fn print_report(report: &RunReport) {
    println!("resource:  {}", report.resource);
    println!("argv:      {}", report.argv.join(" "));
    println!("start:     {:?}", report.start);
    println!("quit:      {:?}", report.quit);
    if let Some(outcome) = &report.outcome {
        println!("outcome:   {}", outcome);
    }
    if let Some(exit) = report.exit {
        println!("exit:      {:?}", exit);
    }
    println!("frames:    {}", report.frames);
    if report.events.is_empty() {
        println!("events:    (none)");
    } else {
        println!("events:    {}", report.events.join(", "));
    }
    println!(
        "contexts:  {} retained, {} released",
        report.host.retains, report.host.releases
    );
    println!("elapsed:   {} ms", report.elapsed_ms);
}
