//! shiplane CLI
//!
//! Entry point for the `shiplane` command-line tool.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use shiplane::config::DEFAULT_CONFIG_FILE;
use shiplane::deploy::{self, DeployEvent};
use shiplane::lane::{BuildOptions, Lane, LaneError, OutputMode, RawOutputOptions, TestOptions};
use shiplane::LaneConfig;

#[derive(Parser)]
#[command(name = "shiplane")]
#[command(about = "Build, test, package, and deploy lane for Xcode projects", version)]
struct Cli {
    /// Path to lane config file (default: shiplane.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the configured target
    Build {
        /// SDK override for this build only
        #[arg(long)]
        sdk: Option<String>,

        /// Stream tool output live instead of writing the log file
        #[arg(long)]
        live: bool,
    },

    /// Build and run the test bundle
    Test {
        /// SDK override for this run only
        #[arg(long)]
        sdk: Option<String>,
    },

    /// Remove build products for the configured target
    Clean,

    /// Re-sign the built app bundle
    Sign,

    /// Package the app into an ipa and zip the dSYM
    Package,

    /// Publish packaged artifacts with a deployment method
    Deploy {
        /// Deployment method (web, ssh, testflight)
        method: String,

        /// Backend options as key=value pairs
        #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
        options: Vec<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("shiplane=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = match LaneConfig::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };

    let mut lane = match Lane::new(config) {
        Ok(lane) => lane,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    };

    let result = match cli.command {
        Commands::Build { sdk, live } => run_build(&mut lane, sdk, live),
        Commands::Test { sdk } => run_test(&mut lane, sdk),
        Commands::Clean => lane.clean().map(|_| ()),
        Commands::Sign => lane.sign(&mut RawOutputOptions::default()).map(|_| ()),
        Commands::Package => lane.package(&mut RawOutputOptions::default()).map(|_| ()),
        Commands::Deploy { method, options } => run_deploy(&mut lane, &method, &options),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn run_build(lane: &mut Lane, sdk: Option<String>, live: bool) -> Result<(), LaneError> {
    if live {
        let mut echo = |line: &str| println!("{}", line);
        lane.build(&mut BuildOptions {
            sdk,
            output: OutputMode::Live(&mut echo),
        })?;
    } else {
        lane.build(&mut BuildOptions {
            sdk,
            output: OutputMode::LogFile,
        })?;
        println!("Build log: {}", lane.config().build_log_path().display());
    }
    Ok(())
}

fn run_test(lane: &mut Lane, sdk: Option<String>) -> Result<(), LaneError> {
    let report = lane.test(TestOptions {
        sdk,
        formatters: None,
    })?;
    if !report.succeeded() {
        process::exit(70);
    }
    Ok(())
}

fn run_deploy(lane: &mut Lane, method: &str, raw_options: &[String]) -> Result<(), LaneError> {
    let mut options = HashMap::new();
    for pair in raw_options {
        match pair.split_once('=') {
            Some((key, value)) => {
                options.insert(key.to_string(), value.to_string());
            }
            None => {
                eprintln!("Invalid option '{}': expected KEY=VALUE", pair);
                eprintln!("Known methods: {}", deploy::method_names().join(", "));
                process::exit(1);
            }
        }
    }

    let mut progress = |event: DeployEvent| match event {
        DeployEvent::Started { method } => println!("Deploying via {}...", method),
        DeployEvent::Progress(message) => println!("  {}", message),
        DeployEvent::Uploaded { what } => println!("  uploaded {}", what),
        DeployEvent::Finished => println!("Done."),
    };
    lane.deploy(method, options, &mut progress)
}
