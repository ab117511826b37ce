//! Stack Compiler CLI
//!
//! Usage:
//!   stack-compiler [OPTIONS] --app <APP> --env <ENV> <MANIFEST>
//!
//! Options:
//!   -a, --app <APP>              Application name
//!   -e, --env <ENV>              Environment to resolve and compile for
//!   -r, --runtime <FILE>         Runtime configuration (TOML format)
//!   --region <REGION>            Region, overrides the runtime config
//!   -p, --params <FILE>          Write the parameters JSON to this file
//!   --unique-suffix <SUFFIX>     Reuse the suffix of a previous deployment
//!   -h, --help                   Print help

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use stack_compiler::{compile_for_environment, resolve_partition, RuntimeConfig, Workload};

#[derive(Parser)]
#[command(name = "stack-compiler")]
#[command(about = "Compile a workload manifest into a deployable stack template")]
struct Cli {
    /// Workload manifest (YAML format)
    manifest: PathBuf,

    /// Application name
    #[arg(short, long)]
    app: String,

    /// Environment to resolve and compile for
    #[arg(short, long)]
    env: String,

    /// Runtime configuration file (TOML format)
    #[arg(short, long)]
    runtime: Option<PathBuf>,

    /// Region; the partition is derived from it
    #[arg(long)]
    region: Option<String>,

    /// Write the parameters JSON to this file instead of stdout
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// Uniqueness suffix read back from the deployed stack
    #[arg(long)]
    unique_suffix: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    let mut runtime = match &cli.runtime {
        Some(path) => match RuntimeConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading runtime config '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => RuntimeConfig::default(),
    };
    if let Some(region) = cli.region {
        runtime = runtime.with_partition(resolve_partition(&region));
        runtime.region = region;
    }
    if let Some(suffix) = cli.unique_suffix {
        runtime = runtime.with_unique_suffix(suffix);
    }

    let workload: Workload = match fs::read_to_string(&cli.manifest) {
        Ok(content) => match serde_yaml::from_str(&content) {
            Ok(workload) => workload,
            Err(e) => {
                eprintln!("Error parsing manifest '{}': {}", cli.manifest.display(), e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("Error reading manifest '{}': {}", cli.manifest.display(), e);
            std::process::exit(1);
        }
    };

    let artifact = match compile_for_environment(&workload, &cli.app, &cli.env, &runtime) {
        Ok(artifact) => artifact,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let rendered = artifact
        .template_body()
        .and_then(|body| artifact.serialized_parameters().map(|params| (body, params)));
    let (body, params) = match rendered {
        Ok(rendered) => rendered,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    print!("{}", body);
    match &cli.params {
        Some(path) => {
            if let Err(e) = fs::write(path, params) {
                eprintln!("Error writing parameters '{}': {}", path.display(), e);
                std::process::exit(1);
            }
        }
        None => {
            println!("---");
            println!("{}", params);
        }
    }
}
