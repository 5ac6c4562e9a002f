//! `brokkr` - build installable Python gRPC packages from proto definitions.
//!
//! Thin dispatcher over [`Pipeline`]: loads `.env`, parses flags, runs the
//! catalog, prints the report. Exit code 0 when every package succeeded, 1
//! when any package failed, 2 for configuration errors.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use brokkr::config::{
    self, DEFAULT_COMPILER, DEFAULT_COMPILER_TIMEOUT_SECS, DEFAULT_OUTPUT_ROOT,
    DEFAULT_PACKAGE_VERSION, DEFAULT_PROTO_DIR,
};
use brokkr::{BuildConfig, Pipeline, catalog};

// ── CLI ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "brokkr", version)]
#[command(about = "build installable Python client/server packages from gRPC protos")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// compile protos and build every catalog package
    Build {
        /// plan only: report what would be written without invoking the
        /// compiler or writing anything
        #[arg(long)]
        dry_run: bool,
        /// emit the run report as JSON on stdout instead of status lines
        #[arg(long)]
        json: bool,
        /// directory containing the proto sources
        #[arg(long, default_value = DEFAULT_PROTO_DIR)]
        proto_dir: PathBuf,
        /// root directory generated packages are published under
        #[arg(long, env = "OUTPUT_DIR", default_value = DEFAULT_OUTPUT_ROOT)]
        output_root: PathBuf,
        /// version stamped into every generated manifest
        #[arg(long, env = "PACKAGE_VERSION", default_value = DEFAULT_PACKAGE_VERSION)]
        package_version: String,
        /// stub compiler command line (split on whitespace)
        #[arg(long, env = "PROTO_COMPILER", default_value = DEFAULT_COMPILER)]
        compiler: String,
        /// seconds before a compiler invocation is killed
        #[arg(long, default_value_t = DEFAULT_COMPILER_TIMEOUT_SECS)]
        compiler_timeout: u64,
        /// build packages one at a time instead of in parallel
        #[arg(long)]
        sequential: bool,
    },
    /// list the packages a build would produce
    List,
}

// ── entry point ─────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    // .env first so both the env filter and clap's env fallbacks see it
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "brokkr=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Build {
            dry_run,
            json,
            proto_dir,
            output_root,
            package_version,
            compiler,
            compiler_timeout,
            sequential,
        } => {
            let compiler_argv = match config::split_command(&compiler) {
                Ok(argv) => argv,
                Err(err) => {
                    eprintln!("{err}");
                    return ExitCode::from(2);
                }
            };
            let config = BuildConfig {
                proto_dir,
                output_root,
                package_version,
                compiler_argv,
                compiler_timeout_secs: compiler_timeout,
                sequential,
            };
            run_build(config, dry_run, json).await
        }
        Command::List => run_list(),
    }
}

// ── commands ────────────────────────────────────────────────────────

async fn run_build(config: BuildConfig, dry_run: bool, json: bool) -> ExitCode {
    let pipeline = Pipeline::with_default_compiler(config);

    let report = match pipeline.run(dry_run).await {
        Ok(report) => report,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(2);
        }
    };

    if json {
        match report.to_json() {
            Ok(text) => println!("{text}"),
            Err(err) => {
                eprintln!("failed to encode report: {err}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print!("{}", report.render());
    }

    if report.all_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run_list() -> ExitCode {
    for spec in catalog() {
        println!("{:<18} {}", spec.name(), spec.description());
    }
    ExitCode::SUCCESS
}
