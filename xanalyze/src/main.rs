use anyhow::Result;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use xanalyze::{AnalysisRequest, AnalyzeEnv, EnvArgs, SystemToolchain};

/// Extracts an apk or ipa and runs apktool/jadx or class-dump on it.
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to the .apk or .ipa file
    file_path: PathBuf,
    /// Directory receiving the extracted package and the analyzer output
    output_dir: PathBuf,
    #[clap(flatten)]
    env: EnvArgs,
}

fn main() -> Result<()> {
    use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};
    tracing_log::LogTracer::init().ok();
    let env = std::env::var("XANALYZE_LOG").unwrap_or_else(|_| "error".into());
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_span_events(FmtSpan::ACTIVE | FmtSpan::CLOSE)
        .with_env_filter(EnvFilter::new(env))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
    log_panics::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.print()?,
                _ => println!("{}", Args::command().render_usage()),
            }
            return Ok(());
        }
    };
    if let Err(err) = run(args) {
        println!("an error occurred: {:#}", err);
    }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let env = AnalyzeEnv::new(args.env)?;
    let request = AnalysisRequest::new(args.file_path, args.output_dir);
    let toolchain = SystemToolchain::new();
    xanalyze::analyze(&env, &toolchain, &request)?;
    Ok(())
}
