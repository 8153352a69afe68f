use crate::task::TaskRunner;
use crate::tools::{apktool_command, jadx_command, Toolchain};
use crate::{AnalysisRequest, AnalyzeEnv};
use anyhow::Result;

pub const APKTOOL_OUTPUT: &str = "apktool-output";
pub const JADX_OUTPUT: &str = "jadx-output";

/// Runs apktool and jadx one after the other. jadx runs even if apktool
/// failed; the run fails if either of them did.
pub fn analyze(
    env: &AnalyzeEnv,
    toolchain: &impl Toolchain,
    request: &AnalysisRequest,
    runner: &mut TaskRunner,
) -> Result<String> {
    runner.start_task("Running apktool");
    let apktool = run_apktool(env, toolchain, request);
    runner.end_task();

    runner.start_task("Running jadx");
    let jadx = run_jadx(env, toolchain, request);
    runner.end_task();

    match (apktool, jadx) {
        (Ok(_), Ok(output)) => Ok(output),
        (Err(err), Ok(_)) => Err(err.context("apktool failed")),
        (Ok(_), Err(err)) => Err(err.context("jadx failed")),
        (Err(apktool), Err(jadx)) => anyhow::bail!(
            "apktool failed: {:#}; jadx failed: {:#}",
            apktool,
            jadx
        ),
    }
}

fn run_apktool(
    env: &AnalyzeEnv,
    toolchain: &impl Toolchain,
    request: &AnalysisRequest,
) -> Result<String> {
    let out = request.output_dir().join(APKTOOL_OUTPUT);
    std::fs::create_dir_all(&out)?;
    let mut cmd = apktool_command(env, toolchain)?;
    cmd.arg("d")
        .arg(request.input())
        .arg("-o")
        .arg(&out)
        .arg("-f");
    toolchain.run(&mut cmd)
}

fn run_jadx(env: &AnalyzeEnv, toolchain: &impl Toolchain, request: &AnalysisRequest) -> Result<String> {
    let out = request.output_dir().join(JADX_OUTPUT);
    std::fs::create_dir_all(&out)?;
    let mut cmd = jadx_command(env, toolchain);
    cmd.arg("-d").arg(&out).arg(request.input());
    toolchain.run(&mut cmd)
}
