use crate::task::TaskRunner;
use crate::tools::{ToolSet, Toolchain};
use crate::{AnalysisRequest, AnalyzeEnv, PackageKind, Stage};
use anyhow::{Context, Result};

mod android;
mod ios;

pub use ios::{find_mach_o_binary, MachBinary};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The input is neither an apk nor an ipa, nothing was done.
    Unsupported,
    /// Output of the last analyzer that ran.
    Analyzed { kind: PackageKind, output: String },
}

/// Provisions the tools, extracts the package and runs the analyzers for
/// its kind.
pub fn analyze(
    env: &AnalyzeEnv,
    toolchain: &impl Toolchain,
    request: &AnalysisRequest,
) -> Result<Outcome> {
    let kind = if let Some(kind) = request.kind() {
        kind
    } else {
        println!(
            "unsupported format {}, please provide an apk or ipa file",
            request.input().display()
        );
        return Ok(Outcome::Unsupported);
    };
    let mut runner = TaskRunner::new(4);

    runner.start_task("Provisioning tools");
    let mut tools = ToolSet::scan(env, toolchain);
    tools.provision(env, toolchain).context(Stage::Provision)?;
    tracing::debug!("tools:\n{}", tools);
    runner.end_task();

    runner.start_task(format!("Extracting {}", kind.extension()));
    extract(request).context(Stage::Extract)?;
    runner.end_task();

    let output = match kind {
        PackageKind::Android => android::analyze(env, toolchain, request, &mut runner),
        PackageKind::Ios => ios::analyze(toolchain, request, &mut runner),
    }
    .context(Stage::Analyze)?;
    println!("{} analysis finished", kind);
    Ok(Outcome::Analyzed { kind, output })
}

/// Unpacks the package into the output directory. apks and ipas are both
/// zip archives.
pub fn extract(request: &AnalysisRequest) -> Result<()> {
    println!(
        "extracting {} to {}",
        request.input().display(),
        request.output_dir().display()
    );
    xcommon::extract_zip(request.input(), request.output_dir())
}
