use crate::task::TaskRunner;
use crate::tools::Toolchain;
use crate::AnalysisRequest;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;
use xcommon::macho::{CpuArch, MachO};

pub const HEADERS_OUTPUT: &str = "headers";

/// The main executable of an app bundle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MachBinary {
    pub path: PathBuf,
    /// Slice to dump, only set for universal binaries with more than one
    /// slice.
    pub arch: Option<CpuArch>,
    pub encrypted: bool,
}

#[derive(Deserialize)]
struct InfoPlist {
    #[serde(rename = "CFBundleExecutable")]
    executable: Option<String>,
}

pub fn analyze(
    toolchain: &impl Toolchain,
    request: &AnalysisRequest,
    runner: &mut TaskRunner,
) -> Result<String> {
    runner.start_task("Locating executable");
    let binary = find_mach_o_binary(request.output_dir())?;
    println!("found executable {}", binary.path.display());
    if binary.encrypted {
        tracing::warn!("{} is encrypted", binary.path.display());
        println!(
            "warning: {} is encrypted, class-dump will not produce usable headers",
            binary.path.display()
        );
    }
    runner.end_task();

    runner.start_task("Running class-dump");
    let headers = request.output_dir().join(HEADERS_OUTPUT);
    std::fs::create_dir_all(&headers)?;
    let mut cmd = Command::new("class-dump");
    cmd.arg("-H").arg("-o").arg(&headers);
    if let Some(arch) = binary.arch {
        cmd.arg("--arch").arg(arch.to_string());
    }
    cmd.arg(&binary.path);
    let output = toolchain.run(&mut cmd)?;
    runner.end_task();
    Ok(output)
}

/// Locates the main executable in an extracted ipa.
///
/// The bundle is `Payload/*.app`. The executable is named by
/// `CFBundleExecutable` in its `Info.plist`, falling back to the file named
/// like the bundle and finally to any Mach-O executable at the top level of
/// the bundle. Nested frameworks and plugins are never considered.
pub fn find_mach_o_binary(extracted: &Path) -> Result<MachBinary> {
    let bundle = find_app_bundle(extracted)?;
    let path = bundle_executable(&bundle)?;
    let macho = MachO::probe(&path)?
        .with_context(|| format!("{} is not a mach-o binary", path.display()))?;
    let slice = macho
        .preferred_slice()
        .with_context(|| format!("{} has no slices", path.display()))?;
    let arch = if macho.slices().len() > 1 && !matches!(slice.arch, CpuArch::Other { .. }) {
        Some(slice.arch)
    } else {
        None
    };
    Ok(MachBinary {
        path,
        arch,
        encrypted: slice.encrypted,
    })
}

fn find_app_bundle(extracted: &Path) -> Result<PathBuf> {
    let payload = extracted.join("Payload");
    let pattern = format!("{}/*.app", glob::Pattern::escape(&payload.to_string_lossy()));
    let mut bundles: Vec<PathBuf> = glob::glob(&pattern)?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_dir())
        .collect();
    bundles.sort();
    if bundles.len() > 1 {
        tracing::warn!(
            "found {} app bundles in {}, using the first one",
            bundles.len(),
            payload.display()
        );
    }
    bundles
        .into_iter()
        .next()
        .with_context(|| format!("no app bundle found in {}", payload.display()))
}

fn bundle_executable(bundle: &Path) -> Result<PathBuf> {
    let info = bundle.join("Info.plist");
    if info.exists() {
        match plist::from_file::<_, InfoPlist>(&info) {
            Ok(InfoPlist {
                executable: Some(name),
            }) => {
                anyhow::ensure!(
                    Path::new(&name).file_name() == Some(OsStr::new(&name)),
                    "invalid CFBundleExecutable {:?}",
                    name
                );
                let path = bundle.join(&name);
                if path.is_file() {
                    return Ok(path);
                }
                tracing::warn!("CFBundleExecutable {} doesn't exist", path.display());
            }
            Ok(_) => tracing::warn!("{} has no CFBundleExecutable", info.display()),
            Err(err) => tracing::warn!("failed to parse {}: {}", info.display(), err),
        }
    }

    if let Some(stem) = bundle.file_stem() {
        let path = bundle.join(stem);
        if path.is_file() && probe(&path).is_some() {
            return Ok(path);
        }
    }

    let mut files = vec![];
    for entry in std::fs::read_dir(bundle)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    for path in files {
        if let Some(macho) = probe(&path) {
            if macho.is_executable() {
                return Ok(path);
            }
        }
    }
    anyhow::bail!("no mach-o executable found in {}", bundle.display());
}

/// Candidates that can't be read are skipped.
fn probe(path: &Path) -> Option<MachO> {
    match MachO::probe(path) {
        Ok(macho) => macho,
        Err(err) => {
            tracing::debug!("skipping {}: {:#}", path.display(), err);
            None
        }
    }
}
