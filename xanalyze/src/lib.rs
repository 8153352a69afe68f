use crate::config::Repos;
use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};

/// Name of a script shipped by a tool, `.bat` flavoured on windows.
#[macro_export]
macro_rules! script {
    ($name:expr) => {
        if cfg!(target_os = "windows") {
            concat!($name, ".bat")
        } else {
            $name
        }
    };
}

pub mod command;
mod config;
mod download;
mod task;
pub mod tools;

pub use crate::command::{analyze, Outcome};
pub use crate::config::Config;
pub use crate::download::{DownloadManager, Payload};
pub use crate::tools::{SystemToolchain, Tool, ToolSet, Toolchain};

/// Operating system family of the machine running the analysis.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HostOs {
    Windows,
    Mac,
    Linux,
    Bsd,
    Unknown,
}

impl HostOs {
    const WINDOWS: &'static [&'static str] = &[
        "mswin", "msys", "mingw", "cygwin", "bccwin", "wince", "emc", "windows",
    ];
    const MAC: &'static [&'static str] = &["darwin", "mac os", "macos"];
    const LINUX: &'static [&'static str] = &["linux"];
    const BSD: &'static [&'static str] = &["solaris", "bsd"];

    /// Classifies a host identifier such as `x86_64-apple-darwin21` or
    /// `linux`.
    pub fn classify(host: &str) -> Self {
        let host = host.to_lowercase();
        let matches = |tokens: &[&str]| tokens.iter().any(|token| host.contains(token));
        if matches(Self::WINDOWS) {
            Self::Windows
        } else if matches(Self::MAC) {
            Self::Mac
        } else if matches(Self::LINUX) {
            Self::Linux
        } else if matches(Self::BSD) {
            Self::Bsd
        } else {
            Self::Unknown
        }
    }

    pub fn detect() -> Self {
        Self::classify(std::env::consts::OS)
    }
}

impl std::fmt::Display for HostOs {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Windows => write!(f, "win"),
            Self::Mac => write!(f, "mac"),
            Self::Linux => write!(f, "linux"),
            Self::Bsd => write!(f, "bsd"),
            Self::Unknown => write!(f, "error"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PackageKind {
    Android,
    Ios,
}

impl PackageKind {
    /// Classifies a package by the suffix of its file name. A bare `.apk` is
    /// still an apk.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy();
        if name.ends_with(".apk") {
            Some(Self::Android)
        } else if name.ends_with(".ipa") {
            Some(Self::Ios)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Android => "apk",
            Self::Ios => "ipa",
        }
    }
}

impl std::fmt::Display for PackageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Android => write!(f, "android"),
            Self::Ios => write!(f, "ios"),
        }
    }
}

/// The package to analyze and where to put the results.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AnalysisRequest {
    input: PathBuf,
    output_dir: PathBuf,
}

impl AnalysisRequest {
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn kind(&self) -> Option<PackageKind> {
        PackageKind::from_path(&self.input)
    }
}

/// Step of the pipeline an error originated from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Provision,
    Extract,
    Analyze,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Provision => write!(f, "failed to provision tools"),
            Self::Extract => write!(f, "failed to extract package"),
            Self::Analyze => write!(f, "failed to analyze package"),
        }
    }
}

#[derive(Parser)]
pub struct EnvArgs {
    /// Directory holding the cloned analysis tools. Defaults to
    /// `$XANALYZE_TOOLS` or `tools`.
    #[clap(long)]
    tools_dir: Option<PathBuf>,
    /// Path to a yaml config file. Defaults to `xanalyze.yaml` if present.
    #[clap(long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct AnalyzeEnv {
    host: HostOs,
    tools_dir: PathBuf,
    apktool_version: String,
    repos: Repos,
}

impl AnalyzeEnv {
    pub fn new(args: EnvArgs) -> Result<Self> {
        let config = if let Some(path) = args.config.as_ref() {
            anyhow::ensure!(path.exists(), "config file doesn't exist {}", path.display());
            Config::parse(path)?
        } else {
            Config::parse("xanalyze.yaml")?
        };
        let tools_dir = args
            .tools_dir
            .or_else(|| std::env::var_os("XANALYZE_TOOLS").map(PathBuf::from))
            .or_else(|| config.tools_dir.clone())
            .unwrap_or_else(|| PathBuf::from("tools"));
        let host = HostOs::detect();
        tracing::debug!("host os {}, tools dir {}", host, tools_dir.display());
        Ok(Self::with_config(host, tools_dir, config))
    }

    pub fn with_config(host: HostOs, tools_dir: PathBuf, config: Config) -> Self {
        Self {
            host,
            tools_dir,
            apktool_version: config.apktool_version().to_string(),
            repos: config.repos,
        }
    }

    pub fn host(&self) -> HostOs {
        self.host
    }

    pub fn tools_dir(&self) -> &Path {
        &self.tools_dir
    }

    pub fn apktool_version(&self) -> &str {
        &self.apktool_version
    }

    pub fn repo(&self, tool: Tool) -> &str {
        match tool {
            Tool::Apktool => &self.repos.apktool,
            Tool::Frida => &self.repos.frida,
            Tool::Jadx => &self.repos.jadx,
        }
    }

    pub fn tool_dir(&self, tool: Tool) -> PathBuf {
        self.tools_dir.join(tool.dir_name())
    }

    pub fn apktool_jar_name(&self) -> String {
        format!("apktool_{}.jar", self.apktool_version)
    }

    pub fn apktool_jar(&self) -> PathBuf {
        self.tool_dir(Tool::Apktool).join(self.apktool_jar_name())
    }

    pub fn apktool_jar_url(&self) -> String {
        download::github_release(
            "iBotPeaches",
            "Apktool",
            &format!("v{}", self.apktool_version),
            &self.apktool_jar_name(),
        )
    }

    /// Launcher produced by `gradlew dist` in the jadx checkout.
    pub fn jadx_build_bin(&self) -> PathBuf {
        self.tool_dir(Tool::Jadx)
            .join("build")
            .join("jadx")
            .join("bin")
            .join(script!("jadx"))
    }
}
