use crate::download::DownloadManager;
use crate::{AnalyzeEnv, HostOs};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Everything the analyzer does outside of its own process.
pub trait Toolchain {
    /// Looks up an executable on `PATH`.
    fn which(&self, name: &str) -> Option<PathBuf>;

    /// Fetches `url` into `dest`.
    fn download(&self, url: &str, dest: &Path) -> Result<()>;

    /// Runs `command` to completion and returns what it printed. A non zero
    /// exit status is an error.
    fn run(&self, command: &mut Command) -> Result<String>;
}

#[derive(Default)]
pub struct SystemToolchain {
    downloads: DownloadManager,
}

impl SystemToolchain {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Toolchain for SystemToolchain {
    fn which(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        self.downloads.download(url, dest)
    }

    fn run(&self, command: &mut Command) -> Result<String> {
        crate::task::capture(command)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tool {
    Apktool,
    Frida,
    Jadx,
}

impl Tool {
    pub const ALL: [Tool; 3] = [Self::Apktool, Self::Frida, Self::Jadx];

    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Apktool => "Apktool",
            Self::Frida => "frida",
            Self::Jadx => "jadx",
        }
    }

    /// Homebrew formula used instead of a source checkout on mac.
    fn formula(self) -> Option<&'static str> {
        match self {
            Self::Apktool => Some("apktool"),
            Self::Frida => None,
            Self::Jadx => Some("jadx"),
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Apktool => write!(f, "apktool"),
            Self::Frida => write!(f, "frida"),
            Self::Jadx => write!(f, "jadx"),
        }
    }
}

#[derive(Clone, Debug)]
struct Entry {
    tool: Tool,
    dir: PathBuf,
    repo: String,
    present: bool,
}

/// Presence of the analysis tools in the tools directory.
#[derive(Clone, Debug)]
pub struct ToolSet {
    entries: Vec<Entry>,
}

impl ToolSet {
    pub fn scan(env: &AnalyzeEnv, toolchain: &impl Toolchain) -> Self {
        let entries = Tool::ALL
            .iter()
            .map(|&tool| {
                let dir = env.tool_dir(tool);
                let present = dir.exists()
                    || (tool == Tool::Apktool && toolchain.which("apktool").is_some());
                Entry {
                    tool,
                    dir,
                    repo: env.repo(tool).to_string(),
                    present,
                }
            })
            .collect();
        Self { entries }
    }

    pub fn is_present(&self, tool: Tool) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.tool == tool && entry.present)
    }

    /// Installs or clones every missing tool. Tools that are already
    /// present are left untouched, nothing is rolled back on failure.
    pub fn provision(&mut self, env: &AnalyzeEnv, toolchain: &impl Toolchain) -> Result<()> {
        std::fs::create_dir_all(env.tools_dir())?;
        let brew = if env.host() == HostOs::Mac {
            toolchain.which("brew")
        } else {
            None
        };
        for entry in &mut self.entries {
            if entry.present {
                println!("{} already present", entry.tool);
                continue;
            }
            match entry.tool {
                Tool::Apktool => {
                    if let (Some(brew), Some(formula)) = (&brew, entry.tool.formula()) {
                        brew_install(toolchain, brew, formula)?;
                    } else {
                        println!("cloning {}", entry.tool);
                        git_clone(toolchain, &entry.repo, &entry.dir)?;
                        let jar = env.apktool_jar();
                        println!("downloading {}", env.apktool_jar_name());
                        toolchain.download(&env.apktool_jar_url(), &jar)?;
                    }
                }
                Tool::Frida => {
                    println!("cloning {}", entry.tool);
                    git_clone(toolchain, &entry.repo, &entry.dir)?;
                }
                Tool::Jadx => {
                    println!("cloning {}", entry.tool);
                    git_clone(toolchain, &entry.repo, &entry.dir)?;
                    if let (Some(brew), Some(formula)) = (&brew, entry.tool.formula()) {
                        brew_install(toolchain, brew, formula)?;
                    } else {
                        // a relative program path is resolved against the
                        // child's working directory
                        let dir = std::env::current_dir()?.join(&entry.dir);
                        let mut gradlew = Command::new(dir.join(script!("gradlew")));
                        gradlew.arg("dist").current_dir(&dir);
                        toolchain.run(&mut gradlew)?;
                    }
                }
            }
            entry.present = true;
        }
        Ok(())
    }
}

impl std::fmt::Display for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for entry in &self.entries {
            write!(f, "{:10} ", entry.tool.to_string())?;
            if entry.present {
                write!(f, "{:12}", "present")?;
            } else {
                write!(f, "{:12}", "missing")?;
            }
            writeln!(f, "{}", entry.repo)?;
        }
        Ok(())
    }
}

fn git_clone(toolchain: &impl Toolchain, repo: &str, dest: &Path) -> Result<()> {
    let mut git = Command::new("git");
    git.arg("clone").arg(repo).arg(dest);
    toolchain.run(&mut git)?;
    Ok(())
}

fn brew_install(toolchain: &impl Toolchain, brew: &Path, formula: &str) -> Result<()> {
    let mut cmd = Command::new(brew);
    cmd.arg("install").arg(formula);
    toolchain.run(&mut cmd)?;
    Ok(())
}

/// Command line prefix that launches apktool.
///
/// The pinned jar in the tools directory wins over an `apktool` found on
/// `PATH`, e.g. one installed with homebrew.
pub fn apktool_command(env: &AnalyzeEnv, toolchain: &impl Toolchain) -> Result<Command> {
    let jar = env.apktool_jar();
    if jar.exists() {
        let mut cmd = Command::new("java");
        cmd.arg("-jar").arg(jar);
        Ok(cmd)
    } else if let Some(apktool) = toolchain.which("apktool") {
        Ok(Command::new(apktool))
    } else {
        anyhow::bail!("apktool not found: neither {} nor `apktool` on PATH", jar.display());
    }
}

/// Command that launches jadx, either from `PATH` or from the checkout built
/// by `gradlew dist`.
pub fn jadx_command(env: &AnalyzeEnv, toolchain: &impl Toolchain) -> Command {
    if let Some(jadx) = toolchain.which("jadx") {
        Command::new(jadx)
    } else {
        Command::new(env.jadx_build_bin())
    }
}
