use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const APKTOOL_VERSION: &str = "2.9.3";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory the tools get cloned into.
    pub tools_dir: Option<PathBuf>,
    /// Version of the prebuilt apktool jar to fetch and run.
    pub apktool_version: Option<String>,
    #[serde(default)]
    pub repos: Repos,
}

impl Config {
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Default::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("invalid config {}", path.display()))?;
        if let Some(version) = config.apktool_version.as_deref() {
            anyhow::ensure!(
                !version.is_empty() && !version.contains(['/', '\\']),
                "invalid apktool version {:?}",
                version
            );
        }
        Ok(config)
    }

    pub fn apktool_version(&self) -> &str {
        self.apktool_version.as_deref().unwrap_or(APKTOOL_VERSION)
    }
}

/// Git remotes the tools are cloned from.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Repos {
    pub apktool: String,
    pub frida: String,
    pub jadx: String,
}

impl Default for Repos {
    fn default() -> Self {
        Self {
            apktool: "https://github.com/iBotPeaches/Apktool.git".into(),
            frida: "https://github.com/frida/frida.git".into(),
            jadx: "https://github.com/skylot/jadx.git".into(),
        }
    }
}
