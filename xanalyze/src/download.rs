use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use reqwest::blocking::{Client, Response};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Bodies up to this size are kept in memory instead of being spooled to
/// disk.
pub const BUFFER_LIMIT: u64 = 10 * 1024;

pub fn github_release(org: &str, name: &str, version: &str, artifact: &str) -> String {
    format!(
        "https://github.com/{}/{}/releases/download/{}/{}",
        org, name, version, artifact
    )
}

/// A fetched response body.
#[derive(Debug, Eq, PartialEq)]
pub enum Payload {
    /// Small body held in memory.
    Buffered(Vec<u8>),
    /// Large or unsized body already written to a temporary file.
    Spooled(PathBuf),
}

impl Payload {
    /// Moves the body to `dest`.
    pub fn persist(self, dest: &Path) -> Result<()> {
        match self {
            Self::Buffered(bytes) => std::fs::write(dest, bytes)
                .with_context(|| format!("failed to write {}", dest.display()))?,
            Self::Spooled(tmp) => std::fs::rename(&tmp, dest).with_context(|| {
                format!("failed to move {} to {}", tmp.display(), dest.display())
            })?,
        }
        Ok(())
    }
}

/// Whether a body of the announced length is kept in memory.
fn buffered(len: Option<u64>) -> bool {
    matches!(len, Some(len) if len <= BUFFER_LIMIT)
}

fn spool_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

pub struct DownloadManager {
    client: Client,
}

impl DownloadManager {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Fetches `url`. Bodies that don't fit into memory are spooled next to
    /// `dest`.
    pub fn fetch(&self, url: &str, dest: &Path) -> Result<Payload> {
        tracing::info!("GET {}", url);
        let resp = self.client.get(url).send()?;
        anyhow::ensure!(
            resp.status().is_success(),
            "GET {} returned status code {}",
            url,
            resp.status()
        );
        let len = resp.content_length();
        if buffered(len) {
            Ok(Payload::Buffered(resp.bytes()?.to_vec()))
        } else {
            self.spool(resp, len, dest)
        }
    }

    fn spool(&self, mut resp: Response, len: Option<u64>, dest: &Path) -> Result<Payload> {
        let pb = ProgressBar::with_draw_target(len, ProgressDrawTarget::stdout())
        .with_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {prefix:.bold} [{elapsed}] {wide_bar:.green} {bytes}/{total_bytes} {msg}")?
                .progress_chars("█▇▆▅▄▃▂▁  ")
        );
        let file_name = dest
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        pb.set_prefix(file_name);
        pb.set_message("📥 downloading");

        let tmp = spool_path(dest);
        let file = File::create(&tmp)
            .with_context(|| format!("failed to create {}", tmp.display()))?;
        let mut writer = pb.wrap_write(BufWriter::new(file));
        std::io::copy(&mut resp, &mut writer)?;
        writer.flush()?;
        pb.finish_with_message("📥 downloaded");
        Ok(Payload::Spooled(tmp))
    }

    pub fn download(&self, url: &str, dest: &Path) -> Result<()> {
        self.fetch(url, dest)?.persist(dest)
    }
}

impl Default for DownloadManager {
    fn default() -> Self {
        Self::new()
    }
}
