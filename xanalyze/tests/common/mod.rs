#![allow(dead_code)]

use anyhow::Result;
use byteorder::{LittleEndian, WriteBytesExt};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use xanalyze::Toolchain;
use zip::write::FileOptions;
use zip::ZipWriter;

/// Records every side effect instead of performing it. `git clone` creates
/// the destination directory, `brew install` puts the formula on the fake
/// `PATH` and downloads write a placeholder file.
#[derive(Default)]
pub struct FakeToolchain {
    path: RefCell<HashMap<String, PathBuf>>,
    failing: Vec<String>,
    calls: RefCell<Vec<String>>,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(self, name: &str) -> Self {
        self.path
            .borrow_mut()
            .insert(name.to_string(), Path::new("/usr/local/bin").join(name));
        self
    }

    pub fn failing(mut self, program: &str) -> Self {
        self.failing.push(program.to_string());
        self
    }

    pub fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.borrow_mut())
    }
}

impl Toolchain for FakeToolchain {
    fn which(&self, name: &str) -> Option<PathBuf> {
        self.path.borrow().get(name).cloned()
    }

    fn download(&self, url: &str, dest: &Path) -> Result<()> {
        self.calls
            .borrow_mut()
            .push(format!("download {} {}", url, dest.display()));
        std::fs::write(dest, b"PK\x03\x04")?;
        Ok(())
    }

    fn run(&self, command: &mut Command) -> Result<String> {
        let program = Path::new(command.get_program())
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let args: Vec<String> = command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        self.calls
            .borrow_mut()
            .push(format!("{} {}", program, args.join(" ")));
        anyhow::ensure!(
            !self.failing.contains(&program),
            "`{}` exited with 1",
            program
        );
        match (program.as_str(), args.first().map(String::as_str)) {
            ("git", Some("clone")) => std::fs::create_dir_all(&args[2])?,
            ("brew", Some("install")) => {
                let formula = &args[1];
                self.path
                    .borrow_mut()
                    .insert(formula.clone(), Path::new("/opt/homebrew/bin").join(formula));
            }
            _ => {}
        }
        Ok(format!("{} done\n", program))
    }
}

pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) -> Result<()> {
    let mut zip = ZipWriter::new(File::create(path)?);
    for (name, contents) in entries {
        zip.start_file(*name, FileOptions::default())?;
        zip.write_all(contents)?;
    }
    zip.finish()?;
    Ok(())
}

/// 64 bit arm64 Mach-O header without load commands.
pub fn macho_executable() -> Vec<u8> {
    let mut buf = vec![];
    for word in [0xfeed_facf_u32, 0x0100_000c, 0, 0x2, 0, 0, 0, 0] {
        buf.write_u32::<LittleEndian>(word).unwrap();
    }
    buf
}

pub const INFO_PLIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>CFBundleExecutable</key>
    <string>Demo</string>
    <key>CFBundleIdentifier</key>
    <string>com.example.demo</string>
</dict>
</plist>
"#;
