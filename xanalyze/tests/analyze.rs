mod common;

use anyhow::Result;
use common::{macho_executable, write_zip, FakeToolchain, INFO_PLIST};
use std::path::Path;
use xanalyze::{
    analyze, AnalysisRequest, AnalyzeEnv, Config, HostOs, Outcome, PackageKind,
};

fn env(root: &Path) -> AnalyzeEnv {
    AnalyzeEnv::with_config(HostOs::Linux, root.join("tools"), Config::default())
}

fn sample_apk(root: &Path) -> Result<std::path::PathBuf> {
    let apk = root.join("sample.apk");
    write_zip(
        &apk,
        &[
            ("AndroidManifest.xml", b"\x03\x00\x08\x00"),
            ("classes.dex", b"dex\n035\0"),
            ("res/layout/main.xml", b"\x03\x00\x08\x00"),
        ],
    )?;
    Ok(apk)
}

#[test]
fn unsupported_format_has_no_side_effects() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let toolchain = FakeToolchain::new();
    let request = AnalysisRequest::new(dir.path().join("notes.txt"), dir.path().join("out"));
    let outcome = analyze(&env(dir.path()), &toolchain, &request)?;
    assert_eq!(outcome, Outcome::Unsupported);
    assert!(toolchain.take_calls().is_empty());
    assert!(!dir.path().join("out").exists());
    assert!(!dir.path().join("tools").exists());
    Ok(())
}

#[test]
fn apk_runs_apktool_and_jadx() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let apk = sample_apk(dir.path())?;
    let out = dir.path().join("out");
    let env = env(dir.path());
    let toolchain = FakeToolchain::new();
    let outcome = analyze(&env, &toolchain, &AnalysisRequest::new(&apk, &out))?;
    assert_eq!(
        outcome,
        Outcome::Analyzed {
            kind: PackageKind::Android,
            output: "jadx done\n".into(),
        }
    );
    assert!(out.join("classes.dex").is_file());
    assert!(out.join("res").join("layout").join("main.xml").is_file());
    assert!(out.join("apktool-output").is_dir());
    assert!(out.join("jadx-output").is_dir());

    let calls = toolchain.take_calls();
    let n = calls.len();
    assert_eq!(
        calls[n - 2],
        format!(
            "java -jar {} d {} -o {} -f",
            env.apktool_jar().display(),
            apk.display(),
            out.join("apktool-output").display()
        )
    );
    assert_eq!(
        calls[n - 1],
        format!(
            "{} -d {} {}",
            xanalyze::script!("jadx"),
            out.join("jadx-output").display(),
            apk.display()
        )
    );
    Ok(())
}

#[test]
fn second_run_skips_provisioning() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let apk = sample_apk(dir.path())?;
    let env = env(dir.path());
    let toolchain = FakeToolchain::new();
    let request = AnalysisRequest::new(&apk, dir.path().join("out"));
    analyze(&env, &toolchain, &request)?;
    toolchain.take_calls();
    analyze(&env, &toolchain, &request)?;
    let calls = toolchain.take_calls();
    assert_eq!(calls.len(), 2);
    assert!(!calls
        .iter()
        .any(|call| call.starts_with("git") || call.starts_with("download")));
    Ok(())
}

#[test]
fn apktool_failure_still_runs_jadx() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let apk = sample_apk(dir.path())?;
    let toolchain = FakeToolchain::new().failing("java");
    let request = AnalysisRequest::new(&apk, dir.path().join("out"));
    let err = analyze(&env(dir.path()), &toolchain, &request).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.starts_with("failed to analyze package"));
    assert!(message.contains("apktool failed"));
    let calls = toolchain.take_calls();
    assert!(calls.last().unwrap().contains("jadx-output"));
    Ok(())
}

#[test]
fn both_android_failures_are_reported() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let apk = sample_apk(dir.path())?;
    let toolchain = FakeToolchain::new()
        .failing("java")
        .failing(xanalyze::script!("jadx"));
    let request = AnalysisRequest::new(&apk, dir.path().join("out"));
    let err = analyze(&env(dir.path()), &toolchain, &request).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("apktool failed"));
    assert!(message.contains("jadx failed"));
    Ok(())
}

#[test]
fn corrupt_package_fails_extraction() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let apk = dir.path().join("broken.apk");
    std::fs::write(&apk, b"definitely not a zip")?;
    let toolchain = FakeToolchain::new();
    let request = AnalysisRequest::new(&apk, dir.path().join("out"));
    let err = analyze(&env(dir.path()), &toolchain, &request).unwrap_err();
    assert!(format!("{:#}", err).starts_with("failed to extract package"));
    Ok(())
}

#[test]
fn ipa_dumps_headers() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let ipa = dir.path().join("Demo.ipa");
    let binary = macho_executable();
    write_zip(
        &ipa,
        &[
            ("Payload/Demo.app/Info.plist", INFO_PLIST.as_bytes()),
            ("Payload/Demo.app/Demo", &binary),
            (
                "Payload/Demo.app/Frameworks/App.framework/App",
                &binary,
            ),
        ],
    )?;
    let out = dir.path().join("out");
    let toolchain = FakeToolchain::new();
    let outcome = analyze(&env(dir.path()), &toolchain, &AnalysisRequest::new(&ipa, &out))?;
    assert_eq!(
        outcome,
        Outcome::Analyzed {
            kind: PackageKind::Ios,
            output: "class-dump done\n".into(),
        }
    );
    assert!(out.join("headers").is_dir());
    assert_eq!(
        toolchain.take_calls().last().unwrap(),
        &format!(
            "class-dump -H -o {} {}",
            out.join("headers").display(),
            out.join("Payload").join("Demo.app").join("Demo").display()
        )
    );
    Ok(())
}

#[test]
fn ipa_without_bundle_fails_analysis() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let ipa = dir.path().join("Empty.ipa");
    write_zip(&ipa, &[("iTunesMetadata.plist", b"<plist/>")])?;
    let toolchain = FakeToolchain::new();
    let request = AnalysisRequest::new(&ipa, dir.path().join("out"));
    let err = analyze(&env(dir.path()), &toolchain, &request).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.starts_with("failed to analyze package"));
    assert!(message.contains("no app bundle"));
    Ok(())
}
