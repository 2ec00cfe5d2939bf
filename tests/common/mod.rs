#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::Compression;
use flate2::write::GzEncoder;

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_pwatch") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "pwatch.exe" } else { "pwatch" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve pwatch binary path for integration test"),
    }
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    run_cli_case_with_env(case_name, args, &[])
}

/// Run the binary with extra environment variables. `PW_*` variables from the
/// calling environment are cleared so they cannot leak into the case.
pub fn run_cli_case_with_env(case_name: &str, args: &[&str], envs: &[(&str, &str)]) -> CmdResult {
    let root = std::env::temp_dir().join("pwatch-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let mut command = Command::new(&bin_path);
    command.args(args).env("RUST_BACKTRACE", "1");
    for (key, _) in std::env::vars() {
        if key.starts_with("PW_") {
            command.env_remove(key);
        }
    }
    for (key, value) in envs {
        command.env(key, value);
    }
    let output = command.output().expect("execute pwatch command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

// ──────────────────── log fixtures ────────────────────

pub fn login_line(time: &str, user: &str) -> String {
    format!(
        "[{time}] [Server thread/INFO]: {user}[/192.168.1.20:52814] logged in with entity id 311 at (12.5, 64.0, -30.5)\n"
    )
}

pub fn logout_line(time: &str, user: &str) -> String {
    format!("[{time}] [Server thread/INFO]: {user} lost connection: Disconnected\n")
}

pub fn noise_line(time: &str) -> String {
    format!("[{time}] [Server thread/INFO]: Saving chunks for level 'world'/minecraft:overworld\n")
}

pub fn write_archive(path: &Path, body: &str) {
    let file = fs::File::create(path).expect("create archive");
    let mut enc = GzEncoder::new(file, Compression::default());
    enc.write_all(body.as_bytes()).expect("write archive");
    enc.finish().expect("finish archive");
}

pub fn append(path: &Path, body: &str) {
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .expect("open for append");
    file.write_all(body.as_bytes()).expect("append");
}

/// Minimal config file pointing at `log_dir`, with the feed off and the
/// activity log inside `root`.
pub fn write_config(root: &Path, log_dir: &Path) -> PathBuf {
    let path = root.join("pwatch.toml");
    let body = format!(
        "[tail]\nlog_dir = {:?}\npoll_interval_ms = 50\n\n[feed]\nenabled = false\n\n[paths]\nactivity_log = {:?}\n",
        log_dir.display().to_string(),
        root.join("activity.jsonl").display().to_string(),
    );
    fs::write(&path, body).expect("write config");
    path
}
