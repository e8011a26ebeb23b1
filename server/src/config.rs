use anyhow::{bail, Context, Result};
use sicide_core::{LoadRequest, MachineMode, MemoryWindow};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::controller::{validate_delay, ControllerSettings, DEFAULT_DELAY_MS};

pub const DEFAULT_SIMULATOR_URL: &str = "http://127.0.0.1:9090";
pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_STATIC_DIR: &str = "frontend/dist";
const DEFAULT_MEMORY_LEN: u32 = 256;

#[derive(Debug, Clone)]
pub struct Config {
    pub simulator_url: String,
    pub bind: SocketAddr,
    pub static_dir: PathBuf,
    pub project_root: PathBuf,
    pub controller: ControllerSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        Self::from_lookup(&args, |key| std::env::var(key).ok())
    }

    /// `args` are the positional arguments without the program name.
    pub fn from_lookup(args: &[String], lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let project_root = match args.first() {
            Some(root) => PathBuf::from(root),
            None => std::env::current_dir().context("cannot determine the working directory")?,
        };
        if !project_root.is_dir() {
            bail!("project root {} is not a directory", project_root.display());
        }

        let file_paths = if args.len() > 1 {
            args[1..]
                .iter()
                .map(|file| absolute(&project_root, Path::new(file)))
                .collect()
        } else {
            discover_sources(&project_root)?
        };

        let mode = match var("SICIDE_MODE") {
            Some(mode) => MachineMode::from_str(&mode).map_err(anyhow::Error::msg)?,
            None => MachineMode::default(),
        };

        let delay_ms = match var("SICIDE_STEP_DELAY_MS") {
            Some(raw) => {
                let ms: f64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("SICIDE_STEP_DELAY_MS={raw} is not a number"))?;
                validate_delay(ms)?
            }
            None => DEFAULT_DELAY_MS,
        };

        let output_dir = var("SICIDE_OUTPUT_DIR")
            .map(|dir| absolute(&project_root, Path::new(&dir)))
            .unwrap_or_else(|| project_root.join("out"));

        let memory_start = match var("SICIDE_MEMORY_START") {
            Some(raw) => parse_u32(&raw).context("SICIDE_MEMORY_START")?,
            None => 0,
        };
        let memory_len = match var("SICIDE_MEMORY_LEN") {
            Some(raw) => parse_u32(&raw).context("SICIDE_MEMORY_LEN")?,
            None => DEFAULT_MEMORY_LEN,
        };
        if memory_len == 0 {
            bail!("SICIDE_MEMORY_LEN must be at least 1");
        }
        let memory_end = memory_start
            .checked_add(memory_len - 1)
            .context("memory window runs past the address space")?;
        let memory = MemoryWindow::new(memory_start, memory_end)?;

        let bind = var("SICIDE_BIND")
            .unwrap_or_else(|| DEFAULT_BIND.to_string())
            .parse()
            .context("SICIDE_BIND is not a socket address")?;

        let request = LoadRequest {
            file_paths: file_paths
                .iter()
                .map(|p: &PathBuf| p.to_string_lossy().into_owned())
                .collect(),
            output_dir: output_dir.to_string_lossy().into_owned(),
            output_name: None,
            main: var("SICIDE_MAIN"),
        };

        Ok(Self {
            simulator_url: var("SICIDE_SIMULATOR_URL")
                .unwrap_or_else(|| DEFAULT_SIMULATOR_URL.to_string()),
            bind,
            static_dir: var("SICIDE_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR)),
            controller: ControllerSettings {
                mode,
                request,
                delay_ms,
                project_root: Some(project_root.clone()),
                memory,
            },
            project_root,
        })
    }
}

fn absolute(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Every `*.asm` directly under `root`, sorted by name.
fn discover_sources(root: &Path) -> Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    for entry in std::fs::read_dir(root)
        .with_context(|| format!("cannot list {}", root.display()))?
    {
        let path = entry?.path();
        let is_asm = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("asm"));
        if is_asm && path.is_file() {
            sources.push(path);
        }
    }
    sources.sort();
    Ok(sources)
}

fn parse_u32(raw: &str) -> Result<u32> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.with_context(|| format!("{raw:?} is not an address"))
}
