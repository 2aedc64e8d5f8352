//! Function discovery: introspection providers that list a binary's functions.

use crate::model::FunctionRef;
use crate::result::{EnsayoError, EnsayoResult};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Lists the functions of a program
pub trait FunctionSource {
    /// Enumerate functions; stable across calls for the same program.
    ///
    /// # Errors
    ///
    /// Returns [`EnsayoError::Discovery`] when the program cannot be read.
    fn enumerate_functions(&self) -> EnsayoResult<Vec<FunctionRef>>;
}

/// `address type name[\tfile:line]` as printed by `nm --line-numbers`
const NM_LINE: &str = r"^([0-9a-fA-F]+)\s+([TtWw])\s+(\S+)(?:\t(.+):(\d+))?$";

/// Discovers text symbols with the system `nm`
#[derive(Debug, Clone)]
pub struct NmSource {
    binary: PathBuf,
    nm: PathBuf,
}

impl NmSource {
    /// Source for a binary, using `nm` from `PATH` (or `$NM`)
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        let nm = std::env::var_os("NM").map_or_else(|| PathBuf::from("nm"), PathBuf::from);
        Self {
            binary: binary.into(),
            nm,
        }
    }

    /// Use a specific `nm` program
    #[must_use]
    pub fn with_nm(mut self, nm: impl Into<PathBuf>) -> Self {
        self.nm = nm.into();
        self
    }

    /// Binary being introspected
    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl FunctionSource for NmSource {
    fn enumerate_functions(&self) -> EnsayoResult<Vec<FunctionRef>> {
        let output = Command::new(&self.nm)
            .args(["--defined-only", "--line-numbers"])
            .arg(&self.binary)
            .output()
            .map_err(|e| {
                EnsayoError::discovery(&self.binary, format!("cannot run {}: {e}", self.nm.display()))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EnsayoError::discovery(&self.binary, stderr.trim().to_string()));
        }
        let functions = parse_nm_output(&String::from_utf8_lossy(&output.stdout))?;
        tracing::debug!(
            binary = %self.binary.display(),
            count = functions.len(),
            "functions discovered"
        );
        Ok(functions)
    }
}

/// Parse `nm --defined-only --line-numbers` output.
///
/// Only text symbols are kept. Symbols without line information get an
/// empty compile unit.
///
/// # Errors
///
/// Never fails on odd lines (they are skipped); errors only if the line
/// pattern itself cannot be compiled.
pub fn parse_nm_output(text: &str) -> EnsayoResult<Vec<FunctionRef>> {
    let line_re = Regex::new(NM_LINE).map_err(|e| EnsayoError::InvalidPattern {
        pattern: NM_LINE.to_string(),
        message: e.to_string(),
    })?;
    let mut functions = Vec::new();
    for line in text.lines() {
        let Some(caps) = line_re.captures(line.trim_end_matches('\r')) else {
            continue;
        };
        let Ok(address) = u64::from_str_radix(&caps[1], 16) else {
            continue;
        };
        let name = strip_symbol_prefix(&caps[3]).to_string();
        let mut func = FunctionRef::new(
            name,
            caps.get(4).map_or_else(PathBuf::new, |m| PathBuf::from(m.as_str())),
            address,
        );
        if let Some(line) = caps.get(5).and_then(|m| m.as_str().parse().ok()) {
            func = func.with_line(line);
        }
        functions.push(func);
    }
    Ok(functions)
}

/// Mach-O prefixes C symbols with an underscore
#[cfg(target_os = "macos")]
fn strip_symbol_prefix(name: &str) -> &str {
    name.strip_prefix('_').unwrap_or(name)
}

#[cfg(not(target_os = "macos"))]
const fn strip_symbol_prefix(name: &str) -> &str {
    name
}

/// Reads functions from a JSON manifest: `[{"name", "compile_unit", "address", "line"}]`
#[derive(Debug, Clone)]
pub struct ManifestSource {
    path: PathBuf,
}

impl ManifestSource {
    /// Source for a manifest file
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FunctionSource for ManifestSource {
    fn enumerate_functions(&self) -> EnsayoResult<Vec<FunctionRef>> {
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| EnsayoError::discovery(&self.path, e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| EnsayoError::discovery(&self.path, e.to_string()))
    }
}

/// Fixed list of functions, handy for tests and generated harnesses
impl FunctionSource for Vec<FunctionRef> {
    fn enumerate_functions(&self) -> EnsayoResult<Vec<FunctionRef>> {
        Ok(self.clone())
    }
}
