//! Request and response bodies of the simulator's HTTP API, plus their
//! conversion into typed session entities.

use crate::listing::ListingRow;
use crate::registers::RegisterSnapshot;
use crate::watch::WatchVariable;
use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Treats an explicit JSON `null` the same as a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MachineMode {
    Sic,
    #[default]
    Sicxe,
}

impl fmt::Display for MachineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineMode::Sic => f.write_str("sic"),
            MachineMode::Sicxe => f.write_str("sicxe"),
        }
    }
}

impl FromStr for MachineMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sic" => Ok(MachineMode::Sic),
            "sicxe" => Ok(MachineMode::Sicxe),
            other => Err(format!("unknown machine mode {other:?} (use \"sic\" or \"sicxe\")")),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct BeginRequest {
    #[serde(rename = "type")]
    pub mode: MachineMode,
}

/// Plain `{ok, message}` acknowledgement.
#[derive(Deserialize, Debug)]
pub struct Ack {
    #[serde(default)]
    pub ok: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    pub file_paths: Vec<String>,
    pub output_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AssemblerError {
    #[serde(default)]
    pub row: u32,
    #[serde(default)]
    pub col: u32,
    #[serde(default)]
    pub length: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default)]
    pub nonbreaking: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LinkerError {
    #[serde(default, deserialize_with = "null_as_default")]
    pub phase: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub msg: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListingBody {
    #[serde(default, deserialize_with = "null_as_default")]
    pub rows: Vec<ListingRow>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub watch: Vec<WatchVariable>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FileLoadResult {
    pub file_name: String,
    #[serde(default)]
    pub listing: Option<ListingBody>,
    #[serde(default, alias = "assemblerErrors")]
    pub compile_errors: Option<Vec<AssemblerError>>,
    #[serde(default)]
    pub linker_error: Option<LinkerError>,
}

#[derive(Deserialize, Debug)]
pub struct LoadResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default)]
    pub registers: Option<RegisterSnapshot>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub files: Vec<FileLoadResult>,
}

/// One file of a `load` answer, already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFile {
    pub file_name: String,
    pub rows: Vec<ListingRow>,
    pub watches: Vec<WatchVariable>,
    pub assembler_errors: Vec<AssemblerError>,
    pub linker_error: Option<LinkerError>,
}

impl LoadedFile {
    pub fn has_errors(&self) -> bool {
        !self.assembler_errors.is_empty() || self.linker_error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded {
        registers: RegisterSnapshot,
        files: Vec<LoadedFile>,
    },
    Failed {
        files: Vec<LoadedFile>,
    },
}

impl From<FileLoadResult> for LoadedFile {
    fn from(result: FileLoadResult) -> Self {
        let listing = result.listing.unwrap_or_default();
        Self {
            file_name: result.file_name,
            rows: listing.rows,
            watches: listing.watch,
            assembler_errors: result.compile_errors.unwrap_or_default(),
            linker_error: result.linker_error,
        }
    }
}

impl LoadResponse {
    /// Splits the answer into success or the compile-time failure channel.
    ///
    /// `ok:false` without any per-file diagnostic is a request-level
    /// rejection (for instance "call /begin first") and becomes an error.
    pub fn into_outcome(self) -> Result<LoadOutcome> {
        let files: Vec<LoadedFile> = self.files.into_iter().map(LoadedFile::from).collect();
        if self.ok {
            let registers = self
                .registers
                .ok_or_else(|| Error::Remote("load succeeded without a register snapshot".into()))?;
            return Ok(LoadOutcome::Loaded { registers, files });
        }
        if files.iter().any(LoadedFile::has_errors) {
            Ok(LoadOutcome::Failed { files })
        } else {
            Err(Error::Remote(if self.message.is_empty() {
                "load failed".to_string()
            } else {
                self.message
            }))
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct StepResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default)]
    pub registers: Option<RegisterSnapshot>,
}

impl StepResponse {
    pub fn into_registers(self) -> Result<RegisterSnapshot> {
        match (self.ok, self.registers) {
            (true, Some(registers)) => Ok(registers),
            (true, None) => Err(Error::Remote("step answered without registers".into())),
            (false, _) => Err(Error::Remote(self.message)),
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy)]
pub struct MemoryRequest {
    pub start: u32,
    pub end: u32,
}

fn default_true() -> bool {
    true
}

/// Range answers carry no `ok` field on success.
#[derive(Deserialize, Debug)]
pub struct MemoryResponse {
    #[serde(default = "default_true")]
    pub ok: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub values: Vec<u8>,
}

impl MemoryResponse {
    pub fn into_values(self) -> Result<Vec<u8>> {
        if self.ok {
            Ok(self.values)
        } else {
            Err(Error::Remote(self.message))
        }
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SyntaxCheckRequest {
    pub texts: Vec<String>,
    pub file_names: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyntaxFileResult {
    pub file_name: String,
    #[serde(default)]
    pub ok: bool,
    #[serde(default, alias = "assemblerErrors", deserialize_with = "null_as_default")]
    pub compile_errors: Vec<AssemblerError>,
}

#[derive(Deserialize, Debug)]
pub struct SyntaxCheckResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub files: Vec<SyntaxFileResult>,
}
