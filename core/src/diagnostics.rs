use crate::wire::{AssemblerError, LinkerError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ErrorOrigin {
    Syntax,
    Load,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub row: u32,
    pub col: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    pub message: String,
    #[serde(rename = "type")]
    pub origin: ErrorOrigin,
}

impl CompileError {
    pub fn from_assembler(error: &AssemblerError, origin: ErrorOrigin) -> Self {
        Self {
            row: error.row,
            col: error.col,
            length: error.length,
            message: error.message.clone(),
            origin,
        }
    }

    /// Linker errors carry no location.
    pub fn from_linker(error: &LinkerError) -> Self {
        let message = if error.phase.is_empty() {
            error.msg.clone()
        } else {
            format!("{}: {}", error.phase, error.msg)
        };
        Self {
            row: 0,
            col: 0,
            length: None,
            message,
            origin: ErrorOrigin::Load,
        }
    }
}

fn lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Compile and link diagnostics grouped by project-relative file path.
#[derive(Debug, Default)]
pub struct ErrorSurface {
    root: Option<PathBuf>,
    errors: BTreeMap<String, Vec<CompileError>>,
}

impl ErrorSurface {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root: root.map(|r| lexical(&r)),
            errors: BTreeMap::new(),
        }
    }

    /// Bucket key for `file`: relative to the project root when inside it.
    pub fn key(&self, file: &str) -> String {
        let path = lexical(Path::new(file));
        let relative = match &self.root {
            Some(root) if path.is_absolute() => path
                .strip_prefix(root)
                .map(Path::to_path_buf)
                .unwrap_or(path),
            _ => path,
        };
        relative.to_string_lossy().replace('\\', "/")
    }

    /// Replaces the whole list for `file`.
    pub fn add_errors(&mut self, file: &str, errors: Vec<CompileError>) {
        let key = self.key(file);
        self.errors.insert(key, errors);
    }

    /// Swaps the `origin` entries of `file` for `errors`, keeping the other
    /// origin's entries. An empty `errors` just clears that origin.
    pub fn replace_origin(&mut self, file: &str, origin: ErrorOrigin, errors: Vec<CompileError>) {
        let key = self.key(file);
        let list = self.errors.entry(key.clone()).or_default();
        list.retain(|e| e.origin != origin);
        list.extend(errors.into_iter().map(|e| CompileError { origin, ..e }));
        if list.is_empty() {
            self.errors.remove(&key);
        }
    }

    /// No file clears everything; a file alone drops its bucket; a file and
    /// an origin drops only that origin's entries.
    pub fn clear_errors(&mut self, file: Option<&str>, origin: Option<ErrorOrigin>) {
        let Some(file) = file else {
            self.errors.clear();
            return;
        };
        let key = self.key(file);
        match origin {
            None => {
                self.errors.remove(&key);
            }
            Some(origin) => {
                if let Some(list) = self.errors.get_mut(&key) {
                    list.retain(|e| e.origin != origin);
                    if list.is_empty() {
                        self.errors.remove(&key);
                    }
                }
            }
        }
    }

    /// Drops one origin across every file.
    pub fn clear_origin(&mut self, origin: ErrorOrigin) {
        self.errors.retain(|_, list| {
            list.retain(|e| e.origin != origin);
            !list.is_empty()
        });
    }

    pub fn errors(&self, file: &str) -> &[CompileError] {
        self.errors
            .get(&self.key(file))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn all(&self) -> &BTreeMap<String, Vec<CompileError>> {
        &self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}
