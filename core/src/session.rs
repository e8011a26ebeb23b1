//! The debugging session: everything one `load` produces and every later
//! `step` mutates, owned by the execution controller.

use crate::diagnostics::{CompileError, ErrorOrigin, ErrorSurface};
use crate::listing::{Listing, ListingIndex};
use crate::registers::{ChangedRegisters, RegisterCache, RegisterSnapshot};
use crate::watch::{WatchEntry, WatchRegistry};
use crate::wire::{LoadOutcome, LoadedFile};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionState {
    #[default]
    Idle,
    Loading,
    Ready,
    Running,
    Paused,
    Stopped,
}

impl ExecutionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionState::Idle => "idle",
            ExecutionState::Loading => "loading",
            ExecutionState::Ready => "ready",
            ExecutionState::Running => "running",
            ExecutionState::Paused => "paused",
            ExecutionState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive memory range shown in the memory view.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryWindow {
    pub start: u32,
    pub end: u32,
    pub values: Vec<u8>,
}

impl MemoryWindow {
    pub fn new(start: u32, end: u32) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidRange { start, end });
        }
        Ok(Self {
            start,
            end,
            values: Vec::new(),
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorLocation {
    pub file: String,
    pub row: u32,
    pub col: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadReport {
    Loaded,
    /// `reveal` is the first assembler error in response order, if any.
    Failed { reveal: Option<ErrorLocation> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepVerdict {
    Continue,
    BreakpointHit { file: String, row: usize },
    /// PC did not move: the program is treated as finished.
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub verdict: StepVerdict,
    pub changed: ChangedRegisters,
    /// Listing the active view switched to, if it switched.
    pub focused: Option<String>,
}

#[derive(Debug)]
pub struct Session {
    pub registers: RegisterCache,
    pub listings: ListingIndex,
    pub watches: WatchRegistry,
    pub errors: ErrorSurface,
    memory: MemoryWindow,
}

impl Session {
    pub fn new(project_root: Option<PathBuf>, memory: MemoryWindow) -> Self {
        Self {
            registers: RegisterCache::default(),
            listings: ListingIndex::new(),
            watches: WatchRegistry::new(),
            errors: ErrorSurface::new(project_root),
            memory,
        }
    }

    pub fn is_loaded(&self) -> bool {
        !self.listings.is_empty()
    }

    /// Applies a `load` answer.
    ///
    /// Success replaces registers, listings and watches as a whole. Failure
    /// only touches the error surface; the previous session stays intact.
    pub fn apply_load(&mut self, outcome: LoadOutcome) -> LoadReport {
        self.errors.clear_origin(ErrorOrigin::Load);
        match outcome {
            LoadOutcome::Loaded { registers, files } => {
                let mut listings = Vec::with_capacity(files.len());
                let mut watches = Vec::new();
                for file in files {
                    watches.extend(file.watches.into_iter().map(|variable| WatchEntry {
                        file: file.file_name.clone(),
                        variable,
                    }));
                    listings.push(Listing::new(file.file_name, file.rows));
                }
                self.registers.clear();
                self.registers.replace(registers);
                self.listings.replace(listings);
                self.watches.replace(watches);
                self.memory.values.clear();
                if let Some(pc) = self.registers.pc() {
                    self.listings.focus_pc(pc);
                }
                LoadReport::Loaded
            }
            LoadOutcome::Failed { files } => {
                // reported under the same key the error buckets use
                let reveal = first_error_location(&files).map(|location| ErrorLocation {
                    file: self.errors.key(&location.file),
                    ..location
                });
                for file in files.iter().filter(|f| f.has_errors()) {
                    let mut errors: Vec<CompileError> = file
                        .assembler_errors
                        .iter()
                        .map(|e| CompileError::from_assembler(e, ErrorOrigin::Load))
                        .collect();
                    if let Some(linker) = &file.linker_error {
                        errors.push(CompileError::from_linker(linker));
                    }
                    self.errors
                        .replace_origin(&file.file_name, ErrorOrigin::Load, errors);
                }
                LoadReport::Failed { reveal }
            }
        }
    }

    /// Applies the snapshot returned by one `step`.
    ///
    /// Replaces the registers, then checks for the no-progress halt, moves
    /// the active listing to the new PC and evaluates breakpoints there.
    pub fn apply_step(&mut self, snapshot: RegisterSnapshot) -> StepReport {
        let previous_pc = self.registers.pc();
        let pc = snapshot.pc;
        let changed = self.registers.replace(snapshot);

        if previous_pc == Some(pc) {
            return StepReport {
                verdict: StepVerdict::Finished,
                changed,
                focused: None,
            };
        }

        let focused = self.listings.focus_pc(pc).map(str::to_string);
        let verdict = match self.listings.breakpoint_hit(pc) {
            Some((file, row)) => StepVerdict::BreakpointHit { file, row },
            None => StepVerdict::Continue,
        };
        StepReport {
            verdict,
            changed,
            focused,
        }
    }

    pub fn memory(&self) -> &MemoryWindow {
        &self.memory
    }

    pub fn set_memory_window(&mut self, start: u32, end: u32) -> Result<()> {
        self.memory = MemoryWindow::new(start, end)?;
        Ok(())
    }

    /// Stores a read of the memory window; reads of a stale range are dropped.
    pub fn store_memory(&mut self, start: u32, end: u32, values: Vec<u8>) -> bool {
        if self.memory.start != start || self.memory.end != end {
            return false;
        }
        self.memory.values = values;
        true
    }

    /// Discards everything a load produced. Breakpoints and diagnostics stay.
    pub fn clear(&mut self) {
        self.registers.clear();
        self.listings.clear();
        self.watches.clear();
        self.memory.values.clear();
    }
}

fn first_error_location(files: &[LoadedFile]) -> Option<ErrorLocation> {
    files.iter().find_map(|file| {
        file.assembler_errors.first().map(|error| ErrorLocation {
            file: file.file_name.clone(),
            row: error.row,
            col: error.col,
        })
    })
}
