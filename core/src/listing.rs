use crate::wire::null_as_default;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One disassembled line of a listing, as produced by `load`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListingRow {
    #[serde(default, deserialize_with = "null_as_default")]
    pub address_hex: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub raw_code_hex: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub raw_code_binary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub label: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub instr: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub instr_hex: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub instr_bin: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nixbpe: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub operand: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comment: String,
    #[serde(default)]
    pub is_comment_row: bool,
}

impl ListingRow {
    pub fn address(&self) -> Option<u32> {
        let digits = self.address_hex.trim();
        let digits = digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits);
        if digits.is_empty() {
            return None;
        }
        u32::from_str_radix(digits, 16).ok()
    }

    /// Directive and comment rows carry no code bytes.
    pub fn has_code(&self) -> bool {
        !self.raw_code_hex.trim().is_empty()
    }

    /// True when this row is the instruction at `pc`.
    pub fn executes_at(&self, pc: u32) -> bool {
        self.has_code() && self.address() == Some(pc)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub file: String,
    pub rows: Vec<ListingRow>,
}

impl Listing {
    pub fn new(file: impl Into<String>, rows: Vec<ListingRow>) -> Self {
        Self {
            file: file.into(),
            rows,
        }
    }

    /// Row highlighted for the current PC.
    pub fn pc_row(&self, pc: u32) -> Option<usize> {
        self.rows.iter().position(|row| row.executes_at(pc))
    }

    pub fn contains_pc(&self, pc: u32) -> bool {
        self.pc_row(pc).is_some()
    }
}

/// Per-file listings in load order, the active view, and the breakpoint set.
///
/// Breakpoints are row indices keyed by file. They outlive the listings
/// themselves: clearing the listings keeps them, a new set of listings
/// reconciles them.
#[derive(Debug, Default)]
pub struct ListingIndex {
    listings: Vec<Listing>,
    active: Option<usize>,
    breakpoints: BTreeMap<String, BTreeSet<usize>>,
}

impl ListingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a fresh set of listings, discarding the previous one.
    ///
    /// Breakpoints of files missing from `listings` are dropped, and indices
    /// past the end of a rebuilt table are removed.
    pub fn replace(&mut self, listings: Vec<Listing>) {
        let previous_active = self.active_file().map(str::to_string);

        self.breakpoints.retain(|file, rows| {
            match listings.iter().find(|listing| &listing.file == file) {
                Some(listing) => {
                    let count = listing.rows.len();
                    rows.retain(|&row| row < count);
                    !rows.is_empty()
                }
                None => false,
            }
        });

        self.active = previous_active
            .and_then(|file| listings.iter().position(|listing| listing.file == file))
            .or(if listings.is_empty() { None } else { Some(0) });
        self.listings = listings;
    }

    /// Drops the listings but keeps breakpoint definitions.
    pub fn clear(&mut self) {
        self.listings.clear();
        self.active = None;
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    pub fn listings(&self) -> &[Listing] {
        &self.listings
    }

    pub fn get(&self, file: &str) -> Option<&Listing> {
        self.listings.iter().find(|listing| listing.file == file)
    }

    pub fn active(&self) -> Option<&Listing> {
        self.active.and_then(|idx| self.listings.get(idx))
    }

    pub fn active_file(&self) -> Option<&str> {
        self.active().map(|listing| listing.file.as_str())
    }

    pub fn select(&mut self, file: &str) -> bool {
        match self.listings.iter().position(|listing| listing.file == file) {
            Some(idx) => {
                self.active = Some(idx);
                true
            }
            None => false,
        }
    }

    /// Flips membership of `row` and returns whether it is now set.
    ///
    /// For a loaded listing, rows outside the table are ignored.
    pub fn toggle_breakpoint(&mut self, file: &str, row: usize) -> bool {
        if let Some(listing) = self.get(file) {
            if row >= listing.rows.len() {
                return false;
            }
        }
        let rows = self.breakpoints.entry(file.to_string()).or_default();
        let now_set = if rows.remove(&row) {
            false
        } else {
            rows.insert(row);
            true
        };
        if rows.is_empty() {
            self.breakpoints.remove(file);
        }
        now_set
    }

    pub fn is_breakpoint(&self, file: &str, row: usize) -> bool {
        self.breakpoints
            .get(file)
            .is_some_and(|rows| rows.contains(&row))
    }

    pub fn breakpoints(&self, file: &str) -> Vec<usize> {
        self.breakpoints
            .get(file)
            .map(|rows| rows.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn all_breakpoints(&self) -> &BTreeMap<String, BTreeSet<usize>> {
        &self.breakpoints
    }

    /// Moves the active view to a listing that holds the instruction at `pc`.
    ///
    /// Keeps the current view when it already matches; otherwise picks the
    /// first match in load order. Returns the newly selected file on a switch.
    pub fn focus_pc(&mut self, pc: u32) -> Option<&str> {
        if self.active().is_some_and(|listing| listing.contains_pc(pc)) {
            return None;
        }
        let idx = self.listings.iter().position(|listing| listing.contains_pc(pc))?;
        self.active = Some(idx);
        Some(self.listings[idx].file.as_str())
    }

    /// The breakpoint in the active listing that the instruction at `pc` sits on.
    pub fn breakpoint_hit(&self, pc: u32) -> Option<(String, usize)> {
        let listing = self.active()?;
        let rows = self.breakpoints.get(&listing.file)?;
        rows.iter()
            .copied()
            .find(|&row| listing.rows.get(row).is_some_and(|r| r.executes_at(pc)))
            .map(|row| (listing.file.clone(), row))
    }
}
