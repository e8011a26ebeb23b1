use crate::wire::null_as_default;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// A symbolic variable declared by the assembler.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WatchVariable {
    pub name: String,
    pub address: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub data_type: String,
    #[serde(default)]
    pub element_size: Option<u32>,
    #[serde(default)]
    pub element_count: Option<u32>,
}

impl WatchVariable {
    pub fn element_size(&self) -> u32 {
        self.element_size.unwrap_or_else(|| {
            match self.data_type.to_ascii_uppercase().as_str() {
                "WORD" => 3,
                "FLOAT" => 6,
                _ => 1,
            }
        })
    }

    pub fn element_count(&self) -> u32 {
        self.element_count.unwrap_or(1)
    }

    /// Inclusive byte range covering every element, `None` when empty.
    pub fn range(&self) -> Option<(u32, u32)> {
        let len = self.element_size().checked_mul(self.element_count())?;
        if len == 0 {
            return None;
        }
        Some((self.address, self.address.checked_add(len - 1)?))
    }

    /// Splits raw bytes into big-endian element values.
    pub fn elements(&self, bytes: &[u8]) -> Vec<u64> {
        let size = self.element_size().max(1) as usize;
        bytes
            .chunks(size)
            .take(self.element_count() as usize)
            .map(|chunk| chunk.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
            .collect()
    }
}

pub fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn printable(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if (32..=126).contains(&b) {
                (b as char).to_string()
            } else {
                ".".to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    pub file: String,
    pub variable: WatchVariable,
}

/// One memory read needed to refresh a watch entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchRead {
    pub address: u32,
    pub start: u32,
    pub end: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WatchView {
    pub file: String,
    pub name: String,
    pub address: u32,
    pub data_type: String,
    pub element_size: u32,
    pub element_count: u32,
    pub value: Option<Vec<u8>>,
}

/// Watch declarations from the last load and their refreshed values.
///
/// Values are keyed by address so refreshes for the same location land in
/// one place; they may be stored through a shared reference while several
/// reads complete out of order.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    entries: Vec<WatchEntry>,
    values: DashMap<u32, Vec<u8>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_watch(&mut self, file: impl Into<String>, variable: WatchVariable) {
        self.entries.push(WatchEntry {
            file: file.into(),
            variable,
        });
    }

    pub fn replace(&mut self, entries: impl IntoIterator<Item = WatchEntry>) {
        self.clear();
        self.entries.extend(entries);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.values.clear();
    }

    pub fn entries(&self) -> &[WatchEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One read per entry; zero-length declarations are skipped.
    pub fn reads(&self) -> Vec<WatchRead> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let (start, end) = entry.variable.range()?;
                Some(WatchRead {
                    address: entry.variable.address,
                    start,
                    end,
                })
            })
            .collect()
    }

    /// Records a refreshed value. Returns false for an address no entry
    /// declares, which happens when a read outlives a reload.
    pub fn store(&self, address: u32, bytes: Vec<u8>) -> bool {
        if !self.entries.iter().any(|e| e.variable.address == address) {
            return false;
        }
        self.values.insert(address, bytes);
        true
    }

    pub fn value_at(&self, address: u32) -> Option<Vec<u8>> {
        self.values.get(&address).map(|v| v.clone())
    }

    pub fn views(&self) -> Vec<WatchView> {
        self.entries
            .iter()
            .map(|entry| WatchView {
                file: entry.file.clone(),
                name: entry.variable.name.clone(),
                address: entry.variable.address,
                data_type: entry.variable.data_type.clone(),
                element_size: entry.variable.element_size(),
                element_count: entry.variable.element_count(),
                value: self.value_at(entry.variable.address),
            })
            .collect()
    }
}
