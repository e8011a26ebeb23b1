use crate::float48;
use crate::Result;
use serde::{Deserialize, Deserializer, Serialize};

bitflags::bitflags! {
    /// Registers whose value differs from the previous snapshot.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChangedRegisters: u16 {
        const A  = 1 << 0;
        const X  = 1 << 1;
        const L  = 1 << 2;
        const S  = 1 << 3;
        const T  = 1 << 4;
        const B  = 1 << 5;
        const SW = 1 << 6;
        const PC = 1 << 7;
        const F  = 1 << 8;
    }
}

/// The simulator sends `F` as a decimal string; a bare number is accepted too.
fn float_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FloatRepr {
        Text(String),
        Number(f64),
        Missing(()),
    }

    Ok(match FloatRepr::deserialize(deserializer)? {
        FloatRepr::Text(text) => text,
        FloatRepr::Number(value) => value.to_string(),
        FloatRepr::Missing(()) => default_float(),
    })
}

fn default_float() -> String {
    "0.0".to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RegisterSnapshot {
    #[serde(rename = "A", default)]
    pub a: u32,
    #[serde(rename = "X", default)]
    pub x: u32,
    #[serde(rename = "L", default)]
    pub l: u32,
    #[serde(rename = "S", default)]
    pub s: u32,
    #[serde(rename = "T", default)]
    pub t: u32,
    #[serde(rename = "B", default)]
    pub b: u32,
    #[serde(rename = "SW", default)]
    pub sw: u32,
    #[serde(rename = "PC", default)]
    pub pc: u32,
    #[serde(rename = "F", default = "default_float", deserialize_with = "float_text")]
    pub f: String,
}

impl Default for RegisterSnapshot {
    fn default() -> Self {
        Self {
            a: 0,
            x: 0,
            l: 0,
            s: 0,
            t: 0,
            b: 0,
            sw: 0,
            pc: 0,
            f: default_float(),
        }
    }
}

impl RegisterSnapshot {
    pub fn f_hex(&self) -> Result<String> {
        float48::decimal_to_hex(&self.f)
    }

    pub fn diff(&self, other: &RegisterSnapshot) -> ChangedRegisters {
        let mut changed = ChangedRegisters::empty();
        changed.set(ChangedRegisters::A, self.a != other.a);
        changed.set(ChangedRegisters::X, self.x != other.x);
        changed.set(ChangedRegisters::L, self.l != other.l);
        changed.set(ChangedRegisters::S, self.s != other.s);
        changed.set(ChangedRegisters::T, self.t != other.t);
        changed.set(ChangedRegisters::B, self.b != other.b);
        changed.set(ChangedRegisters::SW, self.sw != other.sw);
        changed.set(ChangedRegisters::PC, self.pc != other.pc);
        // compare numerically so "0" and "0.0" are the same value
        let f_changed = match (self.f.trim().parse::<f64>(), other.f.trim().parse::<f64>()) {
            (Ok(mine), Ok(theirs)) => mine.to_bits() != theirs.to_bits(),
            _ => self.f != other.f,
        };
        changed.set(ChangedRegisters::F, f_changed);
        changed
    }
}

/// Last-known register snapshot plus the set that changed with it.
#[derive(Debug, Default)]
pub struct RegisterCache {
    snapshot: Option<RegisterSnapshot>,
    changed: ChangedRegisters,
}

impl RegisterCache {
    /// Replaces the snapshot wholesale and recomputes the changed set.
    pub fn replace(&mut self, snapshot: RegisterSnapshot) -> ChangedRegisters {
        self.changed = match &self.snapshot {
            Some(previous) => previous.diff(&snapshot),
            None => ChangedRegisters::empty(),
        };
        self.snapshot = Some(snapshot);
        self.changed
    }

    pub fn snapshot(&self) -> Option<&RegisterSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn pc(&self) -> Option<u32> {
        self.snapshot.as_ref().map(|s| s.pc)
    }

    pub fn changed(&self) -> ChangedRegisters {
        self.changed
    }

    pub fn clear(&mut self) {
        self.snapshot = None;
        self.changed = ChangedRegisters::empty();
    }
}
