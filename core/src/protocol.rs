use crate::diagnostics::CompileError;
use crate::listing::ListingRow;
use crate::registers::{ChangedRegisters, RegisterSnapshot};
use crate::session::{ExecutionState, Session};
use crate::watch::WatchView;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// Client -> Server messages
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    Run,
    Step,
    Pause,
    Stop,
    ToggleBreakpoint { file: String, row: usize },
    SelectListing { file: String },
    SetDelay { ms: f64 },
    SetMemoryWindow { start: u32, end: u32 },
    SyntaxCheck { texts: Vec<String>, file_names: Vec<String> },
    QueryState,
}

impl ClientMessage {
    pub fn action(&self) -> &'static str {
        match self {
            ClientMessage::Run => "run",
            ClientMessage::Step => "step",
            ClientMessage::Pause => "pause",
            ClientMessage::Stop => "stop",
            ClientMessage::ToggleBreakpoint { .. } => "toggle-breakpoint",
            ClientMessage::SelectListing { .. } => "select-listing",
            ClientMessage::SetDelay { .. } => "set-delay",
            ClientMessage::SetMemoryWindow { .. } => "set-memory-window",
            ClientMessage::SyntaxCheck { .. } => "syntax-check",
            ClientMessage::QueryState => "query-state",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ListingView {
    pub file: String,
    pub rows: Vec<ListingRow>,
    pub breakpoints: Vec<usize>,
    pub pc_row: Option<usize>,
}

// Server -> Client messages
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    State {
        state: ExecutionState,
    },
    Registers {
        registers: Option<RegisterSnapshot>,
        f_hex: Option<String>,
        changed: ChangedRegisters,
    },
    Listings {
        listings: Vec<ListingView>,
        active: Option<String>,
    },
    ActiveListing {
        file: String,
    },
    Watches {
        watches: Vec<WatchView>,
    },
    Memory {
        start: u32,
        end: u32,
        values: Vec<u8>,
    },
    Errors {
        errors: BTreeMap<String, Vec<CompileError>>,
    },
    Reveal {
        file: String,
        row: u32,
        col: u32,
    },
    Notice {
        message: String,
    },
    Rejected {
        action: String,
        reason: String,
    },
}

impl ServerMessage {
    pub fn registers(session: &Session) -> Self {
        let registers = session.registers.snapshot().cloned();
        let f_hex = registers.as_ref().and_then(|r| r.f_hex().ok());
        ServerMessage::Registers {
            registers,
            f_hex,
            changed: session.registers.changed(),
        }
    }

    pub fn listings(session: &Session) -> Self {
        let pc = session.registers.pc();
        let listings = session
            .listings
            .listings()
            .iter()
            .map(|listing| ListingView {
                file: listing.file.clone(),
                rows: listing.rows.clone(),
                breakpoints: session.listings.breakpoints(&listing.file),
                pc_row: pc.and_then(|pc| listing.pc_row(pc)),
            })
            .collect();
        ServerMessage::Listings {
            listings,
            active: session.listings.active_file().map(str::to_string),
        }
    }

    pub fn watches(session: &Session) -> Self {
        ServerMessage::Watches {
            watches: session.watches.views(),
        }
    }

    pub fn memory(session: &Session) -> Self {
        let window = session.memory();
        ServerMessage::Memory {
            start: window.start,
            end: window.end,
            values: window.values.clone(),
        }
    }

    pub fn errors(session: &Session) -> Self {
        ServerMessage::Errors {
            errors: session.errors.all().clone(),
        }
    }

    /// Full picture for a newly connected view.
    pub fn snapshot(state: ExecutionState, session: &Session) -> Vec<Self> {
        vec![
            ServerMessage::State { state },
            Self::registers(session),
            Self::listings(session),
            Self::watches(session),
            Self::memory(session),
            Self::errors(session),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_are_tagged() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"ToggleBreakpoint","file":"a.asm","row":3}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::ToggleBreakpoint {
                file: "a.asm".into(),
                row: 3
            }
        );
        let run: ClientMessage = serde_json::from_str(r#"{"type":"Run"}"#).unwrap();
        assert_eq!(run.action(), "run");
    }

    #[test]
    fn state_message_serializes_with_tag() {
        let json = serde_json::to_value(ServerMessage::State {
            state: ExecutionState::Paused,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "State", "state": "Paused"}));
    }
}
