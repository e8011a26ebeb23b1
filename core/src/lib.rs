pub mod diagnostics;
pub mod error;
pub mod float48;
pub mod listing;
pub mod protocol;
pub mod registers;
pub mod session;
pub mod watch;
pub mod wire;

pub use diagnostics::{CompileError, ErrorOrigin, ErrorSurface};
pub use error::{Error, Result};
pub use listing::{Listing, ListingIndex, ListingRow};
pub use registers::{ChangedRegisters, RegisterCache, RegisterSnapshot};
pub use session::{
    ErrorLocation, ExecutionState, LoadReport, MemoryWindow, Session, StepReport, StepVerdict,
};
pub use watch::{WatchEntry, WatchRead, WatchRegistry, WatchVariable};
pub use wire::{LoadOutcome, LoadRequest, LoadedFile, MachineMode};
