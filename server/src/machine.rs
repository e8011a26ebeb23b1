use sicide_core::wire::SyntaxFileResult;
use sicide_core::{LoadOutcome, LoadRequest, MachineMode, RegisterSnapshot, Result};
use std::future::Future;

/// The remote simulator as the controller sees it: one round trip per call,
/// no state or retries on this side.
pub trait Machine: Send + Sync + 'static {
    /// Resets the remote machine to `mode`.
    fn begin(&self, mode: MachineMode) -> impl Future<Output = Result<()>> + Send;

    /// Assembles and links; compile-time problems come back as
    /// [`LoadOutcome::Failed`], not as an error.
    fn load(&self, request: &LoadRequest) -> impl Future<Output = Result<LoadOutcome>> + Send;

    fn step(&self) -> impl Future<Output = Result<RegisterSnapshot>> + Send;

    /// Reads the inclusive range `start..=end`.
    fn memory(&self, start: u32, end: u32) -> impl Future<Output = Result<Vec<u8>>> + Send;

    fn syntax_check(
        &self,
        texts: Vec<String>,
        file_names: Vec<String>,
    ) -> impl Future<Output = Result<Vec<SyntaxFileResult>>> + Send;
}
