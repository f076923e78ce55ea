//! The Runner: a multi-queue cooperative scheduler that drives a batch of
//! LoadTest configs through the control plane in parallel and assembles an
//! xUnit-style report (`spec.md` §5/§6).

pub mod engine;
pub mod log_saver;
pub mod queue;
pub mod report;
