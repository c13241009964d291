//! Engine invocation over a batch of input files

pub mod adapter;

pub use adapter::{enumerate_inputs, plan, release_staged, EngineAdapter, EngineRun, FileTask};
