pub mod config;
pub mod fabric;
pub mod hierarchy;
pub mod inflight;
pub mod request;
pub mod simple_mem;
pub mod writeback;

#[cfg(test)]
mod unit_tests;

pub use hierarchy::MemoryHierarchy;
pub use request::{AccessKind, Addr, Completion};
