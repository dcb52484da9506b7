pub mod config;
pub mod log;
pub mod top;
pub mod trace;
pub mod traffic;
