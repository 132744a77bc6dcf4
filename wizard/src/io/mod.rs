//! Side-effecting adapters: files, the terminal, child processes, and the
//! remote collaborators. Each collaborator sits behind a trait so the
//! orchestration modules can be driven by scripted fakes in tests.

pub mod aws_cli;
pub mod config;
pub mod console;
pub mod control_plane;
pub mod interrupt;
pub mod process;
pub mod provider;
pub mod session_store;
pub mod template;
