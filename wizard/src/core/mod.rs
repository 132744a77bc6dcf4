//! Deterministic, pure logic shared by the wizard.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests. The
//! one exception is [`secrets`], which reads the operating system's random
//! source.

pub mod display;
pub mod invalidate;
pub mod names;
pub mod property;
pub mod secrets;
pub mod stack;
pub mod state;
