//! Interactive CloudReactor AWS setup wizard.
//!
//! The wizard walks an operator through choosing AWS resources, provisions
//! the CloudReactor permissions stack, and registers a run environment with
//! the control plane. Progress is saved after every answer so a session can
//! be resumed. The crate is split the same way throughout:
//!
//! - **[`core`]**: Pure, deterministic logic (property registry, invalidation,
//!   display rules, stack status and output contracts). No I/O.
//! - **[`io`]**: Side-effecting adapters (session file, config, console,
//!   AWS CLI provider, control-plane client, template rendering).
//!
//! Orchestration modules ([`controller`], [`handlers`], [`resources`],
//! [`selector`], [`provisioning`], [`reconcile`]) coordinate the two through
//! a [`session::Session`] and its [`session::Collaborators`].

pub mod controller;
pub mod core;
pub mod exit_codes;
pub mod handlers;
pub mod inventory;
pub mod io;
pub mod logging;
pub mod provisioning;
pub mod reconcile;
pub mod resources;
pub mod selector;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
