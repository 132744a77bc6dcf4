//! Ctrl-C handling for the interactive wizard.
//!
//! An interrupt during a stack poll abandons the poll and returns to the
//! menu. Anywhere else it ends the process; the session is already saved.

use std::thread;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::exit_codes;
use crate::provisioning::CancelToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    CancelPoll,
    Exit,
}

pub fn interrupt_action(cancel: &CancelToken) -> InterruptAction {
    if cancel.is_polling() {
        InterruptAction::CancelPoll
    } else {
        InterruptAction::Exit
    }
}

/// Listen for Ctrl-C on a background thread for the life of the process.
pub fn install(cancel: CancelToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build signal runtime")?;
    thread::Builder::new()
        .name("interrupt".to_string())
        .spawn(move || {
            loop {
                if let Err(err) = runtime.block_on(tokio::signal::ctrl_c()) {
                    warn!(err = %err, "can't listen for interrupts");
                    return;
                }
                match interrupt_action(&cancel) {
                    InterruptAction::CancelPoll => {
                        info!("interrupt received, abandoning poll");
                        cancel.cancel();
                    }
                    InterruptAction::Exit => {
                        eprintln!("\nExiting. Your answers have been saved.");
                        std::process::exit(exit_codes::INTERRUPTED);
                    }
                }
            }
        })
        .context("spawn interrupt listener")?;
    Ok(())
}
