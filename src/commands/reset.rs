//! Reset command - forget the stored session.
//!
//! Clears the same three keys a `DESTROY_NOTIFICATION_SERVICE` clears:
//! credentials, sender id and persistent ids. The store key itself is kept
//! so the store stays readable.

use anyhow::Result;
use std::io::{self, Write};

use crate::config::Config;
use crate::session::SessionStore;

/// Run the reset command.
///
/// Asks for confirmation unless `skip_confirm` is true.
pub fn run(config: &Config, skip_confirm: bool) -> Result<()> {
    let store = super::open_store(config)?;

    println!();
    println!("This will remove the stored push session:");
    println!("  Store: {}", store.path().display());
    println!("    - credentials");
    println!("    - senderId");
    println!("    - persistentIds");
    println!();

    if !skip_confirm {
        print!("Are you sure? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !matches!(input.trim().to_lowercase().as_str(), "y" | "yes") {
            println!("Aborted.");
            return Ok(());
        }
    }

    let mut session = SessionStore::new(Box::new(store));
    session.clear();
    println!("Stored session cleared.");
    Ok(())
}
