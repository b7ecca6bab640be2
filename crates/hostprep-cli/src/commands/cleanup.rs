use super::{execute, Session, EXIT_SUCCESS};
use dialoguer::Confirm;
use hostprep_preflight::{all_checks, Purpose};
use std::io::{stderr, stdin, IsTerminal};

fn confirm(force: bool, is_tty: bool) -> Result<(), String> {
    if force {
        return Ok(());
    }
    if !is_tty {
        return Err("refusing to clean up without confirmation (pass --force)".to_owned());
    }
    let proceed = Confirm::new()
        .with_prompt("remove the hostprep VM, network and host configuration?")
        .default(false)
        .interact()
        .map_err(|e| format!("prompt failed: {e}"))?;
    if proceed {
        Ok(())
    } else {
        Err("cleanup cancelled".to_owned())
    }
}

/// Cleanup covers every check regardless of the configured network mode,
/// so switching modes never strands host changes.
pub fn run(session: &Session, force: bool, json: bool) -> Result<u8, String> {
    let is_tty = stdin().is_terminal() && stderr().is_terminal();
    confirm(force, is_tty)?;

    let checks = all_checks(&session.distro);
    let code = execute(session, &checks, Purpose::Cleanup, json)?;
    if code == EXIT_SUCCESS && !json {
        println!("\nCleanup complete.");
    }
    Ok(code)
}
