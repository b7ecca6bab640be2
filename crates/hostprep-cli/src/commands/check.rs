use super::{execute, Session, EXIT_SUCCESS};
use hostprep_preflight::{compose, Purpose};

pub fn run(session: &Session, json: bool) -> Result<u8, String> {
    let checks = compose(&session.distro, session.mode());
    let code = execute(session, &checks, Purpose::CheckOnly, json)?;
    if code == EXIT_SUCCESS && !json {
        println!("\nAll checks passed.");
    } else if !json {
        println!("Run 'hostprep setup' to fix what can be fixed automatically.");
    }
    Ok(code)
}
