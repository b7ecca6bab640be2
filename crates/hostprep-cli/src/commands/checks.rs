use super::{json_pretty, Session, EXIT_SUCCESS};
use console::Style;
use hostprep_preflight::check::CheckInfo;
use hostprep_preflight::{all_checks, compose};

fn action(info: &CheckInfo) -> &'static str {
    match (info.cleanup_only, info.fixable) {
        (true, _) => "cleanup",
        (false, true) => "fix",
        (false, false) => "manual",
    }
}

pub fn run(session: &Session, all: bool, json: bool) -> Result<u8, String> {
    let checks = if all {
        all_checks(&session.distro)
    } else {
        compose(&session.distro, session.mode())
    };
    let infos = checks.infos(&session.config);

    if json {
        let payload = serde_json::json!({
            "distro": &session.distro,
            "network_mode": session.mode(),
            "all": all,
            "checks": infos,
        });
        println!("{}", json_pretty(&payload)?);
        return Ok(EXIT_SUCCESS);
    }

    if all {
        println!("All checks for {}\n", session.distro.display_name());
    } else {
        println!(
            "Checks for {} ({} network mode)\n",
            session.distro.display_name(),
            session.mode()
        );
    }
    println!("{:<44} {:<8} DESCRIPTION", "SETTING", "ACTION");
    let dim = Style::new().dim();
    for info in &infos {
        let setting = info.skip_setting.as_deref().unwrap_or("-");
        let line = format!("{setting:<44} {:<8} {}", action(info), info.description);
        if info.skipped {
            println!("{} (skipped)", dim.apply_to(line));
        } else {
            println!("{line}");
        }
    }
    Ok(EXIT_SUCCESS)
}
