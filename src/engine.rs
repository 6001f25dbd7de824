//! External obfuscation engine
//!
//! The engine is started once and then left alone: it listens on its own
//! loopback port and the relay only ever dials it. Its stdout is discarded
//! because ours carries the PT protocol.

use crate::config::EngineConfig;
use crate::pt::Role;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Build the engine command line for `role`
pub fn engine_command(config: &EngineConfig, role: Role) -> Command {
    let config_file = match role {
        Role::Client => &config.client_config_file,
        Role::Server => &config.server_config_file,
    };

    let mut command = Command::new(&config.program);
    command
        .arg(format!("--config-file={}", config_file))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit());
    command
}

/// Start the engine if enabled
///
/// A spawn failure is logged and otherwise ignored; sessions will simply
/// fail to dial.
pub fn spawn_engine(config: &EngineConfig, role: Role) -> Option<Child> {
    if !config.enabled {
        debug!("Engine spawning disabled");
        return None;
    }

    match engine_command(config, role).spawn() {
        Ok(child) => {
            info!(
                "Started engine {} for {} role (pid {:?})",
                config.program,
                role,
                child.id()
            );
            Some(child)
        }
        Err(e) => {
            warn!("Failed to start engine {}: {}", config.program, e);
            None
        }
    }
}
