//! Network actuator adapters

use super::{InterfaceAction, NetworkActuator};
use crate::error::CollaboratorError;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

/// Logs the change it would make and reports success.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunActuator;

#[async_trait]
impl NetworkActuator for DryRunActuator {
    async fn set_interface_state(
        &self,
        host: &str,
        interface: &str,
        action: InterfaceAction,
    ) -> Result<(), CollaboratorError> {
        info!(host, interface, action = %action, "Dry run: interface state change skipped");
        Ok(())
    }
}

/// Runs `<program> <host> <interface> <up|down>`; a zero exit status is success.
///
/// Device-specific command syntax belongs to the program, not to RepairNet.
#[derive(Debug, Clone)]
pub struct CommandActuator {
    program: String,
}

impl CommandActuator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl NetworkActuator for CommandActuator {
    async fn set_interface_state(
        &self,
        host: &str,
        interface: &str,
        action: InterfaceAction,
    ) -> Result<(), CollaboratorError> {
        let output = Command::new(&self.program)
            .arg(host)
            .arg(interface)
            .arg(action.as_str())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                CollaboratorError::unavailable("actuator", format!("{}: {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(host, interface, action = %action, status = %output.status, "Actuator command failed");
            return Err(CollaboratorError::rejected(
                "actuator",
                format!("exit {}: {}", output.status, stderr),
            ));
        }

        info!(host, interface, action = %action, "Interface state changed");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exit_status_decides_outcome() {
        assert!(CommandActuator::new("true")
            .set_interface_state("sw1", "eth0", InterfaceAction::Down)
            .await
            .is_ok());

        let err = CommandActuator::new("false")
            .set_interface_state("sw1", "eth0", InterfaceAction::Down)
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let err = CommandActuator::new("/nonexistent/repairnet-set-port")
            .set_interface_state("sw1", "eth0", InterfaceAction::Up)
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Unavailable { .. }));
    }
}
