//! Control of the local Tor daemon: start it and ask for a fresh circuit.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::{Result, TorClientError};

#[async_trait]
pub trait CircuitControl: Send + Sync {
    async fn start(&self) -> Result<()>;

    /// Makes the daemon build new circuits for subsequent connections.
    async fn reload(&self) -> Result<()>;
}

/// Drives a Tor systemd unit through `systemctl`.
#[derive(Debug, Clone)]
pub struct SystemdTor {
    unit: String,
    use_sudo: bool,
}

impl SystemdTor {
    pub fn new(unit: impl Into<String>, use_sudo: bool) -> Self {
        Self {
            unit: unit.into(),
            use_sudo,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.daemon_unit.clone(), config.use_sudo)
    }

    fn command(&self, verb: &str) -> Command {
        let mut cmd = if self.use_sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg("systemctl");
            cmd
        } else {
            Command::new("systemctl")
        };
        cmd.args([verb, self.unit.as_str()]);
        cmd
    }

    async fn systemctl(&self, verb: &str) -> Result<()> {
        debug!("systemctl {} {}", verb, self.unit);

        let output = self
            .command(verb)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                TorClientError::CircuitControl(format!(
                    "failed to run systemctl {} {}: {}",
                    verb, self.unit, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TorClientError::CircuitControl(format!(
                "systemctl {} {} exited with {}: {}",
                verb,
                self.unit,
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl CircuitControl for SystemdTor {
    async fn start(&self) -> Result<()> {
        self.systemctl("start").await
    }

    async fn reload(&self) -> Result<()> {
        self.systemctl("reload").await
    }
}

/// Wraps a [`CircuitControl`] so failures are logged instead of returned.
///
/// Rotations are serialized: the reload is a global side effect on the shared
/// daemon, so only one may be in flight at a time.
#[derive(Clone)]
pub struct CircuitController {
    control: Arc<dyn CircuitControl>,
    rotation: Arc<Mutex<()>>,
}

impl CircuitController {
    pub fn new(control: Arc<dyn CircuitControl>) -> Self {
        Self {
            control,
            rotation: Arc::new(Mutex::new(())),
        }
    }

    /// Returns whether the daemon reported a successful start.
    pub async fn start(&self) -> bool {
        match self.control.start().await {
            Ok(()) => {
                info!("Tor service started successfully");
                true
            }
            Err(e) => {
                error!("Failed to start Tor: {}", e);
                false
            }
        }
    }

    /// Returns whether the daemon accepted the reload.
    pub async fn rotate(&self) -> bool {
        let _guard = self.rotation.lock().await;
        match self.control.reload().await {
            Ok(()) => {
                info!("Tor service reloaded successfully");
                true
            }
            Err(e) => {
                error!("Failed to reload Tor: {}", e);
                false
            }
        }
    }
}
