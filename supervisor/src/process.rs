use common::{CommandError, CommandSpec};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::Child;

use crate::channel::{ControlChannel, QUIT_COMMAND};
use crate::error::SupervisorError;

/// How a supervised process is asked to stop.
#[derive(Debug, Clone)]
pub enum Termination {
    /// SIGTERM, never SIGKILL.
    Signal,
    /// Write `QUIT` to the process's control channel.
    Channel(ControlChannel),
}

/// An external process owned by the supervisor.
#[derive(Debug)]
pub struct SupervisedProcess {
    name: String,
    child: Child,
    termination: Termination,
}

impl SupervisedProcess {
    pub fn spawn(
        name: &str,
        spec: &CommandSpec,
        termination: Termination,
    ) -> Result<Self, CommandError> {
        let child = spec
            .to_command()
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| CommandError::Launch {
                program: spec.program_name(),
                source,
            })?;
        log::info!("Started {} (pid {:?}): {}", name, child.id(), spec);

        Ok(Self {
            name: name.to_string(),
            child,
            termination,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` once the process has been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Asks the process to exit without waiting for it.
    pub fn request_stop(&self) -> Result<(), SupervisorError> {
        match &self.termination {
            Termination::Signal => {
                let Some(pid) = self.child.id() else {
                    log::debug!("{} already exited", self.name);
                    return Ok(());
                };
                kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(|source| {
                    SupervisorError::Signal {
                        name: self.name.clone(),
                        pid,
                        source,
                    }
                })
            }
            Termination::Channel(channel) => Ok(channel.send(QUIT_COMMAND)?),
        }
    }

    /// Waits up to `grace` for the process to exit.
    pub async fn wait_exit(&mut self, grace: Duration) -> Option<ExitStatus> {
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                log::error!("Failed to wait for {}: {}", self.name, e);
                None
            }
            Err(_) => None,
        }
    }
}
