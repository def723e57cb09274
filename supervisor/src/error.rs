use common::CommandError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("could not open the {path:?} FIFO: {source}")]
    Init {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write {command:?} to {path:?}: {source}")]
    Send {
        path: PathBuf,
        command: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Launch(#[from] CommandError),

    #[error("status initialization failed: {0}")]
    StatusInit(#[source] CommandError),

    #[error("failed to signal {name} (pid {pid}): {source}")]
    Signal {
        name: String,
        pid: u32,
        #[source]
        source: nix::errno::Errno,
    },

    #[error("failed to install signal handler: {0}")]
    SignalHandler(#[source] std::io::Error),
}
