use std::process::ExitStatus;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{binary} is not installed")]
    MissingBinary { binary: String },

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Local port {port} is already in use")]
    PortInUse { port: u16 },

    #[error("{program} exited with code {code}")]
    ChildExited { program: String, code: i32 },

    #[error("{program} was terminated by a signal")]
    ChildKilled { program: String },

    #[error("Failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map a non-successful exit status of `program` to an error.
    pub fn from_status(program: &str, status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => CliError::ChildExited {
                program: program.to_string(),
                code,
            },
            None => CliError::ChildKilled {
                program: program.to_string(),
            },
        }
    }

    /// Process exit code the CLI terminates with for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            // Exit codes are truncated to 8 bits by the OS; never report success for a failure.
            CliError::ChildExited { code, .. } => match (*code & 0xff) as u8 {
                0 => 1,
                code => code,
            },
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
