//! Error type and helper functions.

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::os::unix::process::ExitStatusExt;

use nix::sys::signal::Signal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HLError {
    #[error("Child process '{cmdline}' {status}.")]
    CommandFailed { status: String, cmdline: String },

    #[error("{detail}: {cause}.")]
    Spawn { #[source] cause: io::Error, detail: String },

    #[error("Required variable {var} is not set.")]
    MissingConfiguration { var: String },

    #[error("Invalid value {value:?} for {var}: {reason}.")]
    InvalidConfiguration { var: String, value: String, reason: String },

    #[error("{}: {cause}.", path.display())]
    Filesystem { #[source] cause: io::Error, path: PathBuf },
}

pub type Result<T> = std::result::Result<T, HLError>;

pub fn map_unsuc_child(status: &ExitStatus, cmdline: &[String]) -> HLError {
    let status = match status.code() {
        Some(n) => format!("exited unsuccessfully (code {})", n),
        None => match status.signal() {
            Some(n) => {
                // Better than printing the raw signal number.
                if let Ok(sig) = Signal::try_from(n) {
                    format!("killed by {:?}", sig)
                } else {
                    format!("killed by signal {}", n)
                }
            }
            None => String::from("exited unsuccessfully"),
        },
    };
    // FIXME: shell-quote as necessary.
    let cmdline = cmdline.join(" ");
    HLError::CommandFailed { status, cmdline }
}

pub fn map_spawn_err(cause: io::Error, detail: String) -> HLError {
    HLError::Spawn { cause, detail }
}

pub fn map_fs_err(cause: io::Error, path: &Path) -> HLError {
    HLError::Filesystem { cause, path: path.to_path_buf() }
}

pub fn missing(var: &str) -> HLError {
    HLError::MissingConfiguration { var: String::from(var) }
}

pub fn invalid(var: &str, value: &str, reason: impl ToString) -> HLError {
    HLError::InvalidConfiguration {
        var: String::from(var),
        value: String::from(value),
        reason: reason.to_string(),
    }
}
