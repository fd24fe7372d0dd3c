// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Thin wrapper for locating and running the external programs that the
//! packaging pipeline delegates to (the MAR tool, the update packaging shell
//! scripts, `java`, `fs_config`, `adb`, ...).
//!
//! Every invocation blocks until the child exits. The child's stdout is
//! captured and returned, and stderr is captured so that it can be reported
//! when the process fails.

use std::{
    fs::File,
    io::{self, Seek, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use thiserror::Error;
use tracing::debug;

use crate::util::DebugString;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Couldn't find {name}: {path:?}")]
    NotFound { name: String, path: PathBuf },
    #[error("Couldn't find {0} on the PATH")]
    NotOnPath(String),
    #[error("Failed to run command: {0:?}")]
    Spawn(DebugString, #[source] io::Error),
    #[error("Failed to prepare input for command: {0:?}")]
    Input(DebugString, #[source] io::Error),
    #[error(
        "Process returned error code {}: {command:?}{}",
        exit_code_str(.exit_code),
        stderr_suffix(.stderr),
    )]
    Execution {
        command: DebugString,
        exit_code: Option<i32>,
        stderr: String,
    },
}

fn exit_code_str(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "<signal>".to_owned(),
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// An external program whose location has been verified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tool {
    name: String,
    path: PathBuf,
}

impl Tool {
    /// Use the program at `path`. This fails if `path` does not exist or is a
    /// directory.
    pub fn at(name: impl Into<String>, path: impl Into<PathBuf>) -> Result<Self> {
        let name = name.into();
        let path = path.into();

        if !path.is_file() {
            return Err(Error::NotFound { name, path });
        }

        Ok(Self { name, path })
    }

    /// Search for `name` in `PATH`.
    pub fn on_path(name: &str) -> Result<Self> {
        let path = which::which(name).map_err(|_| Error::NotOnPath(name.to_owned()))?;

        Ok(Self {
            name: name.to_owned(),
            path,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a [`Command`] for this program. The caller is responsible for
    /// adding arguments and running it via [`run`].
    pub fn command(&self) -> Command {
        Command::new(&self.path)
    }
}

/// Run `command` to completion, optionally feeding `input` to its stdin. The
/// command's stdout is returned. If the command exits unsuccessfully, the
/// error contains the exit code and the captured stderr.
pub fn run(command: &mut Command, input: Option<&[u8]>) -> Result<Vec<u8>> {
    debug!("Running: {command:?}");

    // The input is spooled to an unnamed temporary file so that a child that
    // fills its stdout pipe before consuming all of stdin cannot deadlock us.
    let stdin = match input {
        Some(data) => {
            let file = spool_input(data)
                .map_err(|e| Error::Input(DebugString::new(command), e))?;
            Stdio::from(file)
        }
        None => Stdio::null(),
    };

    let output = command
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| Error::Spawn(DebugString::new(command), e))?;

    if !output.status.success() {
        return Err(Error::Execution {
            command: DebugString::new(command),
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(output.stdout)
}

fn spool_input(data: &[u8]) -> io::Result<File> {
    let mut file = tempfile::tempfile()?;
    file.write_all(data)?;
    file.rewind()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    use assert_matches::assert_matches;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_tool() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("mar");

        assert_matches!(
            Tool::at("mar", &path),
            Err(Error::NotFound { name, path: p }) if name == "mar" && p == path
        );

        // Directories are not programs.
        assert_matches!(
            Tool::at("mar", temp_dir.path()),
            Err(Error::NotFound { .. })
        );
    }

    #[test]
    fn missing_on_path() {
        assert_matches!(
            Tool::on_path("fotakit-definitely-not-a-real-program"),
            Err(Error::NotOnPath(_))
        );
    }

    #[cfg(unix)]
    #[test]
    fn run_captures_output_and_failures() {
        let mut command = Command::new("sh");
        command.args(["-c", "cat; echo done"]);
        let output = run(&mut command, Some(&b"input\n"[..])).unwrap();
        assert_eq!(output, b"input\ndone\n");

        let mut command = Command::new("sh");
        command.args(["-c", "echo oops >&2; exit 3"]);
        let err = run(&mut command, None).unwrap_err();
        assert_matches!(
            &err,
            Error::Execution { exit_code: Some(3), stderr, .. } if stderr == "oops\n"
        );
        assert!(err.to_string().contains("error code 3"));
        assert!(err.to_string().ends_with(": oops"));
    }
}
