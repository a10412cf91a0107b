// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

// Handles invoking external binaries.
// This module assumes that, for a given machine, there is only one place
// where the desired executable might be installed. Callers are expected to
// invoke verify_binaries() before anything else and to exit if it returns an
// error. The binaries may still be uninstalled afterwards, so the lookup is
// repeated on every invocation and a missing binary is reported as an
// explicit error rather than a failure to spawn.
//
// Every invocation goes through the Executor trait so that the engine can
// be driven by a scripted executor in tests.

use std::{
    collections::HashMap,
    fmt::{self, Display},
    path::{Path, PathBuf},
    process::Command,
    sync::LazyLock,
};

use itertools::Itertools;

use crate::casctl::{CasError, CasResult};

const BINARIES_PATHS: [&str; 4] = ["/usr/sbin", "/sbin", "/usr/bin", "/bin"];

/// Find the binary with the given name by looking in likely locations.
/// Return None if no binary was found.
/// Search an explicit list of directories rather than the user's PATH
/// environment variable. casctl is run from early boot units where PATH
/// may not be set.
fn find_binary(name: &str) -> Option<PathBuf> {
    BINARIES_PATHS
        .iter()
        .map(|pre| [pre, name].iter().collect::<PathBuf>())
        .find(|path| path.exists())
}

// These are the external binaries that casctl relies on.
// Any change in this list requires a corresponding change to BINARIES,
// and vice-versa.
pub const CASADM: &str = "casadm";
pub const LSBLK: &str = "lsblk";
pub const UDEVADM: &str = "udevadm";

static BINARIES: LazyLock<HashMap<&'static str, Option<PathBuf>>> = LazyLock::new(|| {
    [CASADM, LSBLK, UDEVADM]
        .iter()
        .map(|name| (*name, find_binary(name)))
        .collect()
});

/// Verify that all binaries that casctl might invoke are available at some
/// path. Return an error if any are missing.
pub fn verify_binaries() -> CasResult<()> {
    let missing = BINARIES
        .iter()
        .filter(|(_, path)| path.is_none())
        .map(|(name, _)| *name)
        .sorted()
        .collect::<Vec<_>>();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CasError::Msg(format!(
            "Executables {} could not be found in any of {}",
            missing.join(", "),
            BINARIES_PATHS.join(", ")
        )))
    }
}

/// Get an absolute path for the executable with the given name.
fn get_executable(name: &str) -> CasResult<&'static Path> {
    BINARIES
        .get(name)
        .and_then(|path| path.as_deref())
        .ok_or_else(|| {
            CasError::Msg(format!(
                "Executable {name} could not be found in any of {}",
                BINARIES_PATHS.join(", ")
            ))
        })
}

/// A fully formed invocation of one of the known binaries.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CmdLine {
    binary: &'static str,
    args: Vec<String>,
}

impl CmdLine {
    pub fn new(binary: &'static str) -> Self {
        CmdLine {
            binary,
            args: Vec::new(),
        }
    }

    pub fn arg<S>(mut self, arg: S) -> Self
    where
        S: Into<String>,
    {
        self.args.push(arg.into());
        self
    }

    /// Append a flag followed by its value.
    pub fn opt<V>(self, flag: &str, value: V) -> Self
    where
        V: Display,
    {
        self.arg(flag).arg(value.to_string())
    }

    /// Append a flag followed by a path.
    pub fn path_opt(self, flag: &str, path: &Path) -> Self {
        self.arg(flag).arg(path.display().to_string())
    }

    /// Append the flag only if the condition holds.
    pub fn flag_if(self, flag: &str, condition: bool) -> Self {
        if condition {
            self.arg(flag)
        } else {
            self
        }
    }

    pub fn binary(&self) -> &'static str {
        self.binary
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// The value following the given flag, if the flag is present.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(|s| s.as_str())
    }
}

impl Display for CmdLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.binary)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs external commands. Blocks until the command has exited.
pub trait Executor {
    /// Invoke the command and return its standard output. Return an error if
    /// the command could not be started or exited unsuccessfully.
    fn execute(&self, cmd: &CmdLine) -> CasResult<String>;
}

/// Executes commands on the host.
#[derive(Debug, Default)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn execute(&self, cmd: &CmdLine) -> CasResult<String> {
        let executable = get_executable(cmd.binary())?;
        debug!("Executing {cmd}");
        match Command::new(executable).args(cmd.args()).output() {
            Err(err) => Err(CasError::Chained(
                format!("Failed to execute {cmd}"),
                Box::new(CasError::Io(err)),
            )),
            Ok(result) => {
                if result.status.success() {
                    Ok(String::from_utf8_lossy(&result.stdout).into_owned())
                } else {
                    Err(CasError::CommandFailure {
                        cmd: cmd.to_string(),
                        status: result.status,
                        stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
                    })
                }
            }
        }
    }
}

/// Call udevadm settle
pub fn udev_settle(executor: &dyn Executor) -> CasResult<()> {
    executor.execute(&CmdLine::new(UDEVADM).arg("settle"))?;
    Ok(())
}

/// List the names of a block device and of everything below it, one per
/// line, e.g. its partitions.
pub fn lsblk_names(executor: &dyn Executor, device: &Path) -> CasResult<Vec<String>> {
    let output = executor.execute(
        &CmdLine::new(LSBLK)
            .arg("-o")
            .arg("NAME")
            .arg("-l")
            .arg("-n")
            .arg(device.display().to_string()),
    )?;
    Ok(output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.trim().to_string())
        .collect())
}
