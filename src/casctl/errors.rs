// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{error::Error, fmt, io, process::ExitStatus};

pub type CasResult<T> = Result<T, CasError>;

#[derive(Debug)]
pub enum CasError {
    Msg(String),
    Chained(String, Box<CasError>),

    /// A configuration line or value failed validation.
    Invalid(String),
    /// Two declarations disagree about the same device or id.
    Conflict(String),
    /// A declaration repeats an identical existing one.
    AlreadyConfigured(String),

    /// An external command ran and exited unsuccessfully.
    CommandFailure {
        cmd: String,
        status: ExitStatus,
        stderr: String,
    },
    /// Several independent operations failed; none aborted the others.
    Compound(Vec<CasError>),

    Io(io::Error),
    Nix(nix::Error),
    Csv(csv::Error),
    Serde(serde_json::error::Error),
}

impl CasError {
    /// The stderr text of the command whose failure caused this error, if any.
    pub fn command_stderr(&self) -> Option<&str> {
        match self {
            CasError::CommandFailure { ref stderr, .. } => Some(stderr),
            CasError::Chained(_, ref err) => err.command_stderr(),
            _ => None,
        }
    }
}

impl fmt::Display for CasError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CasError::Msg(ref s) => write!(f, "{s}"),
            CasError::Chained(ref msg, ref err) => write!(f, "{msg}; {err}"),
            CasError::Invalid(ref s) => write!(f, "Invalid configuration: {s}"),
            CasError::Conflict(ref s) => write!(f, "Conflicting configuration: {s}"),
            CasError::AlreadyConfigured(ref s) => write!(f, "Already configured: {s}"),
            CasError::CommandFailure {
                ref cmd,
                ref status,
                ref stderr,
            } => write!(
                f,
                "Command {cmd} failed with {status}: {}",
                stderr.trim_end()
            ),
            CasError::Compound(ref errs) => {
                if errs.len() > 1 {
                    writeln!(f, "Multiple errors occurred:")?;
                }
                for err in errs {
                    writeln!(f, "{err}")?;
                }
                Ok(())
            }
            CasError::Io(ref err) => write!(f, "IO error: {err}"),
            CasError::Nix(ref err) => write!(f, "Nix error: {err}"),
            CasError::Csv(ref err) => write!(f, "CSV error: {err}"),
            CasError::Serde(ref err) => write!(f, "Serde error: {err}"),
        }
    }
}

impl Error for CasError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            CasError::Msg(_)
            | CasError::Invalid(_)
            | CasError::Conflict(_)
            | CasError::AlreadyConfigured(_)
            | CasError::CommandFailure { .. }
            | CasError::Compound(_) => None,
            CasError::Chained(_, ref err) => Some(err),
            CasError::Io(ref err) => Some(err),
            CasError::Nix(ref err) => Some(err),
            CasError::Csv(ref err) => Some(err),
            CasError::Serde(ref err) => Some(err),
        }
    }
}

impl From<io::Error> for CasError {
    fn from(err: io::Error) -> CasError {
        CasError::Io(err)
    }
}

impl From<nix::Error> for CasError {
    fn from(err: nix::Error) -> CasError {
        CasError::Nix(err)
    }
}

impl From<csv::Error> for CasError {
    fn from(err: csv::Error) -> CasError {
        CasError::Csv(err)
    }
}

impl From<serde_json::error::Error> for CasError {
    fn from(err: serde_json::error::Error) -> CasError {
        CasError::Serde(err)
    }
}

/// Collects errors from a sequence of operations that must all be attempted.
#[derive(Debug, Default)]
pub struct CompoundError {
    errors: Vec<CasError>,
}

impl CompoundError {
    pub fn new() -> Self {
        CompoundError::default()
    }

    /// Record an error. A compound error is flattened into this one.
    pub fn add(&mut self, err: CasError) {
        match err {
            CasError::Compound(errs) => self.errors.extend(errs),
            err => self.errors.push(err),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Ok if nothing was recorded, otherwise a CasError::Compound holding
    /// every recorded error in the order recorded.
    pub fn into_result(self) -> CasResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(CasError::Compound(self.errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Compound errors added to a compound error are flattened.
    fn test_compound_flattens() {
        let mut inner = CompoundError::new();
        inner.add(CasError::Msg("a".into()));
        inner.add(CasError::Msg("b".into()));

        let mut outer = CompoundError::new();
        outer.add(inner.into_result().unwrap_err());
        outer.add(CasError::Msg("c".into()));
        assert_eq!(outer.len(), 3);

        assert_matches!(outer.into_result(), Err(CasError::Compound(ref errs)) if errs.len() == 3);
    }

    #[test]
    fn test_compound_empty_is_ok() {
        assert_matches!(CompoundError::new().into_result(), Ok(()));
    }

    #[test]
    /// Only a compound of more than one error gets the summary line.
    fn test_compound_display() {
        let single = CasError::Compound(vec![CasError::Msg("only".into())]);
        assert_eq!(single.to_string(), "only\n");

        let multiple = CasError::Compound(vec![
            CasError::Msg("one".into()),
            CasError::Msg("two".into()),
        ]);
        assert_eq!(
            multiple.to_string(),
            "Multiple errors occurred:\none\ntwo\n"
        );
    }
}
