use std::{ffi::OsStr, fmt, io, num::NonZeroI32, process};

use log::debug;

/// Whether commands are run through `sudo`.
///
/// The builder needs loop device access and the container storage lives outside of the workspace,
/// so on a CI runner everything that touches either goes through `sudo`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Elevation {
    #[default]
    Sudo,
    Unprivileged,
}

impl Elevation {
    /// Creates a [`Command`] for `program` with this elevation applied.
    ///
    /// `sudo` resets the environment, so variables that must reach `program` have to be listed in
    /// `preserve_env`. The list is ignored for unprivileged commands since they inherit everything.
    pub fn command<S: AsRef<OsStr>>(self, program: S, preserve_env: &[String]) -> Command {
        match self {
            Elevation::Sudo => {
                let mut command = Command::new("sudo");
                if !preserve_env.is_empty() {
                    command = command.arg(format!("--preserve-env={}", preserve_env.join(",")));
                }
                command.arg(program)
            }
            Elevation::Unprivileged => Command::new(program),
        }
    }
}

pub struct Command(process::Command);

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Command {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self(process::Command::new(program))
    }

    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.0.arg(arg);
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.0.args(args);
        self
    }

    pub fn program(&self) -> &OsStr {
        self.0.get_program()
    }

    pub fn try_status(mut self) -> Result<ExitStatus, Error> {
        if log::log_enabled!(log::Level::Debug) {
            debug!("running `{command:?}`...", command = &self.0);
        }

        match self.0.status() {
            Ok(status) => Ok(ExitStatus {
                command: self,
                status,
            }),
            Err(error) => Err(Error {
                command: self,
                kind: error.into(),
            }),
        }
    }

    /// Runs the command with inherited standard streams so its progress shows up in the job log.
    pub fn status(self) -> Result<(), Error> {
        self.try_status().and_then(ExitStatus::require_success)
    }

    pub fn try_output(mut self) -> Result<Output, Error> {
        if log::log_enabled!(log::Level::Debug) {
            debug!("capturing `{command:?}`...", command = &self.0);
        }

        match self.0.output() {
            Ok(output) => Ok(Output {
                command: self,
                output,
            }),
            Err(error) => Err(Error {
                command: self,
                kind: error.into(),
            }),
        }
    }

    pub fn output(self) -> Result<Output, Error> {
        self.try_output().and_then(Output::require_success)
    }

    pub fn output_with_input(mut self, input: Vec<u8>) -> Result<Output, Error> {
        if log::log_enabled!(log::Level::Debug) {
            debug!("capturing `{command:?}`...", command = &self.0);
        }

        let mut child = match self
            .0
            .stdin(process::Stdio::piped())
            .stdout(process::Stdio::piped())
            .stderr(process::Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(error) => {
                return Err(Error {
                    command: self,
                    kind: error.into(),
                })
            }
        };

        // Writing happens on its own thread so a child that fills its stdout pipe before draining
        // stdin can not deadlock us.
        let stdin_thread = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || {
                use std::io::Write;
                stdin.write_all(&input)
            })
        });

        let output = match child.wait_with_output() {
            Ok(output) => output,
            Err(error) => {
                return Err(Error {
                    command: self,
                    kind: error.into(),
                })
            }
        };

        if let Some(stdin_thread) = stdin_thread {
            let written = stdin_thread.join().unwrap_or_else(|_| {
                Err(io::Error::new(
                    io::ErrorKind::Other,
                    "thread writing to stdin panicked",
                ))
            });
            // A child that exits without reading all of its input closes the pipe early. Its exit
            // status tells the more useful story in that case.
            if let Err(error) = written {
                if error.kind() != io::ErrorKind::BrokenPipe {
                    return Err(Error {
                        command: self,
                        kind: error.into(),
                    });
                }
            }
        }

        Output {
            command: self,
            output,
        }
        .require_success()
    }
}

#[derive(Debug)]
pub struct ExitStatus {
    command: Command,
    status: process::ExitStatus,
}

impl ExitStatus {
    pub fn require_success(self) -> Result<(), Error> {
        let ExitStatus { command, status } = self;
        if status.success() {
            Ok(())
        } else {
            Err(Error {
                command,
                kind: ErrorKind::NonZeroExitStatus {
                    code: status.code().and_then(NonZeroI32::new),
                    stderr: None,
                },
            })
        }
    }
}

#[derive(Debug)]
pub struct Output {
    pub command: Command,
    pub output: process::Output,
}

impl Output {
    pub fn require_success(self) -> Result<Output, Error> {
        let Output { command, output } = self;
        if output.status.success() {
            Ok(Output { command, output })
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            Err(Error {
                command,
                kind: ErrorKind::NonZeroExitStatus {
                    code: output.status.code().and_then(NonZeroI32::new),
                    stderr: (!stderr.is_empty()).then_some(stderr),
                },
            })
        }
    }
}

impl std::ops::Deref for Output {
    type Target = process::Output;

    fn deref(&self) -> &Self::Target {
        &self.output
    }
}

#[derive(Debug)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    Io(io::Error),
    NonZeroExitStatus {
        code: Option<NonZeroI32>,
        stderr: Option<String>,
    },
}

impl From<io::Error> for ErrorKind {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::Io(value),
        }
    }
}

#[derive(Debug)]
pub struct Error {
    pub command: Command,
    pub kind: ErrorKind,
}

impl Error {
    /// The exit code of the process, if it ran to completion and exited with one.
    pub fn exit_code(&self) -> Option<NonZeroI32> {
        match self.kind {
            ErrorKind::NonZeroExitStatus { code, .. } => code,
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to run `{command:?}`: ",
            command = &self.command.0
        )?;
        match &self.kind {
            ErrorKind::NotFound => {
                let program = self.command.program().to_string_lossy();
                write!(f, "the `{program}` command is required but not available on your system, please install it")
            }
            ErrorKind::PermissionDenied => {
                let program = self.command.program().to_string_lossy();
                write!(f, "the `{program}` command is available but does not have the right permissions, please make sure the binary is executable")
            }
            ErrorKind::Io(error) => write!(f, "{error}"),
            ErrorKind::NonZeroExitStatus { code, stderr } => {
                if let Some(code) = code {
                    write!(f, "exited with non-zero exit code `{code}`")?;
                } else {
                    write!(f, "did not run succesfully")?;
                }
                if let Some(stderr) = stderr {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(error) => Some(error),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Calls [`Command::args`] on the provided [`Command`] while calling [`std::convert::AsRef::as_ref`]
/// on each argument.
macro_rules! args {
    ($program:expr, $($arg:expr),+ $(,)?) => {
        $program.args([
            $(::std::convert::AsRef::<::std::ffi::OsStr>::as_ref(&$arg),)*
        ])
    }
}

pub(crate) use args;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sudo_wraps_program() {
        let command = Elevation::Sudo.command("podman", &[]);
        assert_eq!(command.program(), "sudo");
        let args: Vec<_> = command.0.get_args().collect();
        assert_eq!(args, ["podman"]);
    }

    #[test]
    fn test_sudo_preserves_env() {
        let command = Elevation::Sudo.command(
            "podman",
            &["AWS_ACCESS_KEY_ID".to_owned(), "AWS_REGION".to_owned()],
        );
        let args: Vec<_> = command.0.get_args().collect();
        assert_eq!(
            args,
            ["--preserve-env=AWS_ACCESS_KEY_ID,AWS_REGION", "podman"]
        );
    }

    #[test]
    fn test_unprivileged_ignores_preserve_env() {
        let command = Elevation::Unprivileged.command("podman", &["AWS_REGION".to_owned()]);
        assert_eq!(command.program(), "podman");
        assert_eq!(command.0.get_args().count(), 0);
    }

    #[test]
    fn test_missing_program() {
        let error = Command::new("bib-action-does-not-exist").status().unwrap_err();
        assert!(matches!(error.kind, ErrorKind::NotFound));
        assert!(error.to_string().contains("bib-action-does-not-exist"));
    }

    #[test]
    fn test_non_zero_exit_status() {
        let error = args!(Command::new("sh"), "-c", "exit 3").status().unwrap_err();
        assert_eq!(error.exit_code().map(NonZeroI32::get), Some(3));
    }

    #[test]
    fn test_output_captures_stderr() {
        let error = args!(Command::new("sh"), "-c", "echo broken >&2; exit 1")
            .output()
            .unwrap_err();
        match error.kind {
            ErrorKind::NonZeroExitStatus { stderr, .. } => {
                assert_eq!(stderr.as_deref(), Some("broken"))
            }
            other => panic!("unexpected error kind {other:?}"),
        }
    }

    #[test]
    fn test_output_with_input() {
        let output = Command::new("cat")
            .output_with_input(b"hello".to_vec())
            .unwrap();
        assert_eq!(output.stdout, b"hello");
    }
}
