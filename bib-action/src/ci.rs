//! Communication with the CI runner through GitHub Actions workflow commands.
//! See https://docs.github.com/en/actions/reference/workflow-commands-for-github-actions.

use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::PathBuf,
};

use log::info;

use crate::{
    error::{Error, Result},
    result::BuildResult,
};

/// The channel through which the CI runner is told about log groups, secrets and step outputs.
pub trait Workflow {
    /// Makes the runner redact `value` from everything logged afterwards.
    fn add_mask(&self, value: &str);

    fn start_group(&self, title: &str);

    fn end_group(&self);

    fn set_output(&self, name: &str, value: &str) -> io::Result<()>;
}

/// Runs `f` inside a collapsible log group.
pub fn group<W, T, F>(workflow: &W, title: &str, f: F) -> T
where
    W: Workflow + ?Sized,
    F: FnOnce() -> T,
{
    workflow.start_group(title);
    let value = f();
    workflow.end_group();
    value
}

pub struct GitHubActions {
    output_file: Option<PathBuf>,
}

impl GitHubActions {
    pub fn new(output_file: Option<PathBuf>) -> Self {
        Self { output_file }
    }

    /// Step outputs go to the file named by `GITHUB_OUTPUT`, if set.
    pub fn from_env() -> Self {
        Self::new(std::env::var_os("GITHUB_OUTPUT").map(PathBuf::from))
    }
}

impl Workflow for GitHubActions {
    fn add_mask(&self, value: &str) {
        // A multi-line secret has to be masked one line at a time.
        for line in value.lines().filter(|line| !line.trim().is_empty()) {
            println!("::add-mask::{line}");
        }
    }

    fn start_group(&self, title: &str) {
        println!("::group::{title}");
    }

    fn end_group(&self) {
        println!("::endgroup::");
    }

    fn set_output(&self, name: &str, value: &str) -> io::Result<()> {
        let Some(path) = self.output_file.as_ref() else {
            info!("{name}={value}");
            return Ok(());
        };
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(format_output(name, value).as_bytes())
    }
}

/// Publishes the outputs of a successful build as step outputs.
pub fn publish<W: Workflow + ?Sized>(workflow: &W, result: &BuildResult) -> Result<()> {
    let outputs = result.step_outputs().map_err(|error| {
        Error::report("failed to serialize the artifact paths", error.into())
    })?;
    for (name, value) in outputs {
        workflow
            .set_output(&name, &value)
            .map_err(|error| Error::report(format!("failed to set step output {name:?}"), error))?;
    }
    Ok(())
}

/// Formats a step output line, using the multi-line syntax when `value` spans lines.
pub fn format_output(name: &str, value: &str) -> String {
    if !value.contains('\n') {
        return format!("{name}={value}\n");
    }
    let mut delimiter = String::from("BIB_ACTION_EOF");
    while value.lines().any(|line| line == delimiter) {
        delimiter.push('_');
    }
    format!("{name}<<{delimiter}\n{value}\n{delimiter}\n")
}
