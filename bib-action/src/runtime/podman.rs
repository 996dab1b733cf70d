use super::ContainerRuntime;
use crate::{
    plan::InvocationPlan,
    process::{self, Elevation},
};

pub const PODMAN: &str = "podman";

pub struct Podman {
    pub program: String,
    pub elevation: Elevation,
}

impl Podman {
    pub fn new(elevation: Elevation) -> Self {
        Self {
            program: PODMAN.to_owned(),
            elevation,
        }
    }

    fn command(&self, preserve_env: &[String]) -> process::Command {
        self.elevation.command(&self.program, preserve_env)
    }
}

impl ContainerRuntime for Podman {
    fn pull(&self, args: &[String]) -> process::Result<()> {
        self.command(&[]).args(args).status()
    }

    fn run(&self, plan: &InvocationPlan) -> process::Result<()> {
        self.command(plan.forwarded_env()).args(plan.args()).status()
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::{environment::EnvSnapshot, plan, process::ErrorKind, request::BuildRequest};

    #[test]
    fn test_missing_runtime_is_reported() {
        let runtime = Podman {
            program: "bib-action-missing-podman".to_owned(),
            elevation: Elevation::Unprivileged,
        };
        let request = BuildRequest::new("/work/config.toml", "quay.io/example/os:latest");
        let plan = plan::synthesize(
            &request,
            &EnvSnapshot::default(),
            Path::new("/var/lib/containers/storage"),
        );

        let error = runtime.run(&plan).unwrap_err();
        assert!(matches!(error.kind, ErrorKind::NotFound));
    }

    #[test]
    fn test_failing_pull_is_reported() {
        // `false` ignores its arguments and exits with 1, standing in for a failed pull.
        let runtime = Podman {
            program: "false".to_owned(),
            elevation: Elevation::Unprivileged,
        };
        let error = runtime
            .pull(&["pull".to_owned(), "quay.io/example/os:latest".to_owned()])
            .unwrap_err();
        assert_eq!(error.exit_code().map(|code| code.get()), Some(1));
    }
}
