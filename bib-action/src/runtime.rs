mod podman;

pub use podman::*;

use crate::{plan::InvocationPlan, process};

/// The container runtime the builder runs in.
pub trait ContainerRuntime {
    /// Pulls an image. `args` come from [`crate::plan::pull_args`].
    fn pull(&self, args: &[String]) -> process::Result<()>;

    /// Runs the builder container described by `plan` to completion.
    fn run(&self, plan: &InvocationPlan) -> process::Result<()>;
}
