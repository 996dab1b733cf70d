use std::{cell::Cell, fmt, path::PathBuf};

use log::{debug, error, info, warn};

use crate::{
    artifact, checksum,
    ci::{self, Workflow},
    environment::EnvSnapshot,
    error::{Error, Result},
    plan,
    request::BuildRequest,
    result::{BuildOutcome, BuildResult, OutputArtifact},
    runtime::ContainerRuntime,
    storage::StoragePreparer,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Preparing,
    Pulling,
    Building,
    Collecting,
    Checksumming,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::Preparing => "preparing",
            Phase::Pulling => "pulling",
            Phase::Building => "building",
            Phase::Collecting => "collecting",
            Phase::Checksumming => "checksumming",
            Phase::Done => "done",
            Phase::Failed => "failed",
        })
    }
}

/// Runs one build from start to finish: prepare the container storage, pull both images, run the
/// builder and collect what it produced.
///
/// Phases run strictly one after another because they all share the host container storage. Only
/// checksumming fans out.
pub struct Orchestrator<'a> {
    pub preparer: &'a StoragePreparer,
    pub runtime: &'a dyn ContainerRuntime,
    pub workflow: &'a dyn Workflow,
    /// Digests the collected artifacts, [`checksum::digest_all`] unless replaced.
    pub digest: fn(&[PathBuf]) -> Result<Vec<String>>,
    phase: Cell<Phase>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        preparer: &'a StoragePreparer,
        runtime: &'a dyn ContainerRuntime,
        workflow: &'a dyn Workflow,
    ) -> Self {
        Self {
            preparer,
            runtime,
            workflow,
            digest: checksum::digest_all,
            phase: Cell::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    fn enter(&self, phase: Phase) {
        debug!("{from} -> {phase}", from = self.phase.get());
        self.phase.set(phase);
    }

    /// Executes the build with a snapshot of the current process environment.
    pub fn execute(&self, request: BuildRequest) -> BuildOutcome {
        self.execute_with_env(request, &EnvSnapshot::capture())
    }

    pub fn execute_with_env(&self, request: BuildRequest, env: &EnvSnapshot) -> BuildOutcome {
        self.phase.set(Phase::Idle);
        match self.build(request, env) {
            Ok(result) => {
                self.enter(Phase::Done);
                BuildOutcome::success(result)
            }
            Err(error) => {
                error!("Build failed while {phase}", phase = self.phase());
                self.enter(Phase::Failed);
                BuildOutcome::failure(error)
            }
        }
    }

    fn build(&self, request: BuildRequest, env: &EnvSnapshot) -> Result<BuildResult> {
        request.validate()?;

        let config_file = std::fs::canonicalize(&request.config_file).map_err(|error| {
            Error::invalid_request_io(
                format!("can not read config file {:?}", request.config_file),
                error,
            )
        })?;

        self.enter(Phase::Preparing);
        self.preparer.prepare()?;

        std::fs::create_dir_all(&request.output_directory).map_err(|error| {
            Error::environment_setup_io(
                format!(
                    "failed to create output directory {:?}",
                    request.output_directory
                ),
                error,
            )
        })?;
        let output_directory =
            std::fs::canonicalize(&request.output_directory).map_err(|error| {
                Error::environment_setup_io(
                    format!(
                        "failed to resolve output directory {:?}",
                        request.output_directory
                    ),
                    error,
                )
            })?;
        self.preparer.clear_directory(&output_directory)?;

        let request = BuildRequest {
            config_file,
            output_directory,
            ..request
        };

        let env = if request.publishes_ami() {
            for secret in env.secrets() {
                self.workflow.add_mask(secret);
            }
            env.clone()
        } else {
            EnvSnapshot::default()
        };
        let plan = plan::synthesize(&request, &env, &self.preparer.layout.storage_dir);
        debug!("invocation plan: {plan:?}");

        self.enter(Phase::Pulling);
        for image in [request.builder_image.trim(), request.image.trim()] {
            ci::group(self.workflow, &format!("Pulling {image}"), || {
                self.runtime.pull(&plan::pull_args(&request, image))
            })
            .map_err(|error| Error::pull(image, error))?;
        }

        self.enter(Phase::Building);
        ci::group(
            self.workflow,
            &format!("Building {image}", image = request.image.trim()),
            || self.runtime.run(&plan),
        )
        .map_err(Error::build_process)?;

        self.enter(Phase::Collecting);
        let collection = artifact::collect(&request.output_directory)?;

        // Only the first artifact of each type is reported, there is no point in hashing the rest.
        let mut artifacts: Vec<artifact::DiscoveredArtifact> =
            Vec::with_capacity(collection.artifacts.len());
        for discovered in collection.artifacts {
            if let Some(first) = artifacts.iter().find(|a| a.kind == discovered.kind) {
                warn!(
                    "Ignoring {ignored:?}, {first:?} was already found for type {kind:?}",
                    ignored = discovered.path,
                    first = first.path,
                    kind = discovered.kind,
                );
                continue;
            }
            artifacts.push(discovered);
        }

        self.enter(Phase::Checksumming);
        let paths: Vec<PathBuf> = artifacts.iter().map(|a| a.path.clone()).collect();
        let checksums = (self.digest)(&paths)?;

        let mut result = BuildResult {
            manifest_path: collection.manifest_path,
            output_directory: collection.output_directory,
            ..Default::default()
        };
        for (discovered, checksum) in artifacts.into_iter().zip(checksums) {
            info!(
                "{kind}: {path:?} (sha256 {checksum})",
                kind = discovered.kind,
                path = discovered.path
            );
            let artifact = OutputArtifact {
                kind: discovered.kind,
                path: discovered.path,
                checksum,
            };
            if let Some(ignored) = result.insert_first(artifact) {
                warn!("Ignoring duplicate artifact {:?}", ignored.path);
            }
        }

        Ok(result)
    }
}
