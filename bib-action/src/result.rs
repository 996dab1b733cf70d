use std::{collections::BTreeMap, path::PathBuf};

use serde::Serialize;

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputArtifact {
    #[serde(skip)]
    pub kind: String,
    pub path: PathBuf,
    pub checksum: String,
}

/// What a successful build produced. The empty value stands for a failed build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildResult {
    pub manifest_path: PathBuf,
    pub output_directory: PathBuf,
    pub artifacts: BTreeMap<String, OutputArtifact>,
}

impl BuildResult {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Adds `artifact` unless an artifact of the same type is already present. Returns the artifact
    /// back if it was not added.
    pub fn insert_first(&mut self, artifact: OutputArtifact) -> Option<OutputArtifact> {
        use std::collections::btree_map::Entry;

        match self.artifacts.entry(artifact.kind.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(artifact);
                None
            }
            Entry::Occupied(_) => Some(artifact),
        }
    }

    /// Outputs for the CI step, in a stable order.
    pub fn step_outputs(&self) -> serde_json::Result<Vec<(String, String)>> {
        let mut outputs = vec![
            (
                "manifest-path".to_owned(),
                self.manifest_path.display().to_string(),
            ),
            (
                "output-directory".to_owned(),
                self.output_directory.display().to_string(),
            ),
            (
                "output-paths".to_owned(),
                serde_json::to_string(&self.artifacts)?,
            ),
        ];
        for (kind, artifact) in &self.artifacts {
            outputs.push((
                format!("{kind}-output-path"),
                artifact.path.display().to_string(),
            ));
            outputs.push((format!("{kind}-output-checksum"), artifact.checksum.clone()));
        }
        Ok(outputs)
    }
}

/// The value handed back to the caller. A failed build always carries the empty result.
#[derive(Debug)]
pub struct BuildOutcome {
    pub result: BuildResult,
    pub error: Option<Error>,
}

impl BuildOutcome {
    pub fn success(result: BuildResult) -> Self {
        Self {
            result,
            error: None,
        }
    }

    pub fn failure(error: Error) -> Self {
        Self {
            result: BuildResult::default(),
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<BuildResult, Error> {
        match self.error {
            None => Ok(self.result),
            Some(error) => Err(error),
        }
    }
}
