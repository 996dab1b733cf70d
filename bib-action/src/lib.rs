pub mod artifact;
pub mod checksum;
pub mod ci;
pub mod environment;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod process;
pub mod request;
pub mod result;
pub mod runtime;
pub mod storage;
pub(crate) mod version;

pub mod cli;

pub use error::{Error, ErrorKind};
pub use orchestrator::{Orchestrator, Phase};
pub use request::{AwsOptions, BuildRequest};
pub use result::{BuildOutcome, BuildResult, OutputArtifact};

pub(crate) type BoxResult<T, E = Box<dyn std::error::Error + Send + Sync + 'static>> =
    std::result::Result<T, E>;
