use std::path::PathBuf;

use crate::error::{Error, Result};

/// The builder image used when the caller does not pick one.
pub const DEFAULT_BUILDER_IMAGE: &str = "quay.io/centos-bootc/bootc-image-builder:latest";

/// The directory artifacts are written to when the caller does not pick one.
pub const DEFAULT_OUTPUT_DIRECTORY: &str = "./output";

/// The artifact type that publishes an AMI to AWS instead of only writing a file.
pub const AMI_TYPE: &str = "ami";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsOptions {
    pub ami_name: Option<String>,
    pub bucket_name: Option<String>,
    pub region: Option<String>,
}

/// Everything a single build needs to know. Constructed once by the caller and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub config_file: PathBuf,
    pub image: String,
    pub builder_image: String,
    pub output_directory: PathBuf,
    pub platform: Option<String>,
    pub additional_args: Option<String>,
    pub chown: Option<String>,
    pub rootfs: Option<String>,
    pub tls_verify: bool,
    /// Requested artifact types in caller order. Empty means the builder picks its default.
    pub types: Vec<String>,
    pub aws: Option<AwsOptions>,
}

impl BuildRequest {
    pub fn new(config_file: impl Into<PathBuf>, image: impl Into<String>) -> Self {
        Self {
            config_file: config_file.into(),
            image: image.into(),
            builder_image: DEFAULT_BUILDER_IMAGE.to_owned(),
            output_directory: PathBuf::from(DEFAULT_OUTPUT_DIRECTORY),
            platform: None,
            additional_args: None,
            chown: None,
            rootfs: None,
            tls_verify: true,
            types: Vec::new(),
            aws: None,
        }
    }

    /// Requested types with surrounding whitespace removed and blank entries dropped. Order and
    /// duplicates are preserved.
    pub fn requested_types(&self) -> impl Iterator<Item = &str> {
        self.types
            .iter()
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn publishes_ami(&self) -> bool {
        self.requested_types().any(|value| value == AMI_TYPE)
    }

    /// The AMI name and bucket name, if both are present and non-empty.
    pub fn ami_target(&self) -> Option<(&str, &str)> {
        let aws = self.aws.as_ref()?;
        let ami_name = non_empty(aws.ami_name.as_deref())?;
        let bucket_name = non_empty(aws.bucket_name.as_deref())?;
        Some((ami_name, bucket_name))
    }

    pub fn aws_region(&self) -> Option<&str> {
        non_empty(self.aws.as_ref()?.region.as_deref())
    }

    /// Rejects requests the builder can not possibly satisfy, before anything touches the host.
    pub fn validate(&self) -> Result<()> {
        if self.config_file.as_os_str().is_empty() {
            return Err(Error::invalid_request(
                "the config file path must not be empty",
            ));
        }
        if self.image.trim().is_empty() {
            return Err(Error::invalid_request(
                "the target image reference must not be empty",
            ));
        }
        if self.builder_image.trim().is_empty() {
            return Err(Error::invalid_request(
                "the builder image reference must not be empty",
            ));
        }
        if self.output_directory.as_os_str().is_empty() {
            return Err(Error::invalid_request(
                "the output directory must not be empty",
            ));
        }
        if self.publishes_ami() && self.ami_target().is_none() {
            return Err(Error::invalid_request(format!(
                "the `{AMI_TYPE}` type requires both an AWS AMI name and an AWS bucket name"
            )));
        }
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
