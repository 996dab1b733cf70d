use std::path::PathBuf;

use clap::Args;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use constcat::concat;

use crate::{
    ci::{self, GitHubActions},
    process::Elevation,
    request::{self, AwsOptions, BuildRequest},
    result::BuildResult,
    runtime::Podman,
    storage::{StorageLayout, StoragePreparer},
    BoxResult, Orchestrator,
};

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// Path to the builder configuration file. Its extension (`.toml` or `.json`) tells the builder
    /// how to parse it.
    #[arg(long = "config-file")]
    pub config_file: PathBuf,

    /// The bootable container image to convert.
    #[arg(long = "image")]
    pub image: String,

    #[arg(long = "builder-image", default_value = request::DEFAULT_BUILDER_IMAGE)]
    pub builder_image: String,

    #[arg(long = "output-directory", default_value = request::DEFAULT_OUTPUT_DIRECTORY)]
    pub output_directory: PathBuf,

    /// Platform of the images and the build, e.g. `linux/arm64`.
    #[arg(long = "platform")]
    pub platform: Option<String>,

    /// Extra arguments passed verbatim to the builder, separated by whitespace.
    #[arg(long = "additional-args", allow_hyphen_values = true)]
    pub additional_args: Option<String>,

    /// Ownership of the output files as `uid:gid`.
    #[arg(long = "chown")]
    pub chown: Option<String>,

    /// Root filesystem type, e.g. `xfs` or `ext4`.
    #[arg(long = "rootfs")]
    pub rootfs: Option<String>,

    #[arg(long = "tls-verify", default_value_t = true, action = clap::ArgAction::Set)]
    pub tls_verify: bool,

    /// Comma separated artifact types. The builder picks its default when omitted.
    #[arg(long = "types", value_delimiter = ',')]
    pub types: Vec<String>,

    #[arg(long = "aws-ami-name", help = concat!("Name of the AMI to register, required for the `", request::AMI_TYPE, "` type."))]
    pub aws_ami_name: Option<String>,

    #[arg(long = "aws-bucket", help = concat!("S3 bucket the image is uploaded to, required for the `", request::AMI_TYPE, "` type."))]
    pub aws_bucket: Option<String>,

    #[arg(long = "aws-region")]
    pub aws_region: Option<String>,

    /// Run commands directly instead of through `sudo`, e.g. when already running as root.
    #[arg(long = "no-sudo", default_value_t)]
    pub no_sudo: bool,
}

impl From<BuildArgs> for BuildRequest {
    fn from(args: BuildArgs) -> Self {
        let BuildArgs {
            config_file,
            image,
            builder_image,
            output_directory,
            platform,
            additional_args,
            chown,
            rootfs,
            tls_verify,
            types,
            aws_ami_name,
            aws_bucket,
            aws_region,
            no_sudo: _,
        } = args;

        let aws = (aws_ami_name.is_some() || aws_bucket.is_some() || aws_region.is_some()).then(
            || AwsOptions {
                ami_name: aws_ami_name,
                bucket_name: aws_bucket,
                region: aws_region,
            },
        );

        BuildRequest {
            config_file,
            image,
            builder_image,
            output_directory,
            platform,
            additional_args,
            chown,
            rootfs,
            tls_verify,
            types,
            aws,
        }
    }
}

pub fn build(args: BuildArgs) -> BoxResult<()> {
    let elevation = if args.no_sudo {
        Elevation::Unprivileged
    } else {
        Elevation::Sudo
    };
    let request = BuildRequest::from(args);

    let preparer = StoragePreparer::new(StorageLayout::default(), elevation);
    let runtime = Podman::new(elevation);
    let workflow = GitHubActions::from_env();

    let result = Orchestrator::new(&preparer, &runtime, &workflow)
        .execute(request)
        .into_result()?;

    ci::publish(&workflow, &result)?;

    println!("{}", summary(&result));

    Ok(())
}

fn summary(result: &BuildResult) -> Table {
    let mut table = Table::new();
    table
        .load_preset(comfy_table::presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            ["type", "path", "sha256"]
                .into_iter()
                .map(|name| Cell::new(name).add_attribute(Attribute::Bold)),
        );

    for (kind, artifact) in &result.artifacts {
        table.add_row([
            kind.clone(),
            artifact.path.display().to_string(),
            artifact.checksum.clone(),
        ]);
    }

    table
}
