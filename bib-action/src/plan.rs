//! Translates a [`BuildRequest`] into the argument lists handed to the container runtime.
//!
//! Every list is assembled token by token. Optional flags are either pushed as complete
//! `flag value` pairs or not at all, so no list ever contains an empty token.

use std::path::Path;

use crate::{environment::EnvSnapshot, request::BuildRequest};

/// Where the output directory is mounted inside the builder container.
pub const OUTPUT_MOUNT: &str = "/output";

/// The builder looks for its configuration at this path, with the extension telling it the format.
pub const CONFIG_MOUNT_STEM: &str = "/config";

pub const SECURITY_LABEL: &str = "label=type:unconfined_t";

/// The fully resolved arguments for one `run` of the builder container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationPlan {
    runtime_args: Vec<String>,
    builder_args: Vec<String>,
    forwarded_env: Vec<String>,
}

impl InvocationPlan {
    /// Arguments for the container runtime, ending with the builder image.
    pub fn runtime_args(&self) -> &[String] {
        &self.runtime_args
    }

    /// Arguments for the builder, ending with the target image.
    pub fn builder_args(&self) -> &[String] {
        &self.builder_args
    }

    /// Names of the environment variables the runtime passes through to the builder.
    pub fn forwarded_env(&self) -> &[String] {
        &self.forwarded_env
    }

    /// The complete runtime command line: runtime arguments followed by builder arguments.
    pub fn args(&self) -> impl Iterator<Item = &str> {
        self.runtime_args
            .iter()
            .chain(&self.builder_args)
            .map(String::as_str)
    }
}

#[derive(Default)]
struct ArgList(Vec<String>);

impl ArgList {
    fn push(&mut self, value: impl Into<String>) -> &mut Self {
        self.0.push(value.into());
        self
    }

    fn pair(&mut self, flag: &str, value: impl Into<String>) -> &mut Self {
        self.push(flag).push(value)
    }

    fn optional(&mut self, flag: &str, value: Option<&str>) -> &mut Self {
        if let Some(value) = value {
            self.pair(flag, value);
        }
        self
    }

    fn finish(self) -> Vec<String> {
        let mut args = self.0;
        args.retain(|arg| !arg.is_empty());
        args
    }
}

/// The in-container path of the config file. Its extension, the last dot-delimited segment of the
/// file name, is kept so the builder can tell TOML from JSON.
pub fn config_mount_target(config_file: &Path) -> String {
    // Unlike `Path::extension`, a dotfile such as `.toml` counts as having an extension.
    match config_file
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, extension)| extension)
        .filter(|extension| !extension.is_empty())
    {
        Some(extension) => format!("{CONFIG_MOUNT_STEM}.{extension}"),
        None => CONFIG_MOUNT_STEM.to_owned(),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// Arguments for pulling `image` with the same TLS and platform settings the build will use.
pub fn pull_args(request: &BuildRequest, image: &str) -> Vec<String> {
    let mut args = ArgList::default();
    args.push("pull");
    if !request.tls_verify {
        args.push("--tls-verify=false");
    }
    args.optional("--platform", non_empty(request.platform.as_deref()))
        .push(image);
    args.finish()
}

/// Builds the invocation plan. Paths in `request` are used verbatim, the caller is expected to have
/// made them absolute. `env` is only consulted when an AMI is published.
pub fn synthesize(request: &BuildRequest, env: &EnvSnapshot, storage_dir: &Path) -> InvocationPlan {
    let publishes_ami = request.publishes_ami();

    let forwarded_env: Vec<String> = if publishes_ami {
        env.names().map(str::to_owned).collect()
    } else {
        Vec::new()
    };

    let runtime_args = {
        let mut args = ArgList::default();
        args.push("run")
            .push("--rm")
            .push("--privileged")
            .pair("--security-opt", SECURITY_LABEL)
            .pair(
                "-v",
                format!(
                    "{storage}:{storage}",
                    storage = storage_dir.display()
                ),
            )
            .pair(
                "-v",
                format!(
                    "{output}:{OUTPUT_MOUNT}",
                    output = request.output_directory.display()
                ),
            )
            .pair(
                "-v",
                format!(
                    "{config}:{target}:ro",
                    config = request.config_file.display(),
                    target = config_mount_target(&request.config_file)
                ),
            )
            .optional("--platform", non_empty(request.platform.as_deref()));
        for name in &forwarded_env {
            args.pair("--env", name.as_str());
        }
        args.push(request.builder_image.trim());
        args.finish()
    };

    let builder_args = {
        let mut args = ArgList::default();
        args.push("build").pair("--output", OUTPUT_MOUNT);
        if !request.tls_verify {
            args.push("--tls-verify=false");
        }
        args.optional("--chown", non_empty(request.chown.as_deref()))
            .optional("--rootfs", non_empty(request.rootfs.as_deref()));
        if let Some(additional_args) = request.additional_args.as_deref() {
            for arg in additional_args.split_whitespace() {
                args.push(arg);
            }
        }
        for value in request.requested_types() {
            args.pair("--type", value);
        }
        if publishes_ami {
            if let Some((ami_name, bucket_name)) = request.ami_target() {
                args.pair("--aws-bucket", bucket_name)
                    .pair("--aws-ami-name", ami_name)
                    .optional("--aws-region", request.aws_region());
            }
        }
        args.push(request.image.trim());
        args.finish()
    };

    InvocationPlan {
        runtime_args,
        builder_args,
        forwarded_env,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::AwsOptions;

    const STORAGE: &str = "/var/lib/containers/storage";

    fn request(config_file: &str) -> BuildRequest {
        let mut request = BuildRequest::new(config_file, "quay.io/example/os:latest");
        request.output_directory = "/work/output".into();
        request
    }

    fn plan(request: &BuildRequest) -> InvocationPlan {
        synthesize(request, &EnvSnapshot::default(), Path::new(STORAGE))
    }

    fn config_mounts(plan: &InvocationPlan) -> Vec<&str> {
        plan.runtime_args()
            .windows(2)
            .filter(|pair| pair[0] == "-v" && pair[1].contains(CONFIG_MOUNT_STEM))
            .map(|pair| pair[1].as_str())
            .collect()
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|pair| pair[0] == flag && pair[1] == value)
    }

    #[test]
    fn test_minimal_plan() {
        let plan = plan(&request("/work/config.toml"));
        assert_eq!(
            plan.runtime_args(),
            [
                "run",
                "--rm",
                "--privileged",
                "--security-opt",
                "label=type:unconfined_t",
                "-v",
                "/var/lib/containers/storage:/var/lib/containers/storage",
                "-v",
                "/work/output:/output",
                "-v",
                "/work/config.toml:/config.toml:ro",
                "quay.io/centos-bootc/bootc-image-builder:latest",
            ]
        );
        assert_eq!(
            plan.builder_args(),
            ["build", "--output", "/output", "quay.io/example/os:latest"]
        );
        assert!(plan.forwarded_env().is_empty());
    }

    #[test]
    fn test_config_mount_keeps_extension() {
        for (config_file, expected) in [
            ("/work/config.toml", "/work/config.toml:/config.toml:ro"),
            ("/work/config.json", "/work/config.json:/config.json:ro"),
            ("/work/my.build.json", "/work/my.build.json:/config.json:ro"),
            ("/work/config", "/work/config:/config:ro"),
            ("/work.d/config", "/work.d/config:/config:ro"),
            ("/work/.toml", "/work/.toml:/config.toml:ro"),
            ("/work/config.", "/work/config.:/config:ro"),
        ] {
            let plan = plan(&request(config_file));
            assert_eq!(config_mounts(&plan), [expected], "{config_file}");
        }
    }

    #[test]
    fn test_optional_builder_flags() {
        let mut request = request("/work/config.toml");
        request.tls_verify = false;
        request.chown = Some("1000:1000".to_owned());
        request.rootfs = Some("xfs".to_owned());
        request.additional_args = Some("  --log-level debug   --progress verbose ".to_owned());
        let plan = plan(&request);
        assert_eq!(
            plan.builder_args(),
            [
                "build",
                "--output",
                "/output",
                "--tls-verify=false",
                "--chown",
                "1000:1000",
                "--rootfs",
                "xfs",
                "--log-level",
                "debug",
                "--progress",
                "verbose",
                "quay.io/example/os:latest",
            ]
        );
    }

    #[test]
    fn test_empty_optional_values_contribute_nothing() {
        let mut request = request("/work/config.toml");
        request.platform = Some("".to_owned());
        request.chown = Some(" ".to_owned());
        request.rootfs = Some("".to_owned());
        request.additional_args = Some("   ".to_owned());
        request.types = vec!["".to_owned(), " ".to_owned()];
        let plan = plan(&request);
        assert_eq!(
            plan.builder_args(),
            ["build", "--output", "/output", "quay.io/example/os:latest"]
        );
        assert!(!plan.runtime_args().iter().any(|arg| arg == "--platform"));
        assert!(plan.args().all(|arg| !arg.is_empty()));
    }

    #[test]
    fn test_types_keep_order_and_duplicates() {
        let mut request = request("/work/config.toml");
        request.types = vec![
            "qcow2".to_owned(),
            " anaconda-iso".to_owned(),
            "qcow2".to_owned(),
        ];
        let plan = plan(&request);
        assert_eq!(
            plan.builder_args(),
            [
                "build",
                "--output",
                "/output",
                "--type",
                "qcow2",
                "--type",
                "anaconda-iso",
                "--type",
                "qcow2",
                "quay.io/example/os:latest",
            ]
        );
    }

    #[test]
    fn test_platform_is_added_to_run_and_pull() {
        let mut request = request("/work/config.toml");
        request.platform = Some("linux/arm64".to_owned());
        request.tls_verify = false;
        let plan = plan(&request);
        assert!(has_pair(plan.runtime_args(), "--platform", "linux/arm64"));
        assert_eq!(
            plan.runtime_args().last().map(String::as_str),
            Some("quay.io/centos-bootc/bootc-image-builder:latest")
        );
        assert_eq!(
            pull_args(&request, "quay.io/example/os:latest"),
            [
                "pull",
                "--tls-verify=false",
                "--platform",
                "linux/arm64",
                "quay.io/example/os:latest",
            ]
        );
    }

    #[test]
    fn test_ami_without_region() {
        let mut request = request("/work/config.toml");
        request.types = vec!["ami".to_owned()];
        request.aws = Some(AwsOptions {
            ami_name: Some("x".to_owned()),
            bucket_name: Some("y".to_owned()),
            region: None,
        });
        let plan = plan(&request);
        assert_eq!(
            plan.builder_args(),
            [
                "build",
                "--output",
                "/output",
                "--type",
                "ami",
                "--aws-bucket",
                "y",
                "--aws-ami-name",
                "x",
                "quay.io/example/os:latest",
            ]
        );
    }

    #[test]
    fn test_ami_with_region_and_forwarded_env() {
        let mut request = request("/work/config.toml");
        request.types = vec!["qcow2".to_owned(), "ami".to_owned()];
        request.aws = Some(AwsOptions {
            ami_name: Some("x".to_owned()),
            bucket_name: Some("y".to_owned()),
            region: Some("eu-west-1".to_owned()),
        });
        let env: EnvSnapshot = [
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("AWS_ACCESS_KEY_ID", "key"),
            ("PATH", "/usr/bin"),
        ]
        .into_iter()
        .collect();
        let plan = synthesize(&request, &env, Path::new(STORAGE));

        assert_eq!(
            plan.forwarded_env(),
            ["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"]
        );
        assert!(has_pair(plan.runtime_args(), "--env", "AWS_ACCESS_KEY_ID"));
        assert!(has_pair(
            plan.runtime_args(),
            "--env",
            "AWS_SECRET_ACCESS_KEY"
        ));
        assert!(!plan.args().any(|arg| arg.contains("secret")));
        assert_eq!(
            &plan.builder_args()[plan.builder_args().len() - 7..],
            [
                "--aws-bucket",
                "y",
                "--aws-ami-name",
                "x",
                "--aws-region",
                "eu-west-1",
                "quay.io/example/os:latest",
            ]
        );
    }

    #[test]
    fn test_env_is_not_forwarded_without_ami() {
        let mut request = request("/work/config.toml");
        request.types = vec!["qcow2".to_owned()];
        let env: EnvSnapshot = [("AWS_ACCESS_KEY_ID", "key")].into_iter().collect();
        let plan = synthesize(&request, &env, Path::new(STORAGE));
        assert!(plan.forwarded_env().is_empty());
        assert!(!plan.runtime_args().iter().any(|arg| arg == "--env"));
    }

    #[test]
    fn test_images_are_last() {
        let mut request = request("/work/config.toml");
        request.builder_image = "localhost/bib:dev".to_owned();
        request.types = vec!["raw".to_owned()];
        request.additional_args = Some("--verbose".to_owned());
        let plan = plan(&request);
        assert_eq!(
            plan.runtime_args().last().map(String::as_str),
            Some("localhost/bib:dev")
        );
        assert_eq!(
            plan.args().last(),
            Some("quay.io/example/os:latest")
        );
    }
}
