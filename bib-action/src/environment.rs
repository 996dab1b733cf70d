/// Prefix of the variables forwarded to the builder when publishing to AWS.
pub const AWS_PREFIX: &str = "AWS_";

/// AWS variables that carry configuration rather than credentials.
pub const NON_SECRET_AWS_VARIABLES: &[&str] = &[
    "AWS_REGION",
    "AWS_DEFAULT_REGION",
    "AWS_PROFILE",
    "AWS_EXECUTION_ENV",
    "AWS_ROLE_SESSION_NAME",
    "AWS_DEFAULT_OUTPUT",
];

/// An immutable capture of the `AWS_*` process environment, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    variables: Vec<(String, String)>,
}

impl EnvSnapshot {
    /// Reads the process environment. Variables whose name or value is not valid unicode are
    /// skipped, they could not be forwarded by name anyway.
    pub fn capture() -> Self {
        Self::from_iter(std::env::vars_os().filter_map(|(name, value)| {
            Some((name.into_string().ok()?, value.into_string().ok()?))
        }))
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, &str)> {
        self.variables
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|(name, _)| name.as_str())
    }

    /// Values that must be masked before anything derived from this snapshot is logged.
    pub fn secrets(&self) -> impl Iterator<Item = &str> {
        self.variables()
            .filter(|(name, value)| is_secret(name) && !value.is_empty())
            .map(|(_, value)| value)
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for EnvSnapshot {
    /// Keeps only `AWS_*` variables. Later duplicates of a name are ignored.
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut variables: Vec<(String, String)> = iter
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .filter(|(name, _)| name.starts_with(AWS_PREFIX))
            .collect();
        variables.sort_by(|a, b| a.0.cmp(&b.0));
        variables.dedup_by(|later, earlier| later.0 == earlier.0);
        Self { variables }
    }
}

pub fn is_secret(name: &str) -> bool {
    !NON_SECRET_AWS_VARIABLES.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_aws_variables_are_kept_in_order() {
        let snapshot: EnvSnapshot = [
            ("HOME", "/root"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("AWS_ACCESS_KEY_ID", "key"),
            ("NOT_AWS_REGION", "eu-west-1"),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            snapshot.names().collect::<Vec<_>>(),
            ["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"]
        );
    }

    #[test]
    fn test_secrets_exclude_configuration() {
        let snapshot: EnvSnapshot = [
            ("AWS_REGION", "eu-west-1"),
            ("AWS_PROFILE", "ci"),
            ("AWS_SESSION_TOKEN", "token"),
            ("AWS_SECRET_ACCESS_KEY", ""),
        ]
        .into_iter()
        .collect();
        assert_eq!(snapshot.secrets().collect::<Vec<_>>(), ["token"]);
    }

    #[test]
    fn test_prefix_is_case_sensitive() {
        let snapshot: EnvSnapshot = [("aws_region", "eu-west-1")].into_iter().collect();
        assert!(snapshot.is_empty());
    }
}
