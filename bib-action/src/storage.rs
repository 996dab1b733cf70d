use std::{
    fs, io,
    path::{Path, PathBuf},
};

use constcat::concat;
use log::{debug, info};

use crate::{
    error::{Error, Result},
    process::{self, Elevation},
};

pub const CONTAINER_STORAGE: &str = "/var/lib/containers/storage";
pub const CONTAINER_RUN_ROOT: &str = "/run/containers/storage";
pub const CONTAINERS_CONFIG_DIR: &str = "/etc/containers";
pub const STORAGE_CONF: &str = concat!(CONTAINERS_CONFIG_DIR, "/storage.conf");

/// Where the container runtime keeps its storage and reads its storage configuration from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    pub storage_dir: PathBuf,
    pub run_root: PathBuf,
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(CONTAINER_STORAGE),
            run_root: PathBuf::from(CONTAINER_RUN_ROOT),
            config_dir: PathBuf::from(CONTAINERS_CONFIG_DIR),
            config_file: PathBuf::from(STORAGE_CONF),
        }
    }
}

impl StorageLayout {
    /// A layout rooted at `root`, mirroring the host paths below it.
    pub fn under(root: &Path) -> Self {
        let rooted = |path: &str| root.join(path.trim_start_matches('/'));
        Self {
            storage_dir: rooted(CONTAINER_STORAGE),
            run_root: rooted(CONTAINER_RUN_ROOT),
            config_dir: rooted(CONTAINERS_CONFIG_DIR),
            config_file: rooted(STORAGE_CONF),
        }
    }

    /// Overlay storage with the run root and graph root of this layout.
    pub fn storage_conf(&self) -> String {
        format!(
            "[storage]\n\
             driver = \"overlay\"\n\
             runroot = {run_root:?}\n\
             graphroot = {graph_root:?}\n",
            run_root = self.run_root.display().to_string(),
            graph_root = self.storage_dir.display().to_string(),
        )
    }
}

/// Resets the container storage on the host.
///
/// GitHub hosted runners ship with a storage configuration and leftover storage that make the
/// builder fail inside its sandbox. Starting from an empty overlay storage avoids that. Running it
/// again yields the same state.
pub struct StoragePreparer {
    pub layout: StorageLayout,
    pub elevation: Elevation,
}

impl StoragePreparer {
    pub fn new(layout: StorageLayout, elevation: Elevation) -> Self {
        Self { layout, elevation }
    }

    fn command(&self, program: &str) -> process::Command {
        self.elevation.command(program, &[])
    }

    pub fn prepare(&self) -> Result<()> {
        let StorageLayout {
            storage_dir,
            config_dir,
            config_file,
            ..
        } = &self.layout;

        info!("Resetting container storage at {storage_dir:?}");
        // `rm --force` treats a missing directory as success.
        process::args!(self.command("rm"), "-rf", "--", storage_dir)
            .output()
            .map_err(|error| {
                Error::environment_setup(
                    format!("failed to remove container storage {storage_dir:?}"),
                    error,
                )
            })?;

        process::args!(self.command("mkdir"), "-p", "--", config_dir)
            .output()
            .map_err(|error| {
                Error::environment_setup(
                    format!("failed to create container configuration directory {config_dir:?}"),
                    error,
                )
            })?;

        let storage_conf = self.layout.storage_conf();
        debug!("Writing {config_file:?}:\n{storage_conf}");
        process::args!(self.command("tee"), "--", config_file)
            .output_with_input(storage_conf.into_bytes())
            .map_err(|error| {
                Error::environment_setup(
                    format!("failed to write container storage configuration {config_file:?}"),
                    error,
                )
            })?;

        Ok(())
    }

    /// Removes everything below `directory` but keeps the directory itself, so the builder starts
    /// from an empty output directory. Artifacts of an earlier build are usually owned by root.
    pub fn clear_directory(&self, directory: &Path) -> Result<()> {
        let entries = fs::read_dir(directory)
            .and_then(|entries| {
                entries
                    .map(|entry| entry.map(|entry| entry.path()))
                    .collect::<io::Result<Vec<PathBuf>>>()
            })
            .map_err(|error| {
                Error::environment_setup_io(
                    format!("failed to list output directory {directory:?}"),
                    error,
                )
            })?;
        if entries.is_empty() {
            return Ok(());
        }

        info!(
            "Removing {count} stale entries from {directory:?}",
            count = entries.len()
        );
        self.command("rm")
            .args(["-rf", "--"])
            .args(&entries)
            .output()
            .map_err(|error| {
                Error::environment_setup(
                    format!("failed to clear output directory {directory:?}"),
                    error,
                )
            })?;

        Ok(())
    }
}
