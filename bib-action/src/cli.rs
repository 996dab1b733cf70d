mod build;

use clap::{Parser, Subcommand};

use crate::BoxResult;

#[derive(Debug, Parser)]
#[command(version = crate::version::VERSION, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build disk images from a bootable container image with bootc-image-builder
    #[command(arg_required_else_help = true)]
    Build(build::BuildArgs),
}

impl Cli {
    pub fn run(self) -> BoxResult<()> {
        match self.command {
            Commands::Build(args) => {
                build::build(args)?;
            }
        }

        Ok(())
    }
}
