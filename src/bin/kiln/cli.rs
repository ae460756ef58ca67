//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use kiln::BackendId;

/// kiln - a meta-build system generating Make, Ninja and MSBuild files
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configure a build directory and generate its build file
    Configure(ConfigureArgs),

    /// Regenerate the build file of a configured build directory
    Refresh(RefreshArgs),

    /// Report whether the build file is out of date (exit code 1 if so)
    Check(CheckArgs),

    /// List the available backends
    Backends(BackendsArgs),
}

#[derive(Args)]
pub struct ConfigureArgs {
    /// Directory containing kiln.toml
    pub srcdir: PathBuf,

    /// Directory to generate the build file into
    pub builddir: PathBuf,

    /// Backend to generate for (make, ninja, msbuild)
    #[arg(short, long, env = "KILN_BACKEND")]
    pub backend: Option<BackendId>,
}

#[derive(Args)]
pub struct RefreshArgs {
    /// Configured build directory
    #[arg(default_value = ".")]
    pub builddir: PathBuf,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Configured build directory
    #[arg(default_value = ".")]
    pub builddir: PathBuf,
}

#[derive(Args)]
pub struct BackendsArgs {
    /// Show the capabilities of one backend
    pub backend: Option<BackendId>,
}
