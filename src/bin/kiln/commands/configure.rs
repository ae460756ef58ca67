//! `kiln configure` command

use anyhow::{Context, Result};

use crate::cli::ConfigureArgs;
use kiln::ops::{configure, ConfigureOptions};

pub fn execute(args: ConfigureArgs) -> Result<()> {
    let kiln_exe = std::env::current_exe().context("failed to locate the kiln executable")?;
    let opts = ConfigureOptions {
        src_dir: args.srcdir,
        build_dir: args.builddir,
        backend: args.backend,
        kiln_exe,
    };

    let report = configure(&opts).context("failed to configure build directory")?;
    super::print_report(&report);
    Ok(())
}
