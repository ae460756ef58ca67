//! `kiln refresh` command

use anyhow::{Context, Result};

use crate::cli::RefreshArgs;
use kiln::ops::refresh;

pub fn execute(args: RefreshArgs) -> Result<()> {
    let report = refresh(&args.builddir).context("failed to regenerate build files")?;
    super::print_report(&report);
    Ok(())
}
