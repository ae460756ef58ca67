//! `kiln check` command

use anyhow::Result;

use crate::cli::CheckArgs;
use kiln::ops::check;
use kiln::util::diagnostic::suggestions;
use kiln::RegenState;

/// Returns the process exit code: 0 when current, 1 when stale.
pub fn execute(args: CheckArgs) -> Result<i32> {
    match check(&args.builddir)? {
        RegenState::Current => {
            println!("Build files are up to date");
            Ok(0)
        }
        RegenState::Stale(reasons) => {
            println!("Build files are out of date:");
            for reason in &reasons {
                println!("  - {}", reason);
            }
            println!();
            println!("hint: {}", suggestions::STALE);
            Ok(1)
        }
    }
}
