//! Command implementations

pub mod backends;
pub mod check;
pub mod configure;
pub mod refresh;

use kiln::ops::GenerateReport;
use kiln::util::diagnostic::{self, Diagnostic};
use kiln::util::fs::relative_path;

/// One-line summary printed after a successful generation.
fn print_report(report: &GenerateReport) {
    let cwd = std::env::current_dir().unwrap_or_default();
    for path in &report.artifacts {
        println!(
            "Generated {} ({} backend, {} targets)",
            relative_path(&cwd, path).display(),
            report.backend,
            report.targets
        );
    }
    if !report.divergences.is_empty() {
        let warning = Diagnostic::warning(format!(
            "{} discovery result(s) changed since the last run",
            report.divergences.len()
        ));
        diagnostic::emit(&warning, false);
    }
}
