//! `kiln backends` command
//!
//! List the backends, or show what one of them can express.

use anyhow::Result;

use crate::cli::BackendsArgs;
use kiln::backend::{get_backend_summaries, BackendId, BackendRegistry};

pub fn execute(args: BackendsArgs) -> Result<()> {
    match args.backend {
        Some(id) => show_backend(id),
        None => list_backends(),
    }
}

fn list_backends() -> Result<()> {
    let registry = BackendRegistry::new();

    println!("Backends:");
    println!();

    for summary in get_backend_summaries(&registry) {
        let status = match &summary.tool_path {
            Some(path) => format!("found ({})", path.display()),
            None => format!("`{}` not found on PATH", summary.id.tool()),
        };

        println!("  {} - {}", summary.id, summary.description);
        println!("    Writes:  {}", summary.output_file);
        println!("    Tool:    {}", status);
        println!();
    }

    Ok(())
}

fn show_backend(id: BackendId) -> Result<()> {
    let registry = BackendRegistry::new();
    let emitter = registry
        .get(id)
        .ok_or_else(|| anyhow::anyhow!("backend '{}' not found in registry", id))?;
    let caps = emitter.capabilities();
    let yes_no = |b: bool| if b { "yes" } else { "no" };

    println!("Backend: {}", id);
    println!("  Output file:          {}", id.output_file());
    println!("  Order-only edges:     {}", yes_no(caps.order_only));
    println!("  Multiple outputs:     {}", yes_no(caps.multiple_outputs));
    println!("  Implicit outputs:     {}", yes_no(caps.implicit_outputs));
    println!("  Depfiles:             {}", yes_no(caps.depfiles));
    println!("  Phony names with `.`: {}", yes_no(caps.dot_phony));
    println!("  Multi-line commands:  {}", yes_no(caps.multiline_commands));
    println!("  Creates directories:  {}", yes_no(caps.creates_directories));

    Ok(())
}
