mod progress;
mod styling;
mod summary;
mod tables;

pub use progress::PhaseProgress;
pub use styling::{dim, magenta_bold};
pub use summary::{print_batch_summary, print_reconcile_summary, print_settings};

/// Prints the opsweep banner to stderr.
///
/// Displays the tool name, version, and description at the start of execution.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        magenta_bold("🧹 opsweep"),
        dim(env!("CARGO_PKG_VERSION")),
        dim("Environment & issue-tracker housekeeping")
    );
}
