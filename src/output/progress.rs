use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{bright_green, bright_yellow};

/// Spinner covering one fetch-or-act phase of a command.
pub struct PhaseProgress {
    pb: ProgressBar,
}

impl PhaseProgress {
    pub fn start(message: &str) -> Self {
        Self {
            pb: create_spinner(bright_yellow(message).to_string()),
        }
    }

    pub fn finish(self, done: &str) {
        self.pb
            .finish_with_message(bright_green(format!("{done} ✓")).to_string());
        eprintln!();
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {msg} {spinner}")
            .unwrap(),
    );
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
