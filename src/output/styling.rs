use console::{style, StyledObject};

fn base(text: impl std::fmt::Display) -> StyledObject<String> {
    style(text.to_string())
}

/// Styling helpers for terminal output
pub fn bright(text: impl std::fmt::Display) -> StyledObject<String> {
    base(text).bright()
}

pub fn dim(text: impl std::fmt::Display) -> StyledObject<String> {
    base(text).dim()
}

pub fn cyan(text: impl std::fmt::Display) -> StyledObject<String> {
    base(text).cyan()
}

pub fn magenta_bold(text: impl std::fmt::Display) -> StyledObject<String> {
    base(text).magenta().bold()
}

pub fn bright_green(text: impl std::fmt::Display) -> StyledObject<String> {
    base(text).bright().green()
}

pub fn bright_yellow(text: impl std::fmt::Display) -> StyledObject<String> {
    base(text).bright().yellow()
}

pub fn bright_red(text: impl std::fmt::Display) -> StyledObject<String> {
    base(text).bright().red()
}
