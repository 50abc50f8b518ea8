mod client;
mod types;

pub use client::{search_filter, TrackerClient};
pub use types::Issue;
