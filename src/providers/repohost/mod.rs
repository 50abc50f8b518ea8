mod client;
mod types;

pub use client::RepoHostClient;
pub use types::{MergeRequest, MergeState, Pipeline};
