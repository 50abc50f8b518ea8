mod cache;
mod client;
mod types;

pub use cache::SettingsCache;
pub use client::CloudClient;
pub use types::{
    Environment, EnvironmentQuery, EnvironmentSettings, Instance, LifecycleState, ReservedAddress,
};
