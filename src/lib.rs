pub mod alert;
pub mod analysis;
pub mod config;
pub mod dedup;
pub mod diff;
pub mod discovery;
pub mod document;
pub mod fetch;
pub mod monitor;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod profile;
pub mod snapshot;
