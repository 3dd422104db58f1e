pub mod add;
pub mod archive;
pub mod common;
pub mod completions;
pub mod config;
pub mod delete;
pub mod edit;
pub mod export;
pub mod list;
pub mod queue;
pub mod show;
pub mod stats;
pub mod sync;
