pub mod config;
pub mod types;

pub use config::Config;
pub use types::{
    InsertOutcome, JobState, Platform, Post, Profile, QueuedHandle, SearchTerm,
};
