#![forbid(unsafe_code)]

mod config;
mod jobs;
mod status;

pub use config::*;
pub use jobs::*;
pub use status::*;
