//! Cache operations module

mod add;
mod get;
pub mod misc;
mod remove;

// Operations are implemented directly on the Cache type
