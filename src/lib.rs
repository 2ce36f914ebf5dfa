#![forbid(unsafe_code)]

pub mod archive;
pub mod cache;
pub mod cli;
pub mod convert;
pub mod embeds;
pub mod error;
pub mod fetch;
pub mod formats;
pub mod icons;
pub mod logging;
pub mod markup;
pub mod media;
pub mod normalize;
pub mod options;
pub mod package;
pub mod pages;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod readability;
pub mod resources;
pub mod story;
