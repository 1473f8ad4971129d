#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod config;
pub mod engine;
mod error;
#[cfg(feature = "live")]
pub mod live;
pub mod pipeline;
pub mod post;
pub mod tool;
pub mod utils;

pub use crate::config::{CONFIG_FILE, Config, Project};
pub use crate::engine::{
    Action, CancellationToken, Diagnostics, Mode, Registry, Runner, TaskContext, TaskHandle,
    TaskRef,
};
pub use crate::error::*;
