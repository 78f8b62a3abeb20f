#![warn(clippy::all)]
#![allow(clippy::new_without_default)]

pub mod client;
pub mod config;
pub mod error;
pub mod server;
pub mod sql;
pub mod storage;
