//! Maps game controller input onto mouse and keyboard output.

pub mod config;
pub mod controller;
pub mod engine;
pub mod mapping;
