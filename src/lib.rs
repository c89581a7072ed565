//! finsight library: persistent task queue, insight storage, LLM analysis
//! and the JSON API on top of them.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod migrations;
pub mod models;
pub mod queue;
pub mod repository;
pub mod schema;
pub mod server;
pub mod services;
