pub mod bench;
pub mod cli;
pub mod config;
