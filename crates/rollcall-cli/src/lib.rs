pub mod cli;
pub mod commands;
pub mod config;
pub mod errors;
pub mod gallery;
pub mod output;
pub mod recognize;
