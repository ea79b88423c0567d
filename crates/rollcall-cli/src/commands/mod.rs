use std::any::Any;
use std::process::ExitCode;

use crate::cli::{Commands, OutputMode};
use crate::errors::AppResult;

pub trait CommandHandler: Send + Sync {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode>;
    fn as_any(&self) -> &dyn Any;
}

mod config;
mod gallery;
mod recognize;

pub use config::{ConfigHandler, ConfigHandlerDeps};
pub use gallery::{GalleryHandler, GalleryHandlerDeps};
pub use recognize::{RecognizeHandler, RecognizeHandlerDeps, REJECTED_EXIT_CODE};

impl From<Commands> for Box<dyn CommandHandler> {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Gallery(cmd) => Box::new(GalleryHandler::new(cmd)),
            Commands::Match(args) => Box::new(RecognizeHandler::matching(args)),
            Commands::Liveness(args) => Box::new(RecognizeHandler::liveness(args)),
            Commands::Decide(args) => Box::new(RecognizeHandler::decide(args)),
            Commands::Config(cmd) => Box::new(ConfigHandler::new(cmd)),
        }
    }
}
