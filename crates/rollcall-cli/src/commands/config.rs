use std::any::Any;
use std::process::ExitCode;

use rollcall_config::ResolvedConfigWithSource;

use crate::cli::{ConfigCommands, OutputMode};
use crate::commands::CommandHandler;
use crate::config::{self, ConfigReport};
use crate::errors::AppResult;
use crate::output::render_config;

pub struct ConfigHandler {
    command: ConfigCommands,
    deps: ConfigHandlerDeps,
}

pub struct ConfigHandlerDeps {
    pub load_settings: Box<dyn Fn() -> AppResult<ResolvedConfigWithSource> + Send + Sync>,
    pub render: Box<dyn Fn(&ConfigReport, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl ConfigHandlerDeps {
    pub fn new(
        load_settings: impl Fn() -> AppResult<ResolvedConfigWithSource> + Send + Sync + 'static,
        render: impl Fn(&ConfigReport, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            load_settings: Box::new(load_settings),
            render: Box::new(render),
        }
    }
}

impl Default for ConfigHandlerDeps {
    fn default() -> Self {
        Self::new(config::load_settings, render_config)
    }
}

impl ConfigHandler {
    pub fn new(command: ConfigCommands) -> Self {
        Self {
            command,
            deps: ConfigHandlerDeps::default(),
        }
    }

    pub fn with_dependencies(command: ConfigCommands, deps: ConfigHandlerDeps) -> Self {
        Self { command, deps }
    }
}

impl CommandHandler for ConfigHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        match self.command {
            ConfigCommands::Show => {
                let loaded = (self.deps.load_settings)()?;
                (self.deps.render)(&ConfigReport::from(&loaded), mode)?;
            }
        }
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
