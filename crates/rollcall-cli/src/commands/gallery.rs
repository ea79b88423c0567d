use std::any::Any;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use rollcall_config::ResolvedConfigWithSource;
use rollcall_face_core::engine::EngineSettings;
use rollcall_face_core::faces::GallerySettings;

use crate::cli::{GalleryCommands, OutputMode};
use crate::commands::CommandHandler;
use crate::config;
use crate::errors::AppResult;
use crate::gallery::{
    self, DeactivationConfig, DeactivationOutcome, GalleryEnrollmentConfig,
    GalleryEnrollmentOutcome, GalleryListing,
};
use crate::output::{render_gallery_deactivate, render_gallery_enroll, render_gallery_list};

pub struct GalleryHandler {
    command: GalleryCommands,
    deps: GalleryHandlerDeps,
}

type Renderer<T> = Box<dyn Fn(&T, OutputMode) -> AppResult<()> + Send + Sync>;

pub struct GalleryHandlerDeps {
    pub load_settings: Box<dyn Fn() -> AppResult<ResolvedConfigWithSource> + Send + Sync>,
    pub enroll: Box<
        dyn Fn(&GalleryEnrollmentConfig, GallerySettings) -> AppResult<GalleryEnrollmentOutcome>
            + Send
            + Sync,
    >,
    pub list: Box<dyn Fn(&Path, GallerySettings) -> AppResult<GalleryListing> + Send + Sync>,
    pub deactivate: Box<
        dyn Fn(&DeactivationConfig, GallerySettings) -> AppResult<DeactivationOutcome> + Send + Sync,
    >,
    pub render_enroll: Renderer<GalleryEnrollmentOutcome>,
    pub render_list: Renderer<GalleryListing>,
    pub render_deactivate: Renderer<DeactivationOutcome>,
}

impl GalleryHandlerDeps {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        load_settings: impl Fn() -> AppResult<ResolvedConfigWithSource> + Send + Sync + 'static,
        enroll: impl Fn(&GalleryEnrollmentConfig, GallerySettings) -> AppResult<GalleryEnrollmentOutcome>
            + Send
            + Sync
            + 'static,
        list: impl Fn(&Path, GallerySettings) -> AppResult<GalleryListing> + Send + Sync + 'static,
        deactivate: impl Fn(&DeactivationConfig, GallerySettings) -> AppResult<DeactivationOutcome>
            + Send
            + Sync
            + 'static,
        render_enroll: impl Fn(&GalleryEnrollmentOutcome, OutputMode) -> AppResult<()>
            + Send
            + Sync
            + 'static,
        render_list: impl Fn(&GalleryListing, OutputMode) -> AppResult<()> + Send + Sync + 'static,
        render_deactivate: impl Fn(&DeactivationOutcome, OutputMode) -> AppResult<()>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            load_settings: Box::new(load_settings),
            enroll: Box::new(enroll),
            list: Box::new(list),
            deactivate: Box::new(deactivate),
            render_enroll: Box::new(render_enroll),
            render_list: Box::new(render_list),
            render_deactivate: Box::new(render_deactivate),
        }
    }
}

impl Default for GalleryHandlerDeps {
    fn default() -> Self {
        Self::new(
            config::load_settings,
            gallery::run_gallery_enrollment,
            gallery::run_gallery_list,
            gallery::run_deactivation,
            render_gallery_enroll,
            render_gallery_list,
            render_gallery_deactivate,
        )
    }
}

impl GalleryHandler {
    pub fn new(command: GalleryCommands) -> Self {
        Self {
            command,
            deps: GalleryHandlerDeps::default(),
        }
    }

    pub fn with_dependencies(command: GalleryCommands, deps: GalleryHandlerDeps) -> Self {
        Self { command, deps }
    }
}

impl CommandHandler for GalleryHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let loaded = (self.deps.load_settings)()?;
        let settings = EngineSettings::from(&loaded.resolved).gallery;
        let gallery_path =
            |flag: &Option<PathBuf>| config::resolve_gallery_path(flag.clone(), &loaded.resolved);

        match &self.command {
            GalleryCommands::Enroll(args) => {
                let config = GalleryEnrollmentConfig {
                    identity: args.identity,
                    label: args.label.clone(),
                    embedding: args.embedding.clone(),
                    gallery: gallery_path(&args.gallery),
                };
                let outcome = (self.deps.enroll)(&config, settings)?;
                (self.deps.render_enroll)(&outcome, mode)?;
            }
            GalleryCommands::List(args) => {
                let listing = (self.deps.list)(&gallery_path(&args.gallery), settings)?;
                (self.deps.render_list)(&listing, mode)?;
            }
            GalleryCommands::Deactivate(args) => {
                let config = DeactivationConfig {
                    identity: args.identity,
                    gallery: gallery_path(&args.gallery),
                };
                let outcome = (self.deps.deactivate)(&config, settings)?;
                (self.deps.render_deactivate)(&outcome, mode)?;
            }
        }
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
