use std::any::Any;
use std::process::ExitCode;

use rollcall_config::ResolvedConfigWithSource;
use rollcall_face_core::engine::EngineSettings;

use crate::cli::{DecideArgs, LivenessArgs, MatchArgs, OutputMode};
use crate::commands::CommandHandler;
use crate::config;
use crate::errors::AppResult;
use crate::output::{render_decide, render_liveness, render_match};
use crate::recognize::{
    self, DecideConfig, DecideOutcome, LivenessConfig, LivenessOutcome, MatchConfig, MatchOutcome,
};

/// Exit status for a completed run whose verdict is negative: no match, not
/// live, or a rejected decision.
pub const REJECTED_EXIT_CODE: u8 = 10;

enum Request {
    Match(MatchArgs),
    Liveness(LivenessArgs),
    Decide(DecideArgs),
}

pub struct RecognizeHandler {
    request: Request,
    deps: RecognizeHandlerDeps,
}

pub struct RecognizeHandlerDeps {
    pub load_settings: Box<dyn Fn() -> AppResult<ResolvedConfigWithSource> + Send + Sync>,
    pub run_match: Box<dyn Fn(&MatchConfig) -> AppResult<MatchOutcome> + Send + Sync>,
    pub run_liveness: Box<dyn Fn(&LivenessConfig) -> AppResult<LivenessOutcome> + Send + Sync>,
    pub run_decide: Box<dyn Fn(&DecideConfig) -> AppResult<DecideOutcome> + Send + Sync>,
    pub render_match: Box<dyn Fn(&MatchOutcome, OutputMode) -> AppResult<()> + Send + Sync>,
    pub render_liveness: Box<dyn Fn(&LivenessOutcome, OutputMode) -> AppResult<()> + Send + Sync>,
    pub render_decide: Box<dyn Fn(&DecideOutcome, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl RecognizeHandlerDeps {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        load_settings: impl Fn() -> AppResult<ResolvedConfigWithSource> + Send + Sync + 'static,
        run_match: impl Fn(&MatchConfig) -> AppResult<MatchOutcome> + Send + Sync + 'static,
        run_liveness: impl Fn(&LivenessConfig) -> AppResult<LivenessOutcome> + Send + Sync + 'static,
        run_decide: impl Fn(&DecideConfig) -> AppResult<DecideOutcome> + Send + Sync + 'static,
        render_match: impl Fn(&MatchOutcome, OutputMode) -> AppResult<()> + Send + Sync + 'static,
        render_liveness: impl Fn(&LivenessOutcome, OutputMode) -> AppResult<()>
            + Send
            + Sync
            + 'static,
        render_decide: impl Fn(&DecideOutcome, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            load_settings: Box::new(load_settings),
            run_match: Box::new(run_match),
            run_liveness: Box::new(run_liveness),
            run_decide: Box::new(run_decide),
            render_match: Box::new(render_match),
            render_liveness: Box::new(render_liveness),
            render_decide: Box::new(render_decide),
        }
    }
}

impl Default for RecognizeHandlerDeps {
    fn default() -> Self {
        Self::new(
            config::load_settings,
            recognize::run_match,
            recognize::run_liveness,
            recognize::run_decide,
            render_match,
            render_liveness,
            render_decide,
        )
    }
}

impl RecognizeHandler {
    pub fn matching(args: MatchArgs) -> Self {
        Self::with_dependencies_for(Request::Match(args), RecognizeHandlerDeps::default())
    }

    pub fn liveness(args: LivenessArgs) -> Self {
        Self::with_dependencies_for(Request::Liveness(args), RecognizeHandlerDeps::default())
    }

    pub fn decide(args: DecideArgs) -> Self {
        Self::with_dependencies_for(Request::Decide(args), RecognizeHandlerDeps::default())
    }

    pub fn matching_with(args: MatchArgs, deps: RecognizeHandlerDeps) -> Self {
        Self::with_dependencies_for(Request::Match(args), deps)
    }

    pub fn liveness_with(args: LivenessArgs, deps: RecognizeHandlerDeps) -> Self {
        Self::with_dependencies_for(Request::Liveness(args), deps)
    }

    pub fn decide_with(args: DecideArgs, deps: RecognizeHandlerDeps) -> Self {
        Self::with_dependencies_for(Request::Decide(args), deps)
    }

    fn with_dependencies_for(request: Request, deps: RecognizeHandlerDeps) -> Self {
        Self { request, deps }
    }
}

fn verdict_code(accepted: bool) -> ExitCode {
    if accepted {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(REJECTED_EXIT_CODE)
    }
}

impl CommandHandler for RecognizeHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let loaded = (self.deps.load_settings)()?;
        let settings = EngineSettings::from(&loaded.resolved);

        match &self.request {
            Request::Match(args) => {
                let config = MatchConfig {
                    embedding: args.embedding.clone(),
                    gallery: config::resolve_gallery_path(args.gallery.clone(), &loaded.resolved),
                    settings: settings.gallery,
                };
                let outcome = (self.deps.run_match)(&config)?;
                (self.deps.render_match)(&outcome, mode)?;
                Ok(verdict_code(outcome.result.is_match()))
            }
            Request::Liveness(args) => {
                let config = LivenessConfig {
                    frames: args.frames.clone(),
                    settings: settings.liveness,
                };
                let outcome = (self.deps.run_liveness)(&config)?;
                (self.deps.render_liveness)(&outcome, mode)?;
                Ok(verdict_code(outcome.verdict.is_live))
            }
            Request::Decide(args) => {
                let config = DecideConfig {
                    embedding: args.embedding.clone(),
                    frames: args.frames.clone(),
                    mask: args.mask.map(Into::into),
                    gallery: config::resolve_gallery_path(args.gallery.clone(), &loaded.resolved),
                    settings,
                };
                let outcome = (self.deps.run_decide)(&config)?;
                (self.deps.render_decide)(&outcome, mode)?;
                Ok(verdict_code(outcome.outcome.is_present()))
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
