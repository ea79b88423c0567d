use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use rollcall_face_core::mask::MaskStatus;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(
    name = "rollcall",
    about = "Face recognition and liveness decisions for attendance capture",
    version
)]
pub struct Cli {
    /// Emit structured JSON to stdout instead of human-readable logs
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase verbosity (may be used multiple times)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage the gallery of enrolled identities
    #[command(subcommand)]
    Gallery(GalleryCommands),
    /// Match an embedding payload against the gallery
    Match(MatchArgs),
    /// Evaluate liveness over a recorded frame sequence
    Liveness(LivenessArgs),
    /// Fuse match, liveness and mask verdicts into an attendance decision
    Decide(DecideArgs),
    /// Inspect the effective configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Debug, Subcommand)]
pub enum GalleryCommands {
    /// Enroll the faces of an embedding payload under one identity
    Enroll(GalleryEnrollArgs),
    /// List enrolled identities
    List(GalleryListArgs),
    /// Exclude an identity from matching without deleting its embeddings
    Deactivate(GalleryDeactivateArgs),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the resolved configuration and the file it came from
    Show,
}

#[derive(Debug, Clone, Args)]
pub struct GalleryEnrollArgs {
    /// Existing identity to append to (a new identity is created when omitted)
    #[arg(long)]
    pub identity: Option<Uuid>,

    /// Display label for the identity
    #[arg(long)]
    pub label: String,

    /// Embedding payload JSON produced by the external extractor
    #[arg(long)]
    pub embedding: PathBuf,

    /// Gallery file (defaults to $ROLLCALL_GALLERY_PATH or the configured path)
    #[arg(long)]
    pub gallery: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct GalleryListArgs {
    /// Gallery file (defaults to $ROLLCALL_GALLERY_PATH or the configured path)
    #[arg(long)]
    pub gallery: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct GalleryDeactivateArgs {
    /// Identity to deactivate
    #[arg(long)]
    pub identity: Uuid,

    /// Gallery file (defaults to $ROLLCALL_GALLERY_PATH or the configured path)
    #[arg(long)]
    pub gallery: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct MatchArgs {
    /// Embedding payload JSON; the first face is used as the probe
    #[arg(long)]
    pub embedding: PathBuf,

    /// Gallery file (defaults to $ROLLCALL_GALLERY_PATH or the configured path)
    #[arg(long)]
    pub gallery: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct LivenessArgs {
    /// Frame sequence JSON (`{"frames": [...]}`)
    #[arg(long)]
    pub frames: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct DecideArgs {
    /// Embedding payload JSON; the first face is used as the probe
    #[arg(long)]
    pub embedding: PathBuf,

    /// Frame sequence JSON (`{"frames": [...]}`)
    #[arg(long)]
    pub frames: PathBuf,

    /// Mask verdict from an external classifier
    #[arg(long, value_enum)]
    pub mask: Option<MaskArg>,

    /// Gallery file (defaults to $ROLLCALL_GALLERY_PATH or the configured path)
    #[arg(long)]
    pub gallery: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MaskArg {
    With,
    Without,
    Unknown,
}

impl From<MaskArg> for MaskStatus {
    fn from(arg: MaskArg) -> Self {
        match arg {
            MaskArg::With => MaskStatus::WithMask,
            MaskArg::Without => MaskStatus::WithoutMask,
            MaskArg::Unknown => MaskStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl From<bool> for OutputMode {
    fn from(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from(self.json)
    }
}
