use std::path::PathBuf;

use rollcall_cli::cli::{
    Commands, ConfigCommands, DecideArgs, GalleryCommands, GalleryListArgs, LivenessArgs,
    MatchArgs,
};
use rollcall_cli::commands::{CommandHandler, ConfigHandler, GalleryHandler, RecognizeHandler};

fn assert_dispatch<T: 'static>(command: Commands)
where
    T: CommandHandler,
{
    let handler: Box<dyn CommandHandler> = command.into();
    assert!(handler.as_any().is::<T>());
}

#[test]
fn gallery_command_dispatches_gallery_handler() {
    assert_dispatch::<GalleryHandler>(Commands::Gallery(GalleryCommands::List(GalleryListArgs {
        gallery: None,
    })));
}

#[test]
fn match_command_dispatches_recognize_handler() {
    assert_dispatch::<RecognizeHandler>(Commands::Match(MatchArgs {
        embedding: PathBuf::from("probe.json"),
        gallery: None,
    }));
}

#[test]
fn liveness_command_dispatches_recognize_handler() {
    assert_dispatch::<RecognizeHandler>(Commands::Liveness(LivenessArgs {
        frames: PathBuf::from("frames.json"),
    }));
}

#[test]
fn decide_command_dispatches_recognize_handler() {
    assert_dispatch::<RecognizeHandler>(Commands::Decide(DecideArgs {
        embedding: PathBuf::from("probe.json"),
        frames: PathBuf::from("frames.json"),
        mask: None,
        gallery: None,
    }));
}

#[test]
fn config_command_dispatches_config_handler() {
    assert_dispatch::<ConfigHandler>(Commands::Config(ConfigCommands::Show));
}
