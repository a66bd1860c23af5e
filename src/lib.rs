pub mod buffer;
pub mod config;
pub mod error;
pub mod events;
pub mod sources;
pub mod timing;
pub mod tasks {
    pub mod files;
    pub mod loader;
    pub mod player;
}

pub use sources::SourceCollection;
pub use tasks::loader::{FsImageSource, ImageSource};
pub use tasks::player::{Frame, PlaybackObserver, Player, PlayerSettings, PlayerStats};
