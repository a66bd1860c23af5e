use std::path::PathBuf;
use std::sync::Arc;

/// A fully loaded image, ready to be shown.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// RGBA8 pixels; empty for sources that only report dimensions.
    pub pixels: Vec<u8>,
}

impl LoadedImage {
    /// Whether both dimensions reach `min` pixels.
    #[must_use]
    pub const fn meets_min_size(&self, min: u32) -> bool {
        self.width >= min && self.height >= min
    }
}

/// Shared, immutable handle; the same image may sit in history more than once.
pub type ImageHandle = Arc<LoadedImage>;

/// Emitted by the player after each committed advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    /// A new frame became current.
    Displayed(PathBuf),
    /// History length after the advance.
    HistoryLength(usize),
}
