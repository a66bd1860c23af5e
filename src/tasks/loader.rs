//! Loader pool: workers that keep the ready queue topped up.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::select;
use tracing::debug;

use crate::error::LoadError;
use crate::events::LoadedImage;
use crate::tasks::player::{Claim, Player};

/// Idle time when there is nothing to fetch or the ready queue is full.
pub const BACKOFF: Duration = Duration::from_millis(100);

/// Turns a path into a [`LoadedImage`].
pub trait ImageSource: Send + Sync {
    fn load(&self, path: &Path) -> BoxFuture<'static, Result<LoadedImage, LoadError>>;
}

/// Decodes files from disk on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsImageSource;

impl ImageSource for FsImageSource {
    fn load(&self, path: &Path) -> BoxFuture<'static, Result<LoadedImage, LoadError>> {
        let path = path.to_path_buf();
        async move {
            let decoded = tokio::task::spawn_blocking({
                let path = path.clone();
                move || decode_rgba8_apply_exif(&path)
            })
            .await??;
            let (width, height) = decoded.dimensions();
            debug!(path = %path.display(), width, height, "decoded");
            Ok::<_, LoadError>(LoadedImage {
                path,
                width,
                height,
                pixels: decoded.into_raw(),
            })
        }
        .boxed()
    }
}

// Decodes an image to RGBA8 and applies EXIF orientation if available, so the
// reported dimensions are the displayed ones.
fn decode_rgba8_apply_exif(path: &Path) -> Result<image::RgbaImage, LoadError> {
    let img = image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?;
    let img = img.to_rgba8();

    let orientation = read_orientation(path).unwrap_or(1);
    Ok(match orientation {
        2 => image::imageops::flip_horizontal(&img),
        3 => image::imageops::rotate180(&img),
        4 => image::imageops::flip_vertical(&img),
        // transpose
        5 => image::imageops::flip_horizontal(&image::imageops::rotate90(&img)),
        6 => image::imageops::rotate90(&img),
        // transverse
        7 => image::imageops::flip_horizontal(&image::imageops::rotate270(&img)),
        8 => image::imageops::rotate270(&img),
        _ => img,
    })
}

fn read_orientation(path: &Path) -> Option<u16> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let orientation = u16::try_from(field.value.get_uint(0)?).ok()?;
    debug!(orientation, path = %path.display(), "exif orientation");
    Some(orientation)
}

/// One fetch loop of the pool. Runs until the player is torn down.
///
/// - Nothing to pick, or the ready queue at its soft cap: sleep [`BACKOFF`].
/// - Load failed or image too small: try again right away.
pub(crate) async fn run_worker(player: Player, worker: usize) {
    let cancel = player.cancellation();
    let source = player.source();
    debug!(worker, "loader worker started");

    loop {
        match player.claim() {
            Claim::Stop => break,
            Claim::Backoff => select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(BACKOFF) => {}
            },
            Claim::Load(path) => {
                let result = select! {
                    _ = cancel.cancelled() => break,
                    res = source.load(&path) => res,
                };
                if !player.complete_load(&path, result) {
                    break;
                }
                // Retries skip the backoff; still let other tasks run between them.
                tokio::task::yield_now().await;
            }
        }
    }

    player.worker_exited(worker);
}
