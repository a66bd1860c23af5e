use crate::config::Configuration;
use crate::error::Error;
use crate::sources::SourceCollection;
use crate::tasks::player::Player;
use anyhow::Result;
use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecursiveMode, Watcher, recommended_watcher};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use walkdir::{DirEntry, WalkDir};

/// Scan `dirs` recursively for images.
///
/// With `weight_directories_equally` every directory becomes its own group,
/// so each directory is picked equally often whatever its size. Otherwise all
/// images share one group. Paths are sorted within a group.
///
/// # Errors
/// Returns [`Error::BadDir`] if any directory is missing or not a directory.
pub fn scan_groups(
    dirs: &[PathBuf],
    weight_directories_equally: bool,
) -> Result<SourceCollection, Error> {
    let bad: Vec<String> = dirs
        .iter()
        .filter(|d| !d.is_dir())
        .map(|d| d.to_string_lossy().into_owned())
        .collect();
    if !bad.is_empty() {
        return Err(Error::BadDir(bad.join(", ")));
    }

    let groups: Vec<Vec<PathBuf>> = dirs.iter().map(|d| scan_dir(d)).collect();
    if weight_directories_equally {
        Ok(SourceCollection::new(groups))
    } else {
        Ok(SourceCollection::flat(groups.into_iter().flatten().collect()))
    }
}

fn scan_dir(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| !is_hidden_dir(e))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_image(p))
        .collect();
    found.sort();
    debug!(root = %root.display(), count = found.len(), "scanned directory");
    found
}

fn is_hidden_dir(entry: &DirEntry) -> bool {
    // Never skip the root; tempfile roots can be dot-dirs.
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with('.'))
}

#[inline]
fn is_image(p: &Path) -> bool {
    matches!(
        p.extension()
            .and_then(OsStr::to_str)
            .map(|s| s.to_ascii_lowercase()),
        Some(ref e) if ["jpg", "jpeg", "png", "webp", "gif"].contains(&e.as_str())
    )
}

/// Whether `event` can change the set of candidate images.
fn affects_inventory(event: &Event) -> bool {
    let relevant_kind = matches!(
        event.kind,
        EventKind::Create(CreateKind::File | CreateKind::Any)
            | EventKind::Remove(RemoveKind::File | RemoveKind::Any)
            | EventKind::Modify(ModifyKind::Name(_))
    );
    relevant_kind && event.paths.iter().any(|p| is_image(p))
}

/// Watch the configured directories and push rescanned paths to `player`.
///
/// Events are debounced by `rescan-debounce` so a bulk copy triggers a single
/// rescan.
#[instrument(skip_all, fields(dirs = cfg.photo_directories.len()))]
pub async fn run(cfg: Configuration, player: Player, cancel: CancellationToken) -> Result<()> {
    // Bridge notify callback -> async channel
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Result<Event>>(128);
    let mut watcher = recommended_watcher(move |res| {
        let _ = watch_tx.blocking_send(res);
    })?;
    for dir in &cfg.photo_directories {
        watcher.watch(dir, RecursiveMode::Recursive)?;
        info!(watching = %dir.display(), "notify watcher initialized (recursive)");
    }
    debug!(
        debounce = %humantime::format_duration(cfg.rescan_debounce),
        "rescans wait for a quiet period"
    );

    let mut rescan_at: Option<Instant> = None;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting files task");
                break;
            }

            Some(res) = watch_rx.recv() => match res {
                Ok(event) if affects_inventory(&event) => {
                    debug!(kind = ?event.kind, paths = ?event.paths, "fs: inventory change");
                    rescan_at = Some(Instant::now() + cfg.rescan_debounce);
                }
                Ok(event) => debug!(kind = ?event.kind, "fs: ignored"),
                Err(err) => error!("watch error: {err}"),
            },

            _ = sleep_until_some(rescan_at), if rescan_at.is_some() => {
                rescan_at = None;
                match scan_groups(&cfg.photo_directories, cfg.weight_directories_equally) {
                    Ok(paths) => {
                        info!(total = paths.total(), "rescan complete");
                        player.set_paths(paths);
                    }
                    Err(err) => warn!("rescan failed; keeping previous paths: {err}"),
                }
            }
        }
    }
    Ok(())
}

async fn sleep_until_some(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(deadline).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn recognizes_image_extensions() {
        assert!(is_image(Path::new("a/b.JPG")));
        assert!(is_image(Path::new("b.webp")));
        assert!(!is_image(Path::new("notes.txt")));
        assert!(!is_image(Path::new("no_extension")));
    }

    #[test]
    fn one_group_per_directory_when_weighted() {
        let tmp = tempdir().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        fs::create_dir_all(a.join("nested")).unwrap();
        fs::create_dir_all(b.join(".hidden")).unwrap();
        fs::write(a.join("1.jpg"), b"x").unwrap();
        fs::write(a.join("nested").join("2.png"), b"x").unwrap();
        fs::write(a.join("readme.txt"), b"x").unwrap();
        fs::write(b.join("3.jpeg"), b"x").unwrap();
        fs::write(b.join(".hidden").join("4.jpg"), b"x").unwrap();

        let dirs = vec![a.clone(), b.clone()];
        let weighted = scan_groups(&dirs, true).unwrap();
        assert_eq!(
            weighted.groups(),
            &[
                vec![a.join("1.jpg"), a.join("nested").join("2.png")],
                vec![b.join("3.jpeg")],
            ]
        );

        let flat = scan_groups(&dirs, false).unwrap();
        assert_eq!(flat.groups().len(), 1);
        assert_eq!(flat.total(), 3);
    }

    #[test]
    fn missing_directory_is_reported() {
        let tmp = tempdir().unwrap();
        let missing = tmp.path().join("nope");
        let err = scan_groups(&[missing], true).unwrap_err();
        assert!(matches!(err, Error::BadDir(msg) if msg.contains("nope")));
    }

    #[test]
    fn empty_directory_becomes_empty_group() {
        let tmp = tempdir().unwrap();
        let paths = scan_groups(&[tmp.path().to_path_buf()], true).unwrap();
        assert_eq!(paths.groups().len(), 1);
        assert!(paths.is_empty());
    }
}
