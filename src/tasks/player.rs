//! The slideshow player.
//!
//! A [`Player`] owns the ready queue, the bounded history and the single
//! outstanding frame timer. Loader workers feed the ready queue; the timer (or
//! the one-off kick when the very first image lands) drains it into history.
//! All of this state sits behind one mutex, so every mutation step is atomic
//! with respect to every other, while image I/O runs outside the lock.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace};

use crate::buffer::{History, HistoryEntry, ReadyQueue};
use crate::error::{Error, LoadError};
use crate::events::{ImageHandle, LoadedImage, PlayerEvent};
use crate::sources::SourceCollection;
use crate::tasks::loader::{self, ImageSource};
use crate::timing::{self, CONSTANT_TIMING, TimingProvider, TimingTable};

/// Knobs the owner may change at any time via [`Player::update_settings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSettings {
    /// Upper bound on history length.
    pub max_in_memory: usize,
    /// Loader pool size, and the soft cap on the ready queue.
    pub max_loading_at_once: usize,
    /// Minimum width and height in pixels; smaller images are skipped.
    pub image_size_min: u32,
    /// Timing mode; [`CONSTANT_TIMING`] reads `timing_constant` instead.
    pub timing_function: String,
    /// Milliseconds, as text, for the constant timing mode.
    pub timing_constant: String,
    /// Show the previous frame underneath the current one for cross-fades.
    pub fade_enabled: bool,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            max_in_memory: 120,
            max_loading_at_once: 5,
            image_size_min: 0,
            timing_function: CONSTANT_TIMING.to_string(),
            timing_constant: "5000".to_string(),
            fade_enabled: true,
        }
    }
}

/// Receives notifications after each committed advance.
///
/// Callbacks run outside the player's lock, one advance at a time and in the
/// order the advances were committed. They may call back into the player.
pub trait PlaybackObserver: Send + Sync {
    /// History length right after an advance. Called for every committed
    /// advance, including ones that had no image to show.
    fn set_history_length(&self, len: usize);

    /// The image an advance made current. Fires just before
    /// [`PlaybackObserver::set_history_length`] for the same advance, and is
    /// skipped when the advance had no image.
    fn displayed(&self, _image: &ImageHandle) {}
}

impl PlaybackObserver for () {
    fn set_history_length(&self, _len: usize) {}
}

impl PlaybackObserver for UnboundedSender<PlayerEvent> {
    fn set_history_length(&self, len: usize) {
        let _ = self.send(PlayerEvent::HistoryLength(len));
    }

    fn displayed(&self, image: &ImageHandle) {
        let _ = self.send(PlayerEvent::Displayed(image.path.clone()));
    }
}

/// What the presentation layer should draw right now.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    /// Current image first, then the one it fades over (if any).
    pub images: Vec<ImageHandle>,
    /// Half of the delay scheduled after the current frame.
    pub fade_duration: Duration,
    /// Whether `images` came from a history browse offset.
    pub browsing: bool,
}

impl Frame {
    #[must_use]
    pub fn current(&self) -> Option<&ImageHandle> {
        self.images.first()
    }
}

/// Point-in-time counters, mostly for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerStats {
    pub ready: usize,
    pub history: usize,
    pub in_flight: usize,
    pub workers: usize,
    pub playing: bool,
    pub active: bool,
}

/// Outcome of a worker asking for its next job.
pub(crate) enum Claim {
    Load(PathBuf),
    Backoff,
    Stop,
}

struct Timer {
    id: u64,
    cancel: CancellationToken,
}

/// Notifications gathered under the lock and delivered after it is released.
struct Report {
    shown: Option<ImageHandle>,
    history_len: usize,
}

struct PlayerState {
    settings: PlayerSettings,
    paths: SourceCollection,
    playing: bool,
    active: bool,
    pool_running: bool,
    ready: ReadyQueue,
    history: History,
    in_flight: usize,
    timer: Option<Timer>,
    next_timer_id: u64,
    time_to_next_frame: Duration,
    rng: StdRng,
    /// Committed advances not yet handed to the observer, oldest first.
    outbox: VecDeque<Report>,
    /// Someone is draining `outbox`.
    delivering: bool,
}

impl PlayerState {
    fn next_entry(&mut self) -> Option<HistoryEntry> {
        if let Some(image) = self.ready.pop() {
            return Some(HistoryEntry::new(image));
        }
        // Starved: repeat something already shown rather than stall.
        self.history.sample(&mut self.rng)
    }

    fn cancel_timer(&mut self) -> bool {
        match self.timer.take() {
            Some(timer) => {
                timer.cancel.cancel();
                true
            }
            None => false,
        }
    }
}

struct Inner {
    state: Mutex<PlayerState>,
    source: Arc<dyn ImageSource>,
    timing: Arc<dyn TimingProvider>,
    observer: Arc<dyn PlaybackObserver>,
    cancel: CancellationToken,
    tasks: TaskTracker,
    runtime: Handle,
    workers: AtomicUsize,
}

/// Cheaply cloneable handle to a running slideshow.
///
/// Call [`Player::teardown`] (or [`Player::shutdown`]) when done: pending
/// timers and loader workers hold their own handles until then.
#[derive(Clone)]
pub struct Player {
    inner: Arc<Inner>,
}

pub struct PlayerBuilder {
    source: Arc<dyn ImageSource>,
    settings: PlayerSettings,
    paths: SourceCollection,
    playing: bool,
    seed: Option<u64>,
    timing: Arc<dyn TimingProvider>,
    observer: Arc<dyn PlaybackObserver>,
}

impl PlayerBuilder {
    pub fn settings(mut self, settings: PlayerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn paths(mut self, paths: SourceCollection) -> Self {
        self.paths = paths;
        self
    }

    pub fn playing(mut self, playing: bool) -> Self {
        self.playing = playing;
        self
    }

    /// Fix the RNG used for source and history selection.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn timing(mut self, timing: impl TimingProvider + 'static) -> Self {
        self.timing = Arc::new(timing);
        self
    }

    pub fn observer(mut self, observer: impl PlaybackObserver + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Create the player on the current tokio runtime. Nothing runs until
    /// [`Player::start`].
    pub fn build(self) -> Result<Player, Error> {
        let runtime = Handle::try_current()?;
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let state = PlayerState {
            settings: self.settings,
            paths: self.paths,
            playing: self.playing,
            active: true,
            pool_running: false,
            ready: ReadyQueue::new(),
            history: History::new(),
            in_flight: 0,
            timer: None,
            next_timer_id: 0,
            time_to_next_frame: Duration::ZERO,
            rng,
            outbox: VecDeque::new(),
            delivering: false,
        };
        Ok(Player {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                source: self.source,
                timing: self.timing,
                observer: self.observer,
                cancel: CancellationToken::new(),
                tasks: TaskTracker::new(),
                runtime,
                workers: AtomicUsize::new(0),
            }),
        })
    }
}

impl Player {
    pub fn builder(source: impl ImageSource + 'static) -> PlayerBuilder {
        Self::builder_from_arc(Arc::new(source))
    }

    pub fn builder_from_arc(source: Arc<dyn ImageSource>) -> PlayerBuilder {
        PlayerBuilder {
            source,
            settings: PlayerSettings::default(),
            paths: SourceCollection::default(),
            playing: true,
            seed: None,
            timing: Arc::new(TimingTable::default()),
            observer: Arc::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlayerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the loader pool (once) and show the first frame.
    ///
    /// The initial advance runs even when nothing is loaded yet; in that case
    /// it only starts the timer chain and the first successful load kicks the
    /// first frame onto the screen.
    pub fn start(&self) {
        let workers = self.lock().settings.max_loading_at_once;
        self.start_loader_pool(workers);
        self.advance(true, true);
    }

    /// Launch `worker_count` fetch loops unless a pool is already running.
    ///
    /// Returns whether a new pool was spawned.
    pub fn start_loader_pool(&self, worker_count: usize) -> bool {
        {
            let mut state = self.lock();
            if !state.active || state.pool_running {
                return false;
            }
            state.pool_running = true;
        }
        for worker in 0..worker_count {
            self.inner.workers.fetch_add(1, Ordering::SeqCst);
            self.inner
                .tasks
                .spawn_on(loader::run_worker(self.clone(), worker), &self.inner.runtime);
        }
        info!(workers = worker_count, "loader pool started");
        true
    }

    /// Show the next frame.
    ///
    /// Pops the oldest ready image, or resamples history when nothing new is
    /// ready, then trims history to `max_in_memory`. Unless `is_initial`, a
    /// paused player ignores the call; a torn down one always does. With
    /// `reschedule` the next advance is queued after the timing delay.
    pub fn advance(&self, is_initial: bool, reschedule: bool) {
        self.step(&mut self.lock(), is_initial, reschedule);
        self.flush();
    }

    /// One advance under the lock. The report is queued on the outbox so the
    /// observer sees advances in commit order; callers [`Player::flush`]
    /// after releasing the lock.
    fn step(&self, state: &mut PlayerState, is_initial: bool, reschedule: bool) {
        if !state.active || !(is_initial || state.playing) {
            trace!(is_initial, playing = state.playing, "advance dropped");
            return;
        }

        let shown = state.next_entry();
        if let Some(entry) = &shown {
            state.history.push(entry.clone());
        }
        let evicted = state.history.trim(state.settings.max_in_memory);
        if evicted > 0 {
            trace!(evicted, "history trimmed");
        }

        if reschedule {
            self.schedule_next(state);
        }

        let report = Report {
            shown: shown.map(|entry| entry.image),
            history_len: state.history.len(),
        };
        state.outbox.push_back(report);
    }

    fn schedule_next(&self, state: &mut PlayerState) {
        let delay = timing::resolve_delay(
            &state.settings.timing_function,
            &state.settings.timing_constant,
            self.inner.timing.as_ref(),
        );
        state.time_to_next_frame = delay;

        state.cancel_timer();
        let id = state.next_timer_id;
        state.next_timer_id = state.next_timer_id.wrapping_add(1);
        let cancel = self.inner.cancel.child_token();
        state.timer = Some(Timer {
            id,
            cancel: cancel.clone(),
        });

        let player = self.clone();
        self.inner.tasks.spawn_on(
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => player.fire_timer(id),
                }
            },
            &self.inner.runtime,
        );
        trace!(?delay, "next frame scheduled");
    }

    fn fire_timer(&self, id: u64) {
        {
            let mut state = self.lock();
            match &state.timer {
                Some(timer) if timer.id == id => state.timer = None,
                _ => return,
            }
            self.step(&mut state, false, true);
        }
        self.flush();
    }

    /// Hand queued reports to the observer, oldest first.
    ///
    /// One caller drains at a time. A caller that finds a drain in progress
    /// (on another thread, or further up its own stack from an observer
    /// callback) returns at once and leaves its report to that drainer.
    fn flush(&self) {
        {
            let mut state = self.lock();
            if state.delivering || state.outbox.is_empty() {
                return;
            }
            state.delivering = true;
        }
        let _drain = DrainGuard(self);
        loop {
            let report = {
                let mut state = self.lock();
                match state.outbox.pop_front() {
                    Some(report) => report,
                    None => {
                        state.delivering = false;
                        return;
                    }
                }
            };
            if let Some(image) = &report.shown {
                self.inner.observer.displayed(image);
            }
            self.inner.observer.set_history_length(report.history_len);
        }
    }

    /// Record a play/pause change.
    ///
    /// Paused to playing restarts the show (reusing a running loader pool);
    /// playing to paused cancels the pending frame timer. In-flight loads are
    /// left alone either way.
    pub fn on_pause_toggle(&self, was_playing: bool, is_now_playing: bool) {
        self.lock().playing = is_now_playing;
        match (was_playing, is_now_playing) {
            (false, true) => {
                info!("slideshow resumed");
                self.start();
            }
            (true, false) => {
                let cancelled = self.lock().cancel_timer();
                info!(cancelled, "slideshow paused");
            }
            _ => {}
        }
    }

    pub fn set_playing(&self, playing: bool) {
        let was_playing = self.lock().playing;
        self.on_pause_toggle(was_playing, playing);
    }

    pub fn toggle_playing(&self) {
        let was_playing = self.lock().playing;
        self.on_pause_toggle(was_playing, !was_playing);
    }

    /// Stop everything. Workers exit at their next iteration boundary without
    /// touching shared state, and any pending or late timer is a no-op.
    pub fn teardown(&self) {
        {
            let mut state = self.lock();
            if !state.active {
                return;
            }
            state.active = false;
            state.cancel_timer();
        }
        self.inner.cancel.cancel();
        self.inner.tasks.close();
        info!("slideshow torn down");
    }

    /// [`Player::teardown`], then wait for workers and timers to finish.
    pub async fn shutdown(&self) {
        self.teardown();
        self.inner.tasks.wait().await;
    }

    pub fn update_settings(&self, update: impl FnOnce(&mut PlayerSettings)) {
        let mut state = self.lock();
        update(&mut state.settings);
        debug!(settings = ?state.settings, "settings updated");
    }

    /// Replace the candidate paths; workers use them from their next pick.
    pub fn set_paths(&self, paths: SourceCollection) {
        let mut state = self.lock();
        info!(
            groups = paths.groups().len(),
            total = paths.total(),
            "source paths updated"
        );
        state.paths = paths;
    }

    /// Images to draw for the given browse cursor.
    ///
    /// While paused, a negative `history_offset` selects one history entry
    /// (wrapping past the oldest). Otherwise the newest entry is returned,
    /// followed by the previous one when fading is enabled.
    #[must_use]
    pub fn frame(&self, history_offset: i64) -> Frame {
        let state = self.lock();
        let fade_duration = state.time_to_next_frame / 2;
        if !state.playing {
            if let Some(entry) = state.history.resolve_offset(history_offset) {
                return Frame {
                    images: vec![entry.image.clone()],
                    fade_duration,
                    browsing: true,
                };
            }
        }
        let depth = if state.settings.fade_enabled { 2 } else { 1 };
        Frame {
            images: state
                .history
                .tail(depth)
                .map(|entry| entry.image.clone())
                .collect(),
            fade_duration,
            browsing: false,
        }
    }

    /// Displayed paths, oldest first.
    #[must_use]
    pub fn history_paths(&self) -> Vec<PathBuf> {
        self.lock()
            .history
            .iter()
            .map(|entry| entry.path.clone())
            .collect()
    }

    /// Delay computed by the most recent rescheduling advance.
    #[must_use]
    pub fn time_to_next_frame(&self) -> Duration {
        self.lock().time_to_next_frame
    }

    #[must_use]
    pub fn stats(&self) -> PlayerStats {
        let state = self.lock();
        PlayerStats {
            ready: state.ready.len(),
            history: state.history.len(),
            in_flight: state.in_flight,
            workers: self.inner.workers.load(Ordering::SeqCst),
            playing: state.playing,
            active: state.active,
        }
    }

    pub(crate) fn source(&self) -> Arc<dyn ImageSource> {
        Arc::clone(&self.inner.source)
    }

    pub(crate) fn cancellation(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Pick the next path to fetch, or say why not.
    pub(crate) fn claim(&self) -> Claim {
        let mut guard = self.lock();
        let state = &mut *guard;
        if !state.active {
            return Claim::Stop;
        }
        if state.ready.is_saturated(state.settings.max_loading_at_once) {
            return Claim::Backoff;
        }
        match state.paths.pick(&mut state.rng) {
            Some(path) => {
                let path = path.clone();
                state.in_flight += 1;
                Claim::Load(path)
            }
            None => Claim::Backoff,
        }
    }

    /// Commit a finished load. Returns `false` once the player is torn down.
    pub(crate) fn complete_load(&self, path: &Path, result: Result<LoadedImage, LoadError>) -> bool {
        {
            let mut state = self.lock();
            if !state.active {
                return false;
            }
            state.in_flight = state.in_flight.saturating_sub(1);
            let image = match result {
                Ok(image) => image,
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "load failed; retrying");
                    return true;
                }
            };
            let min = state.settings.image_size_min;
            if !image.meets_min_size(min) {
                debug!(
                    path = %path.display(),
                    width = image.width,
                    height = image.height,
                    min,
                    "skipping tiny image"
                );
                return true;
            }

            let first = state.ready.is_empty() && state.history.is_empty();
            state.ready.push(Arc::new(image));
            trace!(path = %path.display(), ready = state.ready.len(), "image ready");
            if first {
                self.step(&mut state, false, false);
            }
        }
        self.flush();
        true
    }

    pub(crate) fn worker_exited(&self, worker: usize) {
        self.inner.workers.fetch_sub(1, Ordering::SeqCst);
        debug!(worker, "loader worker stopped");
    }
}

/// Releases the drain if an observer callback panics, so later advances are
/// still reported.
struct DrainGuard<'a>(&'a Player);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.lock().delivering = false;
        }
    }
}
