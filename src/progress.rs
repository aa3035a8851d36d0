use clap::ValueEnum;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const MAX_STORED_WARNINGS: usize = 32;

/// How build progress is shown on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
#[value(rename_all = "lower")]
pub enum ProgressMode {
    /// Bar on a terminal, `[PROGRESS]` lines otherwise.
    #[default]
    Auto,
    Rich,
    Plain,
    Quiet,
}

/// What the reporter actually draws once the terminal is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Bar,
    Lines,
    Silent,
}

#[derive(Debug, Clone, Copy)]
pub struct ProgressConfig {
    pub mode: ProgressMode,
    /// Warn when no file has finished for this long.
    pub stall_after: Duration,
    /// Spacing of `[PROGRESS]` lines in plain output.
    pub line_every: Duration,
    stderr_terminal: Option<bool>,
}

impl ProgressConfig {
    pub fn new(mode: ProgressMode) -> Self {
        Self {
            mode,
            stall_after: Duration::from_secs(30),
            line_every: Duration::from_secs(2),
            stderr_terminal: None,
        }
    }

    #[cfg(test)]
    pub fn assume_terminal(mut self, is_terminal: bool) -> Self {
        self.stderr_terminal = Some(is_terminal);
        self
    }

    pub fn output(&self) -> Output {
        let on_terminal = self
            .stderr_terminal
            .unwrap_or_else(|| std::io::stderr().is_terminal());
        match (self.mode, on_terminal) {
            (ProgressMode::Quiet, _) => Output::Silent,
            (ProgressMode::Plain, _) | (ProgressMode::Auto, false) => Output::Lines,
            (ProgressMode::Rich, _) | (ProgressMode::Auto, true) => Output::Bar,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressOutcome {
    pub elapsed: Duration,
    pub total_files: u64,
    pub done_files: u64,
    pub bytes_hashed: u64,
    pub files_per_sec: f64,
    pub warning_count: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
struct ProgressSnapshot {
    label: String,
    stage: String,
    done_files: u64,
    total_files: u64,
    bytes_hashed: u64,
    elapsed: Duration,
    files_per_sec: f64,
    eta: Option<Duration>,
}

/// Cheap clonable handle for reporting from inspection workers.
#[derive(Clone)]
pub struct ProgressHandle {
    inner: Arc<ProgressInner>,
}

/// Owns the ticker thread. Dropping it without `finish` still shuts down cleanly.
pub struct ProgressReporter {
    handle: ProgressHandle,
    ticker: Option<JoinHandle<()>>,
}

struct ProgressInner {
    label: String,
    mode: Output,
    stall_after: Duration,
    line_every: Duration,
    state: Mutex<ProgressState>,
    bar: Option<ProgressBar>,
    stop: AtomicBool,
    finalized: AtomicBool,
}

#[derive(Debug)]
struct ProgressState {
    started: Instant,
    stage: String,
    total_files: u64,
    done_files: u64,
    bytes_hashed: u64,
    last_progress: Instant,
    last_line_at: Instant,
    last_stall_warning: Option<Instant>,
    warnings: Vec<String>,
}

impl ProgressState {
    fn new(total_files: u64, now: Instant, line_every: Duration) -> Self {
        Self {
            started: now,
            stage: "starting".to_string(),
            total_files,
            done_files: 0,
            bytes_hashed: 0,
            last_progress: now,
            // First tick prints a line straight away.
            last_line_at: now.checked_sub(line_every).unwrap_or(now),
            last_stall_warning: None,
            warnings: Vec::new(),
        }
    }

    fn finished(&self) -> bool {
        self.total_files > 0 && self.done_files >= self.total_files
    }

    /// No file finished within `stall_after`, and no stall warning in the last
    /// `stall_after` either.
    fn stall_warning_due(&self, now: Instant, stall_after: Duration) -> bool {
        if self.finished() || now.duration_since(self.last_progress) < stall_after {
            return false;
        }
        self.last_stall_warning
            .map_or(true, |warned| now.duration_since(warned) >= stall_after)
    }
}

impl ProgressReporter {
    pub fn new(label: impl Into<String>, total_files: u64, config: ProgressConfig) -> Self {
        let label = label.into();
        let mode = config.output();
        let now = Instant::now();

        let bar = (mode == Output::Bar).then(|| rich_bar(&label, total_files));

        let inner = Arc::new(ProgressInner {
            label,
            mode,
            stall_after: config.stall_after,
            line_every: config.line_every,
            state: Mutex::new(ProgressState::new(total_files, now, config.line_every)),
            bar,
            stop: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
        });

        let ticker = if mode == Output::Silent {
            None
        } else {
            let ticker_inner = Arc::clone(&inner);
            Some(thread::spawn(move || {
                while !ticker_inner.stop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(250));
                    ticker_inner.tick_once();
                }
            }))
        };

        Self {
            handle: ProgressHandle { inner },
            ticker,
        }
    }

    pub fn handle(&self) -> ProgressHandle {
        self.handle.clone()
    }

    pub fn finish(mut self, final_message: impl Into<String>) -> ProgressOutcome {
        self.shutdown_ticker();
        self.handle.inner.finalize(Some(final_message.into()))
    }

    fn shutdown_ticker(&mut self) {
        self.handle.inner.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.ticker.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.shutdown_ticker();
        let _ = self.handle.inner.finalize(None);
    }
}

impl ProgressHandle {
    pub fn set_total_files(&self, total_files: u64) {
        let snapshot = {
            let mut state = self.inner.lock();
            state.total_files = total_files;
            snapshot_locked(&self.inner.label, &state)
        };
        if let Some(bar) = &self.inner.bar {
            bar.set_length(total_files.max(1));
        }
        self.inner.render(&snapshot, true);
    }

    pub fn set_stage(&self, stage: impl Into<String>) {
        let snapshot = {
            let mut state = self.inner.lock();
            state.stage = stage.into();
            snapshot_locked(&self.inner.label, &state)
        };
        self.inner.render(&snapshot, true);
    }

    /// Marks one file as inspected.
    pub fn file_done(&self, bytes_hashed: u64) {
        let snapshot = {
            let mut state = self.inner.lock();
            state.done_files = state.done_files.saturating_add(1);
            if state.total_files > 0 {
                state.done_files = state.done_files.min(state.total_files);
            }
            state.bytes_hashed = state.bytes_hashed.saturating_add(bytes_hashed);
            state.last_progress = Instant::now();
            snapshot_locked(&self.inner.label, &state)
        };
        self.inner.render(&snapshot, false);
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        push_warning_locked(&mut self.inner.lock(), &message);
        self.inner.emit_message("WARN", &message);
    }

    pub fn log(&self, message: impl Into<String>) {
        self.inner.emit_message("INFO", &message.into());
    }
}

impl ProgressInner {
    // A worker that panicked mid-update leaves counters that are still usable.
    fn lock(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn tick_once(&self) {
        let (snapshot, line_due, stall_warning) = {
            let mut state = self.lock();
            let now = Instant::now();

            let line_due = now.duration_since(state.last_line_at) >= self.line_every;
            if line_due {
                state.last_line_at = now;
            }

            let stall_warning = if state.stall_warning_due(now, self.stall_after) {
                state.last_stall_warning = Some(now);
                let msg = format!(
                    "stalled: no file finished for {}s (stage={})",
                    now.duration_since(state.last_progress).as_secs(),
                    state.stage
                );
                push_warning_locked(&mut state, &msg);
                Some(msg)
            } else {
                None
            };

            (snapshot_locked(&self.label, &state), line_due, stall_warning)
        };

        match self.mode {
            Output::Bar => self.render_rich(&snapshot),
            Output::Lines if line_due => self.render_plain(&snapshot),
            _ => {}
        }

        if let Some(msg) = stall_warning {
            self.emit_message("WARN", &msg);
        }
    }

    fn render(&self, snapshot: &ProgressSnapshot, force_plain: bool) {
        match self.mode {
            Output::Bar => self.render_rich(snapshot),
            Output::Lines if force_plain => self.render_plain(snapshot),
            _ => {}
        }
    }

    fn render_rich(&self, snapshot: &ProgressSnapshot) {
        let Some(bar) = &self.bar else {
            return;
        };
        bar.set_position(snapshot.done_files.min(snapshot.total_files.max(1)));
        bar.set_message(format!(
            "stage={} hashed={} ETA={}",
            snapshot.stage,
            HumanBytes(snapshot.bytes_hashed),
            format_eta(snapshot.eta)
        ));
    }

    fn render_plain(&self, snapshot: &ProgressSnapshot) {
        let pct = if snapshot.total_files == 0 {
            0.0
        } else {
            (snapshot.done_files as f64 / snapshot.total_files as f64) * 100.0
        };
        eprintln!(
            "[PROGRESS] {} elapsed={} stage={} files={} / {} ({:.1}%) hashed={} rate={:.1} files/s ETA={}",
            snapshot.label,
            format_duration(snapshot.elapsed),
            snapshot.stage,
            snapshot.done_files,
            snapshot.total_files,
            pct,
            HumanBytes(snapshot.bytes_hashed),
            snapshot.files_per_sec,
            format_eta(snapshot.eta),
        );
    }

    fn emit_message(&self, level: &str, message: &str) {
        match (self.mode, &self.bar) {
            (Output::Silent, _) => {}
            (Output::Bar, Some(bar)) => {
                bar.println(format!("[{}] {}: {}", level, self.label, message));
            }
            _ => eprintln!("[{}] {}: {}", level, self.label, message),
        }
    }

    fn finalize(&self, final_message: Option<String>) -> ProgressOutcome {
        let (snapshot, warnings) = {
            let state = self.lock();
            (snapshot_locked(&self.label, &state), state.warnings.clone())
        };

        if !self.finalized.swap(true, Ordering::Relaxed) {
            match self.mode {
                Output::Silent => {}
                Output::Lines => {
                    self.render_plain(&snapshot);
                    if let Some(msg) = final_message.as_deref() {
                        eprintln!("[DONE] {}: {}", self.label, msg);
                    }
                }
                Output::Bar => {
                    if let Some(bar) = &self.bar {
                        match final_message {
                            Some(msg) => bar.finish_with_message(msg),
                            None => bar.finish_and_clear(),
                        }
                    }
                }
            }
        }

        ProgressOutcome {
            elapsed: snapshot.elapsed,
            total_files: snapshot.total_files,
            done_files: snapshot.done_files,
            bytes_hashed: snapshot.bytes_hashed,
            files_per_sec: average_rate(snapshot.done_files, snapshot.elapsed),
            warning_count: warnings.len(),
            warnings,
        }
    }
}

fn rich_bar(label: &str, total_files: u64) -> ProgressBar {
    let bar = ProgressBar::new(total_files.max(1));
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] {prefix:.bold} {wide_bar:.cyan/blue} {pos}/{len} files | {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.set_prefix(label.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn push_warning_locked(state: &mut ProgressState, message: &str) {
    if state.warnings.len() >= MAX_STORED_WARNINGS {
        state.warnings.remove(0);
    }
    state.warnings.push(message.to_string());
}

fn snapshot_locked(label: &str, state: &ProgressState) -> ProgressSnapshot {
    let elapsed = state.started.elapsed();
    let files_per_sec = average_rate(state.done_files, elapsed);
    ProgressSnapshot {
        label: label.to_string(),
        stage: state.stage.clone(),
        done_files: state.done_files,
        total_files: state.total_files,
        bytes_hashed: state.bytes_hashed,
        elapsed,
        files_per_sec,
        eta: compute_eta(state.total_files, state.done_files, files_per_sec),
    }
}

fn average_rate(count: u64, elapsed: Duration) -> f64 {
    count as f64 / elapsed.as_secs_f64().max(1e-6)
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{:02}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

fn format_eta(eta: Option<Duration>) -> String {
    eta.map(format_duration)
        .unwrap_or_else(|| "--:--".to_string())
}

fn compute_eta(total: u64, done: u64, per_sec: f64) -> Option<Duration> {
    if per_sec <= 1e-3 || done >= total {
        return None;
    }
    let remaining = total.saturating_sub(done) as f64;
    Some(Duration::from_secs_f64((remaining / per_sec).max(0.0)))
}
