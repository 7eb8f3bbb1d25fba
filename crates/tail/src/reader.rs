use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use log2metrics_core::constants::{STATS_PERIOD, TAIL_POLL_INTERVAL};
use log2metrics_core::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct TailStats {
    pub read_count: i64,
    pub drop_count: i64,
}

/// Mutable state of the polling tail loop, owned by the read-loop task and
/// moved in/out of `spawn_blocking` calls.
struct TailState {
    /// Inode of the currently-open file, on platforms where that concept
    /// exists; `None` before the first poll or where unsupported.
    inode: Option<u64>,
    offset: u64,
    /// Bytes read since the last complete line, held across polls.
    leftover: Vec<u8>,
    initialized: bool,
}

impl TailState {
    fn new() -> Self {
        Self { inode: None, offset: 0, leftover: Vec::new(), initialized: false }
    }
}

#[cfg(unix)]
fn inode_of(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn inode_of(_meta: &std::fs::Metadata) -> u64 {
    // No portable inode concept; rotation is still caught by the
    // shrink check in `poll_once`.
    0
}

/// Follows `path` forever: starts at EOF, survives rotation (the file being
/// renamed/recreated under the same path with a different inode), and
/// emits whole, newline-stripped lines into a bounded channel.
pub struct TailReader {
    path: PathBuf,
    tx: mpsc::Sender<String>,
    read_count: AtomicI64,
    drop_count: AtomicI64,
    cancel: CancellationToken,
    handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl TailReader {
    /// Open the reader. Fails if `path` does not exist at open time.
    pub fn open(path: impl Into<PathBuf>, tx: mpsc::Sender<String>) -> Result<Self, Error> {
        let path = path.into();
        std::fs::metadata(&path).map_err(|e| Error::OpenFailure {
            path: path.display().to_string(),
            cause: e.to_string(),
        })?;
        Ok(Self {
            path,
            tx,
            read_count: AtomicI64::new(0),
            drop_count: AtomicI64::new(0),
            cancel: CancellationToken::new(),
            handles: tokio::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn stats(&self) -> TailStats {
        TailStats {
            read_count: self.read_count.load(Ordering::Relaxed),
            drop_count: self.drop_count.load(Ordering::Relaxed),
        }
    }

    /// Spawn the read loop and the stats loop. Idempotent-by-contract only:
    /// calling this twice on the same reader is a caller bug, not guarded
    /// against at runtime.
    pub fn start(self: &Arc<Self>) -> (JoinHandle<()>, JoinHandle<()>) {
        let read_loop = tokio::spawn(Self::run_read_loop(self.clone()));
        let stats_loop = tokio::spawn(Self::run_stats_loop(self.clone()));
        (read_loop, stats_loop)
    }

    /// Spawn and keep the handles so a later `join()` can wait for both
    /// loops to actually exit, not just signal them.
    pub async fn start_tracked(self: &Arc<Self>) {
        let (read_loop, stats_loop) = self.start();
        let mut handles = self.handles.lock().await;
        handles.push(read_loop);
        handles.push(stats_loop);
    }

    /// Interrupt the follower. Non-blocking: only signals, never awaits.
    /// Safe to call exactly once; buffered lines in the channel are not
    /// drained.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait for both loops spawned via `start_tracked` to exit. Requires
    /// `stop()` to have been called first, or this hangs until cancellation.
    pub async fn join(&self) {
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
    }

    async fn run_read_loop(reader: Arc<Self>) {
        let mut interval = tokio::time::interval(TAIL_POLL_INTERVAL);
        let mut state = TailState::new();
        loop {
            tokio::select! {
                _ = reader.cancel.cancelled() => return,
                _ = interval.tick() => {
                    state = reader.poll_once(state).await;
                }
            }
        }
    }

    async fn run_stats_loop(reader: Arc<Self>) {
        let mut interval = tokio::time::interval(STATS_PERIOD);
        let mut prev = TailStats::default();
        loop {
            tokio::select! {
                _ = reader.cancel.cancelled() => return,
                _ = interval.tick() => {
                    let now = reader.stats();
                    info!(
                        path = %reader.path.display(),
                        read_last_10s = now.read_count - prev.read_count,
                        drop_last_10s = now.drop_count - prev.drop_count,
                        "tail reader throughput",
                    );
                    prev = now;
                }
            }
        }
    }

    /// One polling pass: stat the file, detect rotation, read any new
    /// bytes, split into lines, and try_send each (dropping on backpressure).
    async fn poll_once(&self, state: TailState) -> TailState {
        let path = self.path.clone();
        let (state, lines) = match tokio::task::spawn_blocking(move || poll_sync(&path, state)).await {
            Ok(Ok(result)) => result,
            Ok(Err((state, e))) => {
                warn!(path = %self.path.display(), error = %e, "transient tail read error");
                return state;
            }
            Err(join_err) => {
                warn!(path = %self.path.display(), error = %join_err, "tail poll task panicked");
                return TailState::new();
            }
        };

        for line in lines {
            self.read_count.fetch_add(1, Ordering::Relaxed);
            if self.tx.try_send(line).is_err() {
                self.drop_count.fetch_add(1, Ordering::Relaxed);
            }
        }
        state
    }
}

/// Synchronous half of a poll: does the actual stat/seek/read. Run inside
/// `spawn_blocking` so the tokio reactor is never blocked on file IO.
fn poll_sync(path: &Path, mut state: TailState) -> Result<(TailState, Vec<String>), (TailState, std::io::Error)> {
    let meta = match std::fs::metadata(path) {
        Ok(m) => m,
        Err(e) => return Err((state, e)),
    };
    let current_inode = inode_of(&meta);
    let len = meta.len();

    if !state.initialized {
        // First poll after open: start reading from end-of-file, not the start.
        state.inode = Some(current_inode);
        state.offset = len;
        state.initialized = true;
        return Ok((state, Vec::new()));
    }

    let rotated = state.inode != Some(current_inode) || len < state.offset;
    if rotated {
        state.inode = Some(current_inode);
        state.offset = 0;
        state.leftover.clear();
    }

    if len <= state.offset {
        return Ok((state, Vec::new()));
    }

    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) => return Err((state, e)),
    };
    if let Err(e) = file.seek(SeekFrom::Start(state.offset)) {
        return Err((state, e));
    }

    let mut buf = Vec::with_capacity((len - state.offset) as usize);
    if let Err(e) = file.read_to_end(&mut buf) {
        return Err((state, e));
    }
    state.offset += buf.len() as u64;

    state.leftover.extend_from_slice(&buf);
    let mut lines = Vec::new();
    while let Some(pos) = state.leftover.iter().position(|&b| b == b'\n') {
        let mut line_bytes: Vec<u8> = state.leftover.drain(..=pos).collect();
        line_bytes.pop(); // drop '\n'
        if line_bytes.last() == Some(&b'\r') {
            line_bytes.pop();
        }
        lines.push(String::from_utf8_lossy(&line_bytes).into_owned());
    }

    Ok((state, lines))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    async fn drain(rx: &mut mpsc::Receiver<String>, n: usize, timeout: Duration) -> Vec<String> {
        let mut out = Vec::new();
        let deadline = tokio::time::Instant::now() + timeout;
        while out.len() < n {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, rx.recv()).await {
                Ok(Some(line)) => out.push(line),
                _ => break,
            }
        }
        out
    }

    #[tokio::test]
    async fn follows_appended_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "").unwrap();

        let (tx, mut rx) = mpsc::channel(1024);
        let reader = Arc::new(TailReader::open(&path, tx).unwrap());
        let r2 = reader.clone();
        let _handles = r2.start();

        // let the first poll establish EOF baseline
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "line one").unwrap();
        writeln!(f, "line two").unwrap();

        let lines = drain(&mut rx, 2, Duration::from_secs(2)).await;
        assert_eq!(lines, vec!["line one".to_string(), "line two".to_string()]);
        reader.stop();
    }

    #[tokio::test]
    async fn survives_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "").unwrap();

        let (tx, mut rx) = mpsc::channel(1024);
        let reader = Arc::new(TailReader::open(&path, tx).unwrap());
        let r2 = reader.clone();
        let _handles = r2.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(f, "before rotation").unwrap();
        }
        let _ = drain(&mut rx, 1, Duration::from_secs(2)).await;

        // simulate logrotate: rename away, recreate at the same path
        let rotated_path = dir.path().join("app.log.1");
        std::fs::rename(&path, &rotated_path).unwrap();
        std::fs::write(&path, "").unwrap();
        {
            let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(f, "after rotation").unwrap();
        }

        let lines = drain(&mut rx, 1, Duration::from_secs(2)).await;
        assert_eq!(lines, vec!["after rotation".to_string()]);
        reader.stop();
    }

    #[tokio::test]
    async fn open_missing_file_fails() {
        let (tx, _rx) = mpsc::channel(1);
        let err = TailReader::open("/no/such/file/at/all.log", tx).unwrap_err();
        assert!(matches!(err, Error::OpenFailure { .. }));
    }

    #[tokio::test]
    async fn drops_lines_under_backpressure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "").unwrap();

        let (tx, rx) = mpsc::channel(2);
        // never drained: forces try_send to fail once the buffer fills.
        std::mem::forget(rx);

        let reader = Arc::new(TailReader::open(&path, tx).unwrap());
        let r2 = reader.clone();
        let _handles = r2.start();
        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            for i in 0..100 {
                writeln!(f, "line {i}").unwrap();
            }
        }
        tokio::time::sleep(Duration::from_millis(300)).await;

        let stats = reader.stats();
        assert_eq!(stats.read_count, 100);
        assert!(stats.drop_count >= 98, "drop_count={}", stats.drop_count);
        reader.stop();
    }
}
