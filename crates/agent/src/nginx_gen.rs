//! Synthetic nginx-style access log generator, gated by
//! `local_config.nginx_log_generating`. Self-test tooling only: it lets the
//! agent be exercised end to end without a real nginx in front of it, by
//! appending plausible lines to each configured strategy's `file_path` at
//! `local_config.rate_per_second`.

use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE"];
const PATHS: &[&str] = &["/", "/api/v1/items", "/health", "/login", "/static/app.js"];
const STATUSES: &[u16] = &[200, 200, 200, 201, 301, 404, 500];
const HOSTS: &[&str] = &["web-1", "web-2", "web-3"];

fn synthetic_line() -> String {
    let mut rng = rand::thread_rng();
    let method = METHODS.choose(&mut rng).unwrap();
    let path = PATHS.choose(&mut rng).unwrap();
    let status = STATUSES.choose(&mut rng).unwrap();
    let host = HOSTS.choose(&mut rng).unwrap();
    let bytes: u32 = rng.gen_range(120..=65_000);
    let duration_ms: u32 = rng.gen_range(1..=800);
    format!(
        "method={method} path={path} status={status} bytes={bytes} duration_ms={duration_ms} host={host}"
    )
}

/// Round-robins across `file_paths`, appending one synthetic line per tick
/// until cancelled. A no-op if `rate_per_second` is zero or no paths are
/// configured.
pub async fn run(file_paths: Vec<String>, rate_per_second: u32, cancel: CancellationToken) {
    if file_paths.is_empty() || rate_per_second == 0 {
        return;
    }

    let interval_secs = 1.0 / rate_per_second as f64;
    let mut interval = tokio::time::interval(Duration::from_secs_f64(interval_secs));
    info!(files = file_paths.len(), rate_per_second, "synthetic nginx log generator started");

    let mut next = 0usize;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {
                let path = &file_paths[next % file_paths.len()];
                next = next.wrapping_add(1);
                if let Err(e) = append_line(path, &synthetic_line()).await {
                    warn!(path, error = %e, "failed to append synthetic log line");
                }
            }
        }
    }
}

async fn append_line(path: &str, line: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_line_has_every_field_key() {
        let line = synthetic_line();
        for key in ["method=", "path=", "status=", "bytes=", "duration_ms=", "host="] {
            assert!(line.contains(key), "missing {key:?} in {line:?}");
        }
    }

    #[tokio::test]
    async fn run_is_a_noop_with_zero_rate() {
        let cancel = CancellationToken::new();
        run(vec!["/tmp/does-not-matter.log".to_string()], 0, cancel).await;
    }

    #[tokio::test]
    async fn run_appends_lines_to_the_configured_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synthetic.log");
        let cancel = CancellationToken::new();
        let cancel2 = cancel.clone();
        let path_str = path.to_str().unwrap().to_string();

        let handle = tokio::spawn(run(vec![path_str], 50, cancel2));
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
        let _ = handle.await;

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.is_empty());
        assert!(contents.lines().next().unwrap().contains("method="));
    }
}
