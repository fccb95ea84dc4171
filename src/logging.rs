//! Process-wide tracing setup and small timing helpers.
use std::future::Future;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Route tracing logs to stderr, filtered by `REMODEL_LOG` (default `info`).
/// Stdout and the hub socket carry data only.
pub fn setup_tracing() {
    let filter = EnvFilter::try_from_env("REMODEL_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Await `fut` and log how long it took, whether it succeeded or not.
pub async fn timed<T, E, F>(name: &'static str, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let start = Instant::now();
    let out = fut.await;
    let elapsed_ms = start.elapsed().as_millis() as u64;
    match &out {
        Ok(_) => tracing::info!(phase = name, elapsed_ms, "timing: done"),
        Err(e) => tracing::warn!(phase = name, elapsed_ms, error = %e, "timing: failed"),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timed_passes_results_through() {
        let ok: Result<u8, String> = timed("ok", async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));
        let err: Result<u8, String> = timed("err", async { Err("nope".to_string()) }).await;
        assert_eq!(err, Err("nope".to_string()));
    }
}
