use eyre::{Result, eyre};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::UnixStream;

use crate::config::Settings;

/// Why there is no usable hub at the socket path.
#[derive(Debug)]
pub enum ConnectError {
    /// Nothing is listening yet; starting a hub may help.
    NoListener { path: PathBuf },
    /// Something is at the path that we cannot talk to.
    Unusable { path: PathBuf, reason: std::io::ErrorKind },
}

impl std::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectError::NoListener { path } => write!(f, "no listener at: {}", path.display()),
            ConnectError::Unusable { path, reason } => {
                write!(f, "unusable socket at {}: {reason}", path.display())
            }
        }
    }
}

impl std::error::Error for ConnectError {}

/// Try to connect to an existing hub via Unix socket.
pub async fn try_connect_to_hub(path: &Path) -> std::result::Result<UnixStream, ConnectError> {
    let connect = UnixStream::connect(path);
    let no_listener = || ConnectError::NoListener {
        path: path.to_path_buf(),
    };
    match tokio::time::timeout(Duration::from_millis(64), connect).await {
        Err(_elapsed) => Err(no_listener()),
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(error)) => match error.kind() {
            std::io::ErrorKind::NotFound
            | std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::TimedOut => Err(no_listener()),
            reason => Err(ConnectError::Unusable {
                path: path.to_path_buf(),
                reason,
            }),
        },
    }
}

/// Spawn `remodel serve` in the background. Does not wait for readiness.
fn start_hub() -> Result<()> {
    let exe = std::env::current_exe().map_err(|e| eyre!(e))?;
    let mut cmd = std::process::Command::new(exe);
    cmd.arg("serve");
    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::null());
    cmd.stderr(std::process::Stdio::null());
    let _child = cmd.spawn().map_err(|e| eyre!(e))?;
    Ok(())
}

/// Connect to the hub, starting one if nobody is listening.
pub async fn obtain_control_stream(settings: &Settings) -> Result<UnixStream> {
    let path = settings.socket_path();

    match try_connect_to_hub(&path).await {
        Err(e @ ConnectError::Unusable { .. }) => {
            tracing::error!(error = %e, "cli: something is off with the socket");
        }
        Err(ConnectError::NoListener { .. }) => {}
        Ok(stream) => {
            tracing::info!("cli: connected to existing hub at {}", path.display());
            return Ok(stream);
        }
    }

    // By default, serve this one request from an embedded hub.
    // With REMODEL_SPAWN_HUB set, start a detached hub process that outlives us.
    let prefers_daemon = std::env::var("REMODEL_SPAWN_HUB").is_ok();
    if prefers_daemon {
        start_hub()?;

        let mut attempts = 0;
        loop {
            attempts += 1;
            tokio::time::sleep(Duration::from_millis(128)).await;
            match try_connect_to_hub(&path).await {
                Err(e @ ConnectError::Unusable { .. }) => return Err(eyre!("cli: {e}")),
                Err(ConnectError::NoListener { .. }) => {}
                Ok(stream) => return Ok(stream),
            }
            if attempts > 3 {
                tracing::warn!(
                    "cli: hub did not come up at {}; falling back to embedded hub",
                    path.display()
                );
                break;
            }
        }
    }

    let stream = crate::hub::spawn(settings).await?;
    tracing::info!("cli: started embedded hub");
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_socket_means_no_listener() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("socket");
        assert!(matches!(
            try_connect_to_hub(&path).await,
            Err(ConnectError::NoListener { .. })
        ));
    }

    #[tokio::test]
    async fn path_under_a_file_is_unusable() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, "not a directory").unwrap();
        let path = file.join("socket");
        assert!(matches!(
            try_connect_to_hub(&path).await,
            Err(ConnectError::Unusable { .. })
        ));
    }

    #[tokio::test]
    async fn listening_socket_connects() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("socket");
        let _listener = tokio::net::UnixListener::bind(&path).unwrap();
        assert!(try_connect_to_hub(&path).await.is_ok());
    }
}
