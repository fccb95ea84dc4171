//! The hub is a background process that hosts the engine and the project store,
//! and accepts requests from the CLI.
use eyre::{Result, eyre};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast::error::RecvError;

use crate::config::Settings;
use crate::create::{self, NewProject};
use crate::engine::{ChangeRequest, Engine};
use crate::history::{self, Message};
use crate::notify::Notifier;
use crate::plan::Formatter;
use crate::protocol::{ProtocolError, Request, read_frame_from_stream};
use crate::store::{Project, Store};
use crate::stream::{self, Sink};

/// Everything a request needs; shared across connections.
pub struct Hub {
    engine: Engine,
    store: Store,
    notifier: Notifier,
    formatter: Formatter,
}

/// Make `path` bindable: a private parent directory and no leftover socket.
/// Anything at `path` that is not a socket is left alone and reported.
pub fn prepare_socket_path(path: &Path) -> Result<()> {
    use std::fs;
    use std::os::unix::fs::{FileTypeExt, PermissionsExt};

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            tracing::debug!(path = %path.display(), "hub: removing stale socket");
            fs::remove_file(path)?;
        }
        Ok(_) => {
            return Err(eyre!(
                "hub: refusing to replace non-socket at {}",
                path.display()
            ));
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

impl Hub {
    pub fn new(engine: Engine, store: Store, notifier: Notifier, formatter: Formatter) -> Self {
        Self {
            engine,
            store,
            notifier,
            formatter,
        }
    }

    /// Connect the configured models and open the store. Needs a running runtime.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let engine = Engine::from_settings(settings).map_err(|e| eyre!(e))?;
        tracing::info!(
            base = %settings.base.model,
            complex = %settings.complex.model,
            "hub: models configured"
        );
        Ok(Self::new(
            engine,
            Store::new(settings.projects_dir()),
            Notifier::start(),
            Formatter::from_argv(settings.formatter.clone()),
        ))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Apply the last user message to a project. Files are persisted only when
    /// the whole run succeeded; subscribers hear about it afterwards.
    pub async fn change(
        &self,
        project_id: &str,
        messages: Vec<Message>,
        sink: &Sink,
    ) -> Result<Project> {
        let request = match self.prepare(project_id, messages).await {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(%project_id, error = %e, "hub: rejected change request");
                sink.fail(&e.to_string());
                return Err(e);
            }
        };
        let prompt = request.prompt.clone();
        let outcome = self.engine.run(request, sink).await?;
        if sink.is_closed() {
            tracing::info!(%project_id, "hub: client left before the run finished, persisting anyway");
        }

        let committed = self
            .store
            .commit_run(project_id, &prompt, &outcome.files, &outcome.explanation(), false)
            .await;
        let project = match committed {
            Ok(project) => project,
            Err(e) => {
                tracing::error!(%project_id, error = %e, "hub: could not persist run");
                sink.fail(&e.to_string());
                return Err(e);
            }
        };
        self.notifier.publish(project.clone());
        Ok(project)
    }

    async fn prepare(&self, project_id: &str, messages: Vec<Message>) -> Result<ChangeRequest> {
        let messages = history::sanitize(messages);
        let Some((history, prompt)) = history::split_prompt(messages) else {
            return Err(eyre!("request does not end with a user message"));
        };
        let Some(project) = self.store.get_project(project_id).await? else {
            return Err(eyre!("no such project: {project_id}"));
        };
        Ok(ChangeRequest {
            history,
            prompt,
            files: project.current_files(),
        })
    }

    pub async fn create(&self, owner: &str, prompt: &str, sink: &Sink) -> Result<Project> {
        let project = create::create(
            &self.engine,
            &self.store,
            &self.formatter,
            NewProject { owner, prompt },
            sink,
        )
        .await?;
        self.notifier.publish(project.clone());
        Ok(project)
    }
}

/// Run `work` while pumping its frames to `writer`.
/// A vanished reader stops the writes, not the run.
async fn stream_run<W, F>(writer: &mut W, work: impl FnOnce(Sink) -> F) -> Result<()>
where
    W: AsyncWrite + Unpin,
    F: std::future::Future<Output = Result<Project>>,
{
    let (sink, rx) = Sink::new();
    let run = work(sink);
    let (pumped, outcome) = tokio::join!(stream::pump(rx, writer), run);
    match pumped {
        Ok(frames) => tracing::debug!(frames, "hub: stream written"),
        Err(e) => tracing::info!(error = %e, "hub: client went away during the run"),
    }
    match outcome {
        Ok(project) => {
            tracing::info!(project_id = %project.id, "hub: run finished");
            Ok(())
        }
        // Already reported on the stream.
        Err(e) => {
            tracing::debug!(error = %e, "hub: run failed");
            Ok(())
        }
    }
}

async fn subscribe<W: AsyncWrite + Unpin>(writer: &mut W, hub: &Hub, owner: &str) -> Result<()> {
    let mut notifications = hub.notifier.subscribe(owner);
    tracing::info!(%owner, "hub: subscriber attached");
    loop {
        match notifications.recv().await {
            Ok(notification) => {
                let mut line = serde_json::to_string(&notification)?;
                line.push('\n');
                writer.write_all(line.as_bytes()).await?;
                writer.flush().await?;
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(%owner, skipped, "hub: subscriber lagging");
            }
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}

/// Serve one request on a client connection.
async fn accept_and_serve_request(stream: UnixStream, hub: Arc<Hub>) -> Result<()> {
    // Conservative read timeouts make slow or stuck probes go away.
    let per_read_timeout = Some(Duration::from_millis(250));
    let total_timeout = Some(Duration::from_secs(30));

    let (mut reader, mut writer) = stream.into_split();
    let mut buffer = Vec::with_capacity(4096);
    let request: std::result::Result<Request, ProtocolError> =
        read_frame_from_stream(&mut reader, &mut buffer, per_read_timeout, total_timeout).await;
    let request = match request {
        // A probe that connected and left.
        Err(ProtocolError::Disconnect) => return Ok(()),
        Err(e) => return Err(eyre!(e)),
        Ok(request) => request,
    };

    match request {
        Request::Change {
            project_id,
            messages,
        } => {
            tracing::info!(%project_id, messages = messages.len(), "hub: change request");
            stream_run(&mut writer, |sink| async move {
                hub.change(&project_id, messages, &sink).await
            })
            .await?;
        }
        Request::Create { owner, prompt } => {
            tracing::info!(%owner, "hub: create request");
            stream_run(&mut writer, |sink| async move {
                hub.create(&owner, &prompt, &sink).await
            })
            .await?;
        }
        Request::Subscribe { owner } => subscribe(&mut writer, &hub, &owner).await?,
    }
    writer.shutdown().await?;
    Ok(())
}

fn serve_in_background(stream: UnixStream, hub: Arc<Hub>) {
    tokio::spawn(async move {
        if let Err(e) = accept_and_serve_request(stream, hub).await {
            tracing::error!("hub: connection error: {e}");
        }
    });
}

/// Hub main loop: bind socket, connect models once, accept clients forever.
pub async fn run(settings: &Settings) -> Result<()> {
    let socket_path = settings.socket_path();
    prepare_socket_path(&socket_path)?;

    let hub = Arc::new(Hub::from_settings(settings)?);
    let listener = UnixListener::bind(&socket_path)?;
    tracing::info!("hub: listening at {}", socket_path.display());

    loop {
        let (stream, _addr) = listener.accept().await?;
        serve_in_background(stream, hub.clone());
    }
}

/// Convenience for in-process use: serve a single client over a UnixStream pair.
pub async fn spawn(settings: &Settings) -> Result<UnixStream> {
    let hub = Arc::new(Hub::from_settings(settings)?);
    let (probe_end, hub_end) = UnixStream::pair()?;
    serve_in_background(hub_end, hub);
    Ok(probe_end)
}

#[cfg(test)]
mod tests;
