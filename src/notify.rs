//! Fire-and-forget project notifications, fanned out per owner.
//!
//! Publishing only enqueues; a background worker delivers to every live
//! subscriber of the project's owner. Delivery problems are logged there and
//! never reach the request that published.
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc};

use crate::store::Project;

const SUBSCRIBER_BACKLOG: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub project_id: String,
    pub project: Project,
}

type Channels = Arc<Mutex<HashMap<String, broadcast::Sender<Notification>>>>;

#[derive(Clone)]
pub struct Notifier {
    queue: mpsc::UnboundedSender<Notification>,
    channels: Channels,
}

fn lock(channels: &Channels) -> MutexGuard<'_, HashMap<String, broadcast::Sender<Notification>>> {
    channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Notifier {
    /// Start the delivery worker on the current runtime.
    pub fn start() -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let channels: Channels = Arc::default();
        tokio::spawn(deliver(rx, channels.clone()));
        Self { queue, channels }
    }

    pub fn subscribe(&self, owner: &str) -> broadcast::Receiver<Notification> {
        let mut channels = lock(&self.channels);
        channels
            .entry(owner.to_string())
            .or_insert_with(|| broadcast::channel(SUBSCRIBER_BACKLOG).0)
            .subscribe()
    }

    pub fn publish(&self, project: Project) {
        let notification = Notification {
            project_id: project.id.clone(),
            project,
        };
        if self.queue.send(notification).is_err() {
            tracing::warn!("notify: worker is gone, dropping notification");
        }
    }
}

async fn deliver(mut rx: mpsc::UnboundedReceiver<Notification>, channels: Channels) {
    while let Some(notification) = rx.recv().await {
        let owner = notification.project.owner.clone();
        let project_id = notification.project_id.clone();
        let sender = lock(&channels).get(&owner).cloned();
        let Some(sender) = sender else {
            tracing::trace!(%owner, %project_id, "notify: no subscribers");
            continue;
        };
        match sender.send(notification) {
            Ok(receivers) => tracing::debug!(%owner, %project_id, receivers, "notify: delivered"),
            Err(_) => {
                tracing::debug!(%owner, %project_id, "notify: subscribers gone");
                let mut channels = lock(&channels);
                if channels.get(&owner).is_some_and(|s| s.receiver_count() == 0) {
                    channels.remove(&owner);
                }
            }
        }
    }
    tracing::debug!("notify: worker stopped");
}
