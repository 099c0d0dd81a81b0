use std::sync::Arc;

use tracing::info;

use crate::adapters::{MemoryClients, MemoryTray, TokioTimeProvider};
use crate::profile::ProfilePlatform;
use crate::worker::{DeliveryWorker, WorkerError, WorkerHandle};

pub type Tray = MemoryTray<TokioTimeProvider>;

#[derive(Clone)]
pub struct AppState {
    pub profile: ProfilePlatform,
    pub tray: Tray,
    pub clients: MemoryClients,
    /// `None` when the profile uses declarative web push.
    pub worker: Option<Arc<WorkerHandle>>,
}

impl AppState {
    /// Spawns the delivery worker and brings it to the activated state.
    ///
    /// A declarative-push profile gets no worker; its pushes are shown directly.
    pub async fn start(profile: ProfilePlatform) -> Result<Self, WorkerError> {
        let tray = MemoryTray::new(TokioTimeProvider);
        let clients = MemoryClients::default();
        let worker = if profile.declarative_push() {
            info!("declarative web push, no delivery worker installed");
            None
        } else {
            let worker = WorkerHandle::spawn(DeliveryWorker::new(tray.clone(), clients.clone()));
            worker.start().await?;
            Some(Arc::new(worker))
        };
        Ok(Self {
            profile,
            tray,
            clients,
            worker,
        })
    }
}
