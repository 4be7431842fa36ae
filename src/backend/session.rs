use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{Directory, DirectoryFactory};
use crate::error::{ConnectorError, ConnectorResult};

/// The single logical directory session of a connector.
///
/// Opened on first use and reused afterwards. A session that fails its
/// liveness check is replaced; the operation that found it dead is not
/// retried.
pub struct Session {
    factory: Arc<dyn DirectoryFactory>,
    current: Mutex<Option<Arc<dyn Directory>>>,
}

impl Session {
    pub fn new(factory: Arc<dyn DirectoryFactory>) -> Self {
        Self {
            factory,
            current: Mutex::new(None),
        }
    }

    /// A live directory handle, opening or reopening the session as needed
    pub async fn directory(&self) -> ConnectorResult<Arc<dyn Directory>> {
        let mut current = self.current.lock().await;

        if let Some(directory) = current.as_ref() {
            if directory.is_alive().await {
                return Ok(directory.clone());
            }
            warn!("Directory session failed its liveness check, reopening");
            directory.close().await;
            *current = None;
        }

        let directory = self.factory.open().await.map_err(|e| match e {
            ConnectorError::BackendUnavailable(_) => e,
            other => ConnectorError::BackendUnavailable(other.to_string()),
        })?;
        if !directory.is_alive().await {
            return Err(ConnectorError::BackendUnavailable(
                "newly opened session is not alive".to_string(),
            ));
        }
        info!("Directory session opened");
        *current = Some(directory.clone());
        Ok(directory)
    }

    pub async fn check_alive(&self) -> ConnectorResult<()> {
        self.directory().await.map(|_| ())
    }

    /// Close the session; the next operation opens a new one
    pub async fn dispose(&self) {
        if let Some(directory) = self.current.lock().await.take() {
            directory.close().await;
            info!("Directory session closed");
        }
    }
}
