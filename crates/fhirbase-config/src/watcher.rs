//! File watcher for hot-reloading notification channel endpoints.
//!
//! Watches the tenant's backing TOML file with a debounced filesystem
//! watcher and re-parses it on change. Only `[channels]` may actually change
//! in place; a reload that touches anything else is logged and rejected.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use tokio::sync::{RwLock, mpsc};
use tracing::{error, info, warn};

use crate::ConfigError;
use crate::events::ConfigChangeEvent;
use crate::tenant::TenantConfig;

pub struct ConfigWatcher {
    path: PathBuf,
    debounce: Duration,
}

/// Running watcher; dropping the handle stops the background task.
pub struct WatchHandle {
    shutdown: tokio::sync::oneshot::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl WatchHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.task.await;
    }
}

impl ConfigWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            debounce: Duration::from_millis(500),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching. On every file change, re-parses the file and applies
    /// it to `config` via [`TenantConfig::apply_channel_reload`], emitting a
    /// [`ConfigChangeEvent`] on `tx` describing the outcome.
    pub async fn watch(
        &self,
        config: Arc<RwLock<TenantConfig>>,
        tx: mpsc::Sender<ConfigChangeEvent>,
    ) -> Result<WatchHandle, ConfigError> {
        let path = self.path.clone();
        let debounce = self.debounce;
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();

        let watch_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let task = tokio::spawn(async move {
            let (notify_tx, notify_rx) = std::sync::mpsc::channel();
            let mut debouncer = match new_debouncer(debounce, notify_tx) {
                Ok(d) => d,
                Err(e) => {
                    error!("failed to create config file watcher: {e}");
                    return;
                }
            };
            if let Err(e) = debouncer
                .watcher()
                .watch(&watch_dir, RecursiveMode::NonRecursive)
            {
                error!("failed to watch {:?}: {e}", watch_dir);
                return;
            }

            info!("watching tenant config file: {:?}", path);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("config watcher shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        while let Ok(Ok(events)) = notify_rx.try_recv() {
                            let touched = events
                                .iter()
                                .any(|e| e.path.file_name() == path.file_name());
                            if !touched {
                                continue;
                            }

                            let reloaded = match TenantConfig::from_file(&path) {
                                Ok(c) => c,
                                Err(e) => {
                                    warn!("failed to reload tenant config: {e}");
                                    continue;
                                }
                            };

                            let mut guard = config.write().await;
                            let event = match guard.apply_channel_reload(reloaded) {
                                Ok(()) => ConfigChangeEvent::reloaded_channels(),
                                Err(e) => {
                                    warn!("rejected config reload: {e}");
                                    ConfigChangeEvent::rejected(e.to_string())
                                }
                            };
                            drop(guard);

                            if tx.send(event).await.is_err() {
                                warn!("config change receiver dropped");
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(WatchHandle {
            shutdown: shutdown_tx,
            task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ConfigOperation;
    use tempfile::TempDir;
    use tokio::time::timeout;

    const BASE: &str = r#"
route = "default"
base_url = "http://localhost:8080/fhir"
fhir_version = "4.3.0"
enabled_resource_types = ["Patient"]

[channels.rest-hook]
endpoint = "http://localhost:9000/hook"
"#;

    #[tokio::test]
    async fn reload_updates_channel_endpoint() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tenant.toml");
        std::fs::write(&path, BASE).unwrap();

        let config = Arc::new(RwLock::new(TenantConfig::from_file(&path).unwrap()));
        let (tx, mut rx) = mpsc::channel(10);
        let watcher = ConfigWatcher::new(&path).with_debounce(Duration::from_millis(50));
        let handle = watcher.watch(config.clone(), tx).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;

        std::fs::write(
            &path,
            BASE.replace("http://localhost:9000/hook", "http://localhost:9001/hook"),
        )
        .unwrap();

        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for reload event")
            .expect("channel closed");
        assert_eq!(event.operation, ConfigOperation::Reloaded);

        let guard = config.read().await;
        assert_eq!(
            guard.channels["rest-hook"].endpoint,
            "http://localhost:9001/hook"
        );

        handle.stop().await;
    }
}
