//! Worker Pool Manager (spec.md §4.11): owns the at-most-one-worker-per-
//! account invariant, spawns/stops Worker OS processes, and routes
//! commands/events between them and the control plane. Generalizes the
//! teacher's `EventBus` fan-out shape (`infrastructure::event_bus`) from an
//! in-process `Vec<Arc<dyn EventListener>>` to a `tokio::sync::broadcast`
//! channel, since subscribers here (the control API's `/events` websocket)
//! live across an HTTP connection rather than inside this process's heap.

use crate::application::ipc::{InboundCommand, OutboundEvent};
use crate::config::model::AccountProfile;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("account {0} already has a running worker")]
    AlreadyRunning(String),
    #[error("no running worker for account {0}")]
    NotRunning(String),
    #[error("failed to spawn worker process: {0}")]
    SpawnFailed(#[from] std::io::Error),
    #[error("worker for account {0} did not accept the command (channel closed)")]
    SendFailed(String),
}

struct WorkerHandle {
    command_tx: mpsc::UnboundedSender<InboundCommand>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
    child: Child,
    profile: AccountProfile,
}

/// Supervises one Worker OS process per account. `worker_binary` is the
/// path to the sibling `worker` executable (see `src/bin/worker.rs`),
/// spawned once per account with `--account-id`/`--profile` arguments.
pub struct PoolManager {
    worker_binary: std::path::PathBuf,
    workers: HashMap<String, WorkerHandle>,
    events_tx: broadcast::Sender<OutboundEvent>,
    dead_tx: mpsc::UnboundedSender<String>,
    dead_rx: mpsc::UnboundedReceiver<String>,
}

impl PoolManager {
    pub fn new(worker_binary: std::path::PathBuf) -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        Self { worker_binary, workers: HashMap::new(), events_tx, dead_tx, dead_rx }
    }

    /// Subscribe to the global outbound event stream (every worker's events,
    /// tagged by `account_id` inside each `OutboundEvent` variant).
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundEvent> {
        self.events_tx.subscribe()
    }

    /// Drops any worker whose reader task observed a `WorkerFailed` event
    /// since the last call (spec.md §4.11 item 4: a failed worker is
    /// removed from the live set, restart is an outer supervisor's job).
    /// Every method that reads or mutates `workers` calls this first so the
    /// live set never reports a worker that has already died.
    fn reap_dead(&mut self) {
        while let Ok(account_id) = self.dead_rx.try_recv() {
            if let Some(mut handle) = self.workers.remove(&account_id) {
                handle.reader_task.abort();
                handle.writer_task.abort();
                let _ = handle.child.start_kill();
                warn!(account_id, "worker failed, removed from live set");
            }
        }
    }

    pub fn is_running(&mut self, account_id: &str) -> bool {
        self.reap_dead();
        self.workers.contains_key(account_id)
    }

    pub fn running_accounts(&mut self) -> Vec<String> {
        self.reap_dead();
        self.workers.keys().cloned().collect()
    }

    /// Spawns a Worker process for `account_id`. Refuses a second worker for
    /// the same account unless `force` is set, in which case the existing
    /// one is stopped first.
    pub async fn start_worker(
        &mut self,
        account_id: &str,
        profile: &AccountProfile,
        force: bool,
    ) -> Result<(), PoolError> {
        self.reap_dead();
        if self.workers.contains_key(account_id) {
            if !force {
                return Err(PoolError::AlreadyRunning(account_id.to_string()));
            }
            self.stop_worker(account_id).await?;
        }

        let profile_json = serde_json::to_string(profile).map_err(|e| {
            PoolError::SpawnFailed(std::io::Error::other(format!("failed to encode account profile: {e}")))
        })?;

        let mut child = Command::new(&self.worker_binary)
            .arg("--account-id")
            .arg(account_id)
            .arg("--profile")
            .arg(&profile_json)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().expect("piped stdin");
        let stdout = child.stdout.take().expect("piped stdout");

        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<InboundCommand>();
        let writer_task = tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(command) = command_rx.recv().await {
                let line = crate::application::ipc::encode_line(&command);
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    error!(error = %e, "failed to write command to worker stdin");
                    break;
                }
            }
        });

        let events_tx = self.events_tx.clone();
        let dead_tx = self.dead_tx.clone();
        let account_id_owned = account_id.to_string();
        let reader_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match crate::application::ipc::decode_line::<OutboundEvent>(&line) {
                        Ok(event) => {
                            if let OutboundEvent::WorkerFailed { ref account_id } = event {
                                let _ = dead_tx.send(account_id.clone());
                            }
                            let _ = events_tx.send(event);
                        }
                        Err(e) => warn!(account_id = %account_id_owned, error = %e, "dropping malformed worker event"),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        error!(account_id = %account_id_owned, error = %e, "failed to read worker stdout");
                        break;
                    }
                }
            }
        });

        self.workers.insert(
            account_id.to_string(),
            WorkerHandle { command_tx, reader_task, writer_task, child, profile: profile.clone() },
        );
        info!(account_id, "worker started");
        Ok(())
    }

    /// Current profile the worker is running with, as last known to the
    /// pool (updated on `start_worker`/`reload_profile`, not re-fetched
    /// from the worker itself).
    pub fn current_profile(&mut self, account_id: &str) -> Option<&AccountProfile> {
        self.reap_dead();
        self.workers.get(account_id).map(|h| &h.profile)
    }

    /// Swaps in a new resolved profile and pushes it to the worker via
    /// `ReloadCurrencies` (spec.md §4.10); the worker applies it atomically
    /// between cycles.
    pub fn reload_profile(&mut self, account_id: &str, profile: AccountProfile) -> Result<(), PoolError> {
        self.reap_dead();
        self.send(account_id, InboundCommand::ReloadCurrencies { profile: profile.clone() })?;
        if let Some(handle) = self.workers.get_mut(account_id) {
            handle.profile = profile;
        }
        Ok(())
    }

    /// Sends `Shutdown`, waits up to `SHUTDOWN_GRACE` for a clean exit, then
    /// force-kills. Isolation invariant (spec.md §4.3): this never touches
    /// any other worker's process.
    pub async fn stop_worker(&mut self, account_id: &str) -> Result<(), PoolError> {
        self.reap_dead();
        let mut handle = self.workers.remove(account_id).ok_or_else(|| PoolError::NotRunning(account_id.to_string()))?;

        let _ = handle.command_tx.send(InboundCommand::Shutdown);
        drop(handle.command_tx);

        let exited = tokio::time::timeout(SHUTDOWN_GRACE, handle.child.wait()).await;
        if exited.is_err() {
            warn!(account_id, "worker did not exit within grace period, killing");
            let _ = handle.child.kill().await;
        }

        handle.reader_task.abort();
        handle.writer_task.abort();
        info!(account_id, "worker stopped");
        Ok(())
    }

    pub fn send(&self, account_id: &str, command: InboundCommand) -> Result<(), PoolError> {
        let handle = self.workers.get(account_id).ok_or_else(|| PoolError::NotRunning(account_id.to_string()))?;
        handle.command_tx.send(command).map_err(|_| PoolError::SendFailed(account_id.to_string()))
    }

    /// Fans `GetStatus` out to every running worker; replies arrive
    /// asynchronously on the shared event stream as `StatusReport` events.
    pub fn broadcast_status(&mut self) {
        self.reap_dead();
        for account_id in self.workers.keys() {
            if let Err(e) = self.send(account_id, InboundCommand::GetStatus) {
                warn!(account_id, error = %e, "failed to request status");
            }
        }
    }
}
