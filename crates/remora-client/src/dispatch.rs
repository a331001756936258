//! User-initiated torrent actions.
//!
//! Start/stop/verify/remove and single adds run concurrently, each on its
//! own task. Batch file adds go through a dedicated worker that sends one
//! `torrent-add` at a time. Action failures are reported on the bus but
//! never count against the poll failure streak.

use std::path::{Path, PathBuf};

use remora_rpc::methods;
use remora_rpc::request::{torrent_add_metainfo, torrent_add_url};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::ClientError;
use crate::model::{AddSource, TorrentAction, TorrentId};
use crate::session::ConnectionState;
use crate::shared::Shared;

const BATCH_QUEUE_DEPTH: usize = 16;

/// Handle to an action running in the background.
#[derive(Debug)]
pub struct ActionTicket {
    handle: JoinHandle<Result<(), ClientError>>,
}

impl ActionTicket {
    /// Wait for the daemon's answer.
    ///
    /// # Errors
    ///
    /// Returns the action's failure, or [`ClientError::Task`] if the task died.
    pub async fn wait(self) -> Result<(), ClientError> {
        self.handle
            .await
            .map_err(|source| ClientError::Task { source })?
    }
}

/// Result for one file of a batch add.
#[derive(Debug)]
pub struct AddOutcome {
    /// File that was submitted.
    pub path: PathBuf,
    /// Outcome of reading and submitting it.
    pub result: Result<(), ClientError>,
}

/// Handle to a queued batch add.
#[derive(Debug)]
pub struct BatchTicket {
    receiver: oneshot::Receiver<Vec<AddOutcome>>,
}

impl BatchTicket {
    /// Wait until every file of the batch was processed.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::WorkerUnavailable`] if the worker stopped first.
    pub async fn wait(self) -> Result<Vec<AddOutcome>, ClientError> {
        self.receiver
            .await
            .map_err(|_| ClientError::WorkerUnavailable)
    }
}

struct BatchJob {
    paths: Vec<PathBuf>,
    paused: bool,
    respond_to: oneshot::Sender<Vec<AddOutcome>>,
}

/// Issues torrent actions against the daemon.
pub struct ActionDispatcher {
    shared: Shared,
    connection: watch::Receiver<ConnectionState>,
    batches: mpsc::Sender<BatchJob>,
}

impl ActionDispatcher {
    pub(crate) fn new(shared: Shared, connection: watch::Receiver<ConnectionState>) -> Self {
        let (batches, jobs) = mpsc::channel(BATCH_QUEUE_DEPTH);
        spawn_batch_worker(shared.clone(), jobs);
        Self {
            shared,
            connection,
            batches,
        }
    }

    fn ensure_connected(&self) -> Result<(), ClientError> {
        if *self.connection.borrow() == ConnectionState::Connected {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    /// Run `action` on `ids`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::EmptySelection`] for an empty `ids` and
    /// [`ClientError::NotConnected`] without a session; no request is sent
    /// in either case.
    pub fn submit(
        &self,
        action: TorrentAction,
        ids: &[TorrentId],
    ) -> Result<ActionTicket, ClientError> {
        if ids.is_empty() {
            return Err(ClientError::EmptySelection);
        }
        self.ensure_connected()?;

        let shared = self.shared.clone();
        let request = action.request(ids);
        debug!(%action, ids = ?ids, "submitting torrent action");
        let handle = tokio::spawn(async move {
            shared.call(request).await.map(|_| ()).map_err(|source| {
                let err = ClientError::Rpc {
                    operation: action.method(),
                    source,
                };
                let message = err.user_message();
                shared.status(format!("Unable to {action}: {message}"));
                shared.error(message);
                err
            })
        });
        Ok(ActionTicket { handle })
    }

    /// Add one torrent from a link or a local file.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] without a session.
    pub fn submit_add(&self, source: AddSource, paused: bool) -> Result<ActionTicket, ClientError> {
        self.ensure_connected()?;

        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            let result = match &source {
                AddSource::Url(url) => send_add(&shared, torrent_add_url(url, paused)).await,
                AddSource::File(path) => add_file(&shared, path, paused).await,
            };
            if let Err(err) = &result {
                shared.error(err.user_message());
            } else {
                info!(source = %source, "torrent added");
            }
            result
        });
        Ok(ActionTicket { handle })
    }

    /// Queue local `.torrent` files for strictly sequential submission.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::EmptySelection`] for an empty batch,
    /// [`ClientError::NotConnected`] without a session and
    /// [`ClientError::WorkerUnavailable`] if the worker has stopped.
    pub async fn submit_add_batch(
        &self,
        paths: Vec<PathBuf>,
        paused: bool,
    ) -> Result<BatchTicket, ClientError> {
        if paths.is_empty() {
            return Err(ClientError::EmptySelection);
        }
        self.ensure_connected()?;

        let (respond_to, receiver) = oneshot::channel();
        self.batches
            .send(BatchJob {
                paths,
                paused,
                respond_to,
            })
            .await
            .map_err(|_| ClientError::WorkerUnavailable)?;
        Ok(BatchTicket { receiver })
    }
}

fn spawn_batch_worker(shared: Shared, mut jobs: mpsc::Receiver<BatchJob>) {
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            let total = job.paths.len();
            let mut outcomes = Vec::with_capacity(total);
            for path in job.paths {
                let result = add_file(&shared, &path, job.paused).await;
                if let Err(err) = &result {
                    shared.error(err.user_message());
                }
                outcomes.push(AddOutcome { path, result });
            }
            let failed = outcomes.iter().filter(|item| item.result.is_err()).count();
            info!(total, failed, "batch add finished");
            // The submitter may have stopped waiting.
            let _ = job.respond_to.send(outcomes);
        }
        debug!("batch worker stopped");
    });
}

async fn add_file(shared: &Shared, path: &Path, paused: bool) -> Result<(), ClientError> {
    let metainfo = tokio::fs::read(path)
        .await
        .map_err(|source| ClientError::TorrentFile {
            path: path.to_path_buf(),
            source,
        })?;
    send_add(shared, torrent_add_metainfo(&metainfo, paused)).await
}

async fn send_add(shared: &Shared, request: remora_rpc::RpcRequest) -> Result<(), ClientError> {
    shared
        .call(request)
        .await
        .map(|_| ())
        .map_err(|source| ClientError::Rpc {
            operation: methods::TORRENT_ADD,
            source,
        })
}
