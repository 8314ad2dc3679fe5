
use crate::alerts::ThresholdConfig;
use crate::controller::{
    AnalyticsController, AnalyticsView, LiveOutcome, QueryResolution, QueryTicket,
};
use crate::error::{AnalyticsError, StoreError};
use crate::reading::Reading;
use crate::series::MergeOutcome;
use crate::store::{ReadingStore, SubscriptionGuard};
use crate::window::RangeToken;
use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

#[derive(Debug)]
pub enum SessionCommand {
    SelectWindow {
        token: RangeToken,
        reply: oneshot::Sender<u64>,
    },
    Refresh,
    ReplaceThresholds(ThresholdConfig),
    Snapshot(oneshot::Sender<Vec<Reading>>),
    Shutdown,
}

#[derive(Debug)]
struct QueryCompletion {
    generation: u64,
    result: Result<Vec<Reading>, StoreError>,
}

#[derive(Debug, Default)]
pub struct SessionStats {
    pub queries_applied: AtomicU64,
    pub queries_failed: AtomicU64,
    pub stale_discarded: AtomicU64,
    pub live_applied: AtomicU64,
    pub live_deferred: AtomicU64,
    pub live_dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStatsSnapshot {
    pub queries_applied: u64,
    pub queries_failed: u64,
    pub stale_discarded: u64,
    pub live_applied: u64,
    pub live_deferred: u64,
    pub live_dropped: u64,
}

impl SessionStats {
    pub fn snapshot(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            queries_applied: self.queries_applied.load(Ordering::Relaxed),
            queries_failed: self.queries_failed.load(Ordering::Relaxed),
            stale_discarded: self.stale_discarded.load(Ordering::Relaxed),
            live_applied: self.live_applied.load(Ordering::Relaxed),
            live_deferred: self.live_deferred.load(Ordering::Relaxed),
            live_dropped: self.live_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
    view: watch::Receiver<Arc<AnalyticsView>>,
    stats: Arc<SessionStats>,
}

impl SessionHandle {
    /// Returns the generation assigned to the selection.
    pub async fn select_window(&self, token: RangeToken) -> Result<u64, AnalyticsError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::SelectWindow { token, reply }).await?;
        rx.await.map_err(|_| AnalyticsError::SessionClosed)
    }

    pub async fn refresh(&self) -> Result<(), AnalyticsError> {
        self.send(SessionCommand::Refresh).await
    }

    pub async fn replace_thresholds(
        &self,
        thresholds: ThresholdConfig,
    ) -> Result<(), AnalyticsError> {
        self.send(SessionCommand::ReplaceThresholds(thresholds)).await
    }

    pub async fn snapshot(&self) -> Result<Vec<Reading>, AnalyticsError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot(reply)).await?;
        rx.await.map_err(|_| AnalyticsError::SessionClosed)
    }

    pub async fn shutdown(&self) -> Result<(), AnalyticsError> {
        self.send(SessionCommand::Shutdown).await
    }

    /// Latest published view.
    pub fn view(&self) -> Arc<AnalyticsView> {
        self.view.borrow().clone()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<Arc<AnalyticsView>> {
        self.view.clone()
    }

    pub fn stats(&self) -> Arc<SessionStats> {
        self.stats.clone()
    }

    async fn send(&self, command: SessionCommand) -> Result<(), AnalyticsError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| AnalyticsError::SessionClosed)
    }
}

/// Start the session task. It owns `controller`, holds the one live subscription on `store`
/// and releases it when the task ends.
pub fn spawn_session<S: ReadingStore>(
    store: Arc<S>,
    controller: AnalyticsController,
    queue: usize,
) -> Result<(SessionHandle, JoinHandle<()>), StoreError> {
    let (guard, mut live) = SubscriptionGuard::acquire(store.clone())?;
    let (tx, mut rx) = mpsc::channel::<SessionCommand>(queue.max(1));
    let (view_tx, view_rx) = watch::channel(Arc::new(controller.view()));
    let stats = Arc::new(SessionStats::default());

    let handle = SessionHandle {
        tx,
        view: view_rx,
        stats: stats.clone(),
    };

    let task = tokio::spawn(async move {
        let mut controller = controller;
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<QueryCompletion>();
        let mut live_open = true;

        loop {
            tokio::select! {
                command = rx.recv() => {
                    match command {
                        Some(SessionCommand::SelectWindow { token, reply }) => {
                            let ticket = controller.select_window(token, Utc::now());
                            spawn_query(&store, ticket, &done_tx);
                            publish(&view_tx, &controller);
                            let _ = reply.send(ticket.generation);
                        }
                        Some(SessionCommand::Refresh) => {
                            if let Some(ticket) = controller.refresh(Utc::now()) {
                                spawn_query(&store, ticket, &done_tx);
                                publish(&view_tx, &controller);
                            }
                        }
                        Some(SessionCommand::ReplaceThresholds(thresholds)) => {
                            controller.replace_thresholds(thresholds);
                            publish(&view_tx, &controller);
                        }
                        Some(SessionCommand::Snapshot(reply)) => {
                            let _ = reply.send(controller.snapshot());
                        }
                        Some(SessionCommand::Shutdown) | None => break,
                    }
                }
                Some(done) = done_rx.recv() => {
                    match controller.complete_query(done.generation, done.result) {
                        QueryResolution::Applied { count } => {
                            stats.queries_applied.fetch_add(1, Ordering::Relaxed);
                            tracing::info!(
                                generation = done.generation,
                                count,
                                "window query applied"
                            );
                            publish(&view_tx, &controller);
                        }
                        QueryResolution::Failed { error } => {
                            stats.queries_failed.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(
                                generation = done.generation,
                                error = %error,
                                "window query failed; keeping last data"
                            );
                            publish(&view_tx, &controller);
                        }
                        QueryResolution::Stale { generation, current } => {
                            stats.stale_discarded.fetch_add(1, Ordering::Relaxed);
                            tracing::debug!(
                                generation,
                                current,
                                "discarded superseded query result"
                            );
                        }
                    }
                }
                event = live.recv(), if live_open => {
                    match event {
                        Some(reading) => match controller.on_live(reading) {
                            LiveOutcome::Merged(MergeOutcome::Applied) => {
                                stats.live_applied.fetch_add(1, Ordering::Relaxed);
                                publish(&view_tx, &controller);
                            }
                            LiveOutcome::Deferred => {
                                stats.live_deferred.fetch_add(1, Ordering::Relaxed);
                            }
                            outcome => {
                                stats.live_dropped.fetch_add(1, Ordering::Relaxed);
                                tracing::debug!(?outcome, "live reading dropped");
                            }
                        },
                        None => {
                            live_open = false;
                            tracing::warn!("live subscription closed by store");
                        }
                    }
                }
            }
        }

        guard.release();
        tracing::info!("analytics session stopped");
    });

    Ok((handle, task))
}

fn spawn_query<S: ReadingStore>(
    store: &Arc<S>,
    ticket: QueryTicket,
    done_tx: &mpsc::UnboundedSender<QueryCompletion>,
) {
    let store = store.clone();
    let done_tx = done_tx.clone();
    tokio::spawn(async move {
        let result = store.query(ticket.window.from, ticket.window.to).await;
        let _ = done_tx.send(QueryCompletion {
            generation: ticket.generation,
            result,
        });
    });
}

fn publish(view_tx: &watch::Sender<Arc<AnalyticsView>>, controller: &AnalyticsController) {
    view_tx.send_replace(Arc::new(controller.view()));
}
