//! Concurrent batch-download orchestration.
//!
//! Given a URL list, the manager runs a bounded number of downloads in
//! parallel, tracks per-item progress, isolates per-item failures, and
//! reports aggregate completion. All extraction work is delegated to the
//! [`Extractor`]; this is coordination only.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, Mutex, RwLock, Semaphore};
use tracing::{debug, info, warn};

use crate::core::config::DownloadConfig;
use crate::core::extractor::{Extractor, ExtractorEvent, ExtractorOptions};
use crate::core::ffmpeg;
use crate::core::models::{
    AppError, AppResult, BatchReport, DownloadTask, OutputKind, ProgressUpdate, TaskStatus,
};

/// Events published while a batch runs.
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    TaskQueued {
        task_id: String,
        url: String,
    },
    TaskStarted {
        task_id: String,
        title: Option<String>,
    },
    TaskProgress {
        task_id: String,
        update: ProgressUpdate,
    },
    TaskConverting {
        task_id: String,
    },
    TaskCompleted {
        task_id: String,
        output_file: PathBuf,
    },
    TaskFailed {
        task_id: String,
        error: String,
    },
    TaskCancelled {
        task_id: String,
    },
}

impl DownloadEvent {
    pub fn task_id(&self) -> &str {
        match self {
            DownloadEvent::TaskQueued { task_id, .. }
            | DownloadEvent::TaskStarted { task_id, .. }
            | DownloadEvent::TaskProgress { task_id, .. }
            | DownloadEvent::TaskConverting { task_id }
            | DownloadEvent::TaskCompleted { task_id, .. }
            | DownloadEvent::TaskFailed { task_id, .. }
            | DownloadEvent::TaskCancelled { task_id } => task_id,
        }
    }
}

/// Channel for communication between the manager and a front end.
pub type EventSender = mpsc::UnboundedSender<DownloadEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<DownloadEvent>;

/// Task map plus registration order, kept together so reports stay stable.
#[derive(Default)]
struct TaskStore {
    tasks: HashMap<String, DownloadTask>,
    order: Vec<String>,
}

/// Main download manager that orchestrates batch jobs.
pub struct DownloadManager {
    config: DownloadConfig,
    extractor: Extractor,
    store: Arc<RwLock<TaskStore>>,
    /// Semaphore to limit concurrent downloads
    semaphore: Arc<Semaphore>,
    event_sender: Option<EventSender>,
    active: Arc<Mutex<HashMap<String, tokio::task::AbortHandle>>>,
    /// Test/override seam; `run_batch` falls back to PATH discovery.
    ffmpeg_location: Option<PathBuf>,
}

impl DownloadManager {
    /// Create a new download manager with the given configuration
    pub fn new(config: DownloadConfig) -> AppResult<Self> {
        Self::with_extractor(config, Extractor::new())
    }

    pub fn with_extractor(config: DownloadConfig, extractor: Extractor) -> AppResult<Self> {
        if config.concurrent_downloads == 0 {
            return Err(AppError::Config(
                "concurrent_downloads must be greater than 0".to_string(),
            ));
        }

        let concurrent_downloads = config.concurrent_downloads;
        Ok(Self {
            config,
            extractor,
            store: Arc::new(RwLock::new(TaskStore::default())),
            semaphore: Arc::new(Semaphore::new(concurrent_downloads)),
            event_sender: None,
            active: Arc::new(Mutex::new(HashMap::new())),
            ffmpeg_location: None,
        })
    }

    /// Attach the event channel a front end listens on.
    pub fn set_event_sender(&mut self, sender: EventSender) {
        self.event_sender = Some(sender);
    }

    /// Pin the ffmpeg location instead of discovering it per batch.
    pub fn set_ffmpeg_location(&mut self, location: PathBuf) {
        self.ffmpeg_location = Some(location);
    }

    /// Register one task per URL up front, so every item is visible before
    /// any of them starts.
    pub async fn add_batch(&self, urls: Vec<String>) -> Vec<DownloadTask> {
        let mut registered = Vec::with_capacity(urls.len());
        let mut store = self.store.write().await;

        for url in urls {
            let task = DownloadTask::new(url.clone());
            self.emit(DownloadEvent::TaskQueued {
                task_id: task.id.clone(),
                url,
            });
            store.order.push(task.id.clone());
            store.tasks.insert(task.id.clone(), task.clone());
            registered.push(task);
        }

        info!("📋 Registered {} batch tasks", registered.len());
        registered
    }

    /// Run every pending task to a terminal state and report the aggregate.
    ///
    /// Failures are isolated per item: one failed download never aborts its
    /// siblings. At most `concurrent_downloads` items run at once.
    pub async fn run_batch(&self, kind: OutputKind) -> AppResult<BatchReport> {
        let ffmpeg_location = match &self.ffmpeg_location {
            Some(location) => location.clone(),
            // Fail fast before spawning anything when ffmpeg is missing.
            None => ffmpeg::locate_ffmpeg()?,
        };

        let output_dir = PathBuf::from(&self.config.output_directory);
        tokio::fs::create_dir_all(&output_dir).await?;

        let options = ExtractorOptions::new(
            kind,
            output_dir,
            ffmpeg_location,
            self.config.user_agent.clone(),
        );

        let pending: Vec<(String, String)> = {
            let store = self.store.read().await;
            store
                .order
                .iter()
                .filter_map(|id| store.tasks.get(id))
                .filter(|task| task.status == TaskStatus::Pending)
                .map(|task| (task.id.clone(), task.url.clone()))
                .collect()
        };

        info!(
            "🚀 Starting batch of {} downloads (limit {})",
            pending.len(),
            self.config.concurrent_downloads
        );

        let batch_ids: Vec<String> = pending.iter().map(|(id, _)| id.clone()).collect();
        let mut handles = Vec::with_capacity(pending.len());

        for (task_id, url) in pending {
            let worker = ItemWorker {
                task_id: task_id.clone(),
                url,
                options: options.clone(),
                extractor: self.extractor.clone(),
                store: Arc::clone(&self.store),
                event_sender: self.event_sender.clone(),
                retry_attempts: self.config.retry_attempts.max(1),
            };
            let semaphore = Arc::clone(&self.semaphore);

            let handle = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                worker.run().await;
            });

            // cancel_all aborts through this map while we keep the join
            // handles for completion.
            self.active
                .lock()
                .await
                .insert(task_id, handle.abort_handle());
            handles.push(handle);
        }

        for handle in handles {
            let _ = handle.await;
        }

        {
            let mut active = self.active.lock().await;
            for id in &batch_ids {
                active.remove(id);
            }
        }

        // Anything still non-terminal at this point was torn down mid-flight.
        {
            let mut store = self.store.write().await;
            for id in &batch_ids {
                if let Some(task) = store.tasks.get_mut(id) {
                    if !task.status.is_terminal() {
                        task.status = TaskStatus::Cancelled;
                        task.updated_at = chrono::Utc::now();
                    }
                }
            }
        }

        let report = self.report_for(&batch_ids).await;
        info!(
            "🏁 Batch finished: {}/{} completed, {} failed, {} cancelled",
            report.completed, report.total, report.failed, report.cancelled
        );
        Ok(report)
    }

    /// Abort all in-flight downloads and mark their tasks cancelled.
    pub async fn cancel_all(&self) -> usize {
        let handles: Vec<(String, tokio::task::AbortHandle)> =
            self.active.lock().await.drain().collect();

        let mut cancelled = 0;
        for (task_id, handle) in handles {
            handle.abort();
            let mut store = self.store.write().await;
            if let Some(task) = store.tasks.get_mut(&task_id) {
                if !task.status.is_terminal() {
                    task.status = TaskStatus::Cancelled;
                    task.updated_at = chrono::Utc::now();
                    cancelled += 1;
                    self.emit(DownloadEvent::TaskCancelled { task_id });
                }
            }
        }

        if cancelled > 0 {
            info!("🛑 Cancelled {} in-flight downloads", cancelled);
        }
        cancelled
    }

    /// Snapshot of all tasks in registration order.
    pub async fn tasks(&self) -> Vec<DownloadTask> {
        let store = self.store.read().await;
        store
            .order
            .iter()
            .filter_map(|id| store.tasks.get(id).cloned())
            .collect()
    }

    pub async fn get_task(&self, task_id: &str) -> Option<DownloadTask> {
        self.store.read().await.tasks.get(task_id).cloned()
    }

    async fn report_for(&self, ids: &[String]) -> BatchReport {
        let store = self.store.read().await;
        let mut report = BatchReport {
            total: ids.len(),
            ..BatchReport::default()
        };

        for id in ids {
            match store.tasks.get(id).map(|t| t.status) {
                Some(TaskStatus::Completed) => report.completed += 1,
                Some(TaskStatus::Failed) => report.failed += 1,
                _ => report.cancelled += 1,
            }
        }
        report
    }

    fn emit(&self, event: DownloadEvent) {
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(event);
        }
    }
}

/// Everything one batch item needs, detached from the manager borrow.
struct ItemWorker {
    task_id: String,
    url: String,
    options: ExtractorOptions,
    extractor: Extractor,
    store: Arc<RwLock<TaskStore>>,
    event_sender: Option<EventSender>,
    retry_attempts: usize,
}

impl ItemWorker {
    async fn run(self) {
        debug!("▶️ Starting batch item {} ({})", self.task_id, self.url);

        // Probe first so the title is known while the download runs, exactly
        // like the terminal flow shows "Downloading: <title>".
        let title = match self.extractor.probe(&self.url).await {
            Ok(preview) => Some(preview.title),
            Err(AppError::InvalidUrl(url)) => {
                self.fail(format!("Invalid YouTube URL: {}", url)).await;
                return;
            }
            Err(e) => {
                self.fail(e.to_string()).await;
                return;
            }
        };

        self.transition(TaskStatus::Downloading, title.clone()).await;
        self.emit(DownloadEvent::TaskStarted {
            task_id: self.task_id.clone(),
            title,
        });

        match self.download_with_retry().await {
            Ok(output_file) => {
                {
                    let mut store = self.store.write().await;
                    if let Some(task) = store.tasks.get_mut(&self.task_id) {
                        task.status = TaskStatus::Completed;
                        task.progress = 100.0;
                        task.output_file = Some(output_file.clone());
                        task.updated_at = chrono::Utc::now();
                    }
                }
                self.emit(DownloadEvent::TaskCompleted {
                    task_id: self.task_id.clone(),
                    output_file,
                });
            }
            Err(e) => self.fail(e.to_string()).await,
        }
    }

    async fn download_with_retry(&self) -> AppResult<PathBuf> {
        let mut attempt = 0;
        loop {
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let forwarder = self.spawn_event_forwarder(events_rx);

            let result = self
                .extractor
                .download(&self.url, &self.options, Some(events_tx))
                .await;
            let _ = forwarder.await;

            match result {
                Ok(file) => return Ok(file),
                // A bad URL never gets better with retries.
                Err(AppError::InvalidUrl(url)) => return Err(AppError::InvalidUrl(url)),
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.retry_attempts {
                        return Err(e);
                    }
                    let delay = retry_delay(attempt);
                    warn!(
                        "Retrying {} in {:?} (attempt {}/{}): {}",
                        self.url, delay, attempt + 1, self.retry_attempts, e
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn spawn_event_forwarder(
        &self,
        mut events_rx: mpsc::UnboundedReceiver<ExtractorEvent>,
    ) -> tokio::task::JoinHandle<()> {
        let task_id = self.task_id.clone();
        let store = Arc::clone(&self.store);
        let sender = self.event_sender.clone();

        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                match event {
                    ExtractorEvent::Progress(update) => {
                        {
                            let mut store = store.write().await;
                            if let Some(task) = store.tasks.get_mut(&task_id) {
                                task.progress = update.percent;
                                task.downloaded_bytes = update.downloaded_bytes;
                                task.total_bytes = update.total_bytes;
                                task.speed = update.speed;
                                task.eta_seconds = update.eta_seconds;
                                task.updated_at = chrono::Utc::now();
                            }
                        }
                        if let Some(sender) = &sender {
                            let _ = sender.send(DownloadEvent::TaskProgress {
                                task_id: task_id.clone(),
                                update,
                            });
                        }
                    }
                    ExtractorEvent::Converting => {
                        {
                            let mut store = store.write().await;
                            if let Some(task) = store.tasks.get_mut(&task_id) {
                                task.status = TaskStatus::Converting;
                                task.updated_at = chrono::Utc::now();
                            }
                        }
                        if let Some(sender) = &sender {
                            let _ = sender.send(DownloadEvent::TaskConverting {
                                task_id: task_id.clone(),
                            });
                        }
                    }
                }
            }
        })
    }

    async fn transition(&self, status: TaskStatus, title: Option<String>) {
        let mut store = self.store.write().await;
        if let Some(task) = store.tasks.get_mut(&self.task_id) {
            task.status = status;
            if title.is_some() {
                task.title = title;
            }
            task.updated_at = chrono::Utc::now();
        }
    }

    async fn fail(&self, error: String) {
        warn!("❌ Batch item {} failed: {}", self.task_id, error);
        {
            let mut store = self.store.write().await;
            if let Some(task) = store.tasks.get_mut(&self.task_id) {
                task.status = TaskStatus::Failed;
                task.error_message = Some(error.clone());
                task.updated_at = chrono::Utc::now();
            }
        }
        self.emit(DownloadEvent::TaskFailed {
            task_id: self.task_id.clone(),
            error,
        });
    }

    fn emit(&self, event: DownloadEvent) {
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(event);
        }
    }
}

/// Exponential backoff with 20% jitter, capped at one minute.
fn retry_delay(attempt: usize) -> Duration {
    let base = Duration::from_millis(500);
    let exponential = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1) as u32));
    let capped = exponential.min(Duration::from_secs(60));

    let jitter = rand::thread_rng().gen_range(0.8..=1.2);
    capped.mul_f64(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DownloadConfig;

    #[test]
    fn test_manager_rejects_zero_concurrency() {
        let config = DownloadConfig {
            concurrent_downloads: 0,
            ..DownloadConfig::default()
        };
        assert!(DownloadManager::new(config).is_err());
    }

    #[tokio::test]
    async fn test_add_batch_registers_all_tasks_pending() {
        let manager = DownloadManager::new(DownloadConfig::default()).unwrap();
        let tasks = manager
            .add_batch(vec![
                "https://youtu.be/one".to_string(),
                "https://youtu.be/two".to_string(),
            ])
            .await;

        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Pending));

        let snapshot = manager.tasks().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].url, "https://youtu.be/one");
        assert_eq!(snapshot[1].url, "https://youtu.be/two");

        let looked_up = manager.get_task(&tasks[0].id).await.unwrap();
        assert_eq!(looked_up.url, tasks[0].url);
        assert!(manager.get_task("no-such-id").await.is_none());
    }

    #[tokio::test]
    async fn test_queued_events_are_emitted() {
        let mut manager = DownloadManager::new(DownloadConfig::default()).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.set_event_sender(tx);

        manager
            .add_batch(vec!["https://youtu.be/one".to_string()])
            .await;

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, DownloadEvent::TaskQueued { .. }));
    }

    #[test]
    fn test_retry_delay_grows_and_caps() {
        let first = retry_delay(1);
        assert!(first >= Duration::from_millis(400));
        assert!(first <= Duration::from_millis(600));

        // Deep attempts saturate at the cap (plus jitter headroom).
        let deep = retry_delay(30);
        assert!(deep <= Duration::from_secs(72));
        assert!(deep >= Duration::from_secs(48));
    }
}
