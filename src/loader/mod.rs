//! Background loader service.
//!
//! A long-lived tokio task that owns the network side of the application. It
//! answers control messages from at most one registered client, runs one load
//! at a time in its own task, and forwards that task's progress to whichever
//! client is registered when the message is produced.
//!
//! A load is: `NowLoading`, one `CategoryLoaded` per fetched category,
//! `RssLoadComplete`, thumbnails with `ThumbLoaded`/`UpdateLoadProgress`, and
//! finally `FullLoadComplete`. A stopped load still ends with
//! `FullLoadComplete` once it has gone quiet.

mod fetcher;
mod thumbs;

pub use fetcher::{parse_items, FetchError, Fetcher};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::protocol::{ControlMessage, ErrorKind, LoaderMessage};
use crate::storage::Database;

/// Control channel depth.
const CONTROL_BUFFER: usize = 32;

/// Internal progress channel depth.
const EVENT_BUFFER: usize = 256;

/// Thumbnails fetched per category in one load.
const THUMBNAILS_PER_CATEGORY: i64 = 50;

#[derive(Debug, Clone)]
pub struct LoaderSettings {
    pub request_timeout: Duration,
    pub max_concurrent_thumbnails: usize,
    pub load_in_background: bool,
}

impl LoaderSettings {
    pub fn from_config(config: &Config, load_in_background: bool) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            max_concurrent_thumbnails: config.max_concurrent_thumbnails,
            load_in_background,
        }
    }
}

struct RunningLoad {
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
    /// `RssLoadComplete` has been produced.
    feeds_done: bool,
    /// Latest `UpdateLoadProgress` as (total, loaded).
    progress: Option<(u32, u32)>,
}

impl RunningLoad {
    fn observe(&mut self, event: &LoaderMessage) {
        match event {
            LoaderMessage::RssLoadComplete => self.feeds_done = true,
            LoaderMessage::UpdateLoadProgress {
                total_items,
                items_loaded,
            } => self.progress = Some((*total_items, *items_loaded)),
            _ => {}
        }
    }

    /// Messages that bring a newly registered client up to this load's stage.
    fn catch_up(&self) -> Vec<LoaderMessage> {
        let mut out = vec![LoaderMessage::NowLoading];
        if self.feeds_done {
            out.push(LoaderMessage::RssLoadComplete);
        }
        if let Some((total_items, items_loaded)) = self.progress {
            out.push(LoaderMessage::UpdateLoadProgress {
                total_items,
                items_loaded,
            });
        }
        out
    }
}

struct LoaderService {
    db: Database,
    fetcher: Fetcher,
    settings: LoaderSettings,
    client: Option<mpsc::Sender<LoaderMessage>>,
    current: Option<RunningLoad>,
    events_tx: mpsc::Sender<LoaderMessage>,
}

/// Start the loader service. Returns the control handle and the service task.
///
/// The service exits when every control sender has been dropped and no load
/// is running.
pub fn spawn(
    db: Database,
    fetcher: Fetcher,
    settings: LoaderSettings,
) -> (mpsc::Sender<ControlMessage>, JoinHandle<()>) {
    let (control_tx, control_rx) = mpsc::channel(CONTROL_BUFFER);
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

    let service = LoaderService {
        db,
        fetcher,
        settings,
        client: None,
        current: None,
        events_tx,
    };
    let task = tokio::spawn(service.run(control_rx, events_rx));
    (control_tx, task)
}

impl LoaderService {
    async fn run(
        mut self,
        mut control_rx: mpsc::Receiver<ControlMessage>,
        mut events_rx: mpsc::Receiver<LoaderMessage>,
    ) {
        tracing::debug!("Loader service started");
        let mut control_open = true;

        loop {
            tokio::select! {
                msg = control_rx.recv(), if control_open => match msg {
                    Some(msg) => self.handle_control(msg).await,
                    None => {
                        control_open = false;
                        if self.current.is_none() {
                            break;
                        }
                    }
                },
                Some(event) = events_rx.recv() => {
                    if let Some(load) = self.current.as_mut() {
                        load.observe(&event);
                    }
                    let finished = event == LoaderMessage::FullLoadComplete;
                    self.forward(event).await;
                    if finished {
                        self.current = None;
                        if !control_open {
                            break;
                        }
                    }
                }
            }
        }
        tracing::debug!("Loader service stopped");
    }

    async fn handle_control(&mut self, msg: ControlMessage) {
        match msg {
            ControlMessage::RegisterClient { reply } => {
                tracing::debug!(loading = self.current.is_some(), "Client registered");
                self.client = Some(reply);
                self.forward(LoaderMessage::ClientRegistered).await;
                // A late client picks up a load already in flight
                let catch_up = self.current.as_ref().map(RunningLoad::catch_up);
                for message in catch_up.into_iter().flatten() {
                    self.forward(message).await;
                }
            }
            ControlMessage::UnregisterClient => {
                tracing::debug!("Client unregistered");
                self.client = None;
                if !self.settings.load_in_background {
                    self.stop_current();
                }
            }
            ControlMessage::LoadData => {
                if self.current.is_some() {
                    tracing::debug!("Load already running, ignoring LoadData");
                    return;
                }
                self.start_load();
            }
            ControlMessage::StopDataLoad => self.stop_current(),
        }
    }

    fn start_load(&mut self) {
        let stop = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run_load(
            self.db.clone(),
            self.fetcher.clone(),
            self.settings.max_concurrent_thumbnails,
            Arc::clone(&stop),
            self.events_tx.clone(),
        ));
        self.current = Some(RunningLoad {
            stop,
            task,
            feeds_done: false,
            progress: None,
        });
        tracing::info!("Load started");
    }

    fn stop_current(&mut self) {
        if let Some(load) = &self.current {
            tracing::info!(finished = load.task.is_finished(), "Stopping load");
            load.stop.store(true, Ordering::Relaxed);
        }
    }

    /// Send to the registered client, dropping the client if it has gone.
    async fn forward(&mut self, message: LoaderMessage) {
        let Some(client) = &self.client else {
            tracing::trace!(message = message.name(), "No client registered, dropping");
            return;
        };
        let result = client.send(message).await;
        if result.is_err() {
            tracing::debug!("Client receiver dropped, unregistering");
            self.client = None;
            if !self.settings.load_in_background {
                self.stop_current();
            }
        }
    }
}

// ============================================================================
// Load Task
// ============================================================================

async fn run_load(
    db: Database,
    fetcher: Fetcher,
    concurrency: usize,
    stop: Arc<AtomicBool>,
    events: mpsc::Sender<LoaderMessage>,
) {
    emit(&events, LoaderMessage::NowLoading).await;

    if let Err(error) = load_all(&db, &fetcher, concurrency, &stop, &events).await {
        report(&events, "The load could not be completed", &error).await;
    }

    emit(&events, LoaderMessage::FullLoadComplete).await;
}

async fn load_all(
    db: &Database,
    fetcher: &Fetcher,
    concurrency: usize,
    stop: &AtomicBool,
    events: &mpsc::Sender<LoaderMessage>,
) -> Result<(), FetchError> {
    let categories: Vec<_> = db
        .get_all_categories()
        .await
        .map_err(|e| FetchError::Database(e.to_string()))?
        .into_iter()
        .filter(|c| c.enabled)
        .collect();

    for category in &categories {
        if stop.load(Ordering::Relaxed) {
            return Ok(());
        }
        match fetcher.fetch_category(db, category).await {
            Ok(new_items) => {
                tracing::info!(category = %category.name, new_items, "Category loaded");
                emit(
                    events,
                    LoaderMessage::CategoryLoaded {
                        category: category.name.clone(),
                    },
                )
                .await;
            }
            Err(e @ FetchError::Database(_)) => return Err(e),
            Err(e) => {
                tracing::warn!(category = %category.name, error = %e, "Category load failed");
                report(events, &format!("Could not load {}", category.name), &e).await;
            }
        }
    }

    if stop.load(Ordering::Relaxed) {
        return Ok(());
    }
    emit(events, LoaderMessage::RssLoadComplete).await;

    let mut pending = Vec::new();
    for category in &categories {
        let mut batch = db
            .items_needing_thumbnails(&category.name, THUMBNAILS_PER_CATEGORY)
            .await
            .map_err(|e| FetchError::Database(e.to_string()))?;
        pending.append(&mut batch);
    }
    // Feeds overlap; fetch each item once
    let mut seen = std::collections::HashSet::new();
    pending.retain(|p| seen.insert(p.item_id));

    thumbs::load_thumbnails(fetcher, db, pending, concurrency, stop, events).await
}

async fn report(events: &mpsc::Sender<LoaderMessage>, message: &str, error: &FetchError) {
    let kind = error.kind();
    if kind == ErrorKind::Fatal {
        tracing::error!(error = %error, "Store write failed during load");
    }
    emit(events, LoaderMessage::error(kind, message, error.to_string())).await;
}

async fn emit(events: &mpsc::Sender<LoaderMessage>, message: LoaderMessage) {
    if events.send(message).await.is_err() {
        tracing::debug!("Loader service gone, dropping event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CategorySeed;
    use tokio::time::timeout;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WORLD_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><guid>w1</guid><title>World one</title></item>
    <item><guid>w2</guid><title>World two</title></item>
</channel></rss>"#;

    fn settings(load_in_background: bool) -> LoaderSettings {
        LoaderSettings {
            request_timeout: Duration::from_secs(5),
            max_concurrent_thumbnails: 2,
            load_in_background,
        }
    }

    fn fetcher() -> Fetcher {
        Fetcher::with_client(
            reqwest::Client::new(),
            Duration::from_secs(5),
            Duration::from_millis(1),
        )
    }

    async fn setup(server: &MockServer) -> Database {
        let db = Database::open(":memory:").await.unwrap();
        db.seed_default_categories(&[
            CategorySeed {
                name: "World".into(),
                url: format!("{}/world.xml", server.uri()),
                enabled: true,
            },
            CategorySeed {
                name: "UK".into(),
                url: format!("{}/uk.xml", server.uri()),
                enabled: true,
            },
            CategorySeed {
                name: "Sport".into(),
                url: format!("{}/sport.xml", server.uri()),
                enabled: false,
            },
        ])
        .await
        .unwrap();
        db
    }

    async fn register(control: &mpsc::Sender<ControlMessage>) -> mpsc::Receiver<LoaderMessage> {
        let (reply, mut rx) = mpsc::channel(256);
        control
            .send(ControlMessage::RegisterClient { reply })
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(LoaderMessage::ClientRegistered));
        rx
    }

    /// Collect messages up to and including `FullLoadComplete`.
    async fn collect_load(rx: &mut mpsc::Receiver<LoaderMessage>) -> Vec<LoaderMessage> {
        let mut out = Vec::new();
        loop {
            let msg = timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("loader timed out")
                .expect("loader channel closed");
            let done = msg == LoaderMessage::FullLoadComplete;
            out.push(msg);
            if done {
                return out;
            }
        }
    }

    #[tokio::test]
    async fn test_full_load_message_sequence() {
        let server = MockServer::start().await;
        Mock::given(path("/world.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(WORLD_RSS))
            .mount(&server)
            .await;
        Mock::given(path("/uk.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let db = setup(&server).await;
        let (control, _task) = spawn(db.clone(), fetcher(), settings(true));
        let mut rx = register(&control).await;

        control.send(ControlMessage::LoadData).await.unwrap();
        let messages = collect_load(&mut rx).await;

        assert_eq!(messages[0], LoaderMessage::NowLoading);
        assert_eq!(
            messages[1],
            LoaderMessage::CategoryLoaded {
                category: "World".into()
            }
        );
        assert!(matches!(
            &messages[2],
            LoaderMessage::ErrorOccurred {
                kind: ErrorKind::General,
                message: Some(m),
                ..
            } if m == "Could not load UK"
        ));
        assert_eq!(messages[3], LoaderMessage::RssLoadComplete);

        // No thumbnail URLs, so both items get the marker
        let thumbs = messages
            .iter()
            .filter(|m| matches!(m, LoaderMessage::ThumbLoaded { .. }))
            .count();
        assert_eq!(thumbs, 2);
        assert_eq!(db.get_items("World", 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_stop_ends_with_full_load_complete() {
        let server = MockServer::start().await;
        Mock::given(path("/world.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(WORLD_RSS)
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        Mock::given(path("/uk.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(WORLD_RSS))
            .mount(&server)
            .await;

        let db = setup(&server).await;
        let (control, _task) = spawn(db, fetcher(), settings(true));
        let mut rx = register(&control).await;

        control.send(ControlMessage::LoadData).await.unwrap();
        assert_eq!(rx.recv().await, Some(LoaderMessage::NowLoading));
        control.send(ControlMessage::StopDataLoad).await.unwrap();

        let messages = collect_load(&mut rx).await;
        assert!(!messages.contains(&LoaderMessage::RssLoadComplete));
        assert_eq!(messages.last(), Some(&LoaderMessage::FullLoadComplete));
    }

    #[tokio::test]
    async fn test_second_load_data_while_running_is_ignored() {
        let server = MockServer::start().await;
        Mock::given(path("/world.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(WORLD_RSS)
                    .set_delay(Duration::from_millis(100)),
            )
            .mount(&server)
            .await;
        Mock::given(path("/uk.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(WORLD_RSS))
            .mount(&server)
            .await;

        let db = setup(&server).await;
        let (control, _task) = spawn(db, fetcher(), settings(true));
        let mut rx = register(&control).await;

        control.send(ControlMessage::LoadData).await.unwrap();
        control.send(ControlMessage::LoadData).await.unwrap();
        let messages = collect_load(&mut rx).await;
        let starts = messages
            .iter()
            .filter(|m| **m == LoaderMessage::NowLoading)
            .count();
        assert_eq!(starts, 1);

        // Nothing else queued after the single load
        assert!(timeout(Duration::from_millis(200), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_unregister_without_background_loading_stops_load() {
        let server = MockServer::start().await;
        Mock::given(path("/world.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(WORLD_RSS)
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        Mock::given(path("/uk.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(WORLD_RSS))
            .expect(0)
            .mount(&server)
            .await;

        let db = setup(&server).await;
        let (control, task) = spawn(db, fetcher(), settings(false));
        let mut rx = register(&control).await;

        control.send(ControlMessage::LoadData).await.unwrap();
        assert_eq!(rx.recv().await, Some(LoaderMessage::NowLoading));
        control.send(ControlMessage::UnregisterClient).await.unwrap();

        // Service exits once the stopped load has finished and control is closed
        drop(control);
        timeout(Duration::from_secs(10), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_late_client_sees_load_in_progress() {
        let server = MockServer::start().await;
        Mock::given(path("/world.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(WORLD_RSS)
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        Mock::given(path("/uk.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(WORLD_RSS))
            .mount(&server)
            .await;

        let db = setup(&server).await;
        let (control, _task) = spawn(db, fetcher(), settings(true));
        control.send(ControlMessage::LoadData).await.unwrap();

        let mut rx = register(&control).await;
        assert_eq!(rx.recv().await, Some(LoaderMessage::NowLoading));
        let messages = collect_load(&mut rx).await;
        assert_eq!(messages.last(), Some(&LoaderMessage::FullLoadComplete));
    }

    #[tokio::test]
    async fn test_late_client_during_thumbnails_catches_up_to_stage() {
        let server = MockServer::start().await;
        let rss = format!(
            r#"<?xml version="1.0"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/"><channel>
    <item><guid>p1</guid><title>Pictured</title><media:thumbnail url="{0}/p1.jpg"/></item>
    <item><guid>p2</guid><title>Pictured too</title><media:thumbnail url="{0}/p2.jpg"/></item>
</channel></rss>"#,
            server.uri()
        );
        Mock::given(path("/world.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss))
            .mount(&server)
            .await;
        Mock::given(path("/uk.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(WORLD_RSS))
            .mount(&server)
            .await;
        Mock::given(path("/p1.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;
        Mock::given(path("/p2.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![4u8, 5, 6])
                    .set_delay(Duration::from_millis(800)),
            )
            .mount(&server)
            .await;

        let db = setup(&server).await;
        let (control, _task) = spawn(db, fetcher(), settings(true));
        control.send(ControlMessage::LoadData).await.unwrap();

        // Feeds are fetched quickly; the second thumbnail is still in flight
        tokio::time::sleep(Duration::from_millis(400)).await;
        let mut rx = register(&control).await;

        assert_eq!(rx.recv().await, Some(LoaderMessage::NowLoading));
        assert_eq!(rx.recv().await, Some(LoaderMessage::RssLoadComplete));
        assert!(matches!(
            rx.recv().await,
            Some(LoaderMessage::UpdateLoadProgress { total_items, .. }) if total_items > 0
        ));

        let messages = collect_load(&mut rx).await;
        assert!(!messages.contains(&LoaderMessage::NowLoading));
        assert_eq!(messages.last(), Some(&LoaderMessage::FullLoadComplete));
    }
}
