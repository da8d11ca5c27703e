use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use ytview::api::{ApiClient, VideoDataService};
use ytview::config::Config;
use ytview::download::{DownloadEvent, DownloadFormat, DownloadRequest, Downloader};
use ytview::engine::{BlockingToggle, FilterListManager, PatternStore};
use ytview::init::{init_request_logger, init_settings, setup_logging};
use ytview::intercept::{InterceptedRequest, LocalPipeline, NetworkInterceptor};
use ytview::page::{
    accept, MemoryPage, MessageEnvelope, PageMessage, PageRuntime, Peer, SharedPageContext,
    Trigger,
};
use ytview::settings::{SettingsManager, SettingsPatch};
use ytview::stats::StatsRegistry;

const CONTEXTS: [&str; 2] = ["default", "persist:ytview"];
const HOME: &str = "https://www.youtube.com/";

/// Shared pieces the command loop needs.
struct Host {
    config: Config,
    pipeline: Arc<LocalPipeline>,
    stats: Arc<StatsRegistry>,
    settings: Arc<SettingsManager>,
    data: VideoDataService,
    downloader: Arc<Downloader>,
    refresh_tx: mpsc::Sender<()>,
    host_tx: mpsc::Sender<MessageEnvelope>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load Config
    let config_path = std::env::args().nth(1).unwrap_or("config.toml".to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        Config::load(&config_path).await?
    } else {
        Config::default()
    };

    // 2. Setup Logging
    setup_logging(&config);
    info!("Starting ytview...");

    if !std::path::Path::new(&config_path).exists() {
        info!("Config file not found, using defaults.");
    }

    // 3. Init Stats & Request Logger
    let stats = StatsRegistry::new();
    if config.stats.enable {
        stats.spawn_reporter(
            Duration::from_secs(config.stats.log_interval_seconds),
            config.stats.top_domains,
        );
    }
    let logger = init_request_logger(&config);

    // 4. Init Settings (drives the blocking toggle)
    let toggle = BlockingToggle::default();
    let settings = Arc::new(init_settings(&config, toggle.clone()).await);

    // 5. Init Pattern Store & Filter List Manager
    let store = Arc::new(PatternStore::new(config.filters.batch_size));
    let manager = Arc::new(FilterListManager::new(
        &config,
        &config.filter_cache_dir(),
        store.clone(),
    )?);

    // 6. Register Interception on every browsing context
    let pipeline = Arc::new(LocalPipeline::with_contexts(&CONTEXTS));
    let interceptor = Arc::new(NetworkInterceptor::new(
        pipeline.clone(),
        store.clone(),
        toggle,
        stats.clone(),
        logger,
    ));
    for context in CONTEXTS {
        let report = interceptor.setup(context);
        info!(
            "Context '{}': {} layers registered, {} failed{}",
            context,
            report.registered.len(),
            report.failed.len(),
            if report.fallback_installed {
                ", fallback installed"
            } else {
                ""
            }
        );
    }

    // 7. Initial Refresh & Periodic Updater
    let set = interceptor.refresh(manager.as_ref(), false).await;
    info!("Active filter set: {} patterns", set.len());

    let update_interval = Duration::from_secs(config.filters.refresh_interval_hours.max(1) * 3600);
    let (refresh_tx, mut refresh_rx) = mpsc::channel::<()>(1);
    {
        let interceptor = interceptor.clone();
        let manager = manager.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(update_interval);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                let force = tokio::select! {
                    _ = interval.tick() => {
                        info!("Scheduled filter list update...");
                        false
                    }
                    _ = refresh_rx.recv() => {
                        info!("Forced filter list update triggered...");
                        interval.reset();
                        true
                    }
                };
                let set = interceptor.refresh(manager.as_ref(), force).await;
                info!("Active filter set: {} patterns", set.len());
            }
        });
    }

    // 8. Page Runtime
    let (page_tx, mut page_rx) = mpsc::channel::<MessageEnvelope>(64);
    let (host_tx, mut host_rx) = mpsc::channel::<MessageEnvelope>(64);
    let page_context = Arc::new(SharedPageContext::new((*settings.get()).clone()));
    let mut page = PageRuntime::new(
        MemoryPage::new(HOME),
        &config.classifier,
        page_context,
        page_tx,
    );

    let host = Host {
        data: VideoDataService::new(Arc::new(ApiClient::new(&config.api)?)),
        downloader: Arc::new(Downloader::new(&config.filters.user_agent)?),
        config: config.clone(),
        pipeline,
        stats: stats.clone(),
        settings,
        refresh_tx,
        host_tx,
    };

    page.start(Instant::now());
    info!("Ready. Commands: check <url>, open <url>, set <flag> <bool>, reset, refresh, stats, download <url> [audio], quit");

    // 9. Command Loop
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_millis(config.classifier.tick_interval_ms.max(1)));
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !host.command(line.trim(), &mut page).await {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read command: {}", e);
                    break;
                }
            },
            _ = ticker.tick() => page.handle(Trigger::Tick, Instant::now()),
            Some(envelope) = page_rx.recv() => host.on_page_message(envelope),
            Some(envelope) = host_rx.recv() => page.handle_message(envelope, Instant::now()),
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    for context in CONTEXTS {
        interceptor.teardown(context);
    }
    stats.dump_stats(config.stats.top_domains);
    Ok(())
}

impl Host {
    /// Runs one command line. Returns `false` to quit.
    async fn command(&self, line: &str, page: &mut PageRuntime<MemoryPage>) -> bool {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (None, _, _) => {}
            (Some("quit" | "exit"), _, _) => return false,
            (Some("check"), Some(url), context) => {
                let context = context.unwrap_or(CONTEXTS[0]);
                let decision = self.pipeline.dispatch(&InterceptedRequest::new(context, url));
                println!("{:?} {}", decision, url);
            }
            (Some("open"), Some(url), _) => {
                page.dom_mut().set_location(url);
                page.handle(Trigger::Navigation, Instant::now());
            }
            (Some("set"), Some(flag), Some(value)) => match value.parse::<bool>() {
                Ok(value) => self.update_settings(flag, value, page).await,
                Err(_) => println!("expected true or false, got '{}'", value),
            },
            (Some("reset"), _, _) => {
                let result = self.settings.reset().await;
                self.push_settings(&SettingsPatch::from(&result.settings), page);
                println!("{}", serde_json::to_string(&result).unwrap_or_default());
            }
            (Some("refresh"), _, _) => {
                if self.refresh_tx.try_send(()).is_err() {
                    println!("refresh already pending");
                }
            }
            (Some("stats"), _, _) => {
                self.stats.dump_stats(self.config.stats.top_domains);
                for context in self.stats.contexts() {
                    let report = self.stats.for_context(&context).report(self.config.stats.top_domains);
                    println!("{} {}", context, serde_json::to_string(&report).unwrap_or_default());
                }
            }
            (Some("download"), Some(url), format) => self.download(url, format, page),
            _ => println!("unknown command: {}", line),
        }
        true
    }

    async fn update_settings(&self, flag: &str, value: bool, page: &mut PageRuntime<MemoryPage>) {
        let patch: SettingsPatch = serde_json::from_value(serde_json::json!({ flag: value }))
            .unwrap_or_default();
        if patch == SettingsPatch::default() {
            println!("unknown setting '{}'", flag);
            return;
        }
        let result = self.settings.update(&patch).await;
        if result.success {
            self.push_settings(&patch, page);
        }
        println!("{}", serde_json::to_string(&result).unwrap_or_default());
    }

    fn push_settings(&self, patch: &SettingsPatch, page: &mut PageRuntime<MemoryPage>) {
        page.handle_message(
            MessageEnvelope::from_host(PageMessage::UpdateSettings(patch.clone())),
            Instant::now(),
        );
    }

    fn download(&self, url: &str, format: Option<&str>, page: &PageRuntime<MemoryPage>) {
        if !self.settings.get().download_enabled {
            println!("downloads are disabled");
            return;
        }
        let format = match format {
            Some("audio") => DownloadFormat::Audio,
            _ => DownloadFormat::Video,
        };
        let title = page
            .context()
            .snapshot()
            .video
            .as_ref()
            .map(|v| v.title.clone())
            .unwrap_or_else(|| "download".to_string());
        let request = DownloadRequest {
            url: url.to_string(),
            format,
            title,
            output_dir: dirs::download_dir().unwrap_or_else(|| std::path::PathBuf::from(".")),
        };
        let downloader = self.downloader.clone();
        tokio::spawn(async move {
            let (tx, mut rx) = mpsc::channel(32);
            let task = tokio::spawn(async move { downloader.download(&request, tx).await });
            while let Some(event) = rx.recv().await {
                match event {
                    DownloadEvent::Progress { percent: Some(p), .. } if p % 10 == 0 => {
                        info!("Download {}%", p)
                    }
                    DownloadEvent::Progress { .. } => {}
                    DownloadEvent::Complete { path, .. } => println!("saved {}", path.display()),
                    DownloadEvent::Error { message, .. } => println!("download failed: {}", message),
                }
            }
            let _ = task.await;
        });
    }

    /// Answers messages sent by the page.
    fn on_page_message(&self, envelope: MessageEnvelope) {
        let Some(message) = accept(Peer::Page, envelope) else {
            return;
        };
        match message {
            PageMessage::RequestSettings => {
                let patch = SettingsPatch::from(&*self.settings.get());
                self.reply(PageMessage::UpdateSettings(patch));
            }
            PageMessage::VideoIdChanged(info) => {
                info!("Page is showing video {} ({})", info.video_id, info.title);
                let data = self.data.clone();
                let settings = self.settings.get();
                let host_tx = self.host_tx.clone();
                tokio::spawn(async move {
                    for message in data.lookup(&info.video_id, &settings).await {
                        if host_tx.send(MessageEnvelope::from_host(message)).await.is_err() {
                            break;
                        }
                    }
                });
                self.reply(PageMessage::InitializeAdBlocking);
            }
            other => warn!("Unexpected message from page: {:?}", other),
        }
    }

    fn reply(&self, message: PageMessage) {
        if let Err(e) = self.host_tx.try_send(MessageEnvelope::from_host(message)) {
            warn!("Dropping message to page: {}", e);
        }
    }
}
