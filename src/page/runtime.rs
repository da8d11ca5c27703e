use super::actuator::MitigationActuator;
use super::classifier::{AdClassifier, AdState, Transition};
use super::context::{SharedPageContext, VideoContext};
use super::dom::PageDom;
use super::features::{FeatureKind, FeatureSet};
use super::gate::{ReclassifyGate, Trigger};
use super::messages::{accept, MessageEnvelope, PageMessage, Peer, VideoInfo};
use super::signals::AdSignalSet;
use crate::config::ClassifierConfig;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

const TITLE_SUFFIX: &str = " - YouTube";

/// `v` parameter of a watch-page URL.
pub fn video_id_from(location: &str) -> Option<String> {
    let url = Url::parse(location).ok()?;
    if url.path() != "/watch" {
        return None;
    }
    url.query_pairs()
        .find(|(k, _)| k == "v")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Everything that runs inside the embedded page, driven by triggers and
/// host messages on a single logical thread.
pub struct PageRuntime<D: PageDom> {
    dom: D,
    context: Arc<SharedPageContext>,
    classifier: AdClassifier,
    actuator: MitigationActuator,
    gate: ReclassifyGate,
    features: FeatureSet,
    outbox: mpsc::Sender<MessageEnvelope>,
    tick_interval: Duration,
    last_location: Option<String>,
}

impl<D: PageDom> PageRuntime<D> {
    pub fn new(
        dom: D,
        config: &ClassifierConfig,
        context: Arc<SharedPageContext>,
        outbox: mpsc::Sender<MessageEnvelope>,
    ) -> Self {
        Self {
            dom,
            context,
            classifier: AdClassifier::new(config.clone()),
            actuator: MitigationActuator::new(config.clone()),
            gate: ReclassifyGate::new(Duration::from_millis(config.min_reclassify_interval_ms)),
            features: FeatureSet::new(),
            outbox,
            tick_interval: Duration::from_millis(config.tick_interval_ms.max(1)),
            last_location: None,
        }
    }

    pub fn dom(&self) -> &D {
        &self.dom
    }

    pub fn dom_mut(&mut self) -> &mut D {
        &mut self.dom
    }

    pub fn context(&self) -> &Arc<SharedPageContext> {
        &self.context
    }

    pub fn ad_state(&self) -> AdState {
        self.classifier.state()
    }

    pub fn actuator(&self) -> &MitigationActuator {
        &self.actuator
    }

    /// Asks the host for settings and reports the current video.
    pub fn start(&mut self, now: Instant) {
        self.send(PageMessage::RequestSettings);
        self.check_location(now);
    }

    pub fn handle(&mut self, trigger: Trigger, now: Instant) {
        if matches!(trigger, Trigger::Tick | Trigger::Navigation) {
            self.check_location(now);
        }
        let snapshot = self.context.snapshot();
        self.features.on_trigger(&trigger, &mut self.dom, &snapshot, now);
        if self.gate.admit(&trigger, now) && snapshot.settings.ad_blocking_enabled {
            self.reclassify(now);
        }
    }

    pub fn handle_message(&mut self, envelope: MessageEnvelope, now: Instant) {
        let Some(message) = accept(Peer::Host, envelope) else {
            return;
        };
        match message {
            PageMessage::UpdateSettings(patch) => {
                let before = self.context.snapshot().settings.clone();
                self.context.update(|ctx| ctx.settings = ctx.settings.merged(&patch));
                let snapshot = self.context.snapshot();
                if before.ad_blocking_enabled && !snapshot.settings.ad_blocking_enabled {
                    info!("Ad blocking disabled, restoring page");
                    self.actuator.restore(&mut self.dom);
                    self.classifier.reset();
                }
                self.features
                    .settings_changed(&before, &mut self.dom, &snapshot, now);
            }
            PageMessage::SponsorSegmentsUpdated(payload) => {
                self.context.update(|ctx| {
                    if let Some(video) = ctx.video.as_mut() {
                        video.sponsor_segments = payload.segments.clone();
                    }
                });
                self.refresh_feature(FeatureKind::SponsorSkip, now);
            }
            PageMessage::DearrowDataUpdated(branding) => {
                self.context.update(|ctx| {
                    if let Some(video) = ctx.video.as_mut() {
                        video.branding = Some(branding.clone());
                    }
                });
                self.refresh_feature(FeatureKind::Branding, now);
            }
            PageMessage::DislikeDataUpdated(dislikes) => {
                self.context.update(|ctx| {
                    if let Some(video) = ctx.video.as_mut() {
                        video.dislikes = Some(dislikes);
                    }
                });
                self.refresh_feature(FeatureKind::Dislikes, now);
            }
            PageMessage::InitializeAdBlocking => {
                self.gate.reset();
                if self.context.snapshot().settings.ad_blocking_enabled {
                    self.reclassify(now);
                }
            }
            PageMessage::VideoIdChanged(_) | PageMessage::RequestSettings => {
                debug!("Ignoring page-bound message from host");
            }
        }
    }

    /// Drives the runtime until the host inbox closes.
    pub async fn run(
        mut self,
        mut inbox: mpsc::Receiver<MessageEnvelope>,
        mut triggers: mpsc::Receiver<Trigger>,
    ) -> D {
        let mut ticker = tokio::time::interval(self.tick_interval);
        self.start(Instant::now());
        loop {
            tokio::select! {
                _ = ticker.tick() => self.handle(Trigger::Tick, Instant::now()),
                msg = inbox.recv() => match msg {
                    Some(envelope) => self.handle_message(envelope, Instant::now()),
                    None => break,
                },
                Some(trigger) = triggers.recv() => self.handle(trigger, Instant::now()),
            }
        }
        self.actuator.restore(&mut self.dom);
        self.features.cleanup_all(&mut self.dom);
        self.dom
    }

    fn refresh_feature(&mut self, kind: FeatureKind, now: Instant) {
        let snapshot = self.context.snapshot();
        self.features.refresh(kind, &mut self.dom, &snapshot, now);
    }

    fn reclassify(&mut self, now: Instant) {
        let signals = AdSignalSet::sample(&self.dom);
        match self.classifier.observe(&signals) {
            Some(Transition::AdStarted) => {
                self.actuator.on_ad_started(&mut self.dom, &signals, now);
            }
            Some(Transition::AdEnded) => {
                info!("Ad ended");
                self.actuator.restore(&mut self.dom);
            }
            None if self.classifier.state() == AdState::Ad => {
                self.actuator.on_still_in_ad(&mut self.dom, now);
            }
            None => {
                if self.actuator.is_active() {
                    self.actuator.restore(&mut self.dom);
                }
            }
        }
    }

    fn check_location(&mut self, now: Instant) {
        let location = self.dom.location();
        if self.last_location.as_deref() == Some(location.as_str()) {
            return;
        }
        debug!("Page location changed to {}", location);
        self.last_location = Some(location.clone());

        // Any ad episode ends with the page it was on
        self.actuator.restore(&mut self.dom);
        self.classifier.reset();
        self.gate.reset();

        let new_id = video_id_from(&location);
        let current_id = self.context.snapshot().video.as_ref().map(|v| v.video_id.clone());
        if new_id == current_id {
            return;
        }
        self.features.cleanup_all(&mut self.dom);

        match new_id {
            Some(video_id) => {
                let document_title = self.dom.document_title();
                let title = document_title
                    .strip_suffix(TITLE_SUFFIX)
                    .unwrap_or(&document_title)
                    .to_string();
                info!("Video changed to {}", video_id);
                self.context.update(|ctx| {
                    ctx.video = Some(VideoContext::new(&video_id, &title, &location));
                });
                self.send(PageMessage::VideoIdChanged(VideoInfo {
                    video_id,
                    url: location,
                    title,
                }));
            }
            None => self.context.update(|ctx| ctx.video = None),
        }
        let snapshot = self.context.snapshot();
        self.features.apply_enabled(&mut self.dom, &snapshot, now);
    }

    fn send(&self, message: PageMessage) {
        if let Err(e) = self.outbox.try_send(MessageEnvelope::from_page(message)) {
            warn!("Dropping message to host: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::memory::{MediaState, MemoryPage};
    use crate::settings::{FeatureSettings, SettingsPatch};

    fn runtime(location: &str) -> (PageRuntime<MemoryPage>, mpsc::Receiver<MessageEnvelope>) {
        let (tx, rx) = mpsc::channel(16);
        let context = Arc::new(SharedPageContext::new(FeatureSettings::default()));
        let config = ClassifierConfig {
            min_reclassify_interval_ms: 0,
            ..Default::default()
        };
        (PageRuntime::new(MemoryPage::new(location), &config, context, tx), rx)
    }

    #[test]
    fn test_video_id_from() {
        assert_eq!(
            video_id_from("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(video_id_from("https://www.youtube.com/results?v=abc"), None);
        assert_eq!(video_id_from("https://www.youtube.com/watch?v="), None);
        assert_eq!(video_id_from("not a url"), None);
    }

    #[test]
    fn test_start_reports_video() {
        let (mut rt, mut rx) = runtime("https://www.youtube.com/watch?v=abc");
        rt.dom_mut().set_document_title("Some video - YouTube");
        rt.start(Instant::now());

        assert_eq!(rx.try_recv().unwrap().message, PageMessage::RequestSettings);
        let env = rx.try_recv().unwrap();
        assert_eq!(env.source, Peer::Page);
        assert_eq!(
            env.message,
            PageMessage::VideoIdChanged(VideoInfo {
                video_id: "abc".into(),
                url: "https://www.youtube.com/watch?v=abc".into(),
                title: "Some video".into(),
            })
        );
    }

    #[test]
    fn test_navigation_ends_ad_episode() {
        let (mut rt, _rx) = runtime("https://www.youtube.com/watch?v=abc");
        let body = rt.dom().root();
        let player = rt
            .dom_mut()
            .add(body, "div", Some("movie_player"), &["ad-showing"]);
        rt.dom_mut().add(player, "div", None, &["ytp-ad-player-overlay"]);
        let video = rt.dom_mut().add_video(player, MediaState::playing(120.0));
        let t0 = Instant::now();
        rt.start(t0);

        rt.handle(Trigger::Tick, t0);
        assert_eq!(rt.ad_state(), AdState::Ad);
        assert!(rt.dom().query("#ytview-ad-banner").is_some());

        rt.dom_mut().set_location("https://www.youtube.com/watch?v=def");
        rt.handle(Trigger::Navigation, t0 + Duration::from_secs(1));
        // The ad classes are still present so the new page reclassifies,
        // but the previous episode was fully restored first
        assert_eq!(rt.context().snapshot().video.as_ref().map(|v| v.video_id.as_str()), Some("def"));

        rt.dom_mut().remove_class(player, "ad-showing");
        rt.handle(Trigger::Tick, t0 + Duration::from_secs(2));
        assert_eq!(rt.ad_state(), AdState::NoAd);
        assert!(rt.dom().query("#ytview-ad-banner").is_none());
        assert_eq!(rt.dom().style(video, "visibility"), None);
    }

    #[test]
    fn test_disabling_ad_blocking_restores() {
        let (mut rt, _rx) = runtime("https://www.youtube.com/watch?v=abc");
        let body = rt.dom().root();
        let player = rt.dom_mut().add(body, "div", Some("movie_player"), &[]);
        rt.dom_mut().add(player, "button", None, &["ytp-ad-skip-button"]);
        rt.dom_mut().add_video(player, MediaState::playing(120.0));
        let now = Instant::now();
        rt.handle(Trigger::Tick, now);
        assert!(rt.actuator().is_active());

        rt.handle_message(
            MessageEnvelope::from_host(PageMessage::UpdateSettings(SettingsPatch {
                ad_blocking_enabled: Some(false),
                ..Default::default()
            })),
            now,
        );
        assert!(!rt.actuator().is_active());
        assert_eq!(rt.ad_state(), AdState::NoAd);

        // Further ticks leave the page alone
        rt.handle(Trigger::Tick, now + Duration::from_secs(1));
        assert!(rt.dom().query("#ytview-ad-banner").is_none());
    }

    #[test]
    fn test_messages_from_page_are_rejected() {
        let (mut rt, _rx) = runtime("https://www.youtube.com/");
        rt.handle_message(
            MessageEnvelope::from_page(PageMessage::UpdateSettings(SettingsPatch {
                dearrow_enabled: Some(false),
                ..Default::default()
            })),
            Instant::now(),
        );
        assert!(rt.context().snapshot().settings.dearrow_enabled);
    }

    #[tokio::test]
    async fn test_run_stops_when_host_hangs_up() {
        let (rt, mut outbox) = runtime("https://www.youtube.com/watch?v=abc");
        let (host_tx, host_rx) = mpsc::channel(4);
        let (_trigger_tx, trigger_rx) = mpsc::channel(4);
        let task = tokio::spawn(rt.run(host_rx, trigger_rx));

        let first = outbox.recv().await.unwrap();
        assert_eq!(first.message, PageMessage::RequestSettings);
        drop(host_tx);
        let page = task.await.unwrap();
        assert_eq!(page.location(), "https://www.youtube.com/watch?v=abc");
    }
}
