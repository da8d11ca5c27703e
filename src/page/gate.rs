use super::signals::is_ad_class;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    TimeUpdate,
    Play,
    Playing,
    Seeking,
    Other,
}

/// Everything that may prompt the page to look at the player again.
#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    Tick,
    /// Nodes were added under the player; carries their class names.
    Mutation { added_classes: Vec<String> },
    PlayerEvent(PlayerEvent),
    Navigation,
}

impl Trigger {
    pub fn mutation<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Mutation {
            added_classes: classes.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this trigger can change the ad classification.
    pub fn is_relevant(&self) -> bool {
        match self {
            Trigger::Tick | Trigger::Navigation => true,
            Trigger::Mutation { added_classes } => added_classes.iter().any(|c| is_ad_class(c)),
            Trigger::PlayerEvent(e) => *e != PlayerEvent::Other,
        }
    }
}

/// Collapses all producers into one reclassify signal, at most once per
/// `min_interval`. A relevant trigger arriving too early is remembered and
/// admitted by the next trigger of any kind once the interval has passed.
#[derive(Debug)]
pub struct ReclassifyGate {
    min_interval: Duration,
    last: Option<Instant>,
    pending: bool,
}

impl ReclassifyGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
            pending: false,
        }
    }

    pub fn admit(&mut self, trigger: &Trigger, now: Instant) -> bool {
        if !trigger.is_relevant() && !self.pending {
            return false;
        }
        let ready = self
            .last
            .map_or(true, |last| now.saturating_duration_since(last) >= self.min_interval);
        if !ready {
            self.pending = true;
            return false;
        }
        self.last = Some(now);
        self.pending = false;
        true
    }

    pub fn has_pending(&self) -> bool {
        self.pending
    }

    /// Forgets timing state, e.g. after navigation.
    pub fn reset(&mut self) {
        self.last = None;
        self.pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_irrelevant_mutations_are_ignored() {
        let mut gate = ReclassifyGate::new(Duration::from_millis(100));
        let now = Instant::now();
        assert!(!gate.admit(&Trigger::mutation(["ytp-chrome-bottom"]), now));
        assert!(!gate.admit(&Trigger::PlayerEvent(PlayerEvent::Other), now));
        assert!(gate.admit(&Trigger::mutation(["ytp-ad-module"]), now));
    }

    #[test]
    fn test_bursts_collapse_to_one() {
        let mut gate = ReclassifyGate::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(gate.admit(&Trigger::Tick, t0));
        assert!(!gate.admit(&Trigger::PlayerEvent(PlayerEvent::TimeUpdate), t0 + Duration::from_millis(10)));
        assert!(!gate.admit(&Trigger::mutation(["ad-showing"]), t0 + Duration::from_millis(20)));
        assert!(gate.has_pending());

        // Pending work is flushed by the next trigger, even an irrelevant one
        let later = t0 + Duration::from_millis(150);
        assert!(gate.admit(&Trigger::PlayerEvent(PlayerEvent::Other), later));
        assert!(!gate.has_pending());
    }
}
