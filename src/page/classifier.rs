use super::signals::AdSignalSet;
use crate::config::ClassifierConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdState {
    #[default]
    NoAd,
    Ad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    AdStarted,
    AdEnded,
}

/// Scoring rule: enough independent indicators, a skip control on its own,
/// or the player's ad class corroborated by an overlay or ad text.
pub fn is_ad(config: &ClassifierConfig, signals: &AdSignalSet) -> bool {
    signals.primary_count() >= config.min_primary_indicators
        || (config.skip_button_definitive && signals.skip_button_present)
        || (signals.player_has_ad_class && (signals.overlay_present || signals.ad_text_present))
}

/// Edge-triggered ad state. Only changes of state are reported.
#[derive(Debug)]
pub struct AdClassifier {
    config: ClassifierConfig,
    state: AdState,
}

impl AdClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            state: AdState::NoAd,
        }
    }

    pub fn state(&self) -> AdState {
        self.state
    }

    pub fn observe(&mut self, signals: &AdSignalSet) -> Option<Transition> {
        let next = if is_ad(&self.config, signals) {
            AdState::Ad
        } else {
            AdState::NoAd
        };
        if next == self.state {
            return None;
        }
        self.state = next;
        Some(match next {
            AdState::Ad => Transition::AdStarted,
            AdState::NoAd => Transition::AdEnded,
        })
    }

    pub fn reset(&mut self) {
        self.state = AdState::NoAd;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn with_primary(index: usize) -> AdSignalSet {
        let mut s = AdSignalSet::default();
        match index {
            0 => s.player_has_ad_class = true,
            1 => s.overlay_present = true,
            2 => s.ad_text_present = true,
            3 => s.skip_button_present = true,
            4 => s.image_overlay_present = true,
            5 => s.preview_text_present = true,
            6 => s.progress_bar_present = true,
            _ => s.url_ad_marker = true,
        }
        s
    }

    #[test]
    fn test_player_class_needs_corroboration() {
        let config = ClassifierConfig::default();
        let mut signals = AdSignalSet {
            player_has_ad_class: true,
            ..Default::default()
        };
        assert!(!is_ad(&config, &signals));
        signals.ad_text_present = true;
        assert!(is_ad(&config, &signals));
    }

    #[test]
    fn test_skip_button_alone() {
        let mut config = ClassifierConfig::default();
        let signals = with_primary(3);
        assert!(is_ad(&config, &signals));
        config.skip_button_definitive = false;
        assert!(!is_ad(&config, &signals));
    }

    #[test]
    fn test_threshold_is_configurable() {
        let config = ClassifierConfig {
            min_primary_indicators: 3,
            ..Default::default()
        };
        let mut signals = with_primary(4);
        signals.url_ad_marker = true;
        assert!(!is_ad(&config, &signals));
        signals.progress_bar_present = true;
        assert!(is_ad(&config, &signals));
    }

    #[test]
    fn test_transitions_are_edge_triggered() {
        let mut classifier = AdClassifier::new(ClassifierConfig::default());
        let ad = AdSignalSet {
            player_has_ad_class: true,
            overlay_present: true,
            ..Default::default()
        };
        assert_eq!(classifier.observe(&AdSignalSet::default()), None);
        assert_eq!(classifier.observe(&ad), Some(Transition::AdStarted));
        assert_eq!(classifier.observe(&ad), None);
        assert_eq!(classifier.state(), AdState::Ad);
        assert_eq!(classifier.observe(&AdSignalSet::default()), Some(Transition::AdEnded));

        classifier.observe(&ad);
        classifier.reset();
        assert_eq!(classifier.state(), AdState::NoAd);
    }

    proptest! {
        #[test]
        fn single_non_skip_indicator_is_not_an_ad(index in 0usize..8) {
            prop_assume!(index != 3);
            let config = ClassifierConfig::default();
            prop_assert!(!is_ad(&config, &with_primary(index)));
        }

        #[test]
        fn two_indicators_are_an_ad(a in 0usize..8, b in 0usize..8) {
            prop_assume!(a != b);
            let mut signals = with_primary(a);
            let other = with_primary(b);
            signals.player_has_ad_class |= other.player_has_ad_class;
            signals.overlay_present |= other.overlay_present;
            signals.ad_text_present |= other.ad_text_present;
            signals.skip_button_present |= other.skip_button_present;
            signals.image_overlay_present |= other.image_overlay_present;
            signals.preview_text_present |= other.preview_text_present;
            signals.progress_bar_present |= other.progress_bar_present;
            signals.url_ad_marker |= other.url_ad_marker;
            prop_assert!(is_ad(&ClassifierConfig::default(), &signals));
        }
    }
}
