use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Runtime switch for network blocking, read fresh on every request.
///
/// Cloning shares the flag. Disabling does not unregister anything: every
/// layer still fires and simply allows.
#[derive(Debug, Clone)]
pub struct BlockingToggle {
    enabled: Arc<AtomicBool>,
}

impl BlockingToggle {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }
}

impl Default for BlockingToggle {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let toggle = BlockingToggle::default();
        let other = toggle.clone();
        assert!(other.is_enabled());
        toggle.set_enabled(false);
        assert!(!other.is_enabled());
    }
}
