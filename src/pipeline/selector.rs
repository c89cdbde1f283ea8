use parking_lot::RwLock;

/// Which monitored subject the capture session belongs to.
///
/// Changed only by explicit operator action. Reads happen on every sampler
/// tick, so a change applies from the next tick on without restarting the
/// session or the channel.
#[derive(Debug, Default)]
pub struct SessionSelector {
    subject: RwLock<Option<String>>,
}

impl SessionSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a subject. Blank ids clear the selection.
    pub fn select(&self, subject_id: impl Into<String>) {
        let id = subject_id.into();
        let id = id.trim();
        *self.subject.write() = if id.is_empty() {
            None
        } else {
            Some(id.to_string())
        };
    }

    pub fn clear(&self) {
        *self.subject.write() = None;
    }

    pub fn current(&self) -> Option<String> {
        self.subject.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_none() {
        let selector = SessionSelector::new();
        assert_eq!(selector.current(), None);
    }

    #[test]
    fn select_and_change() {
        let selector = SessionSelector::new();
        selector.select("s1");
        assert_eq!(selector.current().as_deref(), Some("s1"));
        selector.select("s2");
        assert_eq!(selector.current().as_deref(), Some("s2"));
    }

    #[test]
    fn blank_selection_clears() {
        let selector = SessionSelector::new();
        selector.select("s1");
        selector.select("   ");
        assert_eq!(selector.current(), None);
    }

    #[test]
    fn clear_removes_selection() {
        let selector = SessionSelector::new();
        selector.select("s1");
        selector.clear();
        assert_eq!(selector.current(), None);
    }
}
