use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Session and demo flags the live view is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModeFlags {
    pub session_id: Option<String>,
    pub demo_mode: bool,
}

impl ModeFlags {
    pub fn has_session(&self) -> bool {
        self.session_id.is_some()
    }

    /// True when data gathered under `self` must not be shown under `other`.
    pub fn is_switch_to(&self, other: &ModeFlags) -> bool {
        self.has_session() != other.has_session()
            || self.demo_mode != other.demo_mode
            || self.session_id != other.session_id
    }
}

/// Published by the session layer whenever login state or demo mode changes.
#[derive(Debug, Clone)]
pub struct ModeNotifier {
    tx: Arc<watch::Sender<ModeFlags>>,
}

impl ModeNotifier {
    pub fn new(initial: ModeFlags) -> Self {
        let (tx, _rx) = watch::channel(initial);
        ModeNotifier { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> ModeFlags {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ModeFlags> {
        self.tx.subscribe()
    }

    pub fn set_session(&self, session_id: Option<String>) {
        let changed = self.tx.send_if_modified(|flags| {
            if flags.session_id == session_id {
                return false;
            }
            flags.session_id = session_id;
            true
        });
        if changed {
            info!(has_session = self.current().has_session(), "session changed");
        }
    }

    pub fn set_demo_mode(&self, demo_mode: bool) {
        let changed = self.tx.send_if_modified(|flags| {
            if flags.demo_mode == demo_mode {
                return false;
            }
            flags.demo_mode = demo_mode;
            true
        });
        if changed {
            info!(demo_mode, "demo mode changed");
        }
    }
}

impl Default for ModeNotifier {
    fn default() -> Self {
        Self::new(ModeFlags::default())
    }
}
