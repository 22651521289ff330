use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::channel::ChannelError;
use crate::message::{Channel, Envelope, Priority, SurfaceId, TabId, TabMessage};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("surface {0} is already registered")]
    AlreadyRegistered(SurfaceId),
}

/// Thread-safe face of a tab, handed out to the compositor and hang monitor.
///
/// The actor owns the only strong reference; the registry keeps a weak one,
/// so a lookup racing with teardown fails instead of reviving the tab.
#[derive(Debug)]
pub struct TabHandle {
    tab: TabId,
    surface: SurfaceId,
    mailbox: mpsc::UnboundedSender<Envelope>,
}

impl TabHandle {
    pub fn new(tab: TabId, surface: SurfaceId, mailbox: mpsc::UnboundedSender<Envelope>) -> Self {
        Self {
            tab,
            surface,
            mailbox,
        }
    }

    pub fn tab(&self) -> TabId {
        self.tab
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    /// Queue a message for the tab's owner thread.
    pub fn post(
        &self,
        channel: Channel,
        priority: Priority,
        message: TabMessage,
    ) -> Result<(), ChannelError> {
        self.mailbox
            .send(Envelope {
                tab: self.tab,
                channel,
                priority,
                message,
            })
            .map_err(|_| ChannelError::Closed)
    }
}

#[derive(Debug)]
struct SurfaceEntry {
    tab: Weak<TabHandle>,
    visible: bool,
}

/// Process-wide map from surface id to the tab painting into it.
///
/// Mutated on the tab thread, read from the compositor thread. Every access
/// goes through one mutex so removal is linearizable with lookups.
#[derive(Debug, Clone, Default)]
pub struct SurfaceRegistry {
    inner: Arc<Mutex<HashMap<SurfaceId, SurfaceEntry>>>,
}

impl SurfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<SurfaceId, SurfaceEntry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, surface: SurfaceId, tab: &Arc<TabHandle>) -> Result<(), RegistryError> {
        let mut entries = self.entries();
        if entries.contains_key(&surface) {
            warn!(target: "tab::registry", %surface, tab = %tab.tab(), "surface already registered");
            return Err(RegistryError::AlreadyRegistered(surface));
        }
        entries.insert(
            surface,
            SurfaceEntry {
                tab: Arc::downgrade(tab),
                visible: false,
            },
        );
        debug!(target: "tab::registry", %surface, tab = %tab.tab(), "registered surface");
        Ok(())
    }

    pub fn lookup(&self, surface: SurfaceId) -> Option<Arc<TabHandle>> {
        self.entries()
            .get(&surface)
            .and_then(|entry| entry.tab.upgrade())
    }

    /// Returns whether an entry was removed. Removing twice is harmless.
    pub fn unregister(&self, surface: SurfaceId) -> bool {
        let removed = self.entries().remove(&surface).is_some();
        if removed {
            debug!(target: "tab::registry", %surface, "unregistered surface");
        }
        removed
    }

    pub fn set_visible(&self, surface: SurfaceId, visible: bool) -> bool {
        match self.entries().get_mut(&surface) {
            Some(entry) => {
                entry.visible = visible;
                true
            }
            None => false,
        }
    }

    pub fn is_visible(&self, surface: SurfaceId) -> bool {
        self.entries()
            .get(&surface)
            .is_some_and(|entry| entry.visible && entry.tab.strong_count() > 0)
    }

    pub fn visible_surfaces(&self) -> Vec<SurfaceId> {
        let mut surfaces: Vec<_> = self
            .entries()
            .iter()
            .filter(|(_, entry)| entry.visible && entry.tab.strong_count() > 0)
            .map(|(surface, _)| *surface)
            .collect();
        surfaces.sort();
        surfaces
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Drop every entry. Called once when the content process shuts down.
    pub fn clear(&self) {
        self.entries().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(tab: u64, surface: u64) -> (Arc<TabHandle>, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(TabHandle::new(TabId(tab), SurfaceId(surface), tx)),
            rx,
        )
    }

    #[test]
    fn rejects_duplicate_registration() {
        let registry = SurfaceRegistry::new();
        let (first, _rx1) = handle(1, 10);
        let (second, _rx2) = handle(2, 10);
        registry.register(SurfaceId(10), &first).unwrap();
        assert_eq!(
            registry.register(SurfaceId(10), &second),
            Err(RegistryError::AlreadyRegistered(SurfaceId(10)))
        );
        assert_eq!(registry.lookup(SurfaceId(10)).unwrap().tab(), TabId(1));
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = SurfaceRegistry::new();
        let (tab, _rx) = handle(1, 10);
        registry.register(SurfaceId(10), &tab).unwrap();
        assert!(registry.unregister(SurfaceId(10)));
        assert!(!registry.unregister(SurfaceId(10)));
        assert!(registry.lookup(SurfaceId(10)).is_none());
    }

    #[test]
    fn dropped_tab_is_never_returned() {
        let registry = SurfaceRegistry::new();
        let (tab, _rx) = handle(1, 10);
        registry.register(SurfaceId(10), &tab).unwrap();
        registry.set_visible(SurfaceId(10), true);
        drop(tab);
        assert!(registry.lookup(SurfaceId(10)).is_none());
        assert!(registry.visible_surfaces().is_empty());
    }

    #[test]
    fn tracks_visibility() {
        let registry = SurfaceRegistry::new();
        let (a, _rx_a) = handle(1, 10);
        let (b, _rx_b) = handle(2, 20);
        registry.register(SurfaceId(10), &a).unwrap();
        registry.register(SurfaceId(20), &b).unwrap();
        assert!(registry.set_visible(SurfaceId(20), true));
        assert!(!registry.set_visible(SurfaceId(30), true));
        assert_eq!(registry.visible_surfaces(), vec![SurfaceId(20)]);
        assert!(registry.is_visible(SurfaceId(20)));
        assert!(!registry.is_visible(SurfaceId(10)));
    }

    #[test]
    fn handle_posts_to_mailbox() {
        let (tab, mut rx) = handle(4, 40);
        tab.post(Channel::HangMonitor, Priority::Input, TabMessage::Destroy)
            .unwrap();
        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.tab, TabId(4));
        assert_eq!(envelope.channel, Channel::HangMonitor);
        assert_eq!(envelope.message, TabMessage::Destroy);
    }
}
