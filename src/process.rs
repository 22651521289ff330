use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::channel::{MailboxChannel, OutboundMessage, ParentChannel};
use crate::clock::Clock;
use crate::config::TabConfig;
use crate::content::ContentDispatcher;
use crate::event_loop::{Runnable, TabLoop};
use crate::lifecycle::{protocol_violation, LifecycleState};
use crate::message::{Envelope, TabId, TabMessage};
use crate::registry::SurfaceRegistry;
use crate::tab::{TabActor, TabServices};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProcessError {
    #[error("tab {0} already exists")]
    DuplicateTab(TabId),
}

/// The tab thread of a content process: every tab it hosts, the shared run
/// queue they are driven from, and the mailboxes to and from the parent.
pub struct ContentProcess {
    services: TabServices,
    tabs: HashMap<TabId, TabActor>,
    /// Tabs reaped after teardown. Work still queued for them is dropped.
    retired: HashSet<TabId>,
    event_loop: TabLoop,
    mailbox: mpsc::UnboundedReceiver<Envelope>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl ContentProcess {
    pub fn new(config: TabConfig, clock: Rc<dyn Clock>) -> Self {
        Self::with_registry(SurfaceRegistry::new(), config, clock)
    }

    pub fn with_registry(registry: SurfaceRegistry, config: TabConfig, clock: Rc<dyn Clock>) -> Self {
        let (mailbox_tx, mailbox) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            services: TabServices {
                registry,
                mailbox: mailbox_tx,
                config,
                clock,
            },
            tabs: HashMap::new(),
            retired: HashSet::new(),
            event_loop: TabLoop::new(),
            mailbox,
            outbound_tx,
            outbound_rx,
        }
    }

    pub fn registry(&self) -> &SurfaceRegistry {
        &self.services.registry
    }

    pub fn config(&self) -> &TabConfig {
        &self.services.config
    }

    /// Sender for inbound messages. Safe to move to other threads.
    pub fn mailbox(&self) -> mpsc::UnboundedSender<Envelope> {
        self.services.mailbox.clone()
    }

    /// Creates a tab whose parent channel feeds this process's outbound queue.
    pub fn create_tab(
        &mut self,
        tab: TabId,
        content: Box<dyn ContentDispatcher>,
    ) -> Result<&mut TabActor, ProcessError> {
        let channel = MailboxChannel::new(tab, self.outbound_tx.clone());
        self.create_tab_with_channel(tab, content, Box::new(channel))
    }

    pub fn create_tab_with_channel(
        &mut self,
        tab: TabId,
        content: Box<dyn ContentDispatcher>,
        channel: Box<dyn ParentChannel>,
    ) -> Result<&mut TabActor, ProcessError> {
        if self.tabs.contains_key(&tab) {
            return Err(ProcessError::DuplicateTab(tab));
        }
        let mut actor = TabActor::new(tab, content, self.services.clone());
        actor.open(channel);
        self.retired.remove(&tab);
        Ok(self.tabs.entry(tab).or_insert(actor))
    }

    pub fn find_tab(&self, tab: TabId) -> Option<&TabActor> {
        self.tabs.get(&tab)
    }

    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    pub fn post(&self, envelope: Envelope) {
        // The receiver lives as long as `self`.
        let _ = self.services.mailbox.send(envelope);
    }

    pub fn add_blocker(&mut self, tab: TabId) {
        match self.tabs.get_mut(&tab) {
            Some(actor) => actor.add_pending_blocker(),
            None => protocol_violation(tab, "blocker for unknown tab"),
        }
    }

    pub fn remove_blocker(&mut self, tab: TabId) {
        match self.tabs.get_mut(&tab) {
            Some(actor) => actor.remove_pending_blocker(),
            None => protocol_violation(tab, "blocker for unknown tab"),
        }
    }

    /// Local teardown request, equivalent to the parent sending `Destroy`.
    pub fn destroy_tab(&mut self, tab: TabId) {
        match self.tabs.get_mut(&tab) {
            Some(actor) => actor.destroy(&mut self.event_loop),
            None => protocol_violation(tab, "destroy for unknown tab"),
        }
    }

    /// Messages the tabs sent to the parent since the last call.
    pub fn take_outbound(&mut self) -> Vec<OutboundMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.outbound_rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    fn pull_mailbox(&mut self) {
        while let Ok(envelope) = self.mailbox.try_recv() {
            self.event_loop.deliver(envelope);
        }
    }

    fn run_task(&mut self, runnable: Runnable) {
        let tab = match runnable {
            Runnable::Deliver(envelope) => {
                let tab = envelope.tab;
                let Some(actor) = self.tabs.get_mut(&tab) else {
                    self.drop_unrouted(envelope);
                    return;
                };
                actor.handle_message(envelope, &mut self.event_loop);
                tab
            }
            Runnable::DelayedDelete(task) => {
                let Some(actor) = self.tabs.get_mut(&task.tab()) else {
                    debug!(target: "tab::lifecycle", tab = %task.tab(), "delete task for reaped tab");
                    return;
                };
                actor.run_delayed_delete(task, &mut self.event_loop);
                task.tab()
            }
        };
        self.reap(tab);
    }

    /// Envelopes whose tab is no longer hosted. The transport reporting a
    /// closed channel and work queued before a reaped tab finished tearing
    /// down are inert; anything else is a protocol violation.
    fn drop_unrouted(&self, envelope: Envelope) {
        let tab = envelope.tab;
        let name = envelope.message.name();
        match envelope.message {
            TabMessage::ChannelClosed => {
                debug!(target: "tab::lifecycle", %tab, "channel closed for unknown tab");
            }
            TabMessage::Destroy if self.retired.contains(&tab) => {
                protocol_violation(tab, "destroy after delete");
            }
            _ if self.retired.contains(&tab) => {
                debug!(target: "tab::lifecycle", %tab, message = name, "dropping message for deleted tab");
            }
            _ => protocol_violation(tab, name),
        }
    }

    fn reap(&mut self, tab: TabId) {
        if self
            .tabs
            .get(&tab)
            .is_some_and(|actor| actor.state() == LifecycleState::Deleted)
        {
            self.tabs.remove(&tab);
            self.retired.insert(tab);
            debug!(target: "tab::lifecycle", %tab, remaining = self.tabs.len(), "reaped tab");
        }
    }

    /// Runs the next queued task, if any. No idle flush.
    pub fn run_one(&mut self) -> bool {
        self.pull_mailbox();
        match self.event_loop.next() {
            Some(runnable) => {
                self.run_task(runnable);
                true
            }
            None => false,
        }
    }

    /// Runs queued work until nothing is left, flushing coalesced pointer
    /// input whenever the queue drains. Returns the number of tasks run.
    pub fn run_until_idle(&mut self) -> usize {
        let mut ran = 0;
        loop {
            self.pull_mailbox();
            if let Some(runnable) = self.event_loop.next() {
                self.run_task(runnable);
                ran += 1;
                continue;
            }
            for actor in self.tabs.values_mut() {
                actor.flush_coalesced_input();
            }
            self.pull_mailbox();
            if self.event_loop.is_idle() {
                return ran;
            }
        }
    }

    /// Drives the process until every tab is gone.
    pub async fn run(&mut self) {
        loop {
            self.run_until_idle();
            if self.tabs.is_empty() {
                info!(target: "tab", "no tabs left, stopping");
                return;
            }
            match self.mailbox.recv().await {
                Some(envelope) => self.event_loop.deliver(envelope),
                None => return,
            }
        }
    }

    /// Drops every tab and clears the registry.
    pub fn shutdown(&mut self) {
        info!(target: "tab", tabs = self.tabs.len(), "shutting down content process");
        self.tabs.clear();
        self.services.registry.clear();
    }
}
