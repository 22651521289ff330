use std::rc::Rc;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::channel::ParentChannel;
use crate::clock::Clock;
use crate::config::TabConfig;
use crate::content::ContentDispatcher;
use crate::epoch::RenderEpochSequencer;
use crate::event_loop::TabLoop;
use crate::gate::{ActivationGate, GateReplay, PendingRenderState};
use crate::input::{CoalescedPointerEvent, KeyRepeatFilter, PointerCoalescer, WheelCoalescer};
use crate::lifecycle::{protocol_violation, DelayedDelete, LifecycleState};
use crate::message::{
    EventStatus, Envelope, KeyEvent, LayersObserverEpoch, ParentMessage, PointerEvent,
    PointerId, PointerMoveEvent, SurfaceId, TabId, TabMessage, WheelEvent,
};
use crate::registry::{SurfaceRegistry, TabHandle};

/// Process-wide services every tab is built with.
#[derive(Clone)]
pub struct TabServices {
    pub registry: SurfaceRegistry,
    /// Inbound mailbox of the owning process; cloned into each `TabHandle`.
    pub mailbox: mpsc::UnboundedSender<Envelope>,
    pub config: TabConfig,
    pub clock: Rc<dyn Clock>,
}

/// One browsing surface in the content process, as seen by the parent.
///
/// Lives on a single thread. Only the `TabHandle` registered for its surface
/// is visible to other threads.
pub struct TabActor {
    id: TabId,
    state: LifecycleState,
    ipc_open: bool,
    channel: Option<Box<dyn ParentChannel>>,
    content: Box<dyn ContentDispatcher>,
    content_destroyed: bool,
    registry: SurfaceRegistry,
    mailbox: mpsc::UnboundedSender<Envelope>,
    handle: Option<Arc<TabHandle>>,
    surface: Option<SurfaceId>,
    epoch: RenderEpochSequencer,
    gate: ActivationGate,
    pointer: Option<PointerCoalescer>,
    wheel: WheelCoalescer,
    keys: KeyRepeatFilter,
    config: TabConfig,
    clock: Rc<dyn Clock>,
}

impl TabActor {
    pub fn new(id: TabId, mut content: Box<dyn ContentDispatcher>, services: TabServices) -> Self {
        let pointer = PointerCoalescer::new();
        content.attach(pointer.sink());
        Self {
            id,
            state: LifecycleState::Created,
            ipc_open: false,
            channel: None,
            content,
            content_destroyed: false,
            registry: services.registry,
            mailbox: services.mailbox,
            handle: None,
            surface: None,
            epoch: RenderEpochSequencer::new(),
            gate: ActivationGate::new(),
            pointer: Some(pointer),
            wheel: WheelCoalescer::new(),
            keys: KeyRepeatFilter::new(),
            config: services.config,
            clock: services.clock,
        }
    }

    pub fn id(&self) -> TabId {
        self.id
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn ipc_open(&self) -> bool {
        self.ipc_open
    }

    pub fn epoch(&self) -> LayersObserverEpoch {
        self.epoch.current()
    }

    pub fn surface(&self) -> Option<SurfaceId> {
        self.surface
    }

    pub fn handle(&self) -> Option<&Arc<TabHandle>> {
        self.handle.as_ref()
    }

    pub fn pending_blockers(&self) -> u32 {
        self.gate.blockers()
    }

    pub fn pending_pointer(&self, pointer: PointerId) -> Option<&CoalescedPointerEvent> {
        self.pointer
            .as_ref()
            .and_then(|coalescer| coalescer.pending(pointer))
    }

    pub fn has_coalescer(&self) -> bool {
        self.pointer.is_some()
    }

    /// The channel to the parent is established.
    pub fn open(&mut self, channel: Box<dyn ParentChannel>) {
        if self.state != LifecycleState::Created {
            protocol_violation(self.id, "channel opened twice");
            return;
        }
        self.ipc_open = channel.is_open();
        self.channel = Some(channel);
        self.state = LifecycleState::Active;
        info!(target: "tab::lifecycle", tab = %self.id, "tab opened");
    }

    pub fn handle_message(&mut self, envelope: Envelope, event_loop: &mut TabLoop) {
        let Envelope {
            channel,
            priority,
            message,
            ..
        } = envelope;
        trace!(target: "tab", tab = %self.id, message = message.name(), ?channel, "message");

        match message {
            TabMessage::Destroy => self.destroy(event_loop),
            TabMessage::ChannelClosed => self.channel_closed(),
            other if self.state == LifecycleState::Deleted => {
                protocol_violation(self.id, other.name());
            }
            other if self.state.is_tearing_down() => {
                debug!(
                    target: "tab::lifecycle",
                    tab = %self.id,
                    message = other.name(),
                    state = %self.state,
                    "ignoring message during teardown"
                );
            }
            TabMessage::SetRenderState {
                enabled,
                force_repaint,
                epoch,
            } => self.request_render_state(enabled, force_repaint, epoch),
            TabMessage::PaintWhileInterrupting {
                epoch,
                force_repaint,
            } => self.paint_while_interrupting(epoch, force_repaint),
            TabMessage::SetActive { is_active } => self.set_active(is_active),
            TabMessage::InitRendering { surface } => self.init_rendering(surface),
            TabMessage::PointerMove(event) => self.pointer_move(event),
            TabMessage::SynthPointerMove(event) => self.pointer_event(PointerEvent::Move(event)),
            TabMessage::Button(event) => self.pointer_event(PointerEvent::Button(event)),
            TabMessage::Wheel(event) => {
                let next_is_wheel = event_loop.next_is_wheel(self.id, channel, priority);
                self.wheel(event, next_is_wheel);
            }
            TabMessage::Key(event) => self.key(event),
        }
    }

    /// Starts the two-pass teardown. Also used for locally requested teardown.
    pub fn destroy(&mut self, event_loop: &mut TabLoop) {
        if !self.state.is_live() {
            protocol_violation(self.id, "destroy while already tearing down");
            return;
        }
        info!(target: "tab::lifecycle", tab = %self.id, "destroying tab");
        self.destroy_window();
        self.state = LifecycleState::Destroying;
        event_loop.schedule_delete(DelayedDelete::new(self.id));
    }

    pub fn run_delayed_delete(&mut self, task: DelayedDelete, event_loop: &mut TabLoop) {
        match (self.state, task.is_ready()) {
            (LifecycleState::Destroying, false) => {
                debug!(target: "tab::lifecycle", tab = %self.id, "delete bounced to input priority");
                self.state = LifecycleState::AwaitingSecondPass;
                event_loop.schedule_delete(task.bounced());
            }
            (LifecycleState::AwaitingSecondPass, true) => self.finish_delete(),
            (state, _) => {
                debug!(
                    target: "tab::lifecycle",
                    tab = %self.id,
                    %state,
                    "stale delete task"
                );
            }
        }
    }

    fn finish_delete(&mut self) {
        match self.channel.as_mut() {
            Some(channel) if self.ipc_open && channel.is_open() => {
                if let Err(err) = channel.send(ParentMessage::ChannelClose) {
                    debug!(target: "tab::lifecycle", tab = %self.id, %err, "channel close not sent");
                }
            }
            _ => {
                debug!(target: "tab::lifecycle", tab = %self.id, "channel already gone, skipping close");
            }
        }
        self.ipc_open = false;
        self.channel = None;
        self.state = LifecycleState::Deleted;
        info!(target: "tab::lifecycle", tab = %self.id, "tab deleted");
    }

    /// The transport lost the channel. A delete bounce already in flight
    /// still finishes, without sending anything.
    pub fn channel_closed(&mut self) {
        debug!(target: "tab::lifecycle", tab = %self.id, state = %self.state, "channel closed");
        self.ipc_open = false;
        self.destroy_window();
        if self.state.is_live() {
            self.state = LifecycleState::Deleted;
        }
    }

    /// Releases coalescers, gate state and the registry entry. Idempotent.
    fn destroy_window(&mut self) {
        if let Some(pointer) = self.pointer.take() {
            if pointer.has_pending() || pointer.queued() > 0 {
                debug!(target: "tab::input", tab = %self.id, "dropping undispatched pointer input");
            }
        }
        self.wheel.clear();
        self.keys.clear();
        self.gate.reset();
        if let Some(surface) = self.surface.take() {
            self.registry.unregister(surface);
        }
        self.handle = None;
        if !self.content_destroyed {
            self.content.destroy();
            self.content_destroyed = true;
        }
    }

    fn send_to_parent(&mut self, message: ParentMessage) {
        if !self.ipc_open {
            debug!(target: "tab", tab = %self.id, "ipc closed, dropping outbound message");
            return;
        }
        let Some(channel) = self.channel.as_mut() else {
            return;
        };
        if let Err(err) = channel.send(message) {
            debug!(target: "tab", tab = %self.id, %err, "outbound message dropped");
        }
    }

    fn init_rendering(&mut self, surface: SurfaceId) {
        if self.surface == Some(surface) {
            debug!(target: "tab::registry", tab = %self.id, %surface, "surface already attached");
            return;
        }
        let handle = Arc::new(TabHandle::new(self.id, surface, self.mailbox.clone()));
        if self.registry.register(surface, &handle).is_err() {
            return;
        }
        if let Some(previous) = self.surface.replace(surface) {
            self.registry.unregister(previous);
        }
        self.registry.set_visible(surface, self.content.is_visible());
        self.handle = Some(handle);
    }

    fn set_active(&mut self, active: bool) {
        if self.gate.capture_active(active) {
            debug!(target: "tab", tab = %self.id, active, "activation deferred by blocker");
            return;
        }
        self.content.set_active(active);
    }

    pub fn request_render_state(
        &mut self,
        enabled: bool,
        force_repaint: bool,
        epoch: LayersObserverEpoch,
    ) {
        if !self.epoch.advance(epoch) {
            debug!(
                target: "tab::render",
                tab = %self.id,
                %epoch,
                current = %self.epoch.current(),
                "stale render state"
            );
            return;
        }

        if self
            .gate
            .capture_render(PendingRenderState { enabled, epoch })
        {
            debug!(target: "tab::render", tab = %self.id, enabled, %epoch, "render state deferred by blocker");
            return;
        }
        self.apply_render_state(enabled, force_repaint, epoch);
    }

    fn apply_render_state(
        &mut self,
        enabled: bool,
        force_repaint: bool,
        epoch: LayersObserverEpoch,
    ) {
        self.content.set_layers_observer_epoch(epoch);
        if !enabled {
            debug!(target: "tab::render", tab = %self.id, %epoch, "rendering disabled");
            if let Some(surface) = self.surface {
                self.registry.set_visible(surface, false);
            }
            self.content.make_hidden();
            self.content.clear_cached_resources();
            return;
        }

        if !force_repaint && self.ipc_open && self.content.is_visible() {
            trace!(target: "tab::render", tab = %self.id, %epoch, "already visible, acknowledging");
            self.send_to_parent(ParentMessage::Acknowledge { epoch });
            return;
        }

        debug!(target: "tab::render", tab = %self.id, %epoch, force_repaint, "rendering enabled");
        if let Some(surface) = self.surface {
            self.registry.set_visible(surface, true);
        }
        self.content.make_visible();
        if self.content.is_safe_to_run_script() {
            self.content.paint_now();
        } else {
            self.content.schedule_paint();
        }
    }

    /// Forced paint requested over the hang-monitor path while content
    /// script may be running.
    fn paint_while_interrupting(&mut self, epoch: LayersObserverEpoch, force_repaint: bool) {
        if !self.ipc_open || self.surface.is_none() {
            debug!(target: "tab::render", tab = %self.id, %epoch, "no surface to paint");
            return;
        }
        self.request_render_state(true, force_repaint, epoch);
    }

    pub fn add_pending_blocker(&mut self) {
        if !self.state.is_live() {
            debug!(target: "tab", tab = %self.id, "blocker on torn down tab ignored");
            return;
        }
        self.gate.add_blocker();
    }

    pub fn remove_pending_blocker(&mut self) {
        if !self.state.is_live() {
            debug!(target: "tab", tab = %self.id, "blocker on torn down tab ignored");
            return;
        }
        match self.gate.remove_blocker() {
            Ok(Some(replay)) => self.replay(replay),
            Ok(None) => {}
            Err(err) => protocol_violation(self.id, &err.to_string()),
        }
    }

    fn replay(&mut self, replay: GateReplay) {
        if let Some(active) = replay.active {
            self.content.set_active(active);
        }
        // The epoch was accepted when the request was captured.
        if let Some(render) = replay.render {
            self.apply_render_state(render.enabled, false, render.epoch);
        }
    }

    fn pointer_move(&mut self, event: PointerMoveEvent) {
        if !self.config.coalesce_pointer_moves {
            self.pointer_event(PointerEvent::Move(event));
            return;
        }
        let Some(pointer) = self.pointer.as_mut() else {
            return;
        };
        if pointer.coalesce_move(event) {
            let dispatched = pointer.drain(self.content.as_mut());
            trace!(target: "tab::input", tab = %self.id, dispatched, "dispatched superseded move");
        }
    }

    /// Non-move pointer events: flush every pending move first so nothing
    /// overtakes them, then drain.
    fn pointer_event(&mut self, event: PointerEvent) {
        let Some(pointer) = self.pointer.as_mut() else {
            return;
        };
        pointer.flush_all();
        pointer.enqueue(event);
        pointer.drain(self.content.as_mut());
    }

    /// Dispatches every coalesced pointer move. Runs when the tab loop goes
    /// idle and before any other event class is dispatched.
    pub fn flush_coalesced_input(&mut self) {
        if !self.state.is_live() {
            return;
        }
        let Some(pointer) = self.pointer.as_mut() else {
            return;
        };
        if !pointer.has_pending() && pointer.queued() == 0 {
            return;
        }
        pointer.flush_all();
        let dispatched = pointer.drain(self.content.as_mut());
        trace!(target: "tab::input", tab = %self.id, dispatched, "flushed pointer input");
    }

    fn wheel(&mut self, event: WheelEvent, next_is_wheel: bool) {
        self.flush_coalesced_input();
        if !self.config.coalesce_wheel {
            self.wheel.dispatch_pending(self.content.as_mut());
            self.content.dispatch_wheel(&event);
            return;
        }
        let outcome = self.wheel.handle(
            event,
            next_is_wheel,
            self.content.as_mut(),
            self.clock.as_ref(),
        );
        trace!(target: "tab::input", tab = %self.id, ?outcome, "wheel");
    }

    fn key(&mut self, event: KeyEvent) {
        self.flush_coalesced_input();
        if self.config.skip_repeated_keys && self.keys.should_skip_repeat(&event) {
            debug!(target: "tab::input", tab = %self.id, key = %event.key, "skipping repeated key");
            return;
        }
        if self.keys.suppresses_key_press(&event) {
            debug!(target: "tab::input", tab = %self.id, "keypress suppressed by consumed keydown");
            return;
        }
        let status = self.content.dispatch_key(&event);
        self.keys.record_dispatch(&event, status, self.clock.now());
        if event.wants_reply {
            self.send_to_parent(ParentMessage::ReplyKeyEvent {
                default_prevented: status == EventStatus::ConsumeNoDefault,
                event,
            });
        }
    }
}

impl Drop for TabActor {
    fn drop(&mut self) {
        self.destroy_window();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MailboxChannel;
    use crate::clock::ManualClock;
    use crate::content::{ContentLog, HeadlessContent, PaintRequest};
    use crate::event_loop::Runnable;

    fn actor(content: HeadlessContent) -> (TabActor, ContentLog, SurfaceRegistry) {
        let (mailbox, _rx) = mpsc::unbounded_channel();
        let registry = SurfaceRegistry::new();
        let log = content.log();
        let services = TabServices {
            registry: registry.clone(),
            mailbox,
            config: TabConfig::default(),
            clock: Rc::new(ManualClock::default()),
        };
        (TabActor::new(TabId(1), Box::new(content), services), log, registry)
    }

    #[test]
    fn render_enable_paints_and_marks_visible() {
        let (mut tab, log, registry) = actor(HeadlessContent::new());
        let (channel, _out) = MailboxChannel::pair(TabId(1));
        tab.open(Box::new(channel));
        tab.init_rendering(SurfaceId(9));

        tab.request_render_state(true, false, LayersObserverEpoch(1));
        assert!(registry.is_visible(SurfaceId(9)));
        assert_eq!(log.paints(), vec![PaintRequest::Now]);

        tab.request_render_state(false, false, LayersObserverEpoch(2));
        assert!(!registry.is_visible(SurfaceId(9)));
        assert!(!log.is_visible());
        assert_eq!(log.cache_clears(), 1);
    }

    #[test]
    fn unsafe_script_state_schedules_paint() {
        let (mut tab, log, _registry) =
            actor(HeadlessContent::new().with_safe_to_run_script(false));
        tab.request_render_state(true, false, LayersObserverEpoch(1));
        assert_eq!(log.paints(), vec![PaintRequest::Scheduled]);
    }

    #[test]
    fn visible_tab_acknowledges_instead_of_painting() {
        let (mut tab, log, _registry) = actor(HeadlessContent::new().with_visible(true));
        let (channel, mut out) = MailboxChannel::pair(TabId(1));
        tab.open(Box::new(channel));

        tab.request_render_state(true, false, LayersObserverEpoch(4));
        assert!(log.paints().is_empty());
        assert_eq!(
            out.try_recv().unwrap().message,
            ParentMessage::Acknowledge {
                epoch: LayersObserverEpoch(4)
            }
        );

        tab.request_render_state(true, true, LayersObserverEpoch(5));
        assert_eq!(log.paints(), vec![PaintRequest::Now]);
        assert!(out.try_recv().is_err());
    }

    #[test]
    fn visible_tab_without_channel_paints() {
        let (mut tab, log, _registry) = actor(HeadlessContent::new().with_visible(true));
        tab.request_render_state(true, false, LayersObserverEpoch(1));
        assert_eq!(log.paints(), vec![PaintRequest::Now]);
    }

    #[test]
    fn gated_render_state_is_hidden_from_content() {
        let (mut tab, log, _registry) = actor(HeadlessContent::new());
        let (channel, _out) = MailboxChannel::pair(TabId(1));
        tab.open(Box::new(channel));
        tab.add_pending_blocker();
        tab.request_render_state(true, false, LayersObserverEpoch(3));
        assert!(log.observer_epochs().is_empty());
        assert!(log.paints().is_empty());
        assert_eq!(tab.epoch(), LayersObserverEpoch(3));

        tab.remove_pending_blocker();
        assert_eq!(log.observer_epochs(), vec![LayersObserverEpoch(3)]);
        assert_eq!(log.paints(), vec![PaintRequest::Now]);
    }

    #[test]
    fn reattaching_surface_moves_registry_entry() {
        let (mut tab, _log, registry) = actor(HeadlessContent::new());
        tab.init_rendering(SurfaceId(1));
        tab.init_rendering(SurfaceId(2));
        assert!(registry.lookup(SurfaceId(1)).is_none());
        assert_eq!(registry.lookup(SurfaceId(2)).unwrap().tab(), TabId(1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn delete_bounces_through_input_priority() {
        let (mut tab, log, registry) = actor(HeadlessContent::new());
        let (channel, mut out) = MailboxChannel::pair(TabId(1));
        tab.open(Box::new(channel));
        tab.init_rendering(SurfaceId(3));

        let mut event_loop = TabLoop::new();
        tab.destroy(&mut event_loop);
        assert_eq!(tab.state(), LifecycleState::Destroying);
        assert!(registry.lookup(SurfaceId(3)).is_none());
        assert!(!tab.has_coalescer());
        assert!(log.is_destroyed());

        let Some(Runnable::DelayedDelete(first)) = event_loop.next() else {
            panic!("expected delete task");
        };
        tab.run_delayed_delete(first, &mut event_loop);
        assert_eq!(tab.state(), LifecycleState::AwaitingSecondPass);
        assert!(out.try_recv().is_err());

        let Some(Runnable::DelayedDelete(second)) = event_loop.next() else {
            panic!("expected bounced delete task");
        };
        assert!(second.is_ready());
        tab.run_delayed_delete(second, &mut event_loop);
        assert_eq!(tab.state(), LifecycleState::Deleted);
        assert_eq!(out.try_recv().unwrap().message, ParentMessage::ChannelClose);
        assert!(event_loop.is_idle());
    }

    #[test]
    fn channel_loss_mid_bounce_skips_close() {
        let (mut tab, _log, _registry) = actor(HeadlessContent::new());
        let (channel, mut out) = MailboxChannel::pair(TabId(1));
        tab.open(Box::new(channel));

        let mut event_loop = TabLoop::new();
        tab.destroy(&mut event_loop);
        tab.channel_closed();
        assert_eq!(tab.state(), LifecycleState::Destroying);

        while let Some(Runnable::DelayedDelete(task)) = event_loop.next() {
            tab.run_delayed_delete(task, &mut event_loop);
        }
        assert_eq!(tab.state(), LifecycleState::Deleted);
        assert!(out.try_recv().is_err());
    }

    #[test]
    fn teardown_without_channel_is_terminal() {
        let (mut tab, _log, _registry) = actor(HeadlessContent::new());
        let mut event_loop = TabLoop::new();
        tab.destroy(&mut event_loop);
        while let Some(Runnable::DelayedDelete(task)) = event_loop.next() {
            tab.run_delayed_delete(task, &mut event_loop);
        }
        assert_eq!(tab.state(), LifecycleState::Deleted);
    }

    #[test]
    #[should_panic(expected = "protocol violation")]
    fn double_destroy_is_fatal_in_debug() {
        let (mut tab, _log, _registry) = actor(HeadlessContent::new());
        let mut event_loop = TabLoop::new();
        tab.destroy(&mut event_loop);
        tab.destroy(&mut event_loop);
    }

    #[test]
    fn drop_releases_registry_entry() {
        let (mut tab, _log, registry) = actor(HeadlessContent::new());
        tab.init_rendering(SurfaceId(5));
        assert_eq!(registry.len(), 1);
        drop(tab);
        assert!(registry.is_empty());
    }
}
