use std::rc::Rc;

use frontier_tab::message::{Channel, LayersObserverEpoch, Priority, SurfaceId};
use frontier_tab::{
    ContentLog, ContentProcess, Envelope, HeadlessContent, ManualClock, PaintRequest,
    ParentMessage, TabConfig, TabId, TabMessage,
};

const TAB: TabId = TabId(4);
const SURFACE: SurfaceId = SurfaceId(40);

fn setup(content: HeadlessContent) -> (ContentProcess, ContentLog) {
    let log = content.log();
    let mut process = ContentProcess::new(TabConfig::default(), Rc::new(ManualClock::default()));
    process.create_tab(TAB, Box::new(content)).unwrap();
    process.post(Envelope::new(TAB, TabMessage::InitRendering { surface: SURFACE }));
    process.run_until_idle();
    (process, log)
}

fn render_state(enabled: bool, force_repaint: bool, epoch: u64) -> Envelope {
    Envelope::new(
        TAB,
        TabMessage::SetRenderState {
            enabled,
            force_repaint,
            epoch: LayersObserverEpoch(epoch),
        },
    )
}

fn paint_while_interrupting(epoch: u64) -> Envelope {
    Envelope::input(
        TAB,
        TabMessage::PaintWhileInterrupting {
            epoch: LayersObserverEpoch(epoch),
            force_repaint: false,
        },
    )
    .with_channel(Channel::HangMonitor)
}

fn current_epoch(process: &ContentProcess) -> LayersObserverEpoch {
    process.find_tab(TAB).unwrap().epoch()
}

/// Epochs 5, 3, 7, 7, 6 apply as 5 and 7 only.
#[test]
fn test_stale_epochs_are_discarded() {
    let (mut process, log) = setup(HeadlessContent::new());
    for epoch in [5, 3, 7, 7, 6] {
        process.post(render_state(true, true, epoch));
    }
    process.run_until_idle();

    assert_eq!(
        log.observer_epochs(),
        vec![LayersObserverEpoch(5), LayersObserverEpoch(7)]
    );
    assert_eq!(log.paints().len(), 2);
    assert_eq!(current_epoch(&process), LayersObserverEpoch(7));
}

/// The expedited paint overtakes a control-channel request it supersedes.
#[test]
fn test_hang_monitor_paint_wins_over_older_disable() {
    let (mut process, log) = setup(HeadlessContent::new());
    process.post(render_state(false, false, 2));
    process.post(paint_while_interrupting(3));
    process.run_until_idle();

    // Input priority ran the paint first; the disable at epoch 2 was stale.
    assert!(log.is_visible());
    assert_eq!(log.paints(), vec![PaintRequest::Now]);
    assert!(process.registry().is_visible(SURFACE));
    assert_eq!(current_epoch(&process), LayersObserverEpoch(3));
}

/// Delivery order across the two channels does not change the outcome.
#[test]
fn test_epoch_order_beats_arrival_order() {
    let (mut process, log) = setup(HeadlessContent::new());
    process.post(render_state(true, false, 4));
    process.run_until_idle();
    process.post(paint_while_interrupting(3));
    process.post(render_state(false, false, 5));
    process.run_until_idle();

    assert!(!log.is_visible());
    assert_eq!(log.paints(), vec![PaintRequest::Now]);
    assert_eq!(log.cache_clears(), 1);
    assert!(process.registry().visible_surfaces().is_empty());
}

#[test]
fn test_visible_tab_acknowledges_epoch() {
    let (mut process, log) = setup(HeadlessContent::new().with_visible(true));
    process.post(render_state(true, false, 1));
    process.run_until_idle();

    assert!(log.paints().is_empty());
    let outbound = process.take_outbound();
    assert_eq!(outbound.len(), 1);
    assert_eq!(outbound[0].tab, TAB);
    assert_eq!(
        outbound[0].message,
        ParentMessage::Acknowledge {
            epoch: LayersObserverEpoch(1)
        }
    );
}

#[test]
fn test_paint_without_surface_is_ignored() {
    let log;
    let mut process = ContentProcess::new(TabConfig::default(), Rc::new(ManualClock::default()));
    {
        let content = HeadlessContent::new();
        log = content.log();
        process.create_tab(TAB, Box::new(content)).unwrap();
    }
    process.post(paint_while_interrupting(1));
    process.run_until_idle();
    assert!(log.paints().is_empty());
    assert_eq!(current_epoch(&process), LayersObserverEpoch(0));
}

/// Three activation changes behind a blocker replay as the last one only.
#[test]
fn test_blocker_replays_latest_activation() {
    let (mut process, log) = setup(HeadlessContent::new());
    process.add_blocker(TAB);
    for is_active in [true, false, true] {
        process.post(Envelope::new(TAB, TabMessage::SetActive { is_active }));
    }
    process.run_until_idle();
    assert!(log.activations().is_empty());

    process.remove_blocker(TAB);
    assert_eq!(log.activations(), vec![true]);
}

#[test]
fn test_blocker_replays_latest_render_state() {
    let (mut process, log) = setup(HeadlessContent::new());
    process.add_blocker(TAB);
    process.add_blocker(TAB);
    process.post(render_state(true, false, 1));
    process.post(render_state(false, false, 2));
    process.run_until_idle();

    // Epochs advance even while held back, but content does not see them.
    assert_eq!(current_epoch(&process), LayersObserverEpoch(2));
    assert!(log.paints().is_empty());
    assert!(log.observer_epochs().is_empty());

    process.remove_blocker(TAB);
    assert_eq!(log.cache_clears(), 0);
    assert!(log.observer_epochs().is_empty());
    process.remove_blocker(TAB);
    assert_eq!(log.cache_clears(), 1);
    assert_eq!(log.observer_epochs(), vec![LayersObserverEpoch(2)]);
    assert!(log.paints().is_empty());
    assert_eq!(process.find_tab(TAB).unwrap().pending_blockers(), 0);
}

#[test]
fn test_unblocked_tab_applies_immediately() {
    let (mut process, log) = setup(HeadlessContent::new());
    process.post(Envelope::new(TAB, TabMessage::SetActive { is_active: true }));
    process.post(Envelope::new(TAB, TabMessage::SetActive { is_active: false }));
    process.run_until_idle();
    assert_eq!(log.activations(), vec![true, false]);
}

#[test]
fn test_normal_priority_paint_request_keeps_channel_order() {
    let (mut process, log) = setup(HeadlessContent::new());
    process.post(Envelope {
        priority: Priority::Normal,
        ..paint_while_interrupting(1)
    });
    process.post(render_state(true, true, 2));
    process.run_until_idle();
    assert_eq!(
        log.observer_epochs(),
        vec![LayersObserverEpoch(1), LayersObserverEpoch(2)]
    );
}
