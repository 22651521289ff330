use std::time::Duration;

use crate::message::{EventStatus, KeyEvent, KeyEventKind};

/// Drops auto-repeated key events that arrive while content is still busy
/// with the previous repeat, and keypresses whose keydown was consumed.
#[derive(Debug, Default)]
pub struct KeyRepeatFilter {
    /// When dispatch of the last repeated keydown/keypress finished.
    repeated_key_event_end: Option<Duration>,
    skip_key_press: bool,
    ignore_key_press: bool,
}

impl KeyRepeatFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_skip_repeat(&mut self, event: &KeyEvent) -> bool {
        let is_down_or_press = matches!(event.kind, KeyEventKind::Down | KeyEventKind::Press);
        let Some(repeat_end) = self.repeated_key_event_end.filter(|_| event.skippable && is_down_or_press)
        else {
            self.repeated_key_event_end = None;
            self.skip_key_press = false;
            return false;
        };

        if (event.kind == KeyEventKind::Down && repeat_end > event.timestamp)
            || (self.skip_key_press && event.kind == KeyEventKind::Press)
        {
            // A skipped keydown takes its keypresses with it.
            self.skip_key_press |= event.kind == KeyEventKind::Down;
            return true;
        }

        if event.kind == KeyEventKind::Down {
            self.repeated_key_event_end = None;
            self.skip_key_press = false;
        }
        false
    }

    /// Content called preventDefault() on the keydown this keypress follows.
    pub fn suppresses_key_press(&self, event: &KeyEvent) -> bool {
        event.kind == KeyEventKind::Press && self.ignore_key_press
    }

    pub fn record_dispatch(&mut self, event: &KeyEvent, status: EventStatus, finished_at: Duration) {
        if event.is_repeat && matches!(event.kind, KeyEventKind::Down | KeyEventKind::Press) {
            self.repeated_key_event_end = Some(finished_at);
        }
        if event.kind == KeyEventKind::Down {
            self.ignore_key_press = status == EventStatus::ConsumeNoDefault;
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use keyboard_types::{Code, Key, Modifiers};

    use super::*;

    fn key(kind: KeyEventKind, at_ms: u64, repeat: bool) -> KeyEvent {
        KeyEvent {
            kind,
            key: Key::Character("j".into()),
            code: Code::KeyJ,
            modifiers: Modifiers::empty(),
            is_repeat: repeat,
            skippable: repeat,
            wants_reply: false,
            timestamp: Duration::from_millis(at_ms),
        }
    }

    #[test]
    fn skips_repeats_queued_during_slow_dispatch() {
        let mut filter = KeyRepeatFilter::new();
        let first = key(KeyEventKind::Down, 0, true);
        assert!(!filter.should_skip_repeat(&first));
        filter.record_dispatch(&first, EventStatus::Ignore, Duration::from_millis(50));

        // Sent before the previous repeat finished: skipped with its keypress.
        assert!(filter.should_skip_repeat(&key(KeyEventKind::Down, 30, true)));
        assert!(filter.should_skip_repeat(&key(KeyEventKind::Press, 30, true)));

        // Sent after: delivered and the skip state resets.
        assert!(!filter.should_skip_repeat(&key(KeyEventKind::Down, 60, true)));
        assert!(!filter.should_skip_repeat(&key(KeyEventKind::Press, 60, true)));
    }

    #[test]
    fn non_skippable_event_resets_state() {
        let mut filter = KeyRepeatFilter::new();
        let first = key(KeyEventKind::Down, 0, true);
        filter.record_dispatch(&first, EventStatus::Ignore, Duration::from_millis(50));
        assert!(!filter.should_skip_repeat(&key(KeyEventKind::Up, 10, false)));
        assert!(!filter.should_skip_repeat(&key(KeyEventKind::Down, 20, true)));
    }

    #[test]
    fn consumed_keydown_suppresses_keypress() {
        let mut filter = KeyRepeatFilter::new();
        let down = key(KeyEventKind::Down, 0, false);
        filter.record_dispatch(&down, EventStatus::ConsumeNoDefault, Duration::from_millis(1));
        assert!(filter.suppresses_key_press(&key(KeyEventKind::Press, 1, false)));

        filter.record_dispatch(&down, EventStatus::Ignore, Duration::from_millis(2));
        assert!(!filter.suppresses_key_press(&key(KeyEventKind::Press, 2, false)));
    }
}
