use std::collections::VecDeque;

use crate::lifecycle::DelayedDelete;
use crate::message::{Channel, Envelope, Priority, TabId};

/// A unit of work on the tab thread.
#[derive(Debug, Clone, PartialEq)]
pub enum Runnable {
    Deliver(Envelope),
    DelayedDelete(DelayedDelete),
}

/// Two-level run queue for the tab thread. Input-priority work always runs
/// before normal-priority work; within a level, FIFO.
#[derive(Debug, Default)]
pub struct TabLoop {
    input: VecDeque<Runnable>,
    normal: VecDeque<Runnable>,
}

impl TabLoop {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, priority: Priority) -> &VecDeque<Runnable> {
        match priority {
            Priority::Input => &self.input,
            Priority::Normal => &self.normal,
        }
    }

    pub fn dispatch(&mut self, runnable: Runnable, priority: Priority) {
        match priority {
            Priority::Input => self.input.push_back(runnable),
            Priority::Normal => self.normal.push_back(runnable),
        }
    }

    pub fn deliver(&mut self, envelope: Envelope) {
        let priority = envelope.priority;
        self.dispatch(Runnable::Deliver(envelope), priority);
    }

    pub fn schedule_delete(&mut self, task: DelayedDelete) {
        self.dispatch(Runnable::DelayedDelete(task), task.priority());
    }

    pub fn next(&mut self) -> Option<Runnable> {
        self.input
            .pop_front()
            .or_else(|| self.normal.pop_front())
    }

    /// Whether the next message queued behind the current one on the same
    /// channel and priority is a wheel event for `tab`. Peeks only.
    pub fn next_is_wheel(&self, tab: TabId, channel: Channel, priority: Priority) -> bool {
        self.queue(priority)
            .iter()
            .find_map(|runnable| match runnable {
                Runnable::Deliver(envelope) if envelope.channel == channel => Some(envelope),
                _ => None,
            })
            .is_some_and(|envelope| envelope.tab == tab && envelope.message.is_wheel())
    }

    pub fn len(&self) -> usize {
        self.input.len() + self.normal.len()
    }

    pub fn is_idle(&self) -> bool {
        self.input.is_empty() && self.normal.is_empty()
    }
}
