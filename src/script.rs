//! JSON-lines replay scripts for driving a content process by hand.
//!
//! Each non-blank line is one step. Lines starting with `#` are comments.
//!
//! ```text
//! {"step": "create_tab", "tab": 1, "dispatch_cost": 4}
//! {"step": "send", "tab": 1, "priority": "input", "message": {"type": "wheel", "delta_y": 3, "timestamp": 10}}
//! {"step": "run"}
//! ```

use std::io::BufRead;
use std::rc::Rc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::channel::OutboundMessage;
use crate::clock::ManualClock;
use crate::config::TabConfig;
use crate::content::HeadlessContent;
use crate::message::{duration_ms, Envelope, TabId};
use crate::process::{ContentProcess, ProcessError};

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to read script: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Process(#[from] ProcessError),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    CreateTab {
        tab: TabId,
        #[serde(default)]
        visible: bool,
        /// Simulated time each content dispatch takes.
        #[serde(default, with = "duration_ms")]
        dispatch_cost: Duration,
    },
    Send(Envelope),
    AddBlocker {
        tab: TabId,
    },
    RemoveBlocker {
        tab: TabId,
    },
    Destroy {
        tab: TabId,
    },
    Advance {
        #[serde(with = "duration_ms")]
        by: Duration,
    },
    Run,
}

impl ScriptStep {
    /// Parses one script line. Returns `None` for blanks and comments.
    pub fn parse_line(line: usize, text: &str) -> Result<Option<Self>, ScriptError> {
        let text = text.trim();
        if text.is_empty() || text.starts_with('#') {
            return Ok(None);
        }
        serde_json::from_str(text)
            .map(Some)
            .map_err(|source| ScriptError::Json { line, source })
    }
}

pub fn parse_script(reader: impl BufRead) -> Result<Vec<ScriptStep>, ScriptError> {
    let mut steps = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        if let Some(step) = ScriptStep::parse_line(index + 1, &line?)? {
            steps.push(step);
        }
    }
    Ok(steps)
}

/// A content process on a manual clock with headless tabs.
pub struct ScriptRunner {
    process: ContentProcess,
    clock: Rc<ManualClock>,
}

impl ScriptRunner {
    pub fn new(config: TabConfig) -> Self {
        let clock = Rc::new(ManualClock::default());
        Self {
            process: ContentProcess::new(config, clock.clone()),
            clock,
        }
    }

    pub fn process(&self) -> &ContentProcess {
        &self.process
    }

    /// Applies one step and returns whatever the tabs sent to the parent.
    /// Messages queue up until a `run` step or `finish`.
    pub fn apply(&mut self, step: ScriptStep) -> Result<Vec<OutboundMessage>, ScriptError> {
        debug!(target: "tab", ?step, "script step");
        match step {
            ScriptStep::CreateTab {
                tab,
                visible,
                dispatch_cost,
            } => {
                let content = HeadlessContent::new()
                    .with_visible(visible)
                    .with_dispatch_cost(self.clock.clone(), dispatch_cost);
                self.process.create_tab(tab, Box::new(content))?;
            }
            ScriptStep::Send(envelope) => self.process.post(envelope),
            ScriptStep::AddBlocker { tab } => self.process.add_blocker(tab),
            ScriptStep::RemoveBlocker { tab } => self.process.remove_blocker(tab),
            ScriptStep::Destroy { tab } => self.process.destroy_tab(tab),
            ScriptStep::Advance { by } => self.clock.advance(by),
            ScriptStep::Run => {
                self.process.run_until_idle();
            }
        }
        Ok(self.process.take_outbound())
    }

    pub fn finish(&mut self) -> Vec<OutboundMessage> {
        self.process.run_until_idle();
        self.process.take_outbound()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{LayersObserverEpoch, ParentMessage, TabMessage};

    #[test]
    fn parses_steps_and_skips_comments() {
        let script = "\
# setup
{\"step\": \"create_tab\", \"tab\": 1, \"dispatch_cost\": 2.5}

{\"step\": \"send\", \"tab\": 1, \"message\": {\"type\": \"destroy\"}}
{\"step\": \"run\"}
";
        let steps = parse_script(script.as_bytes()).unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(
            steps[0],
            ScriptStep::CreateTab {
                tab: TabId(1),
                visible: false,
                dispatch_cost: Duration::from_micros(2_500),
            }
        );
        assert_eq!(
            steps[1],
            ScriptStep::Send(Envelope::new(TabId(1), TabMessage::Destroy))
        );
    }

    #[test]
    fn reports_line_of_bad_step() {
        let script = "{\"step\": \"run\"}\n{\"step\": \"fly\"}\n";
        match parse_script(script.as_bytes()) {
            Err(ScriptError::Json { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn runner_collects_outbound_messages() {
        let mut runner = ScriptRunner::new(TabConfig::default());
        runner
            .apply(ScriptStep::CreateTab {
                tab: TabId(1),
                visible: true,
                dispatch_cost: Duration::ZERO,
            })
            .unwrap();
        let queued = runner
            .apply(ScriptStep::Send(Envelope::new(
                TabId(1),
                TabMessage::SetRenderState {
                    enabled: true,
                    force_repaint: false,
                    epoch: LayersObserverEpoch(1),
                },
            )))
            .unwrap();
        assert!(queued.is_empty());

        let sent = runner.apply(ScriptStep::Run).unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].message,
            ParentMessage::Acknowledge {
                epoch: LayersObserverEpoch(1)
            }
        );
    }

    #[test]
    fn duplicate_tab_is_an_error() {
        let mut runner = ScriptRunner::new(TabConfig::default());
        let create = ScriptStep::CreateTab {
            tab: TabId(1),
            visible: false,
            dispatch_cost: Duration::ZERO,
        };
        runner.apply(create.clone()).unwrap();
        assert!(matches!(
            runner.apply(create),
            Err(ScriptError::Process(ProcessError::DuplicateTab(_)))
        ));
    }
}
