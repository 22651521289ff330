// Library exports for the replay binary and tests

pub mod channel;
pub mod clock;
pub mod config;
pub mod content;
pub mod epoch;
pub mod event_loop;
pub mod gate;
pub mod input;
pub mod lifecycle;
pub mod message;
pub mod process;
pub mod registry;
pub mod script;
pub mod tab;

// Re-export commonly used types for tests
pub use channel::{MailboxChannel, OutboundMessage, ParentChannel};
pub use clock::{Clock, ManualClock};
pub use config::TabConfig;
pub use content::{ContentDispatcher, ContentLog, HeadlessContent, PaintRequest};
pub use lifecycle::LifecycleState;
pub use message::{Envelope, ParentMessage, TabId, TabMessage};
pub use process::ContentProcess;
pub use registry::{SurfaceRegistry, TabHandle};
pub use tab::TabActor;
