use std::fmt;
use std::time::Duration;

use keyboard_types::{Code, Key, Modifiers};
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

id_type!(
    /// Opaque identity the parent assigns to a tab.
    TabId(u64)
);
id_type!(
    /// Identifier of the render surface (layer tree) a tab paints into.
    SurfaceId(u64)
);
id_type!(PointerId(u32));
id_type!(InputBlockId(u64));
id_type!(
    /// Monotonic counter carried by render-state requests.
    LayersObserverEpoch(u64)
);

impl LayersObserverEpoch {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Hit-test target resolved by the parent for an input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ScrollableLayerGuid {
    pub layers_id: u64,
    pub pres_shell_id: u32,
    pub scroll_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Event timestamps travel as fractional milliseconds on the wire.
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = f64::deserialize(deserializer)?;
        if !millis.is_finite() || millis < 0.0 {
            return Err(serde::de::Error::custom("timestamp must be a non-negative number"));
        }
        Ok(Duration::from_nanos((millis * 1_000_000.0).round() as u64))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Primary,
    Secondary,
    Auxiliary,
    Back,
    Forward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    Down,
    Up,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerMoveEvent {
    pub pointer_id: PointerId,
    pub position: Point,
    #[serde(default)]
    pub modifiers: Modifiers,
    /// Bitmask of buttons held during the move.
    #[serde(default)]
    pub buttons: u16,
    #[serde(default, with = "duration_ms")]
    pub timestamp: Duration,
    #[serde(default)]
    pub input_block_id: InputBlockId,
    #[serde(default)]
    pub guid: ScrollableLayerGuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonEvent {
    pub pointer_id: PointerId,
    pub button: MouseButton,
    pub action: ButtonAction,
    pub position: Point,
    #[serde(default)]
    pub modifiers: Modifiers,
    #[serde(default, with = "duration_ms")]
    pub timestamp: Duration,
    #[serde(default)]
    pub input_block_id: InputBlockId,
    #[serde(default)]
    pub guid: ScrollableLayerGuid,
}

/// A pointer event as handed to content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PointerEvent {
    Move(PointerMoveEvent),
    Button(ButtonEvent),
}

impl PointerEvent {
    pub fn pointer_id(&self) -> PointerId {
        match self {
            Self::Move(event) => event.pointer_id,
            Self::Button(event) => event.pointer_id,
        }
    }

    pub fn input_block_id(&self) -> InputBlockId {
        match self {
            Self::Move(event) => event.input_block_id,
            Self::Button(event) => event.input_block_id,
        }
    }

    pub fn position(&self) -> Point {
        match self {
            Self::Move(event) => event.position,
            Self::Button(event) => event.position,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaMode {
    #[default]
    Pixel,
    Line,
    Page,
}

/// Where a wheel event sits within a scroll operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WheelPhase {
    Start,
    #[default]
    Delta,
    End,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WheelEvent {
    #[serde(default)]
    pub delta_x: f64,
    #[serde(default)]
    pub delta_y: f64,
    #[serde(default)]
    pub delta_z: f64,
    #[serde(default)]
    pub delta_mode: DeltaMode,
    #[serde(default)]
    pub phase: WheelPhase,
    #[serde(default)]
    pub position: Point,
    #[serde(default)]
    pub modifiers: Modifiers,
    #[serde(default, with = "duration_ms")]
    pub timestamp: Duration,
    #[serde(default)]
    pub input_block_id: InputBlockId,
    #[serde(default)]
    pub guid: ScrollableLayerGuid,
}

/// Attributes two wheel events must share before their deltas may be summed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WheelCompatibility {
    pub delta_mode: DeltaMode,
    pub modifiers: Modifiers,
    pub input_block_id: InputBlockId,
    pub guid: ScrollableLayerGuid,
}

impl WheelEvent {
    pub fn compatibility(&self) -> WheelCompatibility {
        WheelCompatibility {
            delta_mode: self.delta_mode,
            modifiers: self.modifiers,
            input_block_id: self.input_block_id,
            guid: self.guid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEventKind {
    Down,
    Press,
    Up,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    pub key: Key,
    #[serde(default = "unidentified_code")]
    pub code: Code,
    #[serde(default)]
    pub modifiers: Modifiers,
    #[serde(default)]
    pub is_repeat: bool,
    /// The parent allows this event to be dropped when content falls behind.
    #[serde(default)]
    pub skippable: bool,
    #[serde(default)]
    pub wants_reply: bool,
    #[serde(default, with = "duration_ms")]
    pub timestamp: Duration,
}

fn unidentified_code() -> Code {
    Code::Unidentified
}

/// Result of dispatching an event into content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Ignore,
    ConsumeNoDefault,
    ConsumeDoDefault,
}

/// The delivery path a message travelled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Ordered control channel to the parent.
    #[default]
    Content,
    /// Expedited path used to force paints while content script is busy.
    HangMonitor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Input,
    #[default]
    Normal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TabMessage {
    Destroy,
    SetRenderState {
        enabled: bool,
        #[serde(default)]
        force_repaint: bool,
        epoch: LayersObserverEpoch,
    },
    PaintWhileInterrupting {
        epoch: LayersObserverEpoch,
        #[serde(default)]
        force_repaint: bool,
    },
    SetActive {
        is_active: bool,
    },
    InitRendering {
        surface: SurfaceId,
    },
    PointerMove(PointerMoveEvent),
    SynthPointerMove(PointerMoveEvent),
    Button(ButtonEvent),
    Wheel(WheelEvent),
    Key(KeyEvent),
    /// The transport reported the channel gone without a destroy handshake.
    ChannelClosed,
}

impl TabMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Destroy => "destroy",
            Self::SetRenderState { .. } => "set_render_state",
            Self::PaintWhileInterrupting { .. } => "paint_while_interrupting",
            Self::SetActive { .. } => "set_active",
            Self::InitRendering { .. } => "init_rendering",
            Self::PointerMove(_) => "pointer_move",
            Self::SynthPointerMove(_) => "synth_pointer_move",
            Self::Button(_) => "button",
            Self::Wheel(_) => "wheel",
            Self::Key(_) => "key",
            Self::ChannelClosed => "channel_closed",
        }
    }

    pub fn is_wheel(&self) -> bool {
        matches!(self, Self::Wheel(_))
    }
}

/// An inbound message addressed to one tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub tab: TabId,
    #[serde(default)]
    pub channel: Channel,
    #[serde(default)]
    pub priority: Priority,
    pub message: TabMessage,
}

impl Envelope {
    pub fn new(tab: TabId, message: TabMessage) -> Self {
        Self {
            tab,
            channel: Channel::Content,
            priority: Priority::Normal,
            message,
        }
    }

    pub fn input(tab: TabId, message: TabMessage) -> Self {
        Self {
            priority: Priority::Input,
            ..Self::new(tab, message)
        }
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }
}

/// Messages sent from the tab back to the parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParentMessage {
    /// Render request was a no-op; confirms the child reached `epoch`.
    Acknowledge { epoch: LayersObserverEpoch },
    ReplyKeyEvent {
        event: KeyEvent,
        default_prevented: bool,
    },
    ChannelClose,
}
