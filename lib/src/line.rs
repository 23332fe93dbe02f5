// SPDX-FileCopyrightText: 2022 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use gpiod_uapi::{v1, v2, LineEdgeEventKind, LineInfoChangeKind, ValidationError};
#[cfg(feature = "serde")]
use serde_derive::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// An identifier for a line on a particular chip.
///
/// Valid offsets are in the range 0..[`Chip::lines`](crate::chip::Chip::lines).
pub type Offset = u32;

/// The configuration of a single line.
///
/// Does not include the offset, so one config may describe several lines,
/// nor the output value, which is tracked per line by the reservation.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Config {
    /// The direction of the line.
    pub direction: Direction,

    /// When true the line active state corresponds to a physical low.
    pub active_low: bool,

    /// The bias applied to the line.
    pub bias: Option<Bias>,

    /// The drive applied to the line.
    ///
    /// Only relevant for outputs.
    pub drive: Option<Drive>,

    /// The edges reported as events.
    ///
    /// Only relevant for inputs.
    pub edge_detection: Option<EdgeDetection>,

    /// The source clock for edge event timestamps.
    ///
    /// Only relevant for inputs with edge detection.
    pub event_clock: Option<EventClock>,

    /// The debounce period.
    ///
    /// Only relevant for inputs.
    pub debounce_period: Option<Duration>,
}

impl Config {
    /// True if edges on the line generate events.
    pub fn has_edge_detection(&self) -> bool {
        self.edge_detection.is_some()
    }
}

impl From<&Config> for v2::LineFlags {
    fn from(cfg: &Config) -> v2::LineFlags {
        let mut flags = v2::LineFlags::empty();
        flags.set(v2::LineFlags::ACTIVE_LOW, cfg.active_low);
        flags |= match cfg.bias {
            None => v2::LineFlags::empty(),
            Some(Bias::PullUp) => v2::LineFlags::BIAS_PULL_UP,
            Some(Bias::PullDown) => v2::LineFlags::BIAS_PULL_DOWN,
            Some(Bias::Disabled) => v2::LineFlags::BIAS_DISABLED,
        };
        match cfg.direction {
            Direction::Output => {
                flags |= v2::LineFlags::OUTPUT;
                flags |= match cfg.drive {
                    None | Some(Drive::PushPull) => v2::LineFlags::empty(),
                    Some(Drive::OpenDrain) => v2::LineFlags::OPEN_DRAIN,
                    Some(Drive::OpenSource) => v2::LineFlags::OPEN_SOURCE,
                };
            }
            Direction::Input => {
                flags |= v2::LineFlags::INPUT;
                flags |= match cfg.edge_detection {
                    None => v2::LineFlags::empty(),
                    Some(EdgeDetection::RisingEdge) => v2::LineFlags::EDGE_RISING,
                    Some(EdgeDetection::FallingEdge) => v2::LineFlags::EDGE_FALLING,
                    Some(EdgeDetection::BothEdges) => {
                        v2::LineFlags::EDGE_RISING | v2::LineFlags::EDGE_FALLING
                    }
                };
                if cfg.edge_detection.is_some() {
                    flags |= match cfg.event_clock {
                        None | Some(EventClock::Monotonic) => v2::LineFlags::empty(),
                        Some(EventClock::Realtime) => v2::LineFlags::EVENT_CLOCK_REALTIME,
                        Some(EventClock::Hte) => v2::LineFlags::EVENT_CLOCK_HTE,
                    };
                }
            }
        }
        flags
    }
}

impl From<&Config> for v1::HandleRequestFlags {
    fn from(cfg: &Config) -> v1::HandleRequestFlags {
        let mut flags = v1::HandleRequestFlags::empty();
        flags.set(v1::HandleRequestFlags::ACTIVE_LOW, cfg.active_low);
        flags |= match cfg.bias {
            None => v1::HandleRequestFlags::empty(),
            Some(Bias::PullUp) => v1::HandleRequestFlags::BIAS_PULL_UP,
            Some(Bias::PullDown) => v1::HandleRequestFlags::BIAS_PULL_DOWN,
            Some(Bias::Disabled) => v1::HandleRequestFlags::BIAS_DISABLED,
        };
        match cfg.direction {
            Direction::Output => {
                flags |= v1::HandleRequestFlags::OUTPUT;
                flags |= match cfg.drive {
                    None | Some(Drive::PushPull) => v1::HandleRequestFlags::empty(),
                    Some(Drive::OpenDrain) => v1::HandleRequestFlags::OPEN_DRAIN,
                    Some(Drive::OpenSource) => v1::HandleRequestFlags::OPEN_SOURCE,
                };
            }
            Direction::Input => flags |= v1::HandleRequestFlags::INPUT,
        }
        flags
    }
}

impl From<&Config> for v1::EventRequestFlags {
    fn from(cfg: &Config) -> v1::EventRequestFlags {
        match cfg.edge_detection {
            None => v1::EventRequestFlags::empty(),
            Some(EdgeDetection::RisingEdge) => v1::EventRequestFlags::RISING_EDGE,
            Some(EdgeDetection::FallingEdge) => v1::EventRequestFlags::FALLING_EDGE,
            Some(EdgeDetection::BothEdges) => v1::EventRequestFlags::BOTH_EDGES,
        }
    }
}

/// The publicly available information for a line.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Info {
    /// The line offset on the chip.
    pub offset: Offset,

    /// The name of the line, such as a pin or rail name, as assigned by the chip.
    ///
    /// May be empty.
    pub name: String,

    /// The consumer label set by whoever has requested the line.
    ///
    /// Empty if the line is unused, or if the user set no label.
    pub consumer: String,

    /// When true the line is in use and is not available for request.
    pub used: bool,

    /// The configuration of the line as reported by the kernel.
    ///
    /// The v1 uAPI does not report edge detection, event clock nor
    /// debounce, so those are always None under v1.
    pub config: Config,
}

impl From<&v1::LineInfo> for Info {
    fn from(li: &v1::LineInfo) -> Self {
        let f = li.flags;
        let direction = if f.contains(v1::LineInfoFlags::OUTPUT) {
            Direction::Output
        } else {
            Direction::Input
        };
        let bias = if f.contains(v1::LineInfoFlags::BIAS_PULL_UP) {
            Some(Bias::PullUp)
        } else if f.contains(v1::LineInfoFlags::BIAS_PULL_DOWN) {
            Some(Bias::PullDown)
        } else if f.contains(v1::LineInfoFlags::BIAS_DISABLED) {
            Some(Bias::Disabled)
        } else {
            None
        };
        let drive = match direction {
            Direction::Input => None,
            Direction::Output if f.contains(v1::LineInfoFlags::OPEN_DRAIN) => {
                Some(Drive::OpenDrain)
            }
            Direction::Output if f.contains(v1::LineInfoFlags::OPEN_SOURCE) => {
                Some(Drive::OpenSource)
            }
            Direction::Output => Some(Drive::PushPull),
        };
        Info {
            offset: li.offset,
            name: String::from(&li.name),
            consumer: String::from(&li.consumer),
            used: f.contains(v1::LineInfoFlags::USED),
            config: Config {
                direction,
                active_low: f.contains(v1::LineInfoFlags::ACTIVE_LOW),
                bias,
                drive,
                ..Default::default()
            },
        }
    }
}

impl From<&v2::LineInfo> for Info {
    fn from(li: &v2::LineInfo) -> Self {
        let f = li.flags;
        let direction = if f.contains(v2::LineFlags::OUTPUT) {
            Direction::Output
        } else {
            Direction::Input
        };
        let bias = if f.contains(v2::LineFlags::BIAS_PULL_UP) {
            Some(Bias::PullUp)
        } else if f.contains(v2::LineFlags::BIAS_PULL_DOWN) {
            Some(Bias::PullDown)
        } else if f.contains(v2::LineFlags::BIAS_DISABLED) {
            Some(Bias::Disabled)
        } else {
            None
        };
        let drive = match direction {
            Direction::Input => None,
            Direction::Output if f.contains(v2::LineFlags::OPEN_DRAIN) => Some(Drive::OpenDrain),
            Direction::Output if f.contains(v2::LineFlags::OPEN_SOURCE) => {
                Some(Drive::OpenSource)
            }
            Direction::Output => Some(Drive::PushPull),
        };
        let rising = f.contains(v2::LineFlags::EDGE_RISING);
        let falling = f.contains(v2::LineFlags::EDGE_FALLING);
        let edge_detection = match (rising, falling) {
            (true, true) => Some(EdgeDetection::BothEdges),
            (true, false) => Some(EdgeDetection::RisingEdge),
            (false, true) => Some(EdgeDetection::FallingEdge),
            (false, false) => None,
        };
        let event_clock = edge_detection.map(|_| {
            if f.contains(v2::LineFlags::EVENT_CLOCK_REALTIME) {
                EventClock::Realtime
            } else if f.contains(v2::LineFlags::EVENT_CLOCK_HTE) {
                EventClock::Hte
            } else {
                EventClock::Monotonic
            }
        });
        Info {
            offset: li.offset,
            name: String::from(&li.name),
            consumer: String::from(&li.consumer),
            used: f.contains(v2::LineFlags::USED),
            config: Config {
                direction,
                active_low: f.contains(v2::LineFlags::ACTIVE_LOW),
                bias,
                drive,
                edge_detection,
                event_clock,
                debounce_period: li.debounce_period(),
            },
        }
    }
}

/// The logical level of a line.
///
/// The mapping between logical and physical levels depends on the
/// active-low setting:
///
/// |                 | Physical Low | Physical High |
/// |-----------------|--------------|---------------|
/// | **Active-High** | Inactive     | Active        |
/// | **Active-Low**  | Active       | Inactive      |
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Value {
    /// The line is inactive.
    #[default]
    Inactive,
    /// The line is active.
    Active,
}

impl Value {
    /// The opposite value.
    pub fn not(&self) -> Value {
        match self {
            Value::Active => Value::Inactive,
            Value::Inactive => Value::Active,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Active => write!(f, "active"),
            Value::Inactive => write!(f, "inactive"),
        }
    }
}

impl From<Value> for bool {
    fn from(v: Value) -> bool {
        v == Value::Active
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        if b {
            Value::Active
        } else {
            Value::Inactive
        }
    }
}

impl From<Value> for u8 {
    fn from(v: Value) -> u8 {
        v as u8
    }
}

impl From<u8> for Value {
    fn from(i: u8) -> Value {
        Value::from(i != 0)
    }
}

/// The direction of a line.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Direction {
    /// The line is an input.
    #[default]
    Input,
    /// The line is an output.
    Output,
}

/// The bias applied to a line.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Bias {
    /// The line is pulled up.
    PullUp,
    /// The line is pulled down.
    PullDown,
    /// The line has bias disabled and floats unless externally driven.
    Disabled,
}

/// The drive policy of an output line.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Drive {
    /// The line is driven both when active and inactive.
    #[default]
    PushPull,
    /// The line is driven low, and floats when high.
    OpenDrain,
    /// The line is driven high, and floats when low.
    OpenSource,
}

/// The edges that generate events.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EdgeDetection {
    /// Transitions from inactive to active.
    RisingEdge,
    /// Transitions from active to inactive.
    FallingEdge,
    /// Transitions in either direction.
    BothEdges,
}

/// The clock source for edge event timestamps.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum EventClock {
    /// **CLOCK_MONOTONIC**, the v2 default.
    #[default]
    Monotonic,
    /// **CLOCK_REALTIME**.
    Realtime,
    /// The hardware timestamp engine.
    ///
    /// Requires Linux 5.19 or later with CONFIG_HTE and supporting hardware.
    Hte,
}

/// An edge detected on an input line.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EdgeEvent {
    /// The offset of the line that triggered the event.
    pub offset: Offset,

    /// The transition that triggered the event.
    pub kind: EdgeKind,

    /// The time of the event in nanoseconds.
    ///
    /// The clock depends on the line's [`EventClock`] under v2.  Under v1 it
    /// is CLOCK_MONOTONIC or CLOCK_REALTIME depending on the kernel version.
    pub timestamp_ns: u64,

    /// The sequence number of the event across all lines in the reservation.
    ///
    /// Always zero under v1.
    pub seqno: u32,

    /// The sequence number of the event on this line.
    ///
    /// Always zero under v1.
    pub line_seqno: u32,
}

impl EdgeEvent {
    /// Decode a v1 event, which does not identify its line.
    pub(crate) fn from_v1(ev: &v1::LineEdgeEvent, offset: Offset) -> Result<Self, ValidationError> {
        Ok(EdgeEvent {
            offset,
            kind: EdgeKind::from(ev.kind()?),
            timestamp_ns: ev.timestamp_ns,
            seqno: 0,
            line_seqno: 0,
        })
    }
}

impl TryFrom<&v2::LineEdgeEvent> for EdgeEvent {
    type Error = ValidationError;

    fn try_from(ev: &v2::LineEdgeEvent) -> Result<Self, Self::Error> {
        Ok(EdgeEvent {
            offset: ev.offset,
            kind: EdgeKind::from(ev.kind()?),
            timestamp_ns: ev.timestamp_ns,
            seqno: ev.seqno,
            line_seqno: ev.line_seqno,
        })
    }
}

/// The transition that triggered an [`EdgeEvent`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EdgeKind {
    /// The line went from inactive to active.
    Rising,
    /// The line went from active to inactive.
    Falling,
}

impl From<LineEdgeEventKind> for EdgeKind {
    fn from(kind: LineEdgeEventKind) -> Self {
        match kind {
            LineEdgeEventKind::RisingEdge => EdgeKind::Rising,
            LineEdgeEventKind::FallingEdge => EdgeKind::Falling,
        }
    }
}

/// A change to the [`Info`] of a watched line.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InfoChangeEvent {
    /// The info of the line after the change.
    pub info: Info,

    /// The time of the change in nanoseconds, from CLOCK_MONOTONIC.
    pub timestamp_ns: u64,

    /// What changed.
    pub kind: InfoChangeKind,
}

impl TryFrom<&v2::LineInfoChangeEvent> for InfoChangeEvent {
    type Error = ValidationError;

    fn try_from(ev: &v2::LineInfoChangeEvent) -> Result<Self, Self::Error> {
        Ok(InfoChangeEvent {
            info: Info::from(&ev.info),
            timestamp_ns: ev.timestamp_ns,
            kind: InfoChangeKind::from(ev.kind()?),
        })
    }
}

/// The cause of an [`InfoChangeEvent`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum InfoChangeKind {
    /// The line has been requested.
    Requested,
    /// The line has been released.
    Released,
    /// The line has been reconfigured.
    Reconfigured,
}

impl From<LineInfoChangeKind> for InfoChangeKind {
    fn from(kind: LineInfoChangeKind) -> Self {
        match kind {
            LineInfoChangeKind::Requested => InfoChangeKind::Requested,
            LineInfoChangeKind::Released => InfoChangeKind::Released,
            LineInfoChangeKind::Reconfigured => InfoChangeKind::Reconfigured,
        }
    }
}
