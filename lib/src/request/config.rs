// SPDX-FileCopyrightText: 2022 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::line::{self, Bias, Direction, Drive, EdgeDetection, EventClock, Offset, Value};
use nohash_hasher::IntMap;
use std::time::Duration;

/// A set of changes to the configuration of the lines in a reservation.
///
/// The changes are recorded in order and replayed onto the configuration of
/// the reservation, both when the lines are first requested and on each
/// reconfigure, so the same `Config` can describe either.
///
/// Mutators change the base configuration, which applies to every line
/// without a configuration of its own, until lines are selected with
/// [`with_line`] or [`with_lines`].  Selected lines take their current
/// configuration as a starting point, and subsequent mutators only change
/// the selected lines.  Selected lines keep their own configuration through
/// later changes to the base, unless it becomes identical to the base.
///
/// # Examples
/// ```
///    use gpiod::line::{Bias::*, Value::*};
///    use gpiod::request::Config;
///
///    let mut cfg = Config::default();
///    cfg.as_input()
///        .with_bias(PullUp)
///        // base config ends here
///        .with_lines(&[3, 5]) // lines 3 and 5 are pull-up inputs, as the base...
///        .as_active_low() // ...and also active low
///        .with_line(8) // while line 8 is an output.
///        .as_output(Active);
/// ```
///
/// [`with_line`]: Config::with_line
/// [`with_lines`]: Config::with_lines
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Config {
    ops: Vec<Op>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Op {
    Select(Vec<Offset>),
    Set(Setting),
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum Setting {
    Input,
    Output(Value),
    OutputValues(Vec<Value>),
    ActiveLow(bool),
    Bias(Option<Bias>),
    Drive(Drive),
    EdgeDetection(Option<EdgeDetection>),
    DebouncePeriod(Duration),
    EventClock(EventClock),
}

impl Setting {
    fn apply(&self, cfg: &mut line::Config) {
        match self {
            Setting::Input => {
                cfg.direction = Direction::Input;
                cfg.drive = None;
            }
            Setting::Output(_) | Setting::OutputValues(_) => {
                cfg.direction = Direction::Output;
                cfg.edge_detection = None;
                cfg.event_clock = None;
                cfg.debounce_period = None;
            }
            Setting::ActiveLow(active_low) => cfg.active_low = *active_low,
            Setting::Bias(bias) => cfg.bias = *bias,
            Setting::Drive(drive) => {
                cfg.direction = Direction::Output;
                cfg.drive = Some(*drive);
                cfg.edge_detection = None;
                cfg.event_clock = None;
                cfg.debounce_period = None;
            }
            Setting::EdgeDetection(edge) => {
                if edge.is_some() {
                    cfg.direction = Direction::Input;
                    cfg.drive = None;
                }
                cfg.edge_detection = *edge;
            }
            Setting::DebouncePeriod(period) => {
                cfg.direction = Direction::Input;
                cfg.drive = None;
                cfg.debounce_period = Some(*period).filter(|p| !p.is_zero());
            }
            Setting::EventClock(clock) => cfg.event_clock = Some(*clock),
        }
    }
}

impl Config {
    /// True if the config contains no changes.
    ///
    /// Reconfiguring with an empty config is a no-op.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn set(&mut self, setting: Setting) -> &mut Self {
        self.ops.push(Op::Set(setting));
        self
    }

    /// Set the selected lines to input.
    pub fn as_input(&mut self) -> &mut Self {
        self.set(Setting::Input)
    }

    /// Set the selected lines to output with the given value.
    ///
    /// Disables edge detection and debounce.
    pub fn as_output(&mut self, value: Value) -> &mut Self {
        self.set(Setting::Output(value))
    }

    /// Set the selected lines to output with the values given by position.
    ///
    /// Before any lines are selected the positions are those of the
    /// reservation, otherwise those of the selection.
    /// Positions without a value are set inactive, and extra values are ignored.
    pub fn with_output_values(&mut self, values: &[Value]) -> &mut Self {
        self.set(Setting::OutputValues(values.to_vec()))
    }

    /// Set the selected lines to active low.
    pub fn as_active_low(&mut self) -> &mut Self {
        self.set(Setting::ActiveLow(true))
    }

    /// Set the selected lines to active high.
    pub fn as_active_high(&mut self) -> &mut Self {
        self.set(Setting::ActiveLow(false))
    }

    /// Set the bias of the selected lines.
    pub fn with_bias<B: Into<Option<Bias>>>(&mut self, bias: B) -> &mut Self {
        self.set(Setting::Bias(bias.into()))
    }

    /// Set the drive of the selected lines.
    ///
    /// Implicitly sets the lines as outputs, without changing their value.
    pub fn with_drive(&mut self, drive: Drive) -> &mut Self {
        self.set(Setting::Drive(drive))
    }

    /// Set the edges detected on the selected lines.
    ///
    /// Implicitly sets the lines as inputs, unless disabling edge detection.
    pub fn with_edge_detection<E: Into<Option<EdgeDetection>>>(&mut self, edge: E) -> &mut Self {
        self.set(Setting::EdgeDetection(edge.into()))
    }

    /// Disable edge detection on the selected lines.
    pub fn without_edge_detection(&mut self) -> &mut Self {
        self.set(Setting::EdgeDetection(None))
    }

    /// Set the debounce period of the selected lines.
    ///
    /// A zero period disables debounce.
    /// Implicitly sets the lines as inputs.
    pub fn with_debounce_period(&mut self, period: Duration) -> &mut Self {
        self.set(Setting::DebouncePeriod(period))
    }

    /// Set the clock used to timestamp edge events on the selected lines.
    pub fn with_event_clock(&mut self, clock: EventClock) -> &mut Self {
        self.set(Setting::EventClock(clock))
    }

    /// Select a single line for subsequent mutators.
    pub fn with_line(&mut self, offset: Offset) -> &mut Self {
        self.with_lines(&[offset])
    }

    /// Select a set of lines for subsequent mutators.
    ///
    /// Offsets not in the reservation are ignored.
    pub fn with_lines(&mut self, offsets: &[Offset]) -> &mut Self {
        self.ops.push(Op::Select(offsets.to_vec()));
        self
    }

    /// Replay the changes onto a layout.
    pub(crate) fn apply(&self, layout: &mut Layout) {
        let mut selected: Option<Vec<Offset>> = None;
        for op in &self.ops {
            match op {
                Op::Select(offsets) => {
                    let offsets: Vec<Offset> = offsets
                        .iter()
                        .copied()
                        .filter(|o| layout.offsets.contains(o))
                        .collect();
                    for o in &offsets {
                        let base = &layout.base;
                        layout.lines.entry(*o).or_insert_with(|| base.clone());
                    }
                    selected = Some(offsets);
                }
                Op::Set(setting) => match &selected {
                    None => {
                        setting.apply(&mut layout.base);
                        let positions: Vec<usize> = (0..layout.offsets.len()).collect();
                        layout.set_values(setting, &positions);
                    }
                    Some(offsets) => {
                        let mut positions = Vec::with_capacity(offsets.len());
                        for o in offsets {
                            if let Some(cfg) = layout.lines.get_mut(o) {
                                setting.apply(cfg);
                            }
                            if let Some(pos) = layout.position(*o) {
                                positions.push(pos);
                            }
                        }
                        layout.set_values(setting, &positions);
                    }
                },
            }
        }
        layout.collapse();
    }
}

/// The configuration applied to the lines of a reservation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct Layout {
    /// The offsets of the lines, in reservation order.
    pub(crate) offsets: Vec<Offset>,
    /// The configuration of lines without one of their own.
    pub(crate) base: line::Config,
    /// Lines with their own configuration.
    pub(crate) lines: IntMap<Offset, line::Config>,
    /// The values driven on outputs, by position.
    pub(crate) values: Vec<Value>,
}

impl Layout {
    /// A layout of input lines.
    pub(crate) fn new(offsets: &[Offset]) -> Layout {
        Layout {
            offsets: offsets.to_vec(),
            values: vec![Value::Inactive; offsets.len()],
            ..Default::default()
        }
    }

    /// The configuration applied to a line.
    pub(crate) fn config(&self, offset: Offset) -> &line::Config {
        self.lines.get(&offset).unwrap_or(&self.base)
    }

    /// The configurations of the lines, by position.
    pub(crate) fn configs(&self) -> impl Iterator<Item = &line::Config> {
        self.offsets.iter().map(|o| self.config(*o))
    }

    /// True if every line shares the base configuration.
    pub(crate) fn is_uniform(&self) -> bool {
        self.lines.is_empty()
    }

    /// True if any line has edge detection enabled.
    pub(crate) fn has_edge_detection(&self) -> bool {
        self.configs().any(|c| c.has_edge_detection())
    }

    fn position(&self, offset: Offset) -> Option<usize> {
        self.offsets.iter().position(|o| *o == offset)
    }

    fn set_values(&mut self, setting: &Setting, positions: &[usize]) {
        match setting {
            Setting::Output(v) => {
                for p in positions {
                    self.values[*p] = *v;
                }
            }
            Setting::OutputValues(vv) => {
                for (i, p) in positions.iter().enumerate() {
                    self.values[*p] = vv.get(i).copied().unwrap_or_default();
                }
            }
            _ => {}
        }
    }

    fn collapse(&mut self) {
        let base = &self.base;
        self.lines.retain(|_, cfg| cfg != base);
    }
}
