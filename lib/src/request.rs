// SPDX-FileCopyrightText: 2022 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

mod config;
pub use self::config::Config;
use self::config::Layout;

mod encode;

use crate::chip::{read_line_info, Chip};
use crate::dispatch::{Dispatcher, Source};
use crate::line::{
    self, Bias, Direction, Drive, EdgeDetection, EdgeEvent, EventClock, Offset, Value,
};
use crate::{AbiVersion, Capabilities, Error, Result, UapiCall};
use gpiod_uapi::{v1, v2, LINES_MAX};
use std::fmt;
use std::fs::File;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// A handler for edge events.
pub type EdgeHandler = Arc<dyn Fn(EdgeEvent) + Send + Sync>;

/// The options for a request of lines.
///
/// Combines the initial [`Config`] of the lines with settings that only
/// apply when the lines are requested.
///
/// The configuration mutators mirror those of [`Config`].
#[derive(Clone, Default)]
pub struct Options {
    config: Config,
    consumer: Option<String>,
    handler: Option<EdgeHandler>,
    event_buffer_size: u32,
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("config", &self.config)
            .field("consumer", &self.consumer)
            .field("handler", &self.handler.is_some())
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl Options {
    /// Replace the line configuration.
    pub fn with_config(&mut self, config: Config) -> &mut Self {
        self.config = config;
        self
    }

    /// The line configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Set the consumer label for the lines, overriding the chip's.
    pub fn with_consumer(&mut self, consumer: &str) -> &mut Self {
        self.consumer = Some(consumer.into());
        self
    }

    /// Set the handler for edge events.
    ///
    /// The handler is called from a background thread owned by the
    /// reservation, one event at a time, in the order the kernel reports
    /// them.  It is not called after the reservation is closed.
    ///
    /// Edge detection must also be enabled for events to be reported.
    pub fn with_event_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(EdgeEvent) + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Suggest the size of the kernel edge event buffer.
    ///
    /// The kernel may apply limits.  Zero selects the kernel default.
    /// Ignored under the v1 uAPI ABI.
    pub fn with_kernel_event_buffer_size(&mut self, event_buffer_size: u32) -> &mut Self {
        self.event_buffer_size = event_buffer_size;
        self
    }

    /// Set the selected lines to input.
    pub fn as_input(&mut self) -> &mut Self {
        self.config.as_input();
        self
    }

    /// Set the selected lines to output with the given value.
    pub fn as_output(&mut self, value: Value) -> &mut Self {
        self.config.as_output(value);
        self
    }

    /// Set the selected lines to output with the values given by position.
    pub fn with_output_values(&mut self, values: &[Value]) -> &mut Self {
        self.config.with_output_values(values);
        self
    }

    /// Set the selected lines to active low.
    pub fn as_active_low(&mut self) -> &mut Self {
        self.config.as_active_low();
        self
    }

    /// Set the selected lines to active high.
    pub fn as_active_high(&mut self) -> &mut Self {
        self.config.as_active_high();
        self
    }

    /// Set the bias of the selected lines.
    pub fn with_bias<B: Into<Option<Bias>>>(&mut self, bias: B) -> &mut Self {
        self.config.with_bias(bias);
        self
    }

    /// Set the drive of the selected lines.
    pub fn with_drive(&mut self, drive: Drive) -> &mut Self {
        self.config.with_drive(drive);
        self
    }

    /// Set the edges detected on the selected lines.
    pub fn with_edge_detection<E: Into<Option<EdgeDetection>>>(&mut self, edge: E) -> &mut Self {
        self.config.with_edge_detection(edge);
        self
    }

    /// Disable edge detection on the selected lines.
    pub fn without_edge_detection(&mut self) -> &mut Self {
        self.config.without_edge_detection();
        self
    }

    /// Set the debounce period of the selected lines.
    pub fn with_debounce_period(&mut self, period: Duration) -> &mut Self {
        self.config.with_debounce_period(period);
        self
    }

    /// Set the clock used to timestamp edge events on the selected lines.
    pub fn with_event_clock(&mut self, clock: EventClock) -> &mut Self {
        self.config.with_event_clock(clock);
        self
    }

    /// Select a single line for subsequent mutators.
    pub fn with_line(&mut self, offset: Offset) -> &mut Self {
        self.config.with_line(offset);
        self
    }

    /// Select a set of lines for subsequent mutators.
    pub fn with_lines(&mut self, offsets: &[Offset]) -> &mut Self {
        self.config.with_lines(offsets);
        self
    }
}

// The descriptors holding a reservation.
enum Handle {
    // v1 lines without edge detection share a handle.
    V1Lines(Arc<File>),
    // v1 lines with edge detection each have an event request.
    V1Events(Vec<Arc<File>>),
    V2(Arc<File>),
}

/// An exclusive reservation of a set of lines on a chip.
///
/// The lines are released when the set is closed or dropped.
///
/// # Output Lifetime
///
/// The value of an output line is only guaranteed for the lifetime of the
/// reservation.  Once released the line may retain its value or revert to
/// a default, depending on the driver.
pub struct LineSet {
    chip_name: String,
    chip: Arc<File>,
    caps: Capabilities,
    offsets: Vec<Offset>,
    // stopped before the handle is released
    dispatcher: Option<Dispatcher>,
    handle: Option<Handle>,
    layout: RwLock<Layout>,
    info: Mutex<Option<Vec<line::Info>>>,
}

impl fmt::Debug for LineSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineSet")
            .field("chip", &self.chip_name)
            .field("offsets", &self.offsets)
            .field("abi_version", &self.caps.abi_version())
            .field("closed", &self.handle.is_none())
            .finish()
    }
}

impl LineSet {
    pub(crate) fn new(chip: &Chip, offsets: &[Offset], options: &Options) -> Result<LineSet> {
        let cf = chip.file()?.clone();
        let num_lines = chip.lines()?;
        for (idx, offset) in offsets.iter().enumerate() {
            if *offset >= num_lines || offsets[..idx].contains(offset) {
                return Err(Error::InvalidOffset);
            }
        }
        let caps = chip.capabilities();
        let abiv = caps.abi_version();
        if offsets.is_empty() || offsets.len() > LINES_MAX {
            let call = match abiv {
                AbiVersion::V1 => UapiCall::GetLineHandle,
                AbiVersion::V2 => UapiCall::GetLine,
            };
            return Err(Error::unsupported(call));
        }

        let mut layout = Layout::new(offsets);
        options.config.apply(&mut layout);
        let call = match (abiv, layout.has_edge_detection()) {
            (AbiVersion::V1, true) => UapiCall::GetLineEvent,
            (AbiVersion::V1, false) => UapiCall::GetLineHandle,
            (AbiVersion::V2, _) => UapiCall::GetLine,
        };
        check_capabilities(&caps, &layout, call)?;
        let consumer = options.consumer.as_deref().unwrap_or(chip.consumer());
        let handle = match abiv {
            AbiVersion::V2 => {
                let lr = encode::to_v2_request(&layout, consumer, options.event_buffer_size)
                    .map_err(|e| Error::Uapi(UapiCall::GetLine, e))?;
                let f = v2::get_line(&cf, lr).map_err(|e| Error::Uapi(UapiCall::GetLine, e))?;
                Handle::V2(Arc::new(f))
            }
            AbiVersion::V1 if layout.has_edge_detection() => {
                let files = encode::to_v1_event_requests(&layout, consumer)?
                    .into_iter()
                    .map(|er| {
                        v1::get_line_event(&cf, er)
                            .map(Arc::new)
                            .map_err(|e| Error::Uapi(UapiCall::GetLineEvent, e))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Handle::V1Events(files)
            }
            AbiVersion::V1 => {
                let hr = encode::to_v1_handle_request(&layout, consumer)?;
                let f = v1::get_line_handle(&cf, hr)
                    .map_err(|e| Error::Uapi(UapiCall::GetLineHandle, e))?;
                Handle::V1Lines(Arc::new(f))
            }
        };

        let files = match &handle {
            Handle::V2(f) => vec![f.clone()],
            Handle::V1Events(files) => files.clone(),
            Handle::V1Lines(_) => Vec::new(),
        };
        let dispatcher = match &options.handler {
            Some(handler) if !files.is_empty() => {
                let source = EdgeSource {
                    files,
                    offsets: offsets.to_vec(),
                    caps,
                    handler: handler.clone(),
                };
                Some(Dispatcher::spawn(chip.name(), source)?)
            }
            _ => None,
        };

        Ok(LineSet {
            chip_name: chip.name().into(),
            chip: cf,
            caps,
            offsets: offsets.to_vec(),
            dispatcher,
            handle: Some(handle),
            layout: RwLock::new(layout),
            info: Mutex::new(None),
        })
    }

    fn handle(&self) -> Result<&Handle> {
        self.handle.as_ref().ok_or(Error::Closed)
    }

    /// The offsets of the lines, in the order they were requested.
    pub fn offsets(&self) -> &[Offset] {
        &self.offsets
    }

    /// The name of the chip the lines belong to.
    pub fn chip(&self) -> &str {
        &self.chip_name
    }

    /// The uAPI ABI version used to reserve the lines.
    pub fn abi_version(&self) -> AbiVersion {
        self.caps.abi_version()
    }

    /// Read the values of the lines.
    ///
    /// The values are written to `buf` in the order of [`offsets`].
    /// If `buf` is shorter than the set only the leading lines are read,
    /// and if longer the trailing entries are left untouched.
    ///
    /// Outputs read back the value they are driving, subject to driver support.
    ///
    /// [`offsets`]: LineSet::offsets
    pub fn values(&self, buf: &mut [Value]) -> Result<()> {
        let handle = self.handle()?;
        let n = buf.len().min(self.offsets.len());
        if n == 0 {
            return Ok(());
        }
        let map_err = |e| Error::Uapi(UapiCall::GetLineValues, e);
        match handle {
            Handle::V2(f) => {
                let mut lv = v2::LineValues {
                    bits: 0,
                    mask: leading_mask(n),
                };
                v2::get_line_values(f, &mut lv).map_err(map_err)?;
                for (idx, v) in buf.iter_mut().take(n).enumerate() {
                    *v = lv.get(idx).unwrap_or_default().into();
                }
            }
            Handle::V1Lines(f) => {
                let mut lv = v1::LineValues::default();
                v1::get_line_values(f, &mut lv).map_err(map_err)?;
                for (idx, v) in buf.iter_mut().take(n).enumerate() {
                    *v = lv.get(idx).into();
                }
            }
            Handle::V1Events(files) => {
                for (f, v) in files.iter().zip(buf.iter_mut()) {
                    let mut lv = v1::LineValues::default();
                    v1::get_line_values(f, &mut lv).map_err(map_err)?;
                    *v = lv.get(0).into();
                }
            }
        }
        Ok(())
    }

    /// Set the values of the lines.
    ///
    /// The values apply to the lines in the order of [`offsets`].
    /// If fewer values are provided the trailing lines are left unchanged,
    /// and surplus values are ignored.
    ///
    /// Fails with [`PermissionDenied`] if any line to be set is not an output.
    ///
    /// [`offsets`]: LineSet::offsets
    /// [`PermissionDenied`]: Error::PermissionDenied
    pub fn set_values(&self, values: &[Value]) -> Result<()> {
        let handle = self.handle()?;
        let n = values.len().min(self.offsets.len());
        let mut layout = self.layout.write().expect("layout poisoned");
        if layout
            .configs()
            .take(n)
            .any(|cfg| cfg.direction != Direction::Output)
        {
            return Err(Error::PermissionDenied);
        }
        if n == 0 {
            return Ok(());
        }
        let map_err = |e| Error::Uapi(UapiCall::SetLineValues, e);
        match handle {
            Handle::V2(f) => {
                let mut lv = v2::LineValues::default();
                for (idx, v) in values.iter().take(n).enumerate() {
                    lv.set(idx, (*v).into());
                }
                v2::set_line_values(f, &lv).map_err(map_err)?;
            }
            Handle::V1Lines(f) => {
                // v1 sets every line, so the others are rewritten with their current values
                let vv: Vec<u8> = values
                    .iter()
                    .take(n)
                    .chain(layout.values.iter().skip(n))
                    .map(|v| u8::from(*v))
                    .collect();
                v1::set_line_values(f, &v1::LineValues::from_slice(&vv)).map_err(map_err)?;
            }
            Handle::V1Events(_) => return Err(Error::PermissionDenied),
        }
        layout.values[..n].copy_from_slice(&values[..n]);
        Ok(())
    }

    /// Apply a set of changes to the configuration of the lines.
    ///
    /// The changes are applied on top of the current configuration.
    /// An empty config leaves the lines untouched.
    ///
    /// Under the v1 uAPI ABI edge detection cannot be changed, the lines
    /// must share one configuration, and debounce and event clock are
    /// unavailable.  Such changes fail with EINVAL.
    pub fn reconfigure(&self, config: &Config) -> Result<()> {
        let handle = self.handle()?;
        if config.is_empty() {
            return Ok(());
        }
        let mut layout = self.layout.write().expect("layout poisoned");
        let mut new_layout = layout.clone();
        config.apply(&mut new_layout);
        check_capabilities(&self.caps, &new_layout, UapiCall::SetLineConfig)?;
        if !self.caps.edge_reconfigure() && edges_changed(&layout, &new_layout) {
            return Err(Error::unsupported(UapiCall::SetLineConfig));
        }
        let map_err = |e| Error::Uapi(UapiCall::SetLineConfig, e);
        match handle {
            Handle::V2(f) => {
                let lc = encode::to_v2_config(&new_layout).map_err(map_err)?;
                v2::set_line_config(f, lc).map_err(map_err)?;
            }
            Handle::V1Lines(f) => {
                let hc = encode::to_v1_handle_config(&new_layout)?;
                v1::set_line_config(f, hc).map_err(map_err)?;
            }
            Handle::V1Events(files) => {
                // the kernel decides, and rejects reconfiguring event requests
                let hc = encode::to_v1_handle_config(&new_layout)?;
                for f in files {
                    v1::set_line_config(f, hc.clone()).map_err(map_err)?;
                }
            }
        }
        *layout = new_layout;
        *self.info.lock().expect("info cache poisoned") = None;
        Ok(())
    }

    /// The info for the lines, in the order of [`offsets`].
    ///
    /// The info is read from the kernel on first use and cached until
    /// the lines are reconfigured.
    ///
    /// [`offsets`]: LineSet::offsets
    pub fn info(&self) -> Result<Vec<line::Info>> {
        self.handle()?;
        let mut cache = self.info.lock().expect("info cache poisoned");
        if let Some(info) = cache.as_ref() {
            return Ok(info.clone());
        }
        let abiv = self.caps.abi_version();
        let info = self
            .offsets
            .iter()
            .map(|offset| read_line_info(&self.chip, abiv, *offset))
            .collect::<Result<Vec<_>>>()?;
        *cache = Some(info.clone());
        Ok(info)
    }

    /// The configuration currently applied to a line.
    ///
    /// Fails with [`InvalidOffset`] if the line is not in the set.
    ///
    /// [`InvalidOffset`]: Error::InvalidOffset
    pub fn config(&self, offset: Offset) -> Result<line::Config> {
        self.handle()?;
        if !self.offsets.contains(&offset) {
            return Err(Error::InvalidOffset);
        }
        let layout = self.layout.read().expect("layout poisoned");
        Ok(layout.config(offset).clone())
    }

    /// Release the lines.
    ///
    /// Blocks until any edge event handler has returned, after which it
    /// is not called again.
    ///
    /// If called from within the event handler the handler thread is
    /// signalled to exit but not waited on.
    pub fn close(&mut self) -> Result<()> {
        let handle = self.handle.take().ok_or(Error::Closed)?;
        if let Some(mut dispatcher) = self.dispatcher.take() {
            dispatcher.stop();
        }
        drop(handle);
        Ok(())
    }
}

/// Reject a layout that uses features the ABI version lacks.
fn check_capabilities(caps: &Capabilities, layout: &Layout, call: UapiCall) -> Result<()> {
    let unsupported = (!caps.per_line_config() && !layout.is_uniform())
        || layout.configs().any(|cfg| {
            (!caps.debounce_and_clock()
                && (cfg.debounce_period.is_some() || cfg.event_clock.is_some()))
                || (!caps.bias_and_drive() && (cfg.bias.is_some() || cfg.drive.is_some()))
        });
    if unsupported {
        return Err(Error::unsupported(call));
    }
    Ok(())
}

fn edges_changed(old: &Layout, new: &Layout) -> bool {
    old.configs()
        .zip(new.configs())
        .any(|(o, n)| o.edge_detection != n.edge_detection)
}

fn leading_mask(n: usize) -> u64 {
    if n >= 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}

/// An exclusive reservation of a single line on a chip.
#[derive(Debug)]
pub struct Line {
    set: LineSet,
}

impl From<LineSet> for Line {
    fn from(set: LineSet) -> Self {
        Line { set }
    }
}

impl Line {
    /// The offset of the line.
    pub fn offset(&self) -> Offset {
        self.set.offsets[0]
    }

    /// The name of the chip the line belongs to.
    pub fn chip(&self) -> &str {
        self.set.chip()
    }

    /// The uAPI ABI version used to reserve the line.
    pub fn abi_version(&self) -> AbiVersion {
        self.set.abi_version()
    }

    /// Read the value of the line.
    pub fn value(&self) -> Result<Value> {
        let mut buf = [Value::Inactive];
        self.set.values(&mut buf)?;
        Ok(buf[0])
    }

    /// Set the value of an output line.
    pub fn set_value(&self, value: Value) -> Result<()> {
        self.set.set_values(&[value])
    }

    /// Apply a set of changes to the configuration of the line.
    pub fn reconfigure(&self, config: &Config) -> Result<()> {
        self.set.reconfigure(config)
    }

    /// The info for the line.
    pub fn info(&self) -> Result<line::Info> {
        let mut info = self.set.info()?;
        Ok(info.swap_remove(0))
    }

    /// The configuration currently applied to the line.
    pub fn config(&self) -> Result<line::Config> {
        self.set.config(self.offset())
    }

    /// Release the line.
    pub fn close(&mut self) -> Result<()> {
        self.set.close()
    }
}

struct EdgeSource {
    files: Vec<Arc<File>>,
    // v1 events do not identify their line, so are tagged by descriptor
    offsets: Vec<Offset>,
    caps: Capabilities,
    handler: EdgeHandler,
}

impl Source for EdgeSource {
    fn files(&self) -> &[Arc<File>] {
        &self.files
    }

    fn dispatch(&mut self, idx: usize) -> Result<()> {
        let map_err = |e| Error::Uapi(UapiCall::ReadEvent, e);
        // only v2 records carry sequence numbers, and identify their line
        let ev = if self.caps.event_seqno() {
            let ev = v2::read_edge_event(&self.files[idx]).map_err(map_err)?;
            EdgeEvent::try_from(&ev)
        } else {
            let ev = v1::read_edge_event(&self.files[idx]).map_err(map_err)?;
            EdgeEvent::from_v1(&ev, self.offsets[idx])
        }
        .map_err(|e| map_err(e.into()))?;
        (self.handler)(ev);
        Ok(())
    }
}
