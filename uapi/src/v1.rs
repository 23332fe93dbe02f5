// SPDX-FileCopyrightText: 2022 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bitflags::bitflags;
use std::fs::File;
use std::os::unix::io::AsRawFd;

use crate::common::{file_from_fd, ioctl, read_record, Plain};
use crate::{LineEdgeEventKind, Name, Offset, Offsets, Padding, Result, ValidationError};

#[repr(u8)]
enum Ioctl {
    GetLineInfo = 2,
    GetLineHandle = 3,
    GetLineEvent = 4,
    GetLineValues = 8,
    SetLineValues = 9,
    SetConfig = 0xA,
}

bitflags! {
    /// Flags reporting the configuration of a line.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct LineInfoFlags: u32 {
        /// The line is in use and is not available for request.
        const USED = 1;
        /// The line is an output.
        const OUTPUT = 2;
        /// The line active state corresponds to a physical low.
        const ACTIVE_LOW = 4;
        /// The line is an open drain output.
        const OPEN_DRAIN = 8;
        /// The line is an open source output.
        const OPEN_SOURCE = 16;
        /// The line has pull-up bias enabled.
        const BIAS_PULL_UP = 32;
        /// The line has pull-down bias enabled.
        const BIAS_PULL_DOWN = 64;
        /// The line has bias disabled.
        const BIAS_DISABLED = 128;
    }
}

/// Information about a certain GPIO line.
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LineInfo {
    /// The line offset on the chip.
    pub offset: Offset,
    /// The configuration flags for the line.
    pub flags: LineInfoFlags,
    /// The name of the line, as assigned by the chip.
    pub name: Name,
    /// The consumer label set by whoever has requested the line.
    pub consumer: Name,
}

/// Get the publicly available information for a line.
///
/// * `cf` - The open chip File.
/// * `offset` - The offset of the line.
pub fn get_line_info(cf: &File, offset: Offset) -> Result<LineInfo> {
    let mut li = LineInfo {
        offset,
        ..Default::default()
    };
    ioctl(cf.as_raw_fd(), iorw!(Ioctl::GetLineInfo, LineInfo), &mut li)?;
    Ok(li)
}

bitflags! {
    /// Flags applying to all lines in a handle request.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct HandleRequestFlags: u32 {
        /// Requests the lines as inputs.
        const INPUT = 1;
        /// Requests the lines as outputs.
        const OUTPUT = 2;
        /// Requests the lines as active low.
        const ACTIVE_LOW = 4;
        /// Requests the lines as open drain outputs.
        const OPEN_DRAIN = 8;
        /// Requests the lines as open source outputs.
        const OPEN_SOURCE = 16;
        /// Requests the lines have pull-up bias enabled.
        const BIAS_PULL_UP = 32;
        /// Requests the lines have pull-down bias enabled.
        const BIAS_PULL_DOWN = 64;
        /// Requests the lines have bias disabled.
        const BIAS_DISABLED = 128;
    }
}

/// The logical values for the lines in a handle, one byte per line.
#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LineValues([u8; 64]);

impl Default for LineValues {
    fn default() -> Self {
        LineValues([0; 64])
    }
}

impl LineValues {
    /// Create values from a slice, one entry per line.
    pub fn from_slice(s: &[u8]) -> Self {
        let mut lv = LineValues::default();
        for (dst, src) in lv.0.iter_mut().zip(s) {
            *dst = *src;
        }
        lv
    }

    /// The value of the line at position idx in the request.
    #[inline]
    pub fn get(&self, idx: usize) -> u8 {
        self.0[idx]
    }

    /// Set the value of the line at position idx in the request.
    #[inline]
    pub fn set(&mut self, idx: usize, value: u8) {
        self.0[idx] = value;
    }
}

/// A request for a handle controlling a set of lines.
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HandleRequest {
    /// The offsets of the requested lines.
    pub offsets: Offsets,
    /// The flags applying to all requested lines.
    pub flags: HandleRequestFlags,
    /// The initial values of output lines.
    pub values: LineValues,
    /// The label recorded as the consumer of the lines.
    pub consumer: Name,
    /// The number of lines requested.
    pub num_lines: u32,
    /// Set by the kernel on success.
    pub fd: i32,
}

/// Request a handle for a set of lines, returning the File that controls it.
///
/// * `cf` - The open chip File.
/// * `hr` - The lines and their configuration.
pub fn get_line_handle(cf: &File, mut hr: HandleRequest) -> Result<File> {
    ioctl(cf.as_raw_fd(), iorw!(Ioctl::GetLineHandle, HandleRequest), &mut hr)?;
    Ok(file_from_fd(hr.fd))
}

/// A new configuration for the lines of an existing handle.
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HandleConfig {
    /// The flags applying to all lines in the handle.
    pub flags: HandleRequestFlags,
    /// The values to drive on output lines.
    pub values: LineValues,
    #[doc(hidden)]
    pub padding: Padding<4>,
}

/// Reconfigure the lines of a handle.
///
/// Only valid for handle requests.  The kernel rejects this call on event
/// requests with EINVAL.
///
/// * `lf` - The File returned by [`get_line_handle`] or [`get_line_event`].
/// * `hc` - The new configuration.
pub fn set_line_config(lf: &File, mut hc: HandleConfig) -> Result<()> {
    ioctl(lf.as_raw_fd(), iorw!(Ioctl::SetConfig, HandleConfig), &mut hc)?;
    Ok(())
}

/// Read the values of the lines of a handle or event request.
pub fn get_line_values(lf: &File, vals: &mut LineValues) -> Result<()> {
    ioctl(lf.as_raw_fd(), iorw!(Ioctl::GetLineValues, LineValues), vals)?;
    Ok(())
}

/// Set the values of all the lines of a handle.
pub fn set_line_values(lf: &File, vals: &LineValues) -> Result<()> {
    let mut vals = *vals;
    ioctl(lf.as_raw_fd(), iorw!(Ioctl::SetLineValues, LineValues), &mut vals)?;
    Ok(())
}

bitflags! {
    /// The edges that generate events for an event request.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct EventRequestFlags: u32 {
        /// Report rising edges.
        const RISING_EDGE = 1;
        /// Report falling edges.
        const FALLING_EDGE = 2;
        /// Report both rising and falling edges.
        const BOTH_EDGES = Self::RISING_EDGE.bits() | Self::FALLING_EDGE.bits();
    }
}

/// A request for edge events from a single line.
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EventRequest {
    /// The offset of the line.
    pub offset: Offset,
    /// The handle flags for the line.
    pub handleflags: HandleRequestFlags,
    /// The edges to report.
    pub eventflags: EventRequestFlags,
    /// The label recorded as the consumer of the line.
    pub consumer: Name,
    /// Set by the kernel on success.
    pub fd: i32,
}

/// Request edge events for a line, returning the File that reports them.
///
/// * `cf` - The open chip File.
/// * `er` - The line and its configuration.
pub fn get_line_event(cf: &File, mut er: EventRequest) -> Result<File> {
    ioctl(cf.as_raw_fd(), iorw!(Ioctl::GetLineEvent, EventRequest), &mut er)?;
    Ok(file_from_fd(er.fd))
}

/// An edge event read from an event request.
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LineEdgeEvent {
    /// The time the event was detected, in nanoseconds, from CLOCK_MONOTONIC
    /// or CLOCK_REALTIME depending on kernel version.
    pub timestamp_ns: u64,
    /// The raw event kind.
    pub id: u32,
}

// SAFETY: integers only.
unsafe impl Plain for LineEdgeEvent {}

impl LineEdgeEvent {
    /// The decoded event kind.
    pub fn kind(&self) -> std::result::Result<LineEdgeEventKind, ValidationError> {
        LineEdgeEventKind::try_from(self.id)
    }
}

/// Read one edge event from an event request.
///
/// Blocks until an event is available.
pub fn read_edge_event(lf: &File) -> Result<LineEdgeEvent> {
    let ev: LineEdgeEvent = read_record(lf)?;
    ev.kind()?;
    Ok(ev)
}
