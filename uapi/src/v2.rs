// SPDX-FileCopyrightText: 2022 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bitflags::bitflags;
use errno::Errno;
use std::fmt;
use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use crate::common::{file_from_fd, ioctl, read_record, Plain};
use crate::{
    Error, LineEdgeEventKind, LineInfoChangeKind, Name, Offset, Offsets, Padding, Result,
    ValidationError,
};

#[repr(u8)]
enum Ioctl {
    GetLineInfo = 5,
    WatchLineInfo = 6,
    GetLine = 7,
    UnwatchLineInfo = 0xC,
    SetLineConfig = 0xD,
    GetLineValues = 0xE,
    SetLineValues = 0xF,
}

/// The maximum number of attributes in a [`LineConfig`] or [`LineInfo`].
pub const NUM_ATTRS_MAX: usize = 10;

bitflags! {
    /// Flags describing the configuration of a line.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct LineFlags: u64 {
        /// The line is in use and is not available for request.
        const USED = 1;
        /// The line active state corresponds to a physical low.
        const ACTIVE_LOW = 2;
        /// The line is an input.
        const INPUT = 4;
        /// The line is an output.
        const OUTPUT = 8;
        /// The line detects rising edges.
        const EDGE_RISING = 16;
        /// The line detects falling edges.
        const EDGE_FALLING = 32;
        /// The line is an open drain output.
        const OPEN_DRAIN = 64;
        /// The line is an open source output.
        const OPEN_SOURCE = 128;
        /// The line has pull-up bias enabled.
        const BIAS_PULL_UP = 256;
        /// The line has pull-down bias enabled.
        const BIAS_PULL_DOWN = 512;
        /// The line has bias disabled.
        const BIAS_DISABLED = 1024;
        /// Edge event timestamps are from CLOCK_REALTIME.
        const EVENT_CLOCK_REALTIME = 2048;
        /// Edge event timestamps are from the hardware timestamp engine.
        const EVENT_CLOCK_HTE = 4096;
    }
}

/// Values for the lines of a request.
///
/// Bit n of both fields corresponds to the line at index n of the request's
/// offsets.  Only lines with their mask bit set are read or written.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LineValues {
    /// The line values, a set bit being active.
    pub bits: u64,
    /// The lines the values apply to.
    pub mask: u64,
}

impl LineValues {
    /// The value of line idx, if it is in the mask.
    pub fn get(&self, idx: usize) -> Option<bool> {
        let b = 1u64 << idx;
        if self.mask & b == 0 {
            return None;
        }
        Some(self.bits & b != 0)
    }

    /// Set the value of line idx, adding it to the mask.
    pub fn set(&mut self, idx: usize, active: bool) {
        let b = 1u64 << idx;
        self.mask |= b;
        if active {
            self.bits |= b;
        } else {
            self.bits &= !b;
        }
    }
}

/// Read the values of the masked lines of a request.
///
/// * `lf` - The request File returned by [`get_line`].
/// * `lv` - The mask selects the lines to read, and the bits are updated.
pub fn get_line_values(lf: &File, lv: &mut LineValues) -> Result<()> {
    ioctl(lf.as_raw_fd(), iorw!(Ioctl::GetLineValues, LineValues), lv)?;
    Ok(())
}

/// Set the values of the masked lines of a request.
///
/// * `lf` - The request File returned by [`get_line`].
/// * `lv` - The lines to set and their values.
pub fn set_line_values(lf: &File, lv: &LineValues) -> Result<()> {
    let mut lv = *lv;
    ioctl(lf.as_raw_fd(), iorw!(Ioctl::SetLineValues, LineValues), &mut lv)?;
    Ok(())
}

const ATTR_FLAGS: u32 = 1;
const ATTR_VALUES: u32 = 2;
const ATTR_DEBOUNCE: u32 = 3;

/// The value field of a [`LineAttribute`], discriminated by its id.
#[repr(C)]
#[derive(Clone, Copy)]
pub union LineAttributeValueUnion {
    pub flags: u64,
    pub values: u64,
    pub debounce_period_us: u32,
}

impl Default for LineAttributeValueUnion {
    fn default() -> Self {
        LineAttributeValueUnion { values: 0 }
    }
}

/// A configurable attribute of a line.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct LineAttribute {
    /// The raw attribute id, selecting the active member of `value`.
    pub id: u32,
    #[doc(hidden)]
    pub padding: Padding<1>,
    pub value: LineAttributeValueUnion,
}

/// The decoded content of a [`LineAttribute`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LineAttributeValue {
    /// Flags overriding the base flags.
    Flags(LineFlags),
    /// Output values, bit n corresponding to line n of the request.
    Values(u64),
    /// Debounce period.
    DebouncePeriod(Duration),
}

impl LineAttribute {
    /// Build an attribute from its decoded value.
    pub fn new(value: LineAttributeValue) -> LineAttribute {
        let mut attr = LineAttribute::default();
        match value {
            LineAttributeValue::Flags(f) => {
                attr.id = ATTR_FLAGS;
                attr.value.flags = f.bits();
            }
            LineAttributeValue::Values(v) => {
                attr.id = ATTR_VALUES;
                attr.value.values = v;
            }
            LineAttributeValue::DebouncePeriod(d) => {
                attr.id = ATTR_DEBOUNCE;
                // round up to the next whole microsecond
                let us = (d.as_nanos() + 999) / 1000;
                attr.value.debounce_period_us = us.min(u32::MAX as u128) as u32;
            }
        }
        attr
    }

    /// Decode the attribute.
    ///
    /// Returns None for an unused attribute slot.
    pub fn to_value(&self) -> std::result::Result<Option<LineAttributeValue>, ValidationError> {
        // SAFETY: the id selects the member, and all members are plain integers.
        let v = unsafe {
            match self.id {
                0 => return Ok(None),
                ATTR_FLAGS => LineAttributeValue::Flags(LineFlags::from_bits_retain(
                    self.value.flags,
                )),
                ATTR_VALUES => LineAttributeValue::Values(self.value.values),
                ATTR_DEBOUNCE => LineAttributeValue::DebouncePeriod(Duration::from_micros(
                    self.value.debounce_period_us as u64,
                )),
                x => {
                    return Err(ValidationError::new(
                        "attr.id",
                        format!("invalid value: {}", x),
                    ))
                }
            }
        };
        Ok(Some(v))
    }
}

impl fmt::Debug for LineAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_value() {
            Ok(Some(v)) => write!(f, "{:?}", v),
            Ok(None) => write!(f, "unused"),
            Err(_) => write!(f, "invalid id {}", self.id),
        }
    }
}

impl PartialEq for LineAttribute {
    fn eq(&self, other: &Self) -> bool {
        self.to_value() == other.to_value()
    }
}

impl Eq for LineAttribute {}

/// An attribute applied to the subset of the requested lines in `mask`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LineConfigAttribute {
    pub attr: LineAttribute,
    /// Bit n selects the line at index n of the request's offsets.
    pub mask: u64,
}

/// The configuration of a set of requested lines.
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LineConfig {
    /// Flags applying to every line not covered by a flags attribute.
    pub flags: LineFlags,
    /// The number of attributes in use in `attrs`.
    pub num_attrs: u32,
    #[doc(hidden)]
    pub padding: Padding<5>,
    /// Attributes applying to subsets of the lines.
    ///
    /// Where a line is covered by several attributes of the same kind the
    /// lowest index wins.
    pub attrs: [LineConfigAttribute; NUM_ATTRS_MAX],
}

impl LineConfig {
    /// Append an attribute applying to the lines in `mask`.
    ///
    /// Fails with EINVAL, as the kernel would, if the attributes are full.
    pub fn add_attr(&mut self, value: LineAttributeValue, mask: u64) -> Result<()> {
        let idx = self.num_attrs as usize;
        if idx >= NUM_ATTRS_MAX {
            return Err(Error::Os(Errno(libc::EINVAL)));
        }
        self.attrs[idx] = LineConfigAttribute {
            attr: LineAttribute::new(value),
            mask,
        };
        self.num_attrs += 1;
        Ok(())
    }

    /// The attributes in use.
    pub fn attrs(&self) -> &[LineConfigAttribute] {
        &self.attrs[..(self.num_attrs as usize).min(NUM_ATTRS_MAX)]
    }
}

/// Update the configuration of an existing line request.
///
/// * `lf` - The request File returned by [`get_line`].
/// * `lc` - The configuration to apply.
pub fn set_line_config(lf: &File, mut lc: LineConfig) -> Result<()> {
    ioctl(lf.as_raw_fd(), iorw!(Ioctl::SetLineConfig, LineConfig), &mut lc)?;
    Ok(())
}

/// A request for a set of lines.
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LineRequest {
    /// The offsets of the requested lines.
    pub offsets: Offsets,
    /// The label recorded as the consumer of the lines.
    pub consumer: Name,
    /// The configuration of the lines.
    pub config: LineConfig,
    /// The number of lines requested.
    pub num_lines: u32,
    /// A suggested size for the kernel edge event buffer.
    ///
    /// Zero selects the kernel default.
    pub event_buffer_size: u32,
    #[doc(hidden)]
    pub padding: Padding<5>,
    /// Set by the kernel on success.
    pub fd: i32,
}

/// Request a set of lines, returning the File that controls them.
///
/// * `cf` - The open chip File.
/// * `lr` - The lines and their configuration.
pub fn get_line(cf: &File, mut lr: LineRequest) -> Result<File> {
    ioctl(cf.as_raw_fd(), iorw!(Ioctl::GetLine, LineRequest), &mut lr)?;
    Ok(file_from_fd(lr.fd))
}

/// Information about a certain line.
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LineInfo {
    /// The name of the line, as assigned by the chip.
    pub name: Name,
    /// The consumer label set by whoever has requested the line.
    pub consumer: Name,
    /// The line offset on the chip.
    pub offset: Offset,
    /// The number of attributes in use in `attrs`.
    pub num_attrs: u32,
    /// The configuration flags of the line.
    pub flags: LineFlags,
    /// Attributes not expressible as flags, such as debounce period.
    pub attrs: [LineAttribute; NUM_ATTRS_MAX],
    #[doc(hidden)]
    pub padding: Padding<4>,
}

// SAFETY: integers, and unions of integers, only.
unsafe impl Plain for LineInfo {}

impl LineInfo {
    /// The debounce period applied to the line, if any.
    pub fn debounce_period(&self) -> Option<Duration> {
        let n = (self.num_attrs as usize).min(NUM_ATTRS_MAX);
        self.attrs[..n]
            .iter()
            .find_map(|a| match a.to_value() {
                Ok(Some(LineAttributeValue::DebouncePeriod(d))) => Some(d),
                _ => None,
            })
            .filter(|d| !d.is_zero())
    }
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

/// Add a watch for changes to the info of a line, returning its current info.
///
/// Changes are reported as [`LineInfoChangeEvent`]s read from the chip File.
/// Fails with EBUSY if the line is already watched on this chip File.
///
/// * `cf` - The open chip File.
/// * `offset` - The offset of the line to watch.
pub fn watch_line_info(cf: &File, offset: Offset) -> Result<LineInfo> {
    let mut li = LineInfo {
        offset,
        ..Default::default()
    };
    ioctl(cf.as_raw_fd(), iorw!(Ioctl::WatchLineInfo, LineInfo), &mut li)?;
    Ok(li)
}

/// Remove the watch on the info of a line.
///
/// Fails with EBUSY if the line is not watched on this chip File.
///
/// * `cf` - The open chip File.
/// * `offset` - The offset of the line to unwatch.
pub fn unwatch_line_info(cf: &File, offset: Offset) -> Result<()> {
    let mut offset = offset;
    ioctl(cf.as_raw_fd(), iorw!(Ioctl::UnwatchLineInfo, u32), &mut offset)?;
    Ok(())
}

/// A change to the info of a watched line.
#[repr(C)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LineInfoChangeEvent {
    /// The info of the line after the change.
    pub info: LineInfo,
    /// The time of the change, in nanoseconds from CLOCK_MONOTONIC.
    pub timestamp_ns: u64,
    /// The raw change kind.
    pub id: u32,
    #[doc(hidden)]
    pub padding: Padding<5>,
}

// SAFETY: integers, and unions of integers, only.
unsafe impl Plain for LineInfoChangeEvent {}

impl LineInfoChangeEvent {
    /// The decoded change kind.
    pub fn kind(&self) -> std::result::Result<LineInfoChangeKind, ValidationError> {
        LineInfoChangeKind::try_from(self.id)
    }
}

/// Read one info change event from a chip.
///
/// Blocks until an event is available.
pub fn read_line_info_change_event(cf: &File) -> Result<LineInfoChangeEvent> {
    let ev: LineInfoChangeEvent = read_record(cf)?;
    ev.kind()?;
    Ok(ev)
}

/// An edge event read from a line request.
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LineEdgeEvent {
    /// The time of the event, in nanoseconds, from the event clock
    /// configured for the line.
    pub timestamp_ns: u64,
    /// The raw event kind.
    pub id: u32,
    /// The offset of the line that triggered the event.
    pub offset: Offset,
    /// The sequence number of the event across all lines in the request.
    pub seqno: u32,
    /// The sequence number of the event on this line.
    pub line_seqno: u32,
    #[doc(hidden)]
    pub padding: Padding<6>,
}

// SAFETY: integers only.
unsafe impl Plain for LineEdgeEvent {}

impl LineEdgeEvent {
    /// The decoded event kind.
    pub fn kind(&self) -> std::result::Result<LineEdgeEventKind, ValidationError> {
        LineEdgeEventKind::try_from(self.id)
    }
}

/// Read one edge event from a line request.
///
/// Blocks until an event is available.
pub fn read_edge_event(lf: &File) -> Result<LineEdgeEvent> {
    let ev: LineEdgeEvent = read_record(lf)?;
    ev.kind()?;
    Ok(ev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn struct_sizes() {
        assert_eq!(size_of::<LineValues>(), 16usize);
        assert_eq!(size_of::<LineAttributeValueUnion>(), 8usize);
        assert_eq!(size_of::<LineAttribute>(), 16usize);
        assert_eq!(size_of::<LineConfigAttribute>(), 24usize);
        assert_eq!(size_of::<LineConfig>(), 272usize);
        assert_eq!(size_of::<LineRequest>(), 592usize);
        assert_eq!(size_of::<LineInfo>(), 256usize);
        assert_eq!(size_of::<LineInfoChangeEvent>(), 288usize);
        assert_eq!(size_of::<LineEdgeEvent>(), 48usize);
    }

    #[test]
    fn line_values_get_set() {
        let mut lv = LineValues::default();
        assert_eq!(lv.get(0), None);
        lv.set(0, true);
        lv.set(3, false);
        lv.set(63, true);
        assert_eq!(lv.get(0), Some(true));
        assert_eq!(lv.get(1), None);
        assert_eq!(lv.get(3), Some(false));
        assert_eq!(lv.get(63), Some(true));
        assert_eq!(lv.mask, 0x8000_0000_0000_0009);
        assert_eq!(lv.bits, 0x8000_0000_0000_0001);
        lv.set(0, false);
        assert_eq!(lv.get(0), Some(false));
    }

    #[test]
    fn attribute_round_trip() {
        let flags = LineFlags::INPUT | LineFlags::BIAS_PULL_UP;
        let a = LineAttribute::new(LineAttributeValue::Flags(flags));
        assert_eq!(a.id, 1);
        assert_eq!(a.to_value(), Ok(Some(LineAttributeValue::Flags(flags))));

        let a = LineAttribute::new(LineAttributeValue::Values(0x05));
        assert_eq!(a.id, 2);
        assert_eq!(a.to_value(), Ok(Some(LineAttributeValue::Values(0x05))));

        assert_eq!(LineAttribute::default().to_value(), Ok(None));

        let mut a = LineAttribute::default();
        a.id = 9;
        assert!(a.to_value().is_err());
    }

    #[test]
    fn debounce_rounds_up_to_micros() {
        let a = LineAttribute::new(LineAttributeValue::DebouncePeriod(Duration::from_nanos(
            1500,
        )));
        assert_eq!(a.id, 3);
        assert_eq!(
            a.to_value(),
            Ok(Some(LineAttributeValue::DebouncePeriod(Duration::from_micros(
                2
            ))))
        );
    }

    #[test]
    fn add_attr_limit() {
        let mut lc = LineConfig::default();
        for i in 0..NUM_ATTRS_MAX {
            assert!(lc.add_attr(LineAttributeValue::Values(0), 1 << i).is_ok());
        }
        assert_eq!(lc.attrs().len(), NUM_ATTRS_MAX);
        assert_eq!(
            lc.add_attr(LineAttributeValue::Values(0), 1),
            Err(Error::Os(Errno(libc::EINVAL)))
        );
    }

    #[test]
    fn info_debounce_period() {
        let mut li = LineInfo::default();
        assert_eq!(li.debounce_period(), None);
        li.attrs[0] = LineAttribute::new(LineAttributeValue::Flags(LineFlags::INPUT));
        li.attrs[1] = LineAttribute::new(LineAttributeValue::DebouncePeriod(
            Duration::from_micros(42),
        ));
        li.num_attrs = 2;
        assert_eq!(li.debounce_period(), Some(Duration::from_micros(42)));
    }

    #[test]
    fn edge_event_kind() {
        let ev = LineEdgeEvent {
            id: 1,
            ..Default::default()
        };
        assert_eq!(ev.kind(), Ok(LineEdgeEventKind::RisingEdge));
    }
}
