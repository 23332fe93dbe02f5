// SPDX-FileCopyrightText: 2022 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Translation of a [`Layout`] into the uAPI request and config structures.

use super::config::Layout;
use crate::line::{Config, Direction};
use crate::{Error, Result, UapiCall};
use gpiod_uapi::{self as uapi, v1, v2, Name, Offsets};
use std::time::Duration;

/// Build the v2 config for a layout.
///
/// The most common set of flags becomes the base flags, and the remaining
/// sets are applied to their lines using attributes, as are output values
/// and debounce periods.
pub(crate) fn to_v2_config(layout: &Layout) -> uapi::Result<v2::LineConfig> {
    // groups are kept in order of first appearance so the encoding is stable
    let mut flag_groups: Vec<(v2::LineFlags, u64)> = Vec::new();
    let mut debounce_groups: Vec<(Duration, u64)> = Vec::new();
    let mut values = v2::LineValues::default();
    for (idx, cfg) in layout.configs().enumerate() {
        let bit = 1u64 << idx;
        let flags = v2::LineFlags::from(cfg);
        match flag_groups.iter_mut().find(|(f, _)| *f == flags) {
            Some((_, mask)) => *mask |= bit,
            None => flag_groups.push((flags, bit)),
        }
        if let Some(period) = cfg.debounce_period {
            match debounce_groups.iter_mut().find(|(p, _)| *p == period) {
                Some((_, mask)) => *mask |= bit,
                None => debounce_groups.push((period, bit)),
            }
        }
        if cfg.direction == Direction::Output {
            values.set(idx, layout.values[idx].into());
        }
    }

    let mut lc = v2::LineConfig::default();
    let base = flag_groups
        .iter()
        .enumerate()
        .max_by_key(|(idx, (_, mask))| (mask.count_ones(), std::cmp::Reverse(*idx)))
        .map(|(idx, _)| idx);
    if let Some(base) = base {
        lc.flags = flag_groups[base].0;
        for (idx, (flags, mask)) in flag_groups.iter().enumerate() {
            if idx != base {
                lc.add_attr(v2::LineAttributeValue::Flags(*flags), *mask)?;
            }
        }
    }
    if values.mask != 0 {
        lc.add_attr(v2::LineAttributeValue::Values(values.bits), values.mask)?;
    }
    for (period, mask) in debounce_groups {
        lc.add_attr(v2::LineAttributeValue::DebouncePeriod(period), mask)?;
    }
    Ok(lc)
}

/// Build the v2 request for a layout.
pub(crate) fn to_v2_request(
    layout: &Layout,
    consumer: &str,
    event_buffer_size: u32,
) -> uapi::Result<v2::LineRequest> {
    Ok(v2::LineRequest {
        offsets: Offsets::from_slice(&layout.offsets),
        consumer: Name::from(consumer),
        config: to_v2_config(layout)?,
        num_lines: layout.offsets.len() as u32,
        event_buffer_size,
        ..Default::default()
    })
}

/// The config shared by every line, if the layout is expressible in v1.
fn v1_config(layout: &Layout, call: UapiCall) -> Result<&Config> {
    let cfg = &layout.base;
    if !layout.is_uniform() || cfg.debounce_period.is_some() || cfg.event_clock.is_some() {
        return Err(Error::unsupported(call));
    }
    Ok(cfg)
}

fn v1_values(layout: &Layout) -> v1::LineValues {
    let values: Vec<u8> = layout.values.iter().map(|v| u8::from(*v)).collect();
    v1::LineValues::from_slice(&values)
}

/// Build the v1 handle request for a layout without edge detection.
pub(crate) fn to_v1_handle_request(layout: &Layout, consumer: &str) -> Result<v1::HandleRequest> {
    let cfg = v1_config(layout, UapiCall::GetLineHandle)?;
    let mut hr = v1::HandleRequest {
        offsets: Offsets::from_slice(&layout.offsets),
        flags: v1::HandleRequestFlags::from(cfg),
        consumer: Name::from(consumer),
        num_lines: layout.offsets.len() as u32,
        ..Default::default()
    };
    if cfg.direction == Direction::Output {
        hr.values = v1_values(layout);
    }
    Ok(hr)
}

/// Build the v1 event requests, one per line, for a layout with edge detection.
pub(crate) fn to_v1_event_requests(
    layout: &Layout,
    consumer: &str,
) -> Result<Vec<v1::EventRequest>> {
    let cfg = v1_config(layout, UapiCall::GetLineEvent)?;
    let consumer = Name::from(consumer);
    Ok(layout
        .offsets
        .iter()
        .map(|offset| v1::EventRequest {
            offset: *offset,
            handleflags: v1::HandleRequestFlags::from(cfg),
            eventflags: v1::EventRequestFlags::from(cfg),
            consumer,
            ..Default::default()
        })
        .collect())
}

/// Build the v1 handle config for a layout.
pub(crate) fn to_v1_handle_config(layout: &Layout) -> Result<v1::HandleConfig> {
    let cfg = v1_config(layout, UapiCall::SetLineConfig)?;
    let mut hc = v1::HandleConfig {
        flags: v1::HandleRequestFlags::from(cfg),
        ..Default::default()
    };
    if cfg.direction == Direction::Output {
        hc.values = v1_values(layout);
    }
    Ok(hc)
}

#[cfg(test)]
mod tests {
    use super::super::Config as Changes;
    use super::*;
    use crate::line::{Bias, Drive, EdgeDetection, EventClock, Value};
    use errno::Errno;

    fn layout(offsets: &[u32], changes: &Changes) -> Layout {
        let mut layout = Layout::new(offsets);
        changes.apply(&mut layout);
        layout
    }

    #[test]
    fn v2_uniform() {
        let mut changes = Changes::default();
        changes.as_active_low().with_bias(Bias::PullUp);
        let lc = to_v2_config(&layout(&[1, 2, 3], &changes)).unwrap();
        assert_eq!(
            lc.flags,
            v2::LineFlags::INPUT | v2::LineFlags::ACTIVE_LOW | v2::LineFlags::BIAS_PULL_UP
        );
        assert_eq!(lc.num_attrs, 0);
    }

    #[test]
    fn v2_outputs() {
        let mut changes = Changes::default();
        changes
            .with_output_values(&[Value::Active, Value::Inactive, Value::Active])
            .with_drive(Drive::OpenDrain);
        let lc = to_v2_config(&layout(&[1, 2, 3], &changes)).unwrap();
        assert_eq!(lc.flags, v2::LineFlags::OUTPUT | v2::LineFlags::OPEN_DRAIN);
        assert_eq!(lc.attrs().len(), 1);
        assert_eq!(
            lc.attrs()[0].attr.to_value(),
            Ok(Some(v2::LineAttributeValue::Values(0b101)))
        );
        assert_eq!(lc.attrs()[0].mask, 0b111);
    }

    #[test]
    fn v2_mixed() {
        let mut changes = Changes::default();
        changes
            .with_edge_detection(EdgeDetection::BothEdges)
            .with_debounce_period(Duration::from_millis(2))
            .with_lines(&[3, 4])
            .as_output(Value::Active)
            .with_line(5)
            .with_debounce_period(Duration::from_millis(5));
        let l = layout(&[1, 2, 3, 4, 5], &changes);
        let lc = to_v2_config(&l).unwrap();
        let edges = v2::LineFlags::INPUT | v2::LineFlags::EDGE_RISING | v2::LineFlags::EDGE_FALLING;
        assert_eq!(lc.flags, edges);
        let attrs = lc.attrs();
        assert_eq!(attrs.len(), 4);
        assert_eq!(
            attrs[0].attr.to_value(),
            Ok(Some(v2::LineAttributeValue::Flags(v2::LineFlags::OUTPUT)))
        );
        assert_eq!(attrs[0].mask, 0b01100);
        assert_eq!(
            attrs[1].attr.to_value(),
            Ok(Some(v2::LineAttributeValue::Values(0b01100)))
        );
        assert_eq!(attrs[1].mask, 0b01100);
        assert_eq!(
            attrs[2].attr.to_value(),
            Ok(Some(v2::LineAttributeValue::DebouncePeriod(
                Duration::from_millis(2)
            )))
        );
        assert_eq!(attrs[2].mask, 0b00011);
        assert_eq!(
            attrs[3].attr.to_value(),
            Ok(Some(v2::LineAttributeValue::DebouncePeriod(
                Duration::from_millis(5)
            )))
        );
        assert_eq!(attrs[3].mask, 0b10000);
    }

    #[test]
    fn v2_most_common_flags_are_base() {
        let mut changes = Changes::default();
        changes.with_lines(&[2, 3]).as_active_low();
        let lc = to_v2_config(&layout(&[1, 2, 3], &changes)).unwrap();
        assert_eq!(lc.flags, v2::LineFlags::INPUT | v2::LineFlags::ACTIVE_LOW);
        assert_eq!(lc.attrs().len(), 1);
        assert_eq!(
            lc.attrs()[0].attr.to_value(),
            Ok(Some(v2::LineAttributeValue::Flags(v2::LineFlags::INPUT)))
        );
        assert_eq!(lc.attrs()[0].mask, 0b001);
    }

    #[test]
    fn v2_too_many_attrs() {
        let offsets: Vec<u32> = (0..12).collect();
        let mut changes = Changes::default();
        for o in &offsets {
            changes
                .with_line(*o)
                .with_debounce_period(Duration::from_millis(*o as u64 + 1));
        }
        assert_eq!(
            to_v2_config(&layout(&offsets, &changes)),
            Err(uapi::Error::Os(Errno(libc::EINVAL)))
        );
    }

    #[test]
    fn v2_request() {
        let mut changes = Changes::default();
        changes.as_output(Value::Active);
        let lr = to_v2_request(&layout(&[7, 3], &changes), "banana", 42).unwrap();
        assert_eq!(lr.num_lines, 2);
        assert_eq!(lr.offsets.get(0), 7);
        assert_eq!(lr.offsets.get(1), 3);
        assert_eq!(String::from(&lr.consumer), "banana");
        assert_eq!(lr.event_buffer_size, 42);
        assert_eq!(lr.config.flags, v2::LineFlags::OUTPUT);
    }

    #[test]
    fn v1_handle_request() {
        let mut changes = Changes::default();
        changes
            .with_output_values(&[Value::Inactive, Value::Active])
            .as_active_low();
        let hr = to_v1_handle_request(&layout(&[4, 2], &changes), "kiwi").unwrap();
        assert_eq!(hr.num_lines, 2);
        assert_eq!(hr.offsets.get(0), 4);
        assert_eq!(
            hr.flags,
            v1::HandleRequestFlags::OUTPUT | v1::HandleRequestFlags::ACTIVE_LOW
        );
        assert_eq!(hr.values.get(0), 0);
        assert_eq!(hr.values.get(1), 1);
        assert_eq!(String::from(&hr.consumer), "kiwi");

        let hr = to_v1_handle_request(&layout(&[4, 2], &Changes::default()), "kiwi").unwrap();
        assert_eq!(hr.flags, v1::HandleRequestFlags::INPUT);
    }

    #[test]
    fn v1_event_requests() {
        let mut changes = Changes::default();
        changes
            .with_edge_detection(EdgeDetection::RisingEdge)
            .with_bias(Bias::PullDown);
        let ers = to_v1_event_requests(&layout(&[4, 2], &changes), "kiwi").unwrap();
        assert_eq!(ers.len(), 2);
        assert_eq!(ers[0].offset, 4);
        assert_eq!(ers[1].offset, 2);
        for er in ers {
            assert_eq!(
                er.handleflags,
                v1::HandleRequestFlags::INPUT | v1::HandleRequestFlags::BIAS_PULL_DOWN
            );
            assert_eq!(er.eventflags, v1::EventRequestFlags::RISING_EDGE);
        }
    }

    #[test]
    fn v1_rejects_v2_features() {
        let mut changes = Changes::default();
        changes.with_line(2).as_active_low();
        assert_eq!(
            to_v1_handle_request(&layout(&[1, 2], &changes), "x").unwrap_err(),
            Error::unsupported(UapiCall::GetLineHandle)
        );

        let mut changes = Changes::default();
        changes.with_debounce_period(Duration::from_millis(1));
        assert_eq!(
            to_v1_event_requests(&layout(&[1], &changes), "x").unwrap_err(),
            Error::unsupported(UapiCall::GetLineEvent)
        );

        let mut changes = Changes::default();
        changes.with_event_clock(EventClock::Monotonic);
        assert_eq!(
            to_v1_handle_config(&layout(&[1], &changes)).unwrap_err(),
            Error::unsupported(UapiCall::SetLineConfig)
        );
    }

    #[test]
    fn v1_handle_config() {
        let mut changes = Changes::default();
        changes.as_output(Value::Active).with_bias(Bias::Disabled);
        let hc = to_v1_handle_config(&layout(&[1, 2], &changes)).unwrap();
        assert_eq!(
            hc.flags,
            v1::HandleRequestFlags::OUTPUT | v1::HandleRequestFlags::BIAS_DISABLED
        );
        assert_eq!(hc.values.get(0), 1);
        assert_eq!(hc.values.get(1), 1);
    }
}
