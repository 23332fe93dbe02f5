// SPDX-FileCopyrightText: 2022 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

// Tests for single line reservations.
//
// Assumptions:
//  - kernel supports both uAPI versions

#[macro_use]
mod common;

use common::{open_chip, wait_propagation_delay};
use errno::Errno;
use gpiod::line::{Bias, Direction, Drive, EdgeDetection, Value};
use gpiod::request::{Config, Options};
use gpiod::{AbiVersion, Error};
use gpiosim::{Level, Simpleton};
use std::time::Duration;

mod uapi_v1 {
    common_tests! {
        gpiod::AbiVersion::V1,
        request_busy,
        request_invalid_offset,
        output_value,
        input_value,
        set_value_on_input,
        close,
        empty_reconfigure,
        reconfigure_config,
        info_cached,
        config_snapshot
    }

    #[test]
    fn reconfigure_edges_rejected() {
        use super::*;
        let s = Simpleton::new(4);
        let c = open_chip(s.dev_path(), AbiVersion::V1);

        // lines without edge detection cannot gain it
        let l = c.request_line(1, &Options::default()).unwrap();
        let err = l
            .reconfigure(Config::default().with_edge_detection(EdgeDetection::RisingEdge))
            .unwrap_err();
        assert_eq!(err.errno(), Some(Errno(libc::EINVAL)));

        // and lines with edge detection cannot change it
        let l = c
            .request_line(
                2,
                Options::default().with_edge_detection(EdgeDetection::BothEdges),
            )
            .unwrap();
        let err = l
            .reconfigure(Config::default().with_edge_detection(EdgeDetection::FallingEdge))
            .unwrap_err();
        assert_eq!(err.errno(), Some(Errno(libc::EINVAL)));
        assert_eq!(l.config().unwrap().edge_detection, Some(EdgeDetection::BothEdges));
    }

    #[test]
    fn v2_features_rejected() {
        use super::*;
        let s = Simpleton::new(4);
        let c = open_chip(s.dev_path(), AbiVersion::V1);
        let einval = Some(Errno(libc::EINVAL));

        let err = c
            .request_line(
                1,
                Options::default()
                    .with_edge_detection(EdgeDetection::BothEdges)
                    .with_debounce_period(Duration::from_millis(4)),
            )
            .unwrap_err();
        assert_eq!(err.errno(), einval);

        let err = c
            .request_line(
                1,
                Options::default()
                    .with_edge_detection(EdgeDetection::BothEdges)
                    .with_event_clock(gpiod::line::EventClock::Realtime),
            )
            .unwrap_err();
        assert_eq!(err.errno(), einval);

        // the line was never requested
        assert!(!c.line_info(1).unwrap().used);
    }
}

mod uapi_v2 {
    common_tests! {
        gpiod::AbiVersion::V2,
        request_busy,
        request_invalid_offset,
        output_value,
        input_value,
        set_value_on_input,
        close,
        empty_reconfigure,
        reconfigure_config,
        info_cached,
        config_snapshot
    }

    #[test]
    fn reconfigure_edges() {
        use super::*;
        let s = Simpleton::new(4);
        let c = open_chip(s.dev_path(), AbiVersion::V2);
        let l = c
            .request_line(
                2,
                Options::default().with_edge_detection(EdgeDetection::BothEdges),
            )
            .unwrap();
        l.reconfigure(Config::default().with_edge_detection(EdgeDetection::FallingEdge))
            .unwrap();
        let info = c.line_info(2).unwrap();
        assert_eq!(info.config.edge_detection, Some(EdgeDetection::FallingEdge));

        l.reconfigure(Config::default().with_debounce_period(Duration::from_millis(3)))
            .unwrap();
        let info = c.line_info(2).unwrap();
        assert_eq!(info.config.debounce_period, Some(Duration::from_millis(3)));
        assert_eq!(info.config.edge_detection, Some(EdgeDetection::FallingEdge));
    }
}

fn request_busy(abiv: AbiVersion) {
    let s = Simpleton::new(4);
    let c = open_chip(s.dev_path(), abiv);
    let ebusy = Some(Errno(libc::EBUSY));

    let modes = [
        Options::default(),
        Options::default().as_output(Value::Active).clone(),
        Options::default()
            .with_edge_detection(EdgeDetection::BothEdges)
            .clone(),
    ];
    for held in &modes {
        let mut l = c.request_line(1, held).unwrap();
        for contender in &modes {
            assert_eq!(
                c.request_line(1, contender).unwrap_err().errno(),
                ebusy,
                "{:?} vs {:?}",
                held,
                contender
            );
            // also from an independent chip handle
            let c2 = open_chip(s.dev_path(), abiv);
            assert_eq!(c2.request_line(1, contender).unwrap_err().errno(), ebusy);
        }
        // other lines remain available
        assert!(c.request_line(2, held).is_ok());
        l.close().unwrap();
    }
    // available once released
    assert!(c.request_line(1, &Options::default()).is_ok());
}

fn request_invalid_offset(abiv: AbiVersion) {
    let s = Simpleton::new(4);
    let c = open_chip(s.dev_path(), abiv);
    for offset in [4, 5, u32::MAX] {
        assert_eq!(
            c.request_line(offset, &Options::default()).unwrap_err(),
            Error::InvalidOffset
        );
    }
}

fn output_value(abiv: AbiVersion) {
    let s = Simpleton::new(4);
    let c = open_chip(s.dev_path(), abiv);
    let l = c
        .request_line(2, Options::default().as_output(Value::Active))
        .unwrap();
    assert_eq!(l.offset(), 2);
    assert_eq!(l.abi_version(), abiv);
    assert_eq!(s.get_level(2).unwrap(), Level::High);
    assert_eq!(l.value(), Ok(Value::Active));

    l.set_value(Value::Inactive).unwrap();
    assert_eq!(l.value(), Ok(Value::Inactive));
    assert_eq!(s.get_level(2).unwrap(), Level::Low);

    l.set_value(Value::Active).unwrap();
    assert_eq!(l.value(), Ok(Value::Active));
    assert_eq!(s.get_level(2).unwrap(), Level::High);
    drop(l);

    // active low inverts the physical level
    let l = c
        .request_line(
            2,
            Options::default().as_output(Value::Active).as_active_low(),
        )
        .unwrap();
    assert_eq!(s.get_level(2).unwrap(), Level::Low);
    l.set_value(Value::Inactive).unwrap();
    assert_eq!(s.get_level(2).unwrap(), Level::High);
}

fn input_value(abiv: AbiVersion) {
    let s = Simpleton::new(4);
    let c = open_chip(s.dev_path(), abiv);
    let l = c.request_line(1, &Options::default()).unwrap();
    assert_eq!(l.config().unwrap().direction, Direction::Input);
    s.pullup(1).unwrap();
    wait_propagation_delay();
    assert_eq!(l.value(), Ok(Value::Active));
    s.pulldown(1).unwrap();
    wait_propagation_delay();
    assert_eq!(l.value(), Ok(Value::Inactive));
}

fn set_value_on_input(abiv: AbiVersion) {
    let s = Simpleton::new(4);
    let c = open_chip(s.dev_path(), abiv);
    s.pullup(3).unwrap();
    let l = c.request_line(3, &Options::default()).unwrap();
    wait_propagation_delay();
    assert_eq!(l.set_value(Value::Inactive), Err(Error::PermissionDenied));
    wait_propagation_delay();
    assert_eq!(l.value(), Ok(Value::Active));

    let l = c
        .request_line(
            2,
            Options::default().with_edge_detection(EdgeDetection::RisingEdge),
        )
        .unwrap();
    assert_eq!(l.set_value(Value::Active), Err(Error::PermissionDenied));
}

fn close(abiv: AbiVersion) {
    let s = Simpleton::new(4);
    let c = open_chip(s.dev_path(), abiv);
    let mut l = c
        .request_line(1, Options::default().as_output(Value::Active))
        .unwrap();
    assert_eq!(l.close(), Ok(()));
    assert_eq!(l.close(), Err(Error::Closed));
    assert_eq!(l.value(), Err(Error::Closed));
    assert_eq!(l.set_value(Value::Inactive), Err(Error::Closed));
    assert_eq!(l.info(), Err(Error::Closed));
    assert_eq!(
        l.reconfigure(Config::default().as_input()),
        Err(Error::Closed)
    );
    assert_eq!(l.reconfigure(&Config::default()), Err(Error::Closed));
    assert_eq!(l.config(), Err(Error::Closed));
    // identity survives
    assert_eq!(l.offset(), 1);
    // and the line has been released
    assert!(!c.line_info(1).unwrap().used);
}

fn empty_reconfigure(abiv: AbiVersion) {
    let s = Simpleton::new(4);
    let c = open_chip(s.dev_path(), abiv);
    let l = c
        .request_line(
            1,
            Options::default()
                .as_output(Value::Active)
                .with_bias(Bias::PullUp),
        )
        .unwrap();
    let before = c.line_info(1).unwrap();
    assert_eq!(l.reconfigure(&Config::default()), Ok(()));
    assert_eq!(c.line_info(1).unwrap(), before);
    assert_eq!(s.get_level(1).unwrap(), Level::High);
}

fn reconfigure_config(abiv: AbiVersion) {
    let s = Simpleton::new(4);
    let c = open_chip(s.dev_path(), abiv);
    let l = c.request_line(1, &Options::default()).unwrap();
    l.reconfigure(
        Config::default()
            .as_output(Value::Active)
            .with_bias(Bias::PullDown)
            .with_drive(Drive::PushPull),
    )
    .unwrap();
    let info = c.line_info(1).unwrap();
    assert_eq!(info.config.direction, Direction::Output);
    assert_eq!(info.config.bias, Some(Bias::PullDown));
    assert_eq!(info.config.drive, Some(Drive::PushPull));
    assert_eq!(s.get_level(1).unwrap(), Level::High);

    // changes accumulate
    l.reconfigure(Config::default().as_active_low()).unwrap();
    let info = c.line_info(1).unwrap();
    assert!(info.config.active_low);
    assert_eq!(info.config.bias, Some(Bias::PullDown));
    assert_eq!(info.config.drive, Some(Drive::PushPull));
    // the value is preserved, so the physical level flips
    assert_eq!(s.get_level(1).unwrap(), Level::Low);

    l.reconfigure(Config::default().as_input().with_bias(None))
        .unwrap();
    let info = c.line_info(1).unwrap();
    assert_eq!(info.config.direction, Direction::Input);
    assert_eq!(info.config.bias, None);
    assert_eq!(info.config.drive, None);

    // open drain and source are reported as set
    l.reconfigure(Config::default().with_drive(Drive::OpenDrain))
        .unwrap();
    let info = c.line_info(1).unwrap();
    assert_eq!(info.config.direction, Direction::Output);
    assert_eq!(info.config.drive, Some(Drive::OpenDrain));
    l.reconfigure(Config::default().with_drive(Drive::OpenSource))
        .unwrap();
    assert_eq!(
        c.line_info(1).unwrap().config.drive,
        Some(Drive::OpenSource)
    );
}

fn info_cached(abiv: AbiVersion) {
    let s = Simpleton::new(4);
    let c = open_chip(s.dev_path(), abiv);
    let l = c
        .request_line(2, Options::default().with_consumer("cached"))
        .unwrap();
    let info = l.info().unwrap();
    assert_eq!(info.offset, 2);
    assert!(info.used);
    assert_eq!(info.consumer, "cached");
    assert_eq!(info.config.direction, Direction::Input);

    l.reconfigure(Config::default().as_output(Value::Inactive))
        .unwrap();
    let info = l.info().unwrap();
    assert_eq!(info.config.direction, Direction::Output);
    assert_eq!(l.info().unwrap(), info);
}

fn config_snapshot(abiv: AbiVersion) {
    let s = Simpleton::new(4);
    let c = open_chip(s.dev_path(), abiv);
    let l = c
        .request_line(
            0,
            Options::default()
                .with_bias(Bias::PullUp)
                .as_active_low(),
        )
        .unwrap();
    let cfg = l.config().unwrap();
    assert_eq!(cfg.direction, Direction::Input);
    assert_eq!(cfg.bias, Some(Bias::PullUp));
    assert!(cfg.active_low);
    assert_eq!(c.line_info(0).unwrap().config, cfg);
}
