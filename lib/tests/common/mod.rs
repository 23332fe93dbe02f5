// SPDX-FileCopyrightText: 2022 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![allow(dead_code)]

use gpiod::chip::{self, Chip};
use gpiod::AbiVersion;
use std::path::Path;
use std::time::Duration;

// max time to allow events to propagate from the sim to cdev
const PROPAGATION_DELAY: Duration = Duration::from_millis(10);

// max time to wait for an event - expected or not
pub const EVENT_WAIT_TIMEOUT: Duration = Duration::from_millis(25);

pub fn wait_propagation_delay() {
    std::thread::sleep(PROPAGATION_DELAY);
}

// surfaces dispatcher warnings when run with RUST_LOG set
pub fn init_logging() {
    _ = env_logger::builder().is_test(true).try_init();
}

pub fn open_chip<P: AsRef<Path>>(path: P, abiv: AbiVersion) -> Chip {
    init_logging();
    chip::Options::default()
        .using_abi_version(abiv)
        .open(path)
        .unwrap()
}

// runs a test body, parameterised by ABI version, as a test per version
macro_rules! common_tests {
    ($abiv:expr, $($name:ident),*) => {
        $(
            #[test]
            fn $name() {
                super::$name($abiv)
            }
        )*
    }
}
