// SPDX-FileCopyrightText: 2022 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![allow(dead_code)]

use std::fs::File;
use std::time::Duration;

// max time to allow events to propagate from the sim to cdev
const PROPAGATION_DELAY: Duration = Duration::from_millis(10);

pub fn wait_propagation_delay() {
    std::thread::sleep(PROPAGATION_DELAY);
}

pub fn open(s: &gpiosim::Simpleton) -> File {
    File::open(s.dev_path()).unwrap()
}

// a chip with named and hogged lines for info tests
pub fn detailed_sim() -> gpiosim::Sim {
    use gpiosim::{Bank, Direction};
    gpiosim::builder()
        .with_bank(
            Bank::new(8, "fruit")
                .name(3, "banana")
                .hog(2, "bowl", Direction::OutputLow),
        )
        .live()
        .unwrap()
}
