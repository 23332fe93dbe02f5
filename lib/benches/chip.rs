// SPDX-FileCopyrightText: 2022 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use criterion::{criterion_group, criterion_main, Bencher, Criterion};

use gpiod::chip::{self, Chip};
use gpiod::AbiVersion;
use gpiosim::Simpleton;

criterion_group!(benches, benchmarks);
criterion_main!(benches);

fn benchmarks(c: &mut Criterion) {
    c.bench_function("negotiated open", negotiated_open);
    for (name, abiv) in [("uapi_v1", AbiVersion::V1), ("uapi_v2", AbiVersion::V2)] {
        c.bench_function(&format!("{} open", name), |b| open(b, abiv));
        c.bench_function(&format!("{} line_info", name), |b| line_info(b, abiv));
    }
}

// determine time taken to open and close a chip, including the version probe
fn negotiated_open(b: &mut Bencher) {
    let s = Simpleton::new(4);

    b.iter(|| {
        let mut c = Chip::from_path(s.dev_path()).unwrap();
        c.close().unwrap();
    });
}

// determine time taken to open and close a chip with a forced version
fn open(b: &mut Bencher, abiv: AbiVersion) {
    let s = Simpleton::new(4);
    let mut opts = chip::Options::default();
    opts.using_abi_version(abiv);

    b.iter(|| {
        let mut c = opts.open(s.dev_path()).unwrap();
        c.close().unwrap();
    });
}

// determine time taken to read the info for one line
fn line_info(b: &mut Bencher, abiv: AbiVersion) {
    let s = Simpleton::new(4);
    let c = chip::Options::default()
        .using_abi_version(abiv)
        .open(s.dev_path())
        .unwrap();

    b.iter(|| {
        c.line_info(1).unwrap();
    });
}
