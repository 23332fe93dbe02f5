// SPDX-FileCopyrightText: 2022 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wire-level access to the Linux GPIO character device.
//!
//! The structs here mirror the kernel's `gpio.h` byte for byte and the
//! functions are thin wrappers around the corresponding ioctl or read.
//! Nothing is cached and nothing is negotiated; that is left to the caller.
//!
//! Structs read from the kernel store enumerated fields as raw integers, so
//! any bit pattern the kernel returns is a valid value.  Those fields are
//! converted, and validated, by accessors.

#[cfg(not(any(feature = "uapi_v1", feature = "uapi_v2")))]
compile_error!("Either feature \"uapi_v1\" or \"uapi_v2\" must be enabled for this crate.");

/// Build the request code for a read/write ioctl on the GPIO magic.
macro_rules! iorw {
    ($nr:expr, $ty:ty) => {
        nix::request_code_readwrite!(crate::common::IOCTL_MAGIC, $nr, std::mem::size_of::<$ty>())
    };
}

mod common;

pub use common::*;

/// GPIO uAPI ABI v1, released in Linux 4.8.
///
/// Deprecated by the kernel in favour of v2, but still the only option on
/// older kernels.  Each request carries a single set of flags for all its
/// lines and edge events are requested one line at a time.
#[cfg(feature = "uapi_v1")]
pub mod v1;

/// GPIO uAPI ABI v2, released in Linux 5.10.
///
/// Requests carry a base set of flags plus up to [`NUM_ATTRS_MAX`] attributes
/// that apply to subsets of the requested lines.
///
/// [`NUM_ATTRS_MAX`]: v2::NUM_ATTRS_MAX
#[cfg(feature = "uapi_v2")]
pub mod v2;
