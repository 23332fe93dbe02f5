// SPDX-FileCopyrightText: 2022 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use gpiod_uapi::v2;
use std::fmt;
use std::fs::File;

/// The uAPI ABI versions available to interact with the kernel.
///
/// Two versions of the Linux GPIO uAPI ABI exist, v1 released in Linux 4.8
/// and v2 released in Linux 5.10.
///
/// * `V2` is the current ABI and is preferred where available.
/// * `V1` is more restrictive than V2, so some information and features are
///   unavailable, but it is the only option on older kernels.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum AbiVersion {
    V1,
    #[default]
    V2,
}

impl fmt::Display for AbiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiVersion::V1 => write!(f, "uAPI ABI v1"),
            AbiVersion::V2 => write!(f, "uAPI ABI v2"),
        }
    }
}

/// The features available through a chip, as determined by the ABI version
/// negotiated when the chip was opened.
///
/// | Feature                           | v1        | v2        |
/// |-----------------------------------|-----------|-----------|
/// | Line info change watch            | no        | yes       |
/// | Edge event sequence numbers       | zero      | populated |
/// | Reconfigure edge detection        | no        | yes       |
/// | Per-line config in one reservation| no        | yes       |
/// | Debounce and event clock          | no        | yes       |
/// | Bias and drive                    | Linux 5.5 | yes       |
///
/// Attempts to use a feature the ABI lacks fail with EINVAL, as the kernel
/// itself would.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Capabilities {
    abiv: AbiVersion,
}

impl Capabilities {
    /// The capabilities of the given ABI version.
    pub fn new(abiv: AbiVersion) -> Capabilities {
        Capabilities { abiv }
    }

    /// Determine the capabilities available through a chip.
    ///
    /// A forced version is taken as is, without probing, so a version the
    /// kernel does not support surfaces as the kernel's rejection of the
    /// first call that uses it.
    ///
    /// A chip without lines cannot be probed, and is assumed to support v2.
    pub(crate) fn negotiate(
        cf: &File,
        num_lines: u32,
        forced: Option<AbiVersion>,
    ) -> Capabilities {
        let abiv = forced.unwrap_or_else(|| {
            if num_lines == 0 {
                return AbiVersion::default();
            }
            // offset 0 exists, so any failure means no v2 support
            match v2::get_line_info(cf, 0) {
                Ok(_) => AbiVersion::V2,
                Err(_) => AbiVersion::V1,
            }
        });
        Capabilities::new(abiv)
    }

    /// The negotiated ABI version.
    pub fn abi_version(&self) -> AbiVersion {
        self.abiv
    }

    /// Line info changes may be watched.
    pub fn info_watch(&self) -> bool {
        self.abiv == AbiVersion::V2
    }

    /// Edge events carry sequence numbers.
    pub fn event_seqno(&self) -> bool {
        self.abiv == AbiVersion::V2
    }

    /// Edge detection may be changed on an existing reservation.
    pub fn edge_reconfigure(&self) -> bool {
        self.abiv == AbiVersion::V2
    }

    /// Lines in one reservation may have different configurations.
    pub fn per_line_config(&self) -> bool {
        self.abiv == AbiVersion::V2
    }

    /// Debounce period and event clock may be set.
    pub fn debounce_and_clock(&self) -> bool {
        self.abiv == AbiVersion::V2
    }

    /// Bias and drive may be set.
    ///
    /// Under v1 this also depends on the kernel, which rejects them prior
    /// to Linux 5.5.
    pub fn bias_and_drive(&self) -> bool {
        true
    }
}
