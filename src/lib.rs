//! USB Mass Storage block device driver for USB hosts
//!
//! Binds a mass-storage device (aka thumb drive) attached behind a USB host
//! stack as a block device usable by a filesystem layer. The host stack itself
//! is an external collaborator reached through the [UsbHost] trait.
//!
//! # Layers:
//! * [descriptor] - configuration descriptor walker and interface binding
//! * [Bulk Only] - SCSI command framing over bulk endpoints
//! * [SCSI] - the transparent command set spoken by thumb drives
//! * [UsbMassStorage] - the block device surface
//!
//! # Features
//! | Feature | Description                           |
//! | ------- |---------------------------------------|
//! | `bbb` | Include Bulk Only Transport           |
//! | `scsi` | Include SCSI command set and the block device |
//! | `defmt` | Enable logging via [defmt](https://crates.io/crates/defmt) crate |
//!
//! [UsbHost]: crate::host::UsbHost
//! [descriptor]: crate::descriptor
//! [Bulk Only]: crate::transport::bbb
//! [SCSI]: crate::scsi
//! [UsbMassStorage]: crate::block_device::UsbMassStorage

#![no_std]

#[cfg(all(feature = "bbb", feature = "scsi"))]
pub mod block_device;
pub mod descriptor;
pub(crate) mod fmt;
pub mod host;
#[cfg(feature = "scsi")]
pub mod scsi;
pub mod transport;

/// USB Mass Storage Class code
pub const CLASS_MASS_STORAGE: u8 = 0x08;
