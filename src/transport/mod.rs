//! USB Mass Storage transports

use crate::host::{HostError, UsbHost};
use core::fmt::Debug;
use num_enum::TryFromPrimitive;

#[cfg(feature = "bbb")]
pub mod bbb;

/// Interface protocol for specific transports
pub const TRANSPORT_VENDOR_SPECIFIC: u8 = 0xFF;

/// USB Mass Storage transport, host end.
///
/// An implementation frames command blocks on the wire and reports the status
/// the device answered with. Used as the underlying transport by
/// [UsbMassStorage].
///
/// [UsbMassStorage]: crate::block_device::UsbMassStorage
pub trait Transport {
    /// Interface protocol code
    const PROTO: u8;
    /// Transport-specific error
    type Error: Debug;

    /// Executes one command block against a logical unit, running the data
    /// phase in between.
    ///
    /// A non-[Passed] status is not an error of this method. It is the
    /// device's verdict on the command and is returned for the caller to act
    /// on.
    ///
    /// [Passed]: CommandStatus::Passed
    fn command<H: UsbHost>(
        &mut self,
        host: &mut H,
        lun: u8,
        cb: &[u8],
        data: DataPhase<'_>,
    ) -> Result<CommandStatus, TransportError<Self::Error>>;

    /// Returns the transport to a known state after a fault
    fn reset<H: UsbHost>(&mut self, host: &mut H) -> Result<(), TransportError<Self::Error>>;
}

/// Data phase of a command, seen from the host
pub enum DataPhase<'a> {
    /// Device to host, into the caller buffer
    In(&'a mut [u8]),
    /// Host to device, out of the caller buffer
    Out(&'a [u8]),
    /// No data expected
    None,
}

impl DataPhase<'_> {
    /// Transfer length the host announces for this phase
    pub fn len(&self) -> usize {
        match self {
            DataPhase::In(buf) => buf.len(),
            DataPhase::Out(data) => data.len(),
            DataPhase::None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Generic error type that could be used by [Transport] impls.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError<E: Debug> {
    /// Host stack error
    Host(HostError),
    /// Transport-specific error
    Error(E),
}

/// The status of a Mass Storage command.
///
/// Refer to the USB-MS doc.
#[repr(u8)]
#[derive(Default, Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandStatus {
    #[default]
    Passed = 0x00,
    Failed = 0x01,
    PhaseError = 0x02,
}
