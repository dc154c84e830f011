//! USB host stack seam
//!
//! The driver performs no bus I/O itself. Everything goes through [UsbHost],
//! implemented over whatever host stack the platform provides. Faults of that
//! stack surface as [HostError] and are propagated unchanged.

/* bmRequestType composition */
pub const REQUEST_TYPE_STANDARD: u8 = 0x00;
pub const REQUEST_TYPE_CLASS: u8 = 0x20;
pub const RECIPIENT_DEVICE: u8 = 0x00;
pub const RECIPIENT_INTERFACE: u8 = 0x01;

/* Standard request codes */
const REQUEST_SET_CONFIGURATION: u8 = 0x09;

/// Transfer direction, seen from the host
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Out = 0x00,
    In = 0x80,
}

/// Endpoint address byte: endpoint number in bits 0..=6, direction in bit 7
/// (IN = 1, OUT = 0)
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndpointAddress(u8);

impl From<u8> for EndpointAddress {
    fn from(addr: u8) -> EndpointAddress {
        EndpointAddress(addr)
    }
}

impl From<EndpointAddress> for u8 {
    fn from(addr: EndpointAddress) -> u8 {
        addr.0
    }
}

impl EndpointAddress {
    pub fn number(&self) -> u8 {
        self.0 & 0x7F
    }

    pub fn direction(&self) -> Direction {
        if self.0 & Direction::In as u8 != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

/// Host stack error
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HostError {
    /// The endpoint or the control pipe returned STALL
    Stall,
    /// The transfer did not complete in time
    Timeout,
    /// The device is gone
    Disconnected,
    /// The caller buffer cannot hold what the device sent
    BufferOverflow,
    /// No such endpoint on the addressed device
    InvalidEndpoint,
    /// Any other stack-specific failure
    Other,
}

/// Blocking transfer interface of a USB host stack, addressed at a single
/// attached device
///
/// An implementation wraps one opened device of the platform host stack.
/// Transfers block until completion or fault, mirroring the enumeration flow
/// this driver runs.
pub trait UsbHost {
    /// IN control transfer on the default pipe, returning the bytes read
    fn control_in(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
    ) -> Result<usize, HostError>;

    /// OUT control transfer on the default pipe, returning the bytes written
    fn control_out(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<usize, HostError>;

    /// Bulk IN transfer, returning the bytes read
    fn bulk_in(&mut self, ep: EndpointAddress, buf: &mut [u8]) -> Result<usize, HostError>;

    /// Bulk OUT transfer, returning the bytes written
    fn bulk_out(&mut self, ep: EndpointAddress, data: &[u8]) -> Result<usize, HostError>;

    /// Selects a device configuration by its `bConfigurationValue`
    fn set_configuration(&mut self, value: u8) -> Result<(), HostError> {
        self.control_out(
            REQUEST_TYPE_STANDARD | RECIPIENT_DEVICE | Direction::Out as u8,
            REQUEST_SET_CONFIGURATION,
            value as u16,
            0,
            &[],
        )
        .map(|_| ())
    }
}
