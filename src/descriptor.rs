//! USB configuration descriptor parsing
//!
//! A configuration descriptor is fetched from the device as one byte buffer
//! holding the configuration entry followed by every interface, endpoint and
//! class-specific entry of that configuration. Each entry starts with its own
//! total length and a type tag, so the buffer can be walked without knowing
//! the types in advance. [Descriptors] does that walk lazily and
//! [find_msc_interface] applies it to locate a mass-storage interface and its
//! bulk endpoint pair.

use crate::fmt::trace;
use crate::host::{Direction, EndpointAddress};
use crate::CLASS_MASS_STORAGE;
use num_enum::TryFromPrimitive;

/// Standard descriptor type codes
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DescriptorType {
    Device = 0x01,
    Configuration = 0x02,
    String = 0x03,
    Interface = 0x04,
    Endpoint = 0x05,
}

/* Standard entry lengths, USB 2.0 table 9-10/9-12/9-13 */
const DESCRIPTOR_LEN_CONFIGURATION: usize = 9;
const DESCRIPTOR_LEN_INTERFACE: usize = 9;
const DESCRIPTOR_LEN_ENDPOINT: usize = 7;

/// Transfer type bits of the endpoint attributes field
pub const TRANSFER_TYPE_MASK: u8 = 0b0000_0011;
/// Attributes value of a bulk endpoint
pub const TRANSFER_TYPE_BULK: u8 = 0x02;

/// Configuration descriptor decode fault
///
/// Any fault ends the walk. The length field is the only way to reach the
/// next entry, so no realignment is attempted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DescriptorError {
    /// Entry with a length byte too small to hold its own header
    ZeroLength { offset: usize },
    /// Entry extends past the end of the buffer
    Overrun { offset: usize },
    /// Entry shorter than its type requires
    Truncated { offset: usize },
}

/// One typed entry of a configuration descriptor
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Descriptor {
    /// Configuration entry (0x02)
    Configuration { value: u8, num_interfaces: u8 },
    /// Interface entry (0x04)
    Interface {
        number: u8,
        alternate_setting: u8,
        class: u8,
        subclass: u8,
        protocol: u8,
    },
    /// Endpoint entry (0x05)
    Endpoint {
        address: EndpointAddress,
        attributes: u8,
        max_packet_size: u16,
    },
    /// Any other entry, carried for the caller to skip or inspect
    Unknown { kind: u8, len: u8 },
}

/// Lazy walk over the entries of a configuration descriptor
///
/// Yields one [Descriptor] per entry. A decode fault is yielded once and the
/// walk terminates. An empty buffer yields nothing.
pub struct Descriptors<'a> {
    buf: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> Descriptors<'a> {
    pub fn new(buf: &'a [u8]) -> Descriptors<'a> {
        Descriptors {
            buf,
            offset: 0,
            failed: false,
        }
    }

    fn parse(entry: &[u8], offset: usize) -> Result<Descriptor, DescriptorError> {
        match DescriptorType::try_from_primitive(entry[1]) {
            Ok(DescriptorType::Configuration) => {
                if entry.len() < DESCRIPTOR_LEN_CONFIGURATION {
                    return Err(DescriptorError::Truncated { offset });
                }
                Ok(Descriptor::Configuration {
                    value: entry[5],
                    num_interfaces: entry[4],
                })
            }
            Ok(DescriptorType::Interface) => {
                if entry.len() < DESCRIPTOR_LEN_INTERFACE {
                    return Err(DescriptorError::Truncated { offset });
                }
                Ok(Descriptor::Interface {
                    number: entry[2],
                    alternate_setting: entry[3],
                    class: entry[5],
                    subclass: entry[6],
                    protocol: entry[7],
                })
            }
            Ok(DescriptorType::Endpoint) => {
                if entry.len() < DESCRIPTOR_LEN_ENDPOINT {
                    return Err(DescriptorError::Truncated { offset });
                }
                Ok(Descriptor::Endpoint {
                    address: EndpointAddress::from(entry[2]),
                    attributes: entry[3],
                    max_packet_size: u16::from_le_bytes([entry[4], entry[5]]),
                })
            }
            _ => {
                trace!("usb: desc: Skipping entry of type {:#x}", entry[1]);
                Ok(Descriptor::Unknown {
                    kind: entry[1],
                    len: entry[0],
                })
            }
        }
    }
}

impl<'a> Iterator for Descriptors<'a> {
    type Item = Result<Descriptor, DescriptorError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.buf.len() {
            return None;
        }

        let offset = self.offset;
        let len = self.buf[offset] as usize;

        let result = if len < 2 {
            Err(DescriptorError::ZeroLength { offset })
        } else if offset + len > self.buf.len() {
            Err(DescriptorError::Overrun { offset })
        } else {
            self.offset += len;
            Self::parse(&self.buf[offset..offset + len], offset)
        };

        self.failed = result.is_err();
        Some(result)
    }
}

/// A mass-storage interface located inside a configuration descriptor
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MscInterface {
    /// Value to select with SET CONFIGURATION
    pub configuration_value: u8,
    pub interface_number: u8,
    /// Transport protocol code of the interface
    pub protocol: u8,
    pub in_ep: EndpointAddress,
    pub out_ep: EndpointAddress,
}

/// Locates a mass-storage interface of the given subclass and its bulk
/// endpoint pair
///
/// Walks `config_descriptor` for an interface with class
/// [CLASS_MASS_STORAGE] and subclass `subclass`, then collects the bulk IN
/// and bulk OUT endpoints that follow it. Entries of other interfaces and
/// unknown entries are skipped. Returns `Ok(None)` if no such interface with
/// both endpoints exists.
pub fn find_msc_interface(
    config_descriptor: &[u8],
    subclass: u8,
) -> Result<Option<MscInterface>, DescriptorError> {
    let mut configuration_value = 0;
    let mut msc_interface: Option<(u8, u8)> = None;
    let mut in_msc_interface = false;
    let mut in_ep = None;
    let mut out_ep = None;

    for entry in Descriptors::new(config_descriptor) {
        match entry? {
            Descriptor::Configuration { value, .. } => {
                configuration_value = value;
            }
            Descriptor::Interface {
                number,
                class,
                subclass: interface_subclass,
                protocol,
                ..
            } => {
                in_msc_interface = class == CLASS_MASS_STORAGE && interface_subclass == subclass;
                if in_msc_interface {
                    msc_interface = Some((number, protocol));
                }
            }
            Descriptor::Endpoint {
                address,
                attributes,
                ..
            } if in_msc_interface => {
                if attributes & TRANSFER_TYPE_MASK == TRANSFER_TYPE_BULK {
                    match address.direction() {
                        Direction::In => in_ep = Some(address),
                        Direction::Out => out_ep = Some(address),
                    }
                }
            }
            _ => {}
        }
    }

    match (msc_interface, in_ep, out_ep) {
        (Some((interface_number, protocol)), Some(in_ep), Some(out_ep)) => Ok(Some(MscInterface {
            configuration_value,
            interface_number,
            protocol,
            in_ep,
            out_ep,
        })),
        _ => Ok(None),
    }
}
