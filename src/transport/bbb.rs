//! Bulk Only Transport (BBB/BOT)

use crate::fmt::{info, trace};
use crate::host::{
    Direction, EndpointAddress, HostError, UsbHost, RECIPIENT_INTERFACE, REQUEST_TYPE_CLASS,
};
use crate::transport::{CommandStatus, DataPhase, Transport, TransportError};
use num_enum::TryFromPrimitive;

/// Bulk Only Transport interface protocol
pub const TRANSPORT_BBB: u8 = 0x50;

const CLASS_SPECIFIC_BULK_ONLY_MASS_STORAGE_RESET: u8 = 0xFF;
const CLASS_SPECIFIC_GET_MAX_LUN: u8 = 0xFE;

const CBW_SIGNATURE_LE: [u8; 4] = 0x43425355u32.to_le_bytes();
const CSW_SIGNATURE_LE: [u8; 4] = 0x53425355u32.to_le_bytes();

const CBW_LEN: usize = 31;
const CSW_LEN: usize = 13;

const MIN_CB_LEN: usize = 1;
const MAX_CB_LEN: usize = 16;

/// Bulk Only Transport error
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BulkOnlyError {
    /// Command block length outside of 1..=16
    InvalidCommandBlock,
    /// CSW of a wrong size, with a bad signature or a reserved status code
    InvalidCsw,
    /// CSW tag does not echo the CBW tag
    TagMismatch,
    /// Invalid MAX_LUN value. Refer to USB BBB doc
    InvalidMaxLun,
}

/// Parsed Command Status Wrapper
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandStatusWrapper {
    pub status: CommandStatus,
    /// Announced transfer length minus what the device actually processed
    pub data_residue: u32,
}

type BulkOnlyTransportResult<T> = Result<T, TransportError<BulkOnlyError>>;

/// Bulk Only Transport, host end
///
/// Frames each command block as a `CBW`, runs the data phase on the bulk
/// endpoint the direction calls for and collects the `CSW` the device answers
/// with. Holds no transfer state between commands; one [transfer] call is one
/// complete CBW/data/CSW exchange.
///
/// [transfer]: crate::transport::bbb::BulkOnly::transfer
pub struct BulkOnly {
    interface: u8,
    in_ep: EndpointAddress,
    out_ep: EndpointAddress,
    tag: u32,
    max_lun: u8,
}

impl BulkOnly {
    /// Creates a Bulk Only Transport instance over an already located
    /// interface and its bulk endpoint pair
    pub fn new(interface: u8, in_ep: EndpointAddress, out_ep: EndpointAddress) -> BulkOnly {
        debug_assert!(matches!(in_ep.direction(), Direction::In));
        debug_assert!(matches!(out_ep.direction(), Direction::Out));

        BulkOnly {
            interface,
            in_ep,
            out_ep,
            tag: 0,
            max_lun: 0,
        }
    }

    /// Queries the max index of the Logical Unit
    ///
    /// A STALL on the control pipe is the device's way of saying it has a
    /// single logical unit. Spec. section 3.2
    ///
    /// # Errors
    /// * [InvalidMaxLun]
    ///
    /// [InvalidMaxLun]: crate::transport::bbb::BulkOnlyError::InvalidMaxLun
    pub fn get_max_lun<H: UsbHost>(&mut self, host: &mut H) -> BulkOnlyTransportResult<u8> {
        let mut buf = [0u8; 1];
        match host.control_in(
            REQUEST_TYPE_CLASS | RECIPIENT_INTERFACE | Direction::In as u8,
            CLASS_SPECIFIC_GET_MAX_LUN,
            0,
            self.interface as u16,
            &mut buf,
        ) {
            Ok(1) if buf[0] <= 0x0F => {
                self.max_lun = buf[0];
            }
            Ok(_) => return Err(TransportError::Error(BulkOnlyError::InvalidMaxLun)),
            Err(HostError::Stall) => {
                info!("usb: bbb: Get Max Lun stalled, assuming 0");
                self.max_lun = 0;
            }
            Err(err) => return Err(TransportError::Host(err)),
        }
        Ok(self.max_lun)
    }

    /// Max index of the Logical Unit, as last reported by the device
    pub fn max_lun(&self) -> u8 {
        self.max_lun
    }

    /// Executes one CBW/data/CSW exchange, returning the parsed CSW
    ///
    /// # Errors
    /// * [InvalidCommandBlock]
    /// * [InvalidCsw]
    /// * [TagMismatch]
    ///
    /// [InvalidCommandBlock]: crate::transport::bbb::BulkOnlyError::InvalidCommandBlock
    /// [InvalidCsw]: crate::transport::bbb::BulkOnlyError::InvalidCsw
    /// [TagMismatch]: crate::transport::bbb::BulkOnlyError::TagMismatch
    pub fn transfer<H: UsbHost>(
        &mut self,
        host: &mut H,
        lun: u8,
        cb: &[u8],
        data: DataPhase<'_>,
    ) -> BulkOnlyTransportResult<CommandStatusWrapper> {
        if !(MIN_CB_LEN..=MAX_CB_LEN).contains(&cb.len()) {
            return Err(TransportError::Error(BulkOnlyError::InvalidCommandBlock));
        }

        let tag = self.next_tag();
        let cbw = build_cbw(tag, lun, cb, &data);

        info!("usb: bbb: Send CBW: tag {}, data len {}", tag, data.len());
        host.bulk_out(self.out_ep, &cbw)
            .map_err(TransportError::Host)?;

        match data {
            DataPhase::In(buf) => {
                let count = host.bulk_in(self.in_ep, buf).map_err(TransportError::Host)?;
                trace!("usb: bbb: Read data bytes: {}", count);
            }
            DataPhase::Out(data) => {
                let count = host
                    .bulk_out(self.out_ep, data)
                    .map_err(TransportError::Host)?;
                trace!("usb: bbb: Wrote data bytes: {}", count);
            }
            DataPhase::None => {}
        }

        self.read_csw(host, tag)
    }

    /// Bulk-Only Mass Storage Reset. Spec. section 3.1
    pub fn reset<H: UsbHost>(&mut self, host: &mut H) -> BulkOnlyTransportResult<()> {
        info!("usb: bbb: Send reset");
        host.control_out(
            REQUEST_TYPE_CLASS | RECIPIENT_INTERFACE | Direction::Out as u8,
            CLASS_SPECIFIC_BULK_ONLY_MASS_STORAGE_RESET,
            0,
            self.interface as u16,
            &[],
        )
        .map(|_| ())
        .map_err(TransportError::Host)
    }

    fn read_csw<H: UsbHost>(
        &mut self,
        host: &mut H,
        tag: u32,
    ) -> BulkOnlyTransportResult<CommandStatusWrapper> {
        let mut csw = [0u8; CSW_LEN];
        let count = host
            .bulk_in(self.in_ep, &mut csw)
            .map_err(TransportError::Host)?;

        if count != CSW_LEN || !csw.starts_with(&CSW_SIGNATURE_LE) {
            return Err(TransportError::Error(BulkOnlyError::InvalidCsw));
        }
        // Spec. 6.3: the CSW positively associates with the CBW via the tag
        if u32::from_le_bytes([csw[4], csw[5], csw[6], csw[7]]) != tag {
            return Err(TransportError::Error(BulkOnlyError::TagMismatch));
        }

        let status = CommandStatus::try_from_primitive(csw[12])
            .map_err(|_| TransportError::Error(BulkOnlyError::InvalidCsw))?;
        let data_residue = u32::from_le_bytes([csw[8], csw[9], csw[10], csw[11]]);

        info!(
            "usb: bbb: Recv CSW: status {}, residue {}",
            status as u8, data_residue
        );
        Ok(CommandStatusWrapper {
            status,
            data_residue,
        })
    }

    fn next_tag(&mut self) -> u32 {
        self.tag = self.tag.wrapping_add(1);
        self.tag
    }
}

impl Transport for BulkOnly {
    const PROTO: u8 = TRANSPORT_BBB;
    type Error = BulkOnlyError;

    fn command<H: UsbHost>(
        &mut self,
        host: &mut H,
        lun: u8,
        cb: &[u8],
        data: DataPhase<'_>,
    ) -> Result<CommandStatus, TransportError<BulkOnlyError>> {
        self.transfer(host, lun, cb, data).map(|csw| csw.status)
    }

    fn reset<H: UsbHost>(&mut self, host: &mut H) -> Result<(), TransportError<BulkOnlyError>> {
        BulkOnly::reset(self, host)
    }
}

/// The caller must ensure that `cb` fits a command block
fn build_cbw(tag: u32, lun: u8, cb: &[u8], data: &DataPhase<'_>) -> [u8; CBW_LEN] {
    debug_assert!((MIN_CB_LEN..=MAX_CB_LEN).contains(&cb.len()));

    let direction = match data {
        DataPhase::In(_) => Direction::In,
        DataPhase::Out(_) | DataPhase::None => Direction::Out,
    };

    let mut cbw = [0u8; CBW_LEN];
    cbw[..4].copy_from_slice(CBW_SIGNATURE_LE.as_slice());
    cbw[4..8].copy_from_slice(tag.to_le_bytes().as_slice());
    cbw[8..12].copy_from_slice((data.len() as u32).to_le_bytes().as_slice());
    cbw[12] = direction as u8;
    cbw[13] = lun & 0b00001111;
    cbw[14] = cb.len() as u8;
    cbw[15..15 + cb.len()].copy_from_slice(cb);
    cbw
}
