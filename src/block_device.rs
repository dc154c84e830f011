//! Block device backed by a USB mass storage device

use crate::descriptor::{find_msc_interface, DescriptorError};
use crate::fmt::{debug, info, warn};
use crate::host::{HostError, UsbHost};
use crate::scsi::{
    Capacity10, InquiryData, ScsiCommand, SenseData, CAPACITY_DATA_LEN, INQUIRY_DATA_LEN,
    MAX_CB_LEN, SENSE_DATA_LEN, SUBCLASS_SCSI,
};
use crate::transport::bbb::{BulkOnly, BulkOnlyError};
use crate::transport::{CommandStatus, DataPhase, Transport, TransportError};
use core::fmt::Debug;
use embedded_hal::delay::DelayNs;

/// Test Unit Ready attempts before the device is declared not ready
const READY_TRIES: u32 = 100;
const READY_RETRY_DELAY_MS: u32 = 100;

/// Block device error
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E: Debug> {
    /// No mass-storage interface with a bulk endpoint pair in the
    /// configuration descriptor
    NoMscInterface,
    /// Malformed configuration descriptor
    Descriptor(DescriptorError),
    /// Transport or host stack fault
    Transport(TransportError<E>),
    /// The device reported a command failure
    CommandFailed { status: CommandStatus },
    /// The device never reported ready. Carries the last sense data, if the
    /// device produced any
    NotReady { sense: Option<SenseData> },
    /// Response block shorter than the command requires
    InvalidResponse,
    /// Buffer length is not a multiple of the block size, or addresses more
    /// blocks than one command can carry
    InvalidBufferLen,
}

impl<E: Debug> From<DescriptorError> for Error<E> {
    fn from(err: DescriptorError) -> Error<E> {
        Error::Descriptor(err)
    }
}

impl<E: Debug> From<TransportError<E>> for Error<E> {
    fn from(err: TransportError<E>) -> Error<E> {
        Error::Transport(err)
    }
}

impl<E: Debug> From<HostError> for Error<E> {
    fn from(err: HostError) -> Error<E> {
        Error::Transport(TransportError::Host(err))
    }
}

/// Block device backed by a USB mass storage device (aka thumb drive)
///
/// [new] binds the device: it locates the mass-storage interface in the
/// configuration descriptor, selects that configuration and brings the unit
/// to a ready state. After that, [read_blocks] and [write_blocks] move whole
/// sectors and [block_count]/[block_size] answer capacity queries for the
/// filesystem layer.
///
/// [new]: UsbMassStorage::new
/// [read_blocks]: UsbMassStorage::read_blocks
/// [write_blocks]: UsbMassStorage::write_blocks
/// [block_count]: UsbMassStorage::block_count
/// [block_size]: UsbMassStorage::block_size
pub struct UsbMassStorage<H: UsbHost, T: Transport = BulkOnly> {
    host: H,
    transport: T,
    lun: u8,
    inquiry: Option<InquiryData>,
    capacity: Option<Capacity10>,
}

impl<H: UsbHost> UsbMassStorage<H, BulkOnly> {
    /// Binds `host` as a mass-storage block device over Bulk Only Transport
    ///
    /// # Arguments
    /// * `host` - the opened device, owned from here on
    /// * `config_descriptor` - raw configuration descriptor bytes, as fetched
    ///   during enumeration
    /// * `lun` - the Logical Unit to address
    /// * `delay` - delay provider for the ready poll
    ///
    /// # Errors
    /// * [NoMscInterface] - no suitable interface in the descriptor
    /// * [NotReady] - the unit stayed not ready through every retry
    ///
    /// [NoMscInterface]: Error::NoMscInterface
    /// [NotReady]: Error::NotReady
    pub fn new(
        mut host: H,
        config_descriptor: &[u8],
        lun: u8,
        delay: &mut impl DelayNs,
    ) -> Result<Self, Error<BulkOnlyError>> {
        let interface =
            find_msc_interface(config_descriptor, SUBCLASS_SCSI)?.ok_or(Error::NoMscInterface)?;
        info!(
            "usb: msc: Interface {}, bulk eps in {:#x} out {:#x}",
            interface.interface_number,
            u8::from(interface.in_ep),
            u8::from(interface.out_ep),
        );

        host.set_configuration(interface.configuration_value)?;

        let mut transport =
            BulkOnly::new(interface.interface_number, interface.in_ep, interface.out_ep);
        let max_lun = transport.get_max_lun(&mut host)?;
        if lun > max_lun {
            warn!("usb: msc: Lun {} above device max {}", lun, max_lun);
        }

        let mut device = UsbMassStorage {
            host,
            transport,
            lun,
            inquiry: None,
            capacity: None,
        };
        device.inquiry = Some(device.inquire()?);
        device.wait_for_ready(delay)?;
        Ok(device)
    }
}

impl<H: UsbHost, T: Transport> UsbMassStorage<H, T> {
    /// Reads whole blocks starting at `lba` into `buf`
    ///
    /// `buf` must hold a multiple of the block size.
    pub fn read_blocks(&mut self, lba: u32, buf: &mut [u8]) -> Result<(), Error<T::Error>> {
        let blocks = self.blocks_for(buf.len())?;
        debug!("usb: msc: Read {} blocks at {}", blocks, lba);
        let mut cb = [0u8; MAX_CB_LEN];
        let len = ScsiCommand::Read10 { lba, blocks }.serialize(&mut cb);
        self.command(&cb[..len], DataPhase::In(buf))
    }

    /// Writes whole blocks from `buf` starting at `lba`
    ///
    /// `buf` must hold a multiple of the block size.
    pub fn write_blocks(&mut self, lba: u32, buf: &[u8]) -> Result<(), Error<T::Error>> {
        let blocks = self.blocks_for(buf.len())?;
        debug!("usb: msc: Write {} blocks at {}", blocks, lba);
        let mut cb = [0u8; MAX_CB_LEN];
        let len = ScsiCommand::Write10 { lba, blocks }.serialize(&mut cb);
        self.command(&cb[..len], DataPhase::Out(buf))
    }

    /// Number of addressable blocks, fetched on first use
    pub fn block_count(&mut self) -> Result<u64, Error<T::Error>> {
        self.capacity().map(|capacity| capacity.block_count())
    }

    /// Block length in bytes, fetched on first use
    pub fn block_size(&mut self) -> Result<u32, Error<T::Error>> {
        self.capacity().map(|capacity| capacity.block_size)
    }

    /// INQUIRY data collected while binding
    pub fn inquiry(&self) -> Option<&InquiryData> {
        self.inquiry.as_ref()
    }

    /// Transport reset, for recovery after a transport fault
    pub fn reset(&mut self) -> Result<(), Error<T::Error>> {
        self.transport.reset(&mut self.host).map_err(Error::from)
    }

    /// Releases the underlying host device
    pub fn release(self) -> H {
        self.host
    }

    fn capacity(&mut self) -> Result<Capacity10, Error<T::Error>> {
        if let Some(capacity) = self.capacity {
            return Ok(capacity);
        }
        let capacity = self.read_capacity()?;
        info!(
            "usb: msc: Capacity: {} blocks of {}",
            capacity.block_count(),
            capacity.block_size
        );
        self.capacity = Some(capacity);
        Ok(capacity)
    }

    fn blocks_for(&mut self, len: usize) -> Result<u16, Error<T::Error>> {
        let block_size = self.capacity()?.block_size as usize;
        if block_size == 0 || len % block_size != 0 {
            return Err(Error::InvalidBufferLen);
        }
        u16::try_from(len / block_size).map_err(|_| Error::InvalidBufferLen)
    }

    fn inquire(&mut self) -> Result<InquiryData, Error<T::Error>> {
        let mut response = [0u8; INQUIRY_DATA_LEN];
        let mut cb = [0u8; MAX_CB_LEN];
        let len = ScsiCommand::Inquiry {
            alloc_len: INQUIRY_DATA_LEN as u16,
        }
        .serialize(&mut cb);
        self.command(&cb[..len], DataPhase::In(&mut response))?;
        InquiryData::parse(&response).ok_or(Error::InvalidResponse)
    }

    fn read_capacity(&mut self) -> Result<Capacity10, Error<T::Error>> {
        let mut response = [0u8; CAPACITY_DATA_LEN];
        let mut cb = [0u8; MAX_CB_LEN];
        let len = ScsiCommand::ReadCapacity10.serialize(&mut cb);
        self.command(&cb[..len], DataPhase::In(&mut response))?;
        Capacity10::parse(&response).ok_or(Error::InvalidResponse)
    }

    /// Polls Test Unit Ready until the unit answers passed, requesting sense
    /// data between attempts to let the unit clear its attention condition
    fn wait_for_ready(&mut self, delay: &mut impl DelayNs) -> Result<(), Error<T::Error>> {
        if self.test_unit_ready()? == CommandStatus::Passed {
            return Ok(());
        }

        let mut sense = None;
        for attempt in 0..READY_TRIES {
            delay.delay_ms(READY_RETRY_DELAY_MS);
            sense = self.request_sense()?;
            if self.test_unit_ready()? == CommandStatus::Passed {
                debug!("usb: msc: Unit ready after {} retries", attempt + 1);
                return Ok(());
            }
        }
        Err(Error::NotReady { sense })
    }

    fn test_unit_ready(&mut self) -> Result<CommandStatus, Error<T::Error>> {
        let mut cb = [0u8; MAX_CB_LEN];
        let len = ScsiCommand::TestUnitReady.serialize(&mut cb);
        self.transport
            .command(&mut self.host, self.lun, &cb[..len], DataPhase::None)
            .map_err(Error::from)
    }

    /// The status of the sense command itself is ignored; only the sense
    /// bytes matter to the poll.
    fn request_sense(&mut self) -> Result<Option<SenseData>, Error<T::Error>> {
        let mut response = [0u8; SENSE_DATA_LEN];
        let mut cb = [0u8; MAX_CB_LEN];
        let len = ScsiCommand::RequestSense {
            alloc_len: SENSE_DATA_LEN as u8,
        }
        .serialize(&mut cb);
        self.transport
            .command(
                &mut self.host,
                self.lun,
                &cb[..len],
                DataPhase::In(&mut response),
            )
            .map_err(Error::from)?;
        Ok(SenseData::parse(&response))
    }

    fn command(&mut self, cb: &[u8], data: DataPhase<'_>) -> Result<(), Error<T::Error>> {
        match self
            .transport
            .command(&mut self.host, self.lun, cb, data)
            .map_err(Error::from)?
        {
            CommandStatus::Passed => Ok(()),
            status => Err(Error::CommandFailed { status }),
        }
    }
}
