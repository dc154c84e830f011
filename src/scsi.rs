//! USB SCSI
//!
//! The transparent command set subset a mass-storage host needs: command
//! block serialization and the fixed response blocks that come back. Byte
//! layouts follow SPC/SBC; all multi-byte fields are big-endian.

/// SCSI device subclass code
pub const SUBCLASS_SCSI: u8 = 0x06; // SCSI Transparent command set

/* SCSI codes */

/* SPC */
const TEST_UNIT_READY: u8 = 0x00;
const REQUEST_SENSE: u8 = 0x03;
const INQUIRY: u8 = 0x12;

/* SBC */
const READ_10: u8 = 0x28;
const READ_CAPACITY_10: u8 = 0x25;
const WRITE_10: u8 = 0x2A;

/// Longest command block a CBW can carry
pub const MAX_CB_LEN: usize = 16;

/// Standard INQUIRY data length requested by this driver
pub const INQUIRY_DATA_LEN: usize = 36;
/// READ CAPACITY (10) response length
pub const CAPACITY_DATA_LEN: usize = 8;
/// Fixed-format sense data length requested by this driver
pub const SENSE_DATA_LEN: usize = 18;

/// SCSI command
///
/// Refer to specifications (SPC,SAM,SBC,etc.)
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum ScsiCommand {
    /* SPC */
    TestUnitReady,
    Inquiry { alloc_len: u16 },
    RequestSense { alloc_len: u8 },

    /* SBC */
    ReadCapacity10,
    Read10 { lba: u32, blocks: u16 },
    Write10 { lba: u32, blocks: u16 },
}

impl ScsiCommand {
    /// Serializes into a command block, returning the significant length
    pub fn serialize(&self, cb: &mut [u8; MAX_CB_LEN]) -> usize {
        cb.fill(0);
        match *self {
            ScsiCommand::TestUnitReady => {
                cb[0] = TEST_UNIT_READY;
                6
            }
            ScsiCommand::Inquiry { alloc_len } => {
                cb[0] = INQUIRY;
                cb[3..5].copy_from_slice(alloc_len.to_be_bytes().as_slice());
                6
            }
            ScsiCommand::RequestSense { alloc_len } => {
                cb[0] = REQUEST_SENSE;
                cb[4] = alloc_len;
                6
            }
            ScsiCommand::ReadCapacity10 => {
                cb[0] = READ_CAPACITY_10;
                10
            }
            ScsiCommand::Read10 { lba, blocks } => {
                cb[0] = READ_10;
                cb[2..6].copy_from_slice(lba.to_be_bytes().as_slice());
                cb[7..9].copy_from_slice(blocks.to_be_bytes().as_slice());
                10
            }
            ScsiCommand::Write10 { lba, blocks } => {
                cb[0] = WRITE_10;
                cb[2..6].copy_from_slice(lba.to_be_bytes().as_slice());
                cb[7..9].copy_from_slice(blocks.to_be_bytes().as_slice());
                10
            }
        }
    }
}

/// Standard INQUIRY data, the fields a host binding cares about
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InquiryData {
    pub peripheral_device_type: u8,
    pub removable: bool,
    pub vendor_id: [u8; 8],
    pub product_id: [u8; 16],
    pub product_revision: [u8; 4],
}

impl InquiryData {
    pub fn parse(buf: &[u8]) -> Option<InquiryData> {
        if buf.len() < INQUIRY_DATA_LEN {
            return None;
        }
        Some(InquiryData {
            peripheral_device_type: buf[0] & 0b00011111,
            removable: (buf[1] & 0b10000000) != 0,
            vendor_id: buf[8..16].try_into().ok()?,
            product_id: buf[16..32].try_into().ok()?,
            product_revision: buf[32..36].try_into().ok()?,
        })
    }
}

/// READ CAPACITY (10) data
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Capacity10 {
    /// Address of the last addressable block
    pub last_lba: u32,
    /// Block length in bytes
    pub block_size: u32,
}

impl Capacity10 {
    pub fn parse(buf: &[u8]) -> Option<Capacity10> {
        if buf.len() < CAPACITY_DATA_LEN {
            return None;
        }
        Some(Capacity10 {
            last_lba: u32::from_be_bytes(buf[..4].try_into().ok()?),
            block_size: u32::from_be_bytes(buf[4..8].try_into().ok()?),
        })
    }

    /// The response carries the last valid block address. Count is one
    /// greater.
    pub fn block_count(&self) -> u64 {
        self.last_lba as u64 + 1
    }
}

/// Fixed-format sense data
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SenseData {
    pub sense_key: u8,
    /// Additional sense code
    pub asc: u8,
    /// Additional sense code qualifier
    pub ascq: u8,
}

impl SenseData {
    pub fn parse(buf: &[u8]) -> Option<SenseData> {
        if buf.len() < 14 {
            return None;
        }
        Some(SenseData {
            sense_key: buf[2] & 0b00001111,
            asc: buf[12],
            ascq: buf[13],
        })
    }
}
