//! A scripted USB host stack wrapping a simulated Bulk Only SCSI device
//!
//! The simulated device parses the CBWs the driver sends, executes the
//! command against an in-memory disk and queues the data and CSW for the
//! following bulk IN transfers. Shared-state clones allow a test to inspect
//! and steer the device while the driver under test owns another clone.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use usbh_storage::host::{Direction, EndpointAddress, HostError, UsbHost};

pub const BLOCK_SIZE: usize = 512;

const CBW_LEN: usize = 31;
const CSW_LEN: usize = 13;
const CBW_SIGNATURE_LE: [u8; 4] = 0x43425355u32.to_le_bytes();
const CSW_SIGNATURE_LE: [u8; 4] = 0x53425355u32.to_le_bytes();

const CLASS_SPECIFIC_BULK_ONLY_MASS_STORAGE_RESET: u8 = 0xFF;
const CLASS_SPECIFIC_GET_MAX_LUN: u8 = 0xFE;
const REQUEST_SET_CONFIGURATION: u8 = 0x09;

const TEST_UNIT_READY: u8 = 0x00;
const REQUEST_SENSE: u8 = 0x03;
const INQUIRY: u8 = 0x12;
const READ_CAPACITY_10: u8 = 0x25;
const READ_10: u8 = 0x28;
const WRITE_10: u8 = 0x2A;

const STATUS_PASSED: u8 = 0x00;
const STATUS_FAILED: u8 = 0x01;

/// Fixed-format NOT READY / MEDIUM NOT PRESENT sense block
const NOT_READY_SENSE: [u8; 18] = [
    0x70, 0, 0x02, 0, 0, 0, 0, 10, 0, 0, 0, 0, 0x3A, 0x00, 0, 0, 0, 0,
];

#[derive(Clone)]
pub struct DummyUsbHost {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    disk: Vec<u8>,
    configured: Option<u8>,
    max_lun: u8,
    stall_max_lun: bool,
    tur_failures_left: u32,
    sense_requests: u32,
    capacity_requests: u32,
    resets: u32,
    fail_next: bool,
    corrupt_next_tag: bool,
    in_queue: VecDeque<Vec<u8>>,
    pending_write: Option<PendingWrite>,
    last_cbw: Option<[u8; CBW_LEN]>,
}

struct PendingWrite {
    offset: usize,
    len: usize,
    tag: u32,
    status: u8,
    discard: bool,
}

impl DummyUsbHost {
    pub fn new(blocks: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                disk: vec![0u8; blocks * BLOCK_SIZE],
                configured: None,
                max_lun: 0,
                stall_max_lun: false,
                tur_failures_left: 0,
                sense_requests: 0,
                capacity_requests: 0,
                resets: 0,
                fail_next: false,
                corrupt_next_tag: false,
                in_queue: VecDeque::new(),
                pending_write: None,
                last_cbw: None,
            })),
        }
    }

    /* test scripting */

    pub fn stall_max_lun(&self) {
        self.inner.lock().unwrap().stall_max_lun = true;
    }

    /// Make the next `count` Test Unit Ready commands report failure
    pub fn require_tur_failures(&self, count: u32) {
        self.inner.lock().unwrap().tur_failures_left = count;
    }

    pub fn fail_next_command(&self) {
        self.inner.lock().unwrap().fail_next = true;
    }

    pub fn corrupt_next_csw_tag(&self) {
        self.inner.lock().unwrap().corrupt_next_tag = true;
    }

    pub fn write_sector(&self, lba: usize, data: &[u8]) {
        assert_eq!(BLOCK_SIZE, data.len());
        let mut lock = self.inner.lock().unwrap();
        lock.disk[lba * BLOCK_SIZE..(lba + 1) * BLOCK_SIZE].copy_from_slice(data);
    }

    pub fn read_sector(&self, lba: usize) -> Vec<u8> {
        let lock = self.inner.lock().unwrap();
        lock.disk[lba * BLOCK_SIZE..(lba + 1) * BLOCK_SIZE].to_vec()
    }

    /* observation */

    pub fn configured(&self) -> Option<u8> {
        self.inner.lock().unwrap().configured
    }

    pub fn sense_requests(&self) -> u32 {
        self.inner.lock().unwrap().sense_requests
    }

    pub fn capacity_requests(&self) -> u32 {
        self.inner.lock().unwrap().capacity_requests
    }

    pub fn resets(&self) -> u32 {
        self.inner.lock().unwrap().resets
    }

    pub fn last_cbw(&self) -> Option<[u8; CBW_LEN]> {
        self.inner.lock().unwrap().last_cbw
    }
}

impl Inner {
    fn push_csw(&mut self, mut tag: u32, residue: u32, status: u8) {
        if self.corrupt_next_tag {
            self.corrupt_next_tag = false;
            tag ^= 0xDEAD_BEEF;
        }
        let mut csw = vec![0u8; CSW_LEN];
        csw[..4].copy_from_slice(CSW_SIGNATURE_LE.as_slice());
        csw[4..8].copy_from_slice(tag.to_le_bytes().as_slice());
        csw[8..12].copy_from_slice(residue.to_le_bytes().as_slice());
        csw[12] = status;
        self.in_queue.push_back(csw);
    }

    fn handle_cbw(&mut self, bytes: &[u8]) {
        let mut cbw = [0u8; CBW_LEN];
        cbw.copy_from_slice(bytes);
        self.last_cbw = Some(cbw);

        let tag = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        let data_len = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let cb_len = bytes[14] as usize;
        assert!((1..=16).contains(&cb_len), "invalid command block length");
        let cb = &bytes[15..15 + cb_len];

        if self.fail_next {
            self.fail_next = false;
            let out = bytes[12] & 0x80 == 0;
            if out && data_len > 0 {
                // swallow the data phase, then report the failure
                self.pending_write = Some(PendingWrite {
                    offset: 0,
                    len: data_len as usize,
                    tag,
                    status: STATUS_FAILED,
                    discard: true,
                });
            } else {
                // IN (or no-data) command: the device still runs the data
                // phase, returning a zero-length packet, before the failing CSW
                if data_len > 0 {
                    self.in_queue.push_back(Vec::new());
                }
                self.push_csw(tag, data_len, STATUS_FAILED);
            }
            return;
        }

        match cb[0] {
            TEST_UNIT_READY => {
                if self.tur_failures_left > 0 {
                    self.tur_failures_left -= 1;
                    self.push_csw(tag, 0, STATUS_FAILED);
                } else {
                    self.push_csw(tag, 0, STATUS_PASSED);
                }
            }
            REQUEST_SENSE => {
                self.sense_requests += 1;
                let alloc = cb[4] as usize;
                self.in_queue
                    .push_back(NOT_READY_SENSE[..alloc.min(NOT_READY_SENSE.len())].to_vec());
                self.push_csw(tag, 0, STATUS_PASSED);
            }
            INQUIRY => {
                let mut inquiry = vec![0u8; 36];
                inquiry[1] = 0x80; // removable
                inquiry[8..16].copy_from_slice(b"DUMMY   ");
                inquiry[16..32].copy_from_slice(b"DUMMY DISK      ");
                inquiry[32..36].copy_from_slice(b"0.1 ");
                self.in_queue.push_back(inquiry);
                self.push_csw(tag, 0, STATUS_PASSED);
            }
            READ_CAPACITY_10 => {
                self.capacity_requests += 1;
                let last_lba = (self.disk.len() / BLOCK_SIZE - 1) as u32;
                let mut capacity = vec![0u8; 8];
                capacity[..4].copy_from_slice(last_lba.to_be_bytes().as_slice());
                capacity[4..].copy_from_slice((BLOCK_SIZE as u32).to_be_bytes().as_slice());
                self.in_queue.push_back(capacity);
                self.push_csw(tag, 0, STATUS_PASSED);
            }
            READ_10 => {
                let lba = u32::from_be_bytes(cb[2..6].try_into().unwrap()) as usize;
                let blocks = u16::from_be_bytes(cb[7..9].try_into().unwrap()) as usize;
                let data = self.disk[lba * BLOCK_SIZE..(lba + blocks) * BLOCK_SIZE].to_vec();
                self.in_queue.push_back(data);
                self.push_csw(tag, 0, STATUS_PASSED);
            }
            WRITE_10 => {
                let lba = u32::from_be_bytes(cb[2..6].try_into().unwrap()) as usize;
                let blocks = u16::from_be_bytes(cb[7..9].try_into().unwrap()) as usize;
                self.pending_write = Some(PendingWrite {
                    offset: lba * BLOCK_SIZE,
                    len: blocks * BLOCK_SIZE,
                    tag,
                    status: STATUS_PASSED,
                    discard: false,
                });
            }
            opcode => panic!("unexpected SCSI opcode {opcode:#04x}"),
        }
    }
}

impl UsbHost for DummyUsbHost {
    fn control_in(
        &mut self,
        request_type: u8,
        request: u8,
        _value: u16,
        _index: u16,
        buf: &mut [u8],
    ) -> Result<usize, HostError> {
        let lock = self.inner.lock().unwrap();
        match request {
            CLASS_SPECIFIC_GET_MAX_LUN => {
                assert_eq!(0xA1, request_type);
                if lock.stall_max_lun {
                    return Err(HostError::Stall);
                }
                buf[0] = lock.max_lun;
                Ok(1)
            }
            request => panic!("unexpected IN control request {request:#04x}"),
        }
    }

    fn control_out(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        _index: u16,
        _data: &[u8],
    ) -> Result<usize, HostError> {
        let mut lock = self.inner.lock().unwrap();
        match request {
            REQUEST_SET_CONFIGURATION => {
                assert_eq!(0x00, request_type);
                lock.configured = Some(value as u8);
                Ok(0)
            }
            CLASS_SPECIFIC_BULK_ONLY_MASS_STORAGE_RESET => {
                assert_eq!(0x21, request_type);
                lock.resets += 1;
                Ok(0)
            }
            request => panic!("unexpected OUT control request {request:#04x}"),
        }
    }

    fn bulk_in(&mut self, ep: EndpointAddress, buf: &mut [u8]) -> Result<usize, HostError> {
        assert_eq!(Direction::In, ep.direction());
        let mut lock = self.inner.lock().unwrap();
        match lock.in_queue.pop_front() {
            Some(data) => {
                if data.len() > buf.len() {
                    return Err(HostError::BufferOverflow);
                }
                buf[..data.len()].copy_from_slice(data.as_slice());
                Ok(data.len())
            }
            None => Err(HostError::Timeout),
        }
    }

    fn bulk_out(&mut self, ep: EndpointAddress, data: &[u8]) -> Result<usize, HostError> {
        assert_eq!(Direction::Out, ep.direction());
        let mut lock = self.inner.lock().unwrap();

        if let Some(write) = lock.pending_write.take() {
            assert_eq!(write.len, data.len(), "unexpected write data length");
            if !write.discard {
                lock.disk[write.offset..write.offset + data.len()].copy_from_slice(data);
            }
            let residue = if write.discard { write.len as u32 } else { 0 };
            lock.push_csw(write.tag, residue, write.status);
            return Ok(data.len());
        }

        assert_eq!(CBW_LEN, data.len(), "expected a CBW");
        assert!(data.starts_with(&CBW_SIGNATURE_LE), "expected a CBW");
        lock.handle_cbw(data);
        Ok(data.len())
    }
}
