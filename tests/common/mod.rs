use embedded_hal::delay::DelayNs;

pub mod host;

/// Delay provider for the ready poll. Nothing in the simulated device needs
/// real time to pass.
pub struct NoopDelay;

impl DelayNs for NoopDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// Configuration descriptor of a typical thumb drive: configuration value 1,
/// one mass-storage interface with bulk endpoints 0x81/0x02
pub fn msc_config_descriptor() -> Vec<u8> {
    let mut desc = vec![];
    desc.extend_from_slice(&[9, 0x02, 32, 0, 1, 1, 0, 0x80, 50]); // configuration
    desc.extend_from_slice(&[9, 0x04, 0, 0, 2, 0x08, 0x06, 0x50, 0]); // interface
    desc.extend_from_slice(&[7, 0x05, 0x81, 0x02, 64, 0, 0]); // bulk IN
    desc.extend_from_slice(&[7, 0x05, 0x02, 0x02, 64, 0, 0]); // bulk OUT
    desc
}

/// Composite device: a HID interface with its class and interrupt-endpoint
/// entries ahead of the mass-storage interface
pub fn composite_config_descriptor() -> Vec<u8> {
    let mut desc = vec![];
    desc.extend_from_slice(&[9, 0x02, 57, 0, 2, 2, 0, 0x80, 50]); // configuration, value 2
    desc.extend_from_slice(&[9, 0x04, 0, 0, 1, 0x03, 0x01, 0x01, 0]); // HID interface
    desc.extend_from_slice(&[9, 0x21, 0x11, 0x01, 0, 1, 0x22, 63, 0]); // HID descriptor
    desc.extend_from_slice(&[7, 0x05, 0x83, 0x03, 8, 0, 10]); // HID interrupt IN
    desc.extend_from_slice(&[9, 0x04, 1, 0, 2, 0x08, 0x06, 0x50, 0]); // MSC interface
    desc.extend_from_slice(&[7, 0x05, 0x81, 0x02, 64, 0, 0]); // bulk IN
    desc.extend_from_slice(&[7, 0x05, 0x02, 0x02, 64, 0, 0]); // bulk OUT
    desc
}

/// A device with no mass-storage interface at all
pub fn hid_only_config_descriptor() -> Vec<u8> {
    let mut desc = vec![];
    desc.extend_from_slice(&[9, 0x02, 25, 0, 1, 1, 0, 0x80, 50]); // configuration
    desc.extend_from_slice(&[9, 0x04, 0, 0, 1, 0x03, 0x01, 0x01, 0]); // HID interface
    desc.extend_from_slice(&[7, 0x05, 0x81, 0x03, 8, 0, 10]); // interrupt IN
    desc
}
