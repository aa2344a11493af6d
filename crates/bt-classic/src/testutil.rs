//! Shared fixtures for the unit tests.

use crate::host::HidReportSink;
use crate::transport::{HciTransport, TransportError};

/// Records every outbound packet; can be switched to refuse sends.
#[derive(Default)]
pub struct MockTransport {
    pub sent: heapless::Vec<heapless::Vec<u8, 256>, 32>,
    pub blocked: bool,
}

impl HciTransport for MockTransport {
    fn send_available(&self) -> bool {
        !self.blocked && self.sent.len() < self.sent.capacity()
    }

    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        if self.blocked {
            return Err(TransportError::Unavailable);
        }
        let mut copy = heapless::Vec::new();
        copy.extend_from_slice(packet)
            .map_err(|_| TransportError::Failed)?;
        self.sent.push(copy).map_err(|_| TransportError::Failed)?;
        Ok(())
    }
}

/// Discards all reports.
pub struct NullSink;

impl HidReportSink for NullSink {
    fn on_hid_input(&mut self, _report: &[u8]) {}
}

/// Build an event packet, type byte first.
pub fn evt(code: u8, params: &[u8]) -> heapless::Vec<u8, 64> {
    let mut packet = heapless::Vec::new();
    packet.push(0x04).unwrap();
    packet.push(code).unwrap();
    packet.push(params.len() as u8).unwrap();
    packet.extend_from_slice(params).unwrap();
    packet
}

/// Build an ACL frame carrying one L2CAP signalling command, type byte
/// first.
pub fn signal_frame(handle: u16, code: u8, ident: u8, body: &[u8]) -> heapless::Vec<u8, 64> {
    let mut packet = heapless::Vec::new();
    packet.push(0x02).unwrap();
    let hf = (handle & 0x0FFF) | 0x2000;
    packet.extend_from_slice(&hf.to_le_bytes()).unwrap();
    let signal = 4 + body.len() as u16;
    let l2cap = 4 + signal;
    packet.extend_from_slice(&l2cap.to_le_bytes()).unwrap();
    packet.extend_from_slice(&signal.to_le_bytes()).unwrap();
    packet.extend_from_slice(&1u16.to_le_bytes()).unwrap();
    packet.push(code).unwrap();
    packet.push(ident).unwrap();
    packet
        .extend_from_slice(&(body.len() as u16).to_le_bytes())
        .unwrap();
    packet.extend_from_slice(body).unwrap();
    packet
}
