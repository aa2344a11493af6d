//! HCI command and event codec plus ACL framing.
//!
//! Commands are assembled bit-exact into caller-provided buffers; inbound
//! events and ACL frames are decoded as borrowed views into the packet
//! just delivered.

use crate::{BdAddr, DeviceClass};

/// Maximum HCI packet size
pub const MAX_PACKET: usize = 512;

/// Largest command frame this stack assembles (Change Local Name:
/// type + opcode + length + 248 name bytes)
pub const MAX_COMMAND: usize = 252;

/// HCI packet type, first byte of every frame on the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PacketType {
    Command = 0x01,
    AclData = 0x02,
    ScoData = 0x03,
    Event = 0x04,
}

impl PacketType {
    /// Decode the packet-type byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::Command),
            0x02 => Some(Self::AclData),
            0x03 => Some(Self::ScoData),
            0x04 => Some(Self::Event),
            _ => None,
        }
    }
}

/// HCI connection handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionHandle(u16);

impl ConnectionHandle {
    /// Create from raw handle value
    pub const fn new(handle: u16) -> Self {
        Self(handle & 0x0FFF) // 12 bits
    }

    /// Get the raw handle value
    pub const fn raw(&self) -> u16 {
        self.0
    }
}

/// PB flag for the first packet of a host-to-controller L2CAP PDU,
/// positioned in the handle field (bits 12-13); BC stays point-to-point
pub const ACL_PB_FIRST: u16 = 2 << 12;

/// HCI event codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum EventCode {
    InquiryComplete = 0x01,
    InquiryResult = 0x02,
    ConnectionComplete = 0x03,
    ConnectionRequest = 0x04,
    DisconnectionComplete = 0x05,
    AuthenticationComplete = 0x06,
    RemoteNameRequestComplete = 0x07,
    EncryptionChange = 0x08,
    ChangeConnectionLinkKeyComplete = 0x09,
    CommandComplete = 0x0E,
    CommandStatus = 0x0F,
    RoleChange = 0x12,
    NumberOfCompletedPackets = 0x13,
    PinCodeRequest = 0x16,
    LinkKeyRequest = 0x17,
    LinkKeyNotification = 0x18,
    LoopbackCommand = 0x19,
    DataBufferOverflow = 0x1A,
    MaxSlotsChange = 0x1B,
    QosSetupComplete = 0x0D,
    PageScanRepetitionModeChange = 0x20,
}

impl EventCode {
    /// Decode an event code byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x01 => Self::InquiryComplete,
            0x02 => Self::InquiryResult,
            0x03 => Self::ConnectionComplete,
            0x04 => Self::ConnectionRequest,
            0x05 => Self::DisconnectionComplete,
            0x06 => Self::AuthenticationComplete,
            0x07 => Self::RemoteNameRequestComplete,
            0x08 => Self::EncryptionChange,
            0x09 => Self::ChangeConnectionLinkKeyComplete,
            0x0D => Self::QosSetupComplete,
            0x0E => Self::CommandComplete,
            0x0F => Self::CommandStatus,
            0x12 => Self::RoleChange,
            0x13 => Self::NumberOfCompletedPackets,
            0x16 => Self::PinCodeRequest,
            0x17 => Self::LinkKeyRequest,
            0x18 => Self::LinkKeyNotification,
            0x19 => Self::LoopbackCommand,
            0x1A => Self::DataBufferOverflow,
            0x1B => Self::MaxSlotsChange,
            0x20 => Self::PageScanRepetitionModeChange,
            _ => return None,
        })
    }
}

/// Command opcodes, `(ogf << 10) | ocf`
pub mod opcode {
    // Link Control commands (OGF 0x01)
    pub const INQUIRY: u16 = 0x0401;
    pub const INQUIRY_CANCEL: u16 = 0x0402;
    pub const CREATE_CONNECTION: u16 = 0x0405;
    pub const DISCONNECT: u16 = 0x0406;
    pub const ACCEPT_CONNECTION_REQUEST: u16 = 0x0409;
    pub const LINK_KEY_REQUEST_NEGATIVE_REPLY: u16 = 0x040C;
    pub const PIN_CODE_REQUEST_REPLY: u16 = 0x040D;
    pub const PIN_CODE_REQUEST_NEGATIVE_REPLY: u16 = 0x040E;
    pub const AUTHENTICATION_REQUESTED: u16 = 0x0411;
    pub const REMOTE_NAME_REQUEST: u16 = 0x0419;

    // Controller & Baseband commands (OGF 0x03)
    pub const RESET: u16 = 0x0C03;
    pub const CHANGE_LOCAL_NAME: u16 = 0x0C13;
    pub const WRITE_SCAN_ENABLE: u16 = 0x0C1A;
    pub const WRITE_CLASS_OF_DEVICE: u16 = 0x0C24;

    // Informational commands (OGF 0x04)
    pub const READ_LOCAL_VERSION: u16 = 0x1001;
    pub const READ_BD_ADDR: u16 = 0x1009;
}

/// Write Scan Enable parameter values
pub mod scan {
    /// No scans
    pub const OFF: u8 = 0x00;
    /// Page scan only: connectable but not discoverable
    pub const PAGE: u8 = 0x02;
    /// Inquiry and page scan: discoverable and connectable
    pub const PAGE_AND_INQUIRY: u8 = 0x03;
}

/// General/Unlimited Inquiry Access Code (GIAC, 0x9E8B33), little-endian
const GIAC_LAP: [u8; 3] = [0x33, 0x8B, 0x9E];
/// Inquiry length in 1.28 s units (61.44 s, the maximum)
const INQUIRY_LENGTH: u8 = 0x30;
/// Maximum inquiry responses per pass
const INQUIRY_MAX_RESPONSES: u8 = 0x0A;
/// DM1, DH1, DM3, DH3, DM5 and DH5 may be used
const ACL_PACKET_TYPES: u16 = 0xCC18;
/// Page scan repetition mode R1
const PAGE_SCAN_R1: u8 = 0x01;
/// Disconnect reason: remote user terminated connection
const REASON_REMOTE_USER_TERMINATED: u8 = 0x13;

/// One outbound HCI command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Reset,
    WriteClassOfDevice(DeviceClass),
    WriteScanEnable(u8),
    ChangeLocalName(&'a str),
    ReadBdAddr,
    ReadLocalVersion,
    Inquiry,
    InquiryCancel,
    CreateConnection(BdAddr),
    AcceptConnection(BdAddr),
    AuthenticationRequested(ConnectionHandle),
    Disconnect(ConnectionHandle),
    RemoteNameRequest(BdAddr),
    PinCodeRequestReply(BdAddr, &'a [u8]),
    PinCodeNegativeReply(BdAddr),
    LinkKeyNegativeReply(BdAddr),
}

impl Command<'_> {
    /// The command's opcode
    pub fn opcode(&self) -> u16 {
        match self {
            Command::Reset => opcode::RESET,
            Command::WriteClassOfDevice(_) => opcode::WRITE_CLASS_OF_DEVICE,
            Command::WriteScanEnable(_) => opcode::WRITE_SCAN_ENABLE,
            Command::ChangeLocalName(_) => opcode::CHANGE_LOCAL_NAME,
            Command::ReadBdAddr => opcode::READ_BD_ADDR,
            Command::ReadLocalVersion => opcode::READ_LOCAL_VERSION,
            Command::Inquiry => opcode::INQUIRY,
            Command::InquiryCancel => opcode::INQUIRY_CANCEL,
            Command::CreateConnection(_) => opcode::CREATE_CONNECTION,
            Command::AcceptConnection(_) => opcode::ACCEPT_CONNECTION_REQUEST,
            Command::AuthenticationRequested(_) => opcode::AUTHENTICATION_REQUESTED,
            Command::Disconnect(_) => opcode::DISCONNECT,
            Command::RemoteNameRequest(_) => opcode::REMOTE_NAME_REQUEST,
            Command::PinCodeRequestReply(..) => opcode::PIN_CODE_REQUEST_REPLY,
            Command::PinCodeNegativeReply(_) => opcode::PIN_CODE_REQUEST_NEGATIVE_REPLY,
            Command::LinkKeyNegativeReply(_) => opcode::LINK_KEY_REQUEST_NEGATIVE_REPLY,
        }
    }

    /// Assemble the full wire frame. Returns the frame length.
    ///
    /// `buf` must hold at least [`MAX_COMMAND`] bytes.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        buf[0] = PacketType::Command as u8;
        buf[1..3].copy_from_slice(&self.opcode().to_le_bytes());
        let params = self.encode_params(&mut buf[4..]);
        buf[3] = params as u8;
        4 + params
    }

    fn encode_params(&self, p: &mut [u8]) -> usize {
        match self {
            Command::Reset
            | Command::ReadBdAddr
            | Command::ReadLocalVersion
            | Command::InquiryCancel => 0,
            Command::WriteClassOfDevice(class) => {
                p[..3].copy_from_slice(&class.0);
                3
            }
            Command::WriteScanEnable(mode) => {
                p[0] = *mode;
                1
            }
            Command::ChangeLocalName(name) => {
                // Null-terminated, zero-padded to the full 248 bytes
                let n = name.len().min(247);
                p[..n].copy_from_slice(&name.as_bytes()[..n]);
                p[n..248].fill(0);
                248
            }
            Command::Inquiry => {
                p[..3].copy_from_slice(&GIAC_LAP);
                p[3] = INQUIRY_LENGTH;
                p[4] = INQUIRY_MAX_RESPONSES;
                5
            }
            Command::CreateConnection(addr) => {
                p[..6].copy_from_slice(addr.bytes());
                p[6..8].copy_from_slice(&ACL_PACKET_TYPES.to_le_bytes());
                p[8] = PAGE_SCAN_R1;
                p[9] = 0x00; // reserved
                p[10..12].copy_from_slice(&0u16.to_le_bytes()); // clock offset unknown
                p[12] = 0x00; // no role switch
                13
            }
            Command::AcceptConnection(addr) => {
                p[..6].copy_from_slice(addr.bytes());
                p[6] = 0x00; // become master
                7
            }
            Command::AuthenticationRequested(handle) => {
                p[..2].copy_from_slice(&handle.raw().to_le_bytes());
                2
            }
            Command::Disconnect(handle) => {
                p[..2].copy_from_slice(&handle.raw().to_le_bytes());
                p[2] = REASON_REMOTE_USER_TERMINATED;
                3
            }
            Command::RemoteNameRequest(addr) => {
                p[..6].copy_from_slice(addr.bytes());
                p[6] = PAGE_SCAN_R1;
                p[7] = 0x00; // reserved
                p[8..10].copy_from_slice(&0u16.to_le_bytes()); // clock offset unknown
                10
            }
            Command::PinCodeRequestReply(addr, pin) => {
                p[..6].copy_from_slice(addr.bytes());
                let n = pin.len().min(16);
                p[6] = n as u8;
                p[7..7 + n].copy_from_slice(&pin[..n]);
                p[7 + n..23].fill(0);
                23
            }
            Command::PinCodeNegativeReply(addr) | Command::LinkKeyNegativeReply(addr) => {
                p[..6].copy_from_slice(addr.bytes());
                6
            }
        }
    }
}

/// Borrowed view of one HCI event (without the packet-type byte)
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    /// Event code
    pub code: u8,
    /// Event parameters
    pub params: &'a [u8],
}

impl<'a> Event<'a> {
    /// Decode an event packet
    pub fn parse(bytes: &'a [u8]) -> Option<Self> {
        if bytes.len() < 2 {
            return None;
        }
        let len = bytes[1] as usize;
        let params = bytes.get(2..2 + len)?;
        Some(Self {
            code: bytes[0],
            params,
        })
    }

    /// Status byte at the head of most event parameter blocks
    pub fn status(&self) -> u8 {
        self.params.first().copied().unwrap_or(0xFF)
    }

    /// Little-endian u16 at `offset` into the parameters
    pub fn u16_at(&self, offset: usize) -> Option<u16> {
        let b = self.params.get(offset..offset + 2)?;
        Some(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Bluetooth address at `offset` into the parameters
    pub fn bdaddr_at(&self, offset: usize) -> Option<BdAddr> {
        let b = self.params.get(offset..offset + 6)?;
        Some(BdAddr([b[0], b[1], b[2], b[3], b[4], b[5]]))
    }
}

/// Borrowed view of one inbound ACL data frame (without the packet-type
/// byte)
#[derive(Debug, Clone, Copy)]
pub struct AclFrame<'a> {
    /// Connection handle
    pub handle: ConnectionHandle,
    /// Packet boundary flag
    pub pb_flag: u8,
    /// Broadcast flag
    pub bc_flag: u8,
    /// Data payload
    pub data: &'a [u8],
}

impl<'a> AclFrame<'a> {
    /// Decode an ACL data frame
    pub fn parse(bytes: &'a [u8]) -> Option<Self> {
        if bytes.len() < 4 {
            return None;
        }
        let handle_flags = u16::from_le_bytes([bytes[0], bytes[1]]);
        let len = u16::from_le_bytes([bytes[2], bytes[3]]) as usize;
        let data = bytes.get(4..4 + len)?;
        Some(Self {
            handle: ConnectionHandle::new(handle_flags & 0x0FFF),
            pb_flag: ((handle_flags >> 12) & 0x03) as u8,
            bc_flag: ((handle_flags >> 14) & 0x03) as u8,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_frame() {
        let mut buf = [0u8; MAX_COMMAND];
        let n = Command::Reset.encode(&mut buf);
        assert_eq!(&buf[..n], &[0x01, 0x03, 0x0C, 0x00]);
    }

    #[test]
    fn write_class_of_device_frame() {
        let mut buf = [0u8; MAX_COMMAND];
        let n = Command::WriteClassOfDevice(DeviceClass::gamepad()).encode(&mut buf);
        assert_eq!(&buf[..n], &[0x01, 0x24, 0x0C, 0x03, 0x04, 0x08, 0x00]);
    }

    #[test]
    fn inquiry_frame() {
        let mut buf = [0u8; MAX_COMMAND];
        let n = Command::Inquiry.encode(&mut buf);
        assert_eq!(
            &buf[..n],
            &[0x01, 0x01, 0x04, 0x05, 0x33, 0x8B, 0x9E, 0x30, 0x0A]
        );
    }

    #[test]
    fn create_connection_frame() {
        let addr = BdAddr::new([0x28, 0x9A, 0x4B, 0x0A, 0x1D, 0x9A]);
        let mut buf = [0u8; MAX_COMMAND];
        let n = Command::CreateConnection(addr).encode(&mut buf);
        assert_eq!(
            &buf[..n],
            &[
                0x01, 0x05, 0x04, 0x0D, // header
                0x28, 0x9A, 0x4B, 0x0A, 0x1D, 0x9A, // bdaddr
                0x18, 0xCC, // packet types
                0x01, 0x00, // page scan repetition mode, reserved
                0x00, 0x00, // clock offset
                0x00, // no role switch
            ]
        );
    }

    #[test]
    fn pin_code_reply_pads_to_16() {
        let addr = BdAddr::new([1, 2, 3, 4, 5, 6]);
        let mut buf = [0u8; MAX_COMMAND];
        let n = Command::PinCodeRequestReply(addr, b"0000").encode(&mut buf);
        assert_eq!(n, 4 + 23);
        assert_eq!(buf[3], 23);
        assert_eq!(buf[10], 4); // pin length
        assert_eq!(&buf[11..15], b"0000");
        assert_eq!(&buf[15..27], &[0u8; 12]);
    }

    #[test]
    fn local_name_padded_to_248() {
        let mut buf = [0u8; MAX_COMMAND];
        let n = Command::ChangeLocalName("HID Host").encode(&mut buf);
        assert_eq!(n, 252);
        assert_eq!(buf[3], 248);
        assert_eq!(&buf[4..12], b"HID Host");
        assert_eq!(buf[12], 0);
        assert_eq!(buf[251], 0);
    }

    #[test]
    fn event_view_offsets() {
        // Command Complete for Read BD_ADDR
        let bytes = [
            0x0E, 0x0A, 0x01, 0x09, 0x10, 0x00, 0xE9, 0xA2, 0x06, 0xDC, 0x1B, 0x00,
        ];
        let event = Event::parse(&bytes).unwrap();
        assert_eq!(event.code, 0x0E);
        assert_eq!(event.u16_at(1), Some(opcode::READ_BD_ADDR));
        assert_eq!(event.params[3], 0x00);
        assert_eq!(
            event.bdaddr_at(4),
            Some(BdAddr::new([0xE9, 0xA2, 0x06, 0xDC, 0x1B, 0x00]))
        );
    }

    #[test]
    fn event_parse_rejects_truncated() {
        assert!(Event::parse(&[0x0E]).is_none());
        assert!(Event::parse(&[0x0E, 0x04, 0x01]).is_none());
    }

    #[test]
    fn acl_frame_splits_handle_and_flags() {
        let bytes = [0x2A, 0x20, 0x03, 0x00, 0xAA, 0xBB, 0xCC];
        let frame = AclFrame::parse(&bytes).unwrap();
        assert_eq!(frame.handle, ConnectionHandle::new(0x002A));
        assert_eq!(frame.pb_flag, 0x02);
        assert_eq!(frame.bc_flag, 0x00);
        assert_eq!(frame.data, &[0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn acl_frame_rejects_short_payload() {
        assert!(AclFrame::parse(&[0x2A, 0x20, 0x08, 0x00, 0xAA]).is_none());
    }
}
