//! L2CAP signalling codec for the HID control and interrupt channels.
//!
//! Provides channel multiplexing over the ACL link: borrowed views of
//! inbound PDUs and bit-exact assembly of outbound signalling frames.

use crate::hci::{ConnectionHandle, PacketType, ACL_PB_FIRST};

/// Well-known channel IDs
pub mod cid {
    /// Signalling channel for ACL-U links
    pub const SIGNALING: u16 = 0x0001;
    /// Connectionless channel
    pub const CONNECTIONLESS: u16 = 0x0002;
    /// Local endpoint of the HID control channel
    pub const HID_CONTROL: u16 = 0x0040;
    /// Local endpoint of the HID interrupt channel
    pub const HID_INTERRUPT: u16 = 0x0041;
}

/// Well-known PSM (Protocol/Service Multiplexer) values
pub mod psm {
    /// SDP protocol
    pub const SDP: u16 = 0x0001;
    /// HID control channel
    pub const HID_CONTROL: u16 = 0x0011;
    /// HID interrupt channel
    pub const HID_INTERRUPT: u16 = 0x0013;
}

/// Connection Response result codes
pub mod result {
    /// Connection successful
    pub const SUCCESS: u16 = 0x0000;
    /// Connection pending
    pub const PENDING: u16 = 0x0001;
}

/// First byte of a DATA transaction of type input on the interrupt channel
pub const HID_DATA_INPUT: u8 = 0xA1;

/// MTU offered in our Configuration Requests
pub const MTU_REQUEST: u16 = 0xFFFF;
/// MTU granted in our Configuration Responses
pub const MTU_RESPONSE: u16 = 0x02A0;

/// L2CAP signalling command codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SignalCode {
    CommandReject = 0x01,
    ConnectionRequest = 0x02,
    ConnectionResponse = 0x03,
    ConfigurationRequest = 0x04,
    ConfigurationResponse = 0x05,
    DisconnectionRequest = 0x06,
    DisconnectionResponse = 0x07,
    EchoRequest = 0x08,
    EchoResponse = 0x09,
    InformationRequest = 0x0A,
    InformationResponse = 0x0B,
}

/// Borrowed view of one L2CAP PDU inside an ACL frame
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Channel ID
    pub cid: u16,
    /// Payload data
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Decode the basic L2CAP header
    pub fn parse(bytes: &'a [u8]) -> Option<Self> {
        if bytes.len() < 4 {
            return None;
        }
        let len = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
        let cid = u16::from_le_bytes([bytes[2], bytes[3]]);
        let payload = bytes.get(4..4 + len)?;
        Some(Self { cid, payload })
    }
}

/// One L2CAP signalling command, used for both directions.
///
/// `ident` pairs requests with responses: our requests carry a fresh
/// identifier, our responses echo the identifier of the request they
/// answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Signal {
    CommandReject {
        ident: u8,
        reason: u16,
    },
    ConnectionRequest {
        ident: u8,
        psm: u16,
        scid: u16,
    },
    ConnectionResponse {
        ident: u8,
        dcid: u16,
        scid: u16,
        result: u16,
    },
    ConfigurationRequest {
        ident: u8,
        dcid: u16,
        mtu: u16,
    },
    ConfigurationResponse {
        ident: u8,
        scid: u16,
        result: u16,
        mtu: u16,
    },
    DisconnectionRequest {
        ident: u8,
        dcid: u16,
        scid: u16,
    },
    DisconnectionResponse {
        ident: u8,
        dcid: u16,
        scid: u16,
    },
}

impl Signal {
    /// The signalling command code
    pub fn code(&self) -> u8 {
        match self {
            Signal::CommandReject { .. } => SignalCode::CommandReject as u8,
            Signal::ConnectionRequest { .. } => SignalCode::ConnectionRequest as u8,
            Signal::ConnectionResponse { .. } => SignalCode::ConnectionResponse as u8,
            Signal::ConfigurationRequest { .. } => SignalCode::ConfigurationRequest as u8,
            Signal::ConfigurationResponse { .. } => SignalCode::ConfigurationResponse as u8,
            Signal::DisconnectionRequest { .. } => SignalCode::DisconnectionRequest as u8,
            Signal::DisconnectionResponse { .. } => SignalCode::DisconnectionResponse as u8,
        }
    }

    /// The identifier carried by this command
    pub fn ident(&self) -> u8 {
        match *self {
            Signal::CommandReject { ident, .. }
            | Signal::ConnectionRequest { ident, .. }
            | Signal::ConnectionResponse { ident, .. }
            | Signal::ConfigurationRequest { ident, .. }
            | Signal::ConfigurationResponse { ident, .. }
            | Signal::DisconnectionRequest { ident, .. }
            | Signal::DisconnectionResponse { ident, .. } => ident,
        }
    }

    /// Decode a signalling command from the payload of a CID 0x0001 frame
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.len() < 4 {
            return None;
        }
        let code = payload[0];
        let ident = payload[1];
        let len = u16::from_le_bytes([payload[2], payload[3]]) as usize;
        let body = payload.get(4..4 + len)?;
        let word = |off: usize| -> Option<u16> {
            let b = body.get(off..off + 2)?;
            Some(u16::from_le_bytes([b[0], b[1]]))
        };
        Some(match code {
            0x01 => Signal::CommandReject {
                ident,
                reason: word(0)?,
            },
            0x02 => Signal::ConnectionRequest {
                ident,
                psm: word(0)?,
                scid: word(2)?,
            },
            0x03 => Signal::ConnectionResponse {
                ident,
                dcid: word(0)?,
                scid: word(2)?,
                result: word(4)?,
            },
            0x04 => Signal::ConfigurationRequest {
                ident,
                dcid: word(0)?,
                mtu: parse_mtu_option(body.get(4..)?).unwrap_or(MTU_REQUEST),
            },
            0x05 => Signal::ConfigurationResponse {
                ident,
                scid: word(0)?,
                result: word(4)?,
                mtu: parse_mtu_option(body.get(6..)?).unwrap_or(MTU_RESPONSE),
            },
            0x06 => Signal::DisconnectionRequest {
                ident,
                dcid: word(0)?,
                scid: word(2)?,
            },
            0x07 => Signal::DisconnectionResponse {
                ident,
                dcid: word(0)?,
                scid: word(2)?,
            },
            _ => return None,
        })
    }

    /// Assemble a complete outbound ACL frame carrying this command on
    /// the signalling channel. Returns the frame length.
    ///
    /// `buf` must hold at least [`MAX_SIGNAL_FRAME`] bytes.
    pub fn encode(&self, handle: ConnectionHandle, buf: &mut [u8]) -> usize {
        let body = self.body_len();
        let signal = 4 + body;
        let l2cap = 4 + signal;

        buf[0] = PacketType::AclData as u8;
        buf[1..3].copy_from_slice(&(handle.raw() | ACL_PB_FIRST).to_le_bytes());
        buf[3..5].copy_from_slice(&(l2cap as u16).to_le_bytes());
        buf[5..7].copy_from_slice(&(signal as u16).to_le_bytes());
        buf[7..9].copy_from_slice(&cid::SIGNALING.to_le_bytes());
        buf[9] = self.code();
        buf[10] = self.ident();
        buf[11..13].copy_from_slice(&(body as u16).to_le_bytes());
        self.encode_body(&mut buf[13..]);
        13 + body
    }

    fn body_len(&self) -> usize {
        match self {
            Signal::CommandReject { .. } => 2,
            Signal::ConnectionRequest { .. } => 4,
            Signal::ConnectionResponse { .. } => 8,
            Signal::ConfigurationRequest { .. } => 8,
            Signal::ConfigurationResponse { .. } => 10,
            Signal::DisconnectionRequest { .. } => 4,
            Signal::DisconnectionResponse { .. } => 4,
        }
    }

    fn encode_body(&self, b: &mut [u8]) {
        match *self {
            Signal::CommandReject { reason, .. } => {
                b[..2].copy_from_slice(&reason.to_le_bytes());
            }
            Signal::ConnectionRequest { psm, scid, .. } => {
                b[..2].copy_from_slice(&psm.to_le_bytes());
                b[2..4].copy_from_slice(&scid.to_le_bytes());
            }
            Signal::ConnectionResponse {
                dcid, scid, result, ..
            } => {
                b[..2].copy_from_slice(&dcid.to_le_bytes());
                b[2..4].copy_from_slice(&scid.to_le_bytes());
                b[4..6].copy_from_slice(&result.to_le_bytes());
                b[6..8].copy_from_slice(&0u16.to_le_bytes()); // no further information
            }
            Signal::ConfigurationRequest { dcid, mtu, .. } => {
                b[..2].copy_from_slice(&dcid.to_le_bytes());
                b[2..4].copy_from_slice(&0u16.to_le_bytes()); // flags
                encode_mtu_option(mtu, &mut b[4..8]);
            }
            Signal::ConfigurationResponse {
                scid, result, mtu, ..
            } => {
                b[..2].copy_from_slice(&scid.to_le_bytes());
                b[2..4].copy_from_slice(&0u16.to_le_bytes()); // flags
                b[4..6].copy_from_slice(&result.to_le_bytes());
                encode_mtu_option(mtu, &mut b[6..10]);
            }
            Signal::DisconnectionRequest { dcid, scid, .. }
            | Signal::DisconnectionResponse { dcid, scid, .. } => {
                b[..2].copy_from_slice(&dcid.to_le_bytes());
                b[2..4].copy_from_slice(&scid.to_le_bytes());
            }
        }
    }
}

/// Largest signalling frame this stack assembles (Configuration Response)
pub const MAX_SIGNAL_FRAME: usize = 23;

fn encode_mtu_option(mtu: u16, b: &mut [u8]) {
    b[0] = 0x01; // option type: MTU
    b[1] = 0x02; // option length
    b[2..4].copy_from_slice(&mtu.to_le_bytes());
}

fn parse_mtu_option(mut options: &[u8]) -> Option<u16> {
    while let &[kind, len, ref rest @ ..] = options {
        let value = rest.get(..len as usize)?;
        if kind & 0x7F == 0x01 && len == 2 {
            return Some(u16::from_le_bytes([value[0], value[1]]));
        }
        options = rest.get(len as usize..)?;
    }
    None
}
