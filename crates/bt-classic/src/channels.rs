//! L2CAP channel manager.
//!
//! The inner state machine, active once an ACL handle exists: opens the
//! HID control and interrupt channels in either orientation (we connect
//! after pairing, or the peripheral connects after paging us), answers
//! configuration, and forwards interrupt-channel input reports.

use crate::hci::{AclFrame, ConnectionHandle};
use crate::host::{AclLink, HidReportSink};
use crate::l2cap::{cid, psm, result, Frame, Signal, HID_DATA_INPUT, MAX_SIGNAL_FRAME, MTU_REQUEST, MTU_RESPONSE};
use crate::transport::HciTransport;

/// Per-channel completion flags recorded from inbound signalling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelFlags(u8);

impl ChannelFlags {
    pub const CONTROL_CONNECTED: u8 = 1 << 0;
    pub const INTERRUPT_CONNECTED: u8 = 1 << 1;
    pub const CONFIG_CONTROL_SUCCESS: u8 = 1 << 2;
    pub const CONFIG_INTERRUPT_SUCCESS: u8 = 1 << 3;
    pub const CONNECTION_CONTROL_REQUEST: u8 = 1 << 4;
    pub const CONNECTION_INTERRUPT_REQUEST: u8 = 1 << 5;
    pub const DISCONNECT_CONTROL_RESPONSE: u8 = 1 << 6;
    pub const DISCONNECT_INTERRUPT_RESPONSE: u8 = 1 << 7;

    pub fn set(&mut self, flags: u8) {
        self.0 |= flags;
    }

    pub fn clear(&mut self, flags: u8) {
        self.0 &= !flags;
    }

    pub fn contains(&self, flags: u8) -> bool {
        self.0 & flags != 0
    }

    pub fn clear_all(&mut self) {
        self.0 = 0;
    }

    pub fn raw(&self) -> u8 {
        self.0
    }
}

/// Channel manager states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelState {
    /// No bring-up in progress
    #[default]
    Wait,
    /// We sent the control Connection Request
    ControlConnectRequest,
    /// We sent the control Configuration Request
    ControlConfigRequest,
    /// Control channel accepted (peer-initiated), configuring
    ControlSuccess,
    /// Waiting for the peer's interrupt Connection Request
    InterruptSetup,
    /// We sent the interrupt Connection Request
    InterruptConnectRequest,
    /// Interrupt channel configuring
    InterruptConfigRequest,
    /// Both HID channels established
    Done,
    /// Tearing down, waiting for the interrupt Disconnect Response
    InterruptDisconnect,
    /// Tearing down, waiting for the control Disconnect Response
    ControlDisconnect,
}

/// Request from the channel machine to the link machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkRequest {
    /// Both channels are down; close the ACL link
    Disconnect,
}

/// The L2CAP channel state machine
pub struct ChannelManager {
    state: ChannelState,
    flags: ChannelFlags,
    /// Identifier of the last signalling exchange; our own requests
    /// pre-increment it
    ident: u8,
    /// Peer endpoint of the control channel
    control_dcid: u16,
    /// Peer endpoint of the interrupt channel
    interrupt_dcid: u16,
}

impl ChannelManager {
    /// Create a new channel manager in its wait state
    pub const fn new() -> Self {
        Self {
            state: ChannelState::Wait,
            flags: ChannelFlags(0),
            ident: 0,
            control_dcid: 0,
            interrupt_dcid: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Recorded signalling flags
    pub fn flags(&self) -> ChannelFlags {
        self.flags
    }

    /// Peer endpoint of the control channel, 0 before it is learned
    pub fn control_dcid(&self) -> u16 {
        self.control_dcid
    }

    /// Peer endpoint of the interrupt channel, 0 before it is learned
    pub fn interrupt_dcid(&self) -> u16 {
        self.interrupt_dcid
    }

    /// Fresh identifier for an outbound request
    fn next_ident(&mut self) -> u8 {
        self.ident = self.ident.wrapping_add(1);
        self.ident
    }

    fn send<T: HciTransport>(&self, tx: &mut T, handle: ConnectionHandle, signal: &Signal) -> bool {
        if !tx.send_available() {
            warn!("l2cap frame dropped, controller busy");
            return false;
        }
        let mut buf = [0u8; MAX_SIGNAL_FRAME];
        let n = signal.encode(handle, &mut buf);
        match tx.send(&buf[..n]) {
            Ok(()) => true,
            Err(_) => {
                warn!("l2cap send failed");
                false
            }
        }
    }

    /// Drop both channels and all progress. The ACL handle stays valid.
    pub fn reset(&mut self, acl: &mut AclLink) {
        acl.connected = false;
        acl.active = false;
        self.flags.clear_all();
        self.ident = 0;
        self.control_dcid = 0;
        self.interrupt_dcid = 0;
        self.state = ChannelState::Wait;
    }

    /// Digest one inbound ACL frame: the incoming-connection claim,
    /// signalling dispatch and HID interrupt traffic.
    pub fn on_frame<T: HciTransport, S: HidReportSink>(
        &mut self,
        bytes: &[u8],
        acl: &mut AclLink,
        tx: &mut T,
        sink: &mut S,
    ) {
        let Some(frame) = AclFrame::parse(bytes) else {
            warn!("malformed acl frame");
            return;
        };
        let Some(pdu) = Frame::parse(frame.data) else {
            warn!("malformed l2cap frame");
            return;
        };

        // An unclaimed page from a HID peripheral: the first HID Control
        // connection request marks this link as ours.
        if !acl.claimed && acl.incoming_hid && !acl.connected && !acl.active {
            if pdu.cid == cid::SIGNALING {
                if let Some(Signal::ConnectionRequest {
                    psm: psm::HID_CONTROL,
                    ..
                }) = Signal::parse(pdu.payload)
                {
                    acl.incoming_hid = false;
                    acl.claimed = true;
                    acl.active = true;
                    self.state = ChannelState::Wait;
                    debug!("l2cap connection claimed");
                }
            }
        }

        let Some(handle) = acl.handle else { return };
        if handle != frame.handle {
            return;
        }

        match pdu.cid {
            cid::SIGNALING => self.on_signal(pdu.payload, handle, acl, tx),
            cid::HID_INTERRUPT => {
                if let [HID_DATA_INPUT, report @ ..] = pdu.payload {
                    sink.on_hid_input(report);
                }
            }
            cid::HID_CONTROL => {
                trace!("control channel data, {} bytes", pdu.payload.len());
            }
            other => debug!("l2cap data for unknown channel {}", other),
        }
    }

    fn on_signal<T: HciTransport>(
        &mut self,
        payload: &[u8],
        handle: ConnectionHandle,
        acl: &mut AclLink,
        tx: &mut T,
    ) {
        let Some(signal) = Signal::parse(payload) else {
            debug!(
                "unknown l2cap signalling command {}",
                payload.first().copied().unwrap_or(0)
            );
            return;
        };
        match signal {
            Signal::CommandReject { reason, .. } => {
                warn!("l2cap command rejected, reason {}", reason);
            }
            Signal::ConnectionRequest { ident, psm, scid } => match psm {
                psm::HID_CONTROL => {
                    self.ident = ident;
                    self.control_dcid = scid;
                    self.flags.set(ChannelFlags::CONNECTION_CONTROL_REQUEST);
                }
                psm::HID_INTERRUPT => {
                    self.ident = ident;
                    self.interrupt_dcid = scid;
                    self.flags.set(ChannelFlags::CONNECTION_INTERRUPT_REQUEST);
                }
                other => debug!("connection request for unsupported psm {}", other),
            },
            Signal::ConnectionResponse {
                ident,
                dcid,
                scid,
                result,
            } => {
                // The source CID field echoes our endpoint.
                if result == result::SUCCESS {
                    match scid {
                        cid::HID_CONTROL => {
                            info!("hid control channel connected");
                            self.ident = ident;
                            self.control_dcid = dcid;
                            self.flags.set(ChannelFlags::CONTROL_CONNECTED);
                        }
                        cid::HID_INTERRUPT => {
                            info!("hid interrupt channel connected");
                            self.ident = ident;
                            self.interrupt_dcid = dcid;
                            self.flags.set(ChannelFlags::INTERRUPT_CONNECTED);
                        }
                        _ => {}
                    }
                }
            }
            Signal::ConfigurationRequest { ident, dcid, .. } => {
                let peer = match dcid {
                    cid::HID_CONTROL => self.control_dcid,
                    cid::HID_INTERRUPT => self.interrupt_dcid,
                    other => {
                        debug!("configuration request for unknown channel {}", other);
                        return;
                    }
                };
                self.ident = ident;
                self.send(
                    tx,
                    handle,
                    &Signal::ConfigurationResponse {
                        ident,
                        scid: peer,
                        result: result::SUCCESS,
                        mtu: MTU_RESPONSE,
                    },
                );
            }
            Signal::ConfigurationResponse {
                ident,
                scid,
                result,
                ..
            } => {
                if result == result::SUCCESS {
                    match scid {
                        cid::HID_CONTROL => {
                            info!("hid control channel configured");
                            self.ident = ident;
                            self.flags.set(ChannelFlags::CONFIG_CONTROL_SUCCESS);
                        }
                        cid::HID_INTERRUPT => {
                            info!("hid interrupt channel configured");
                            self.ident = ident;
                            self.flags.set(ChannelFlags::CONFIG_INTERRUPT_SUCCESS);
                        }
                        _ => {}
                    }
                }
            }
            Signal::DisconnectionRequest { ident, dcid, scid } => {
                if dcid == cid::HID_CONTROL || dcid == cid::HID_INTERRUPT {
                    info!("peer closed channel {}", dcid);
                    self.ident = ident;
                    self.send(tx, handle, &Signal::DisconnectionResponse { ident, dcid, scid });
                    self.reset(acl);
                }
            }
            Signal::DisconnectionResponse { ident, scid, .. } => {
                // The source CID field is our endpoint.
                match scid {
                    cid::HID_CONTROL => {
                        self.ident = ident;
                        self.flags.set(ChannelFlags::DISCONNECT_CONTROL_RESPONSE);
                    }
                    cid::HID_INTERRUPT => {
                        self.ident = ident;
                        self.flags.set(ChannelFlags::DISCONNECT_INTERRUPT_RESPONSE);
                    }
                    _ => {}
                }
            }
        }
    }

    /// Accept an incoming channel: result Pending, then Success, then our
    /// own Configuration Request. The transport preserves submission
    /// order, so Pending reaches the peer first.
    fn respond_and_configure<T: HciTransport>(
        &mut self,
        tx: &mut T,
        handle: ConnectionHandle,
        local: u16,
        peer: u16,
    ) {
        let ident = self.ident;
        self.send(
            tx,
            handle,
            &Signal::ConnectionResponse {
                ident,
                dcid: local,
                scid: peer,
                result: result::PENDING,
            },
        );
        self.send(
            tx,
            handle,
            &Signal::ConnectionResponse {
                ident,
                dcid: local,
                scid: peer,
                result: result::SUCCESS,
            },
        );
        let ident = self.next_ident();
        self.send(
            tx,
            handle,
            &Signal::ConfigurationRequest {
                ident,
                dcid: peer,
                mtu: MTU_REQUEST,
            },
        );
    }

    /// Advance the machine on the recorded flags. Called from the tick
    /// and after every inbound ACL frame.
    pub fn poll<T: HciTransport>(&mut self, acl: &mut AclLink, tx: &mut T) -> Option<LinkRequest> {
        let handle = acl.handle?;
        match self.state {
            ChannelState::Wait => {
                if acl.connect_pending && !acl.claimed && !acl.connected && !acl.active {
                    info!("opening hid control channel");
                    self.flags.clear_all();
                    self.ident = 0;
                    let ident = self.next_ident();
                    if self.send(
                        tx,
                        handle,
                        &Signal::ConnectionRequest {
                            ident,
                            psm: psm::HID_CONTROL,
                            scid: cid::HID_CONTROL,
                        },
                    ) {
                        acl.claimed = true;
                        acl.active = true;
                        self.state = ChannelState::ControlConnectRequest;
                    } else {
                        self.ident = 0;
                    }
                } else if self.flags.contains(ChannelFlags::CONNECTION_CONTROL_REQUEST) {
                    info!("incoming hid control connection");
                    self.respond_and_configure(tx, handle, cid::HID_CONTROL, self.control_dcid);
                    self.state = ChannelState::ControlSuccess;
                }
            }
            ChannelState::ControlSuccess => {
                if self.flags.contains(ChannelFlags::CONFIG_CONTROL_SUCCESS) {
                    self.state = ChannelState::InterruptSetup;
                }
            }
            ChannelState::InterruptSetup => {
                if self.flags.contains(ChannelFlags::CONNECTION_INTERRUPT_REQUEST) {
                    info!("incoming hid interrupt connection");
                    self.respond_and_configure(tx, handle, cid::HID_INTERRUPT, self.interrupt_dcid);
                    self.state = ChannelState::InterruptConfigRequest;
                }
            }
            ChannelState::ControlConnectRequest => {
                if self.flags.contains(ChannelFlags::CONTROL_CONNECTED) {
                    let ident = self.next_ident();
                    if self.send(
                        tx,
                        handle,
                        &Signal::ConfigurationRequest {
                            ident,
                            dcid: self.control_dcid,
                            mtu: MTU_REQUEST,
                        },
                    ) {
                        self.state = ChannelState::ControlConfigRequest;
                    }
                }
            }
            ChannelState::ControlConfigRequest => {
                if self.flags.contains(ChannelFlags::CONFIG_CONTROL_SUCCESS) {
                    info!("opening hid interrupt channel");
                    let ident = self.next_ident();
                    if self.send(
                        tx,
                        handle,
                        &Signal::ConnectionRequest {
                            ident,
                            psm: psm::HID_INTERRUPT,
                            scid: cid::HID_INTERRUPT,
                        },
                    ) {
                        self.state = ChannelState::InterruptConnectRequest;
                    }
                }
            }
            ChannelState::InterruptConnectRequest => {
                if self.flags.contains(ChannelFlags::INTERRUPT_CONNECTED) {
                    let ident = self.next_ident();
                    if self.send(
                        tx,
                        handle,
                        &Signal::ConfigurationRequest {
                            ident,
                            dcid: self.interrupt_dcid,
                            mtu: MTU_REQUEST,
                        },
                    ) {
                        self.state = ChannelState::InterruptConfigRequest;
                    }
                }
            }
            ChannelState::InterruptConfigRequest => {
                if self.flags.contains(ChannelFlags::CONFIG_INTERRUPT_SUCCESS) {
                    info!("hid channels established");
                    acl.connect_pending = false;
                    acl.pair_pending = false;
                    acl.connected = true;
                    self.state = ChannelState::Done;
                }
            }
            ChannelState::Done => {}
            ChannelState::InterruptDisconnect => {
                if self.flags.contains(ChannelFlags::DISCONNECT_INTERRUPT_RESPONSE) {
                    let ident = self.next_ident();
                    if self.send(
                        tx,
                        handle,
                        &Signal::DisconnectionRequest {
                            ident,
                            dcid: self.control_dcid,
                            scid: cid::HID_CONTROL,
                        },
                    ) {
                        self.state = ChannelState::ControlDisconnect;
                    }
                }
            }
            ChannelState::ControlDisconnect => {
                if self.flags.contains(ChannelFlags::DISCONNECT_CONTROL_RESPONSE) {
                    info!("hid channels closed");
                    self.reset(acl);
                    return Some(LinkRequest::Disconnect);
                }
            }
        }
        None
    }

    /// Start an orderly teardown: interrupt channel first, then control,
    /// then the ACL link
    pub fn start_disconnect<T: HciTransport>(&mut self, acl: &AclLink, tx: &mut T) -> bool {
        let Some(handle) = acl.handle else {
            return false;
        };
        if self.state != ChannelState::Done {
            return false;
        }
        self.flags.clear(
            ChannelFlags::DISCONNECT_CONTROL_RESPONSE | ChannelFlags::DISCONNECT_INTERRUPT_RESPONSE,
        );
        let ident = self.next_ident();
        if self.send(
            tx,
            handle,
            &Signal::DisconnectionRequest {
                ident,
                dcid: self.interrupt_dcid,
                scid: cid::HID_INTERRUPT,
            },
        ) {
            self.state = ChannelState::InterruptDisconnect;
            true
        } else {
            false
        }
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}
