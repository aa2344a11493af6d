//! HCI link manager.
//!
//! The outer state machine: resets the controller, learns the local
//! identity, discovers a HID peripheral by inquiry or accepts one paging
//! us, and drives legacy PIN pairing. A periodic tick reads the event
//! flags recorded by the handler and decides what to emit next.

use crate::hci::{opcode, scan, Command, ConnectionHandle, Event, EventCode, MAX_COMMAND};
use crate::host::{AclLink, HostConfig};
use crate::transport::HciTransport;
use crate::{BdAddr, DeviceClass};

/// Ticks spent in INIT before the first Reset; grows tenfold while the
/// controller stays silent
const RESET_GRACE_TICKS: u16 = 100;
const RESET_GRACE_MAX: u16 = 2000;
/// Ticks spent in DONE so the peer can start its L2CAP setup
const DONE_GRACE_TICKS: u16 = 1000;
/// Empty inquiry passes before falling back to page scanning
const INQUIRY_PASSES: u8 = 5;
/// Longest remote name we keep
const REMOTE_NAME_LEN: usize = 30;

/// Completion flags recorded from the HCI event stream.
///
/// Flags are edge-triggered: each is cleared right before the command
/// expected to set it is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EventFlags(u16);

impl EventFlags {
    pub const CMD_COMPLETE: u16 = 1 << 0;
    pub const READ_BDADDR: u16 = 1 << 1;
    pub const READ_VERSION: u16 = 1 << 2;
    pub const DEVICE_FOUND: u16 = 1 << 3;
    pub const INCOMING_REQUEST: u16 = 1 << 4;
    pub const REMOTE_NAME_COMPLETE: u16 = 1 << 5;
    pub const CONNECT_EVENT: u16 = 1 << 6;
    pub const CONNECT_COMPLETE: u16 = 1 << 7;
    pub const DISCONNECT_COMPLETE: u16 = 1 << 8;

    pub fn set(&mut self, flags: u16) {
        self.0 |= flags;
    }

    pub fn clear(&mut self, flags: u16) {
        self.0 &= !flags;
    }

    pub fn contains(&self, flags: u16) -> bool {
        self.0 & flags != 0
    }

    pub fn clear_all(&mut self) {
        self.0 = 0;
    }

    pub fn raw(&self) -> u16 {
        self.0
    }
}

/// Link manager states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    /// Discarding stale events queued before we came up
    #[default]
    Init,
    /// Reset issued, waiting for its completion
    Reset,
    /// Writing the class of device
    Class,
    /// Reading the local address
    BdAddr,
    /// Reading the local version
    LocalVersion,
    /// Writing the configured local name
    SetName,
    /// About to start discovery
    CheckDeviceService,
    /// Inquiry running
    Inquiry,
    /// Inquiry cancelled, about to page the discovered peripheral
    ConnectDevice,
    /// Create Connection issued
    ConnectedDevice,
    /// Enabling page (and inquiry) scan
    Scanning,
    /// Waiting for a peripheral to page us
    ConnectIn,
    /// Reading the paging peer's name
    RemoteName,
    /// Accept Connection issued
    Connected,
    /// Link up, giving the peer time to open its channels
    Done,
    /// Waiting for the disconnection to complete
    Disconnect,
}

/// The HCI link state machine
pub struct LinkManager {
    state: LinkState,
    flags: EventFlags,
    counter: u16,
    reset_grace: u16,
    inquiry_passes: u8,
    connect_retried: bool,
    version: u8,
    own_addr: BdAddr,
    peer_addr: BdAddr,
    peer_class: DeviceClass,
    remote_name: heapless::Vec<u8, REMOTE_NAME_LEN>,
}

impl LinkManager {
    /// Create a new link manager in its initial state
    pub const fn new() -> Self {
        Self {
            state: LinkState::Init,
            flags: EventFlags(0),
            counter: 0,
            reset_grace: RESET_GRACE_TICKS,
            inquiry_passes: 0,
            connect_retried: false,
            version: 0,
            own_addr: BdAddr([0; 6]),
            peer_addr: BdAddr([0; 6]),
            peer_class: DeviceClass([0; 3]),
            remote_name: heapless::Vec::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Recorded event flags
    pub fn flags(&self) -> EventFlags {
        self.flags
    }

    /// Address of the local controller, learned after reset
    pub fn own_addr(&self) -> BdAddr {
        self.own_addr
    }

    /// Address of the discovered or paging peripheral
    pub fn peer_addr(&self) -> BdAddr {
        self.peer_addr
    }

    /// Class of device of the peripheral
    pub fn peer_class(&self) -> DeviceClass {
        self.peer_class
    }

    /// HCI version reported by the controller
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Name of the paging peripheral, when one was read
    pub fn remote_name(&self) -> &[u8] {
        &self.remote_name
    }

    /// Clear the expected flags and send one command. Returns false when
    /// the transport refused it; the caller must not advance.
    fn command<T: HciTransport>(&mut self, tx: &mut T, clear: u16, cmd: &Command<'_>) -> bool {
        if !tx.send_available() {
            warn!("hci command {} dropped, controller busy", cmd.opcode());
            return false;
        }
        self.flags.clear(EventFlags::CMD_COMPLETE | clear);
        let mut buf = [0u8; MAX_COMMAND];
        let n = cmd.encode(&mut buf);
        match tx.send(&buf[..n]) {
            Ok(()) => true,
            Err(_) => {
                warn!("hci command {} send failed", cmd.opcode());
                false
            }
        }
    }

    /// Advance the machine one tick (~100 ms)
    pub fn tick<T: HciTransport>(&mut self, acl: &mut AclLink, cfg: &HostConfig, tx: &mut T) {
        match self.state {
            LinkState::Init => {
                self.counter += 1;
                if self.counter > self.reset_grace {
                    // Anything queued before this point is stale.
                    self.flags.clear_all();
                    if self.command(tx, 0, &Command::Reset) {
                        self.state = LinkState::Reset;
                    }
                    self.counter = 0;
                }
            }
            LinkState::Reset => {
                self.counter += 1;
                if self.flags.contains(EventFlags::CMD_COMPLETE) {
                    info!("hci reset complete");
                    self.counter = 0;
                    if self.command(tx, 0, &Command::WriteClassOfDevice(cfg.class_of_device)) {
                        self.state = LinkState::Class;
                    }
                } else if self.counter > self.reset_grace {
                    self.reset_grace = (self.reset_grace.saturating_mul(10)).min(RESET_GRACE_MAX);
                    warn!("no response to hci reset");
                    self.state = LinkState::Init;
                    self.counter = 0;
                }
            }
            LinkState::Class => {
                if self.flags.contains(EventFlags::CMD_COMPLETE)
                    && self.command(tx, EventFlags::READ_BDADDR, &Command::ReadBdAddr)
                {
                    self.state = LinkState::BdAddr;
                }
            }
            LinkState::BdAddr => {
                if self.flags.contains(EventFlags::READ_BDADDR)
                    && self.command(tx, EventFlags::READ_VERSION, &Command::ReadLocalVersion)
                {
                    self.state = LinkState::LocalVersion;
                }
            }
            LinkState::LocalVersion => {
                if self.flags.contains(EventFlags::READ_VERSION) {
                    match cfg.local_name {
                        Some(name) => {
                            if self.command(tx, 0, &Command::ChangeLocalName(name)) {
                                self.state = LinkState::SetName;
                            }
                        }
                        None => self.state = LinkState::CheckDeviceService,
                    }
                }
            }
            LinkState::SetName => {
                if self.flags.contains(EventFlags::CMD_COMPLETE) {
                    self.state = LinkState::CheckDeviceService;
                }
            }
            LinkState::CheckDeviceService => {
                if self.command(tx, EventFlags::DEVICE_FOUND, &Command::Inquiry) {
                    self.state = LinkState::Inquiry;
                }
            }
            LinkState::Inquiry => {
                if self.flags.contains(EventFlags::DEVICE_FOUND) {
                    info!("hid peripheral found");
                    if self.command(tx, 0, &Command::InquiryCancel) {
                        self.connect_retried = false;
                        self.state = LinkState::ConnectDevice;
                    }
                }
            }
            LinkState::ConnectDevice => {
                if self.flags.contains(EventFlags::CMD_COMPLETE)
                    && self.command(
                        tx,
                        EventFlags::CONNECT_EVENT | EventFlags::CONNECT_COMPLETE,
                        &Command::CreateConnection(self.peer_addr),
                    )
                {
                    self.state = LinkState::ConnectedDevice;
                }
            }
            LinkState::ConnectedDevice => {
                if self.flags.contains(EventFlags::CONNECT_EVENT) {
                    if self.flags.contains(EventFlags::CONNECT_COMPLETE) {
                        if !acl.ready {
                            return;
                        }
                        let Some(handle) = acl.handle else { return };
                        info!("connected, starting authentication");
                        if self.command(tx, 0, &Command::AuthenticationRequested(handle)) {
                            self.state = LinkState::Scanning;
                        }
                    } else if !self.connect_retried {
                        self.connect_retried = true;
                        self.command(
                            tx,
                            EventFlags::CONNECT_EVENT | EventFlags::CONNECT_COMPLETE,
                            &Command::CreateConnection(self.peer_addr),
                        );
                    }
                }
            }
            LinkState::Scanning => {
                if !acl.connect_pending && !acl.pair_pending {
                    let mode = if cfg.local_name.is_some() {
                        scan::PAGE_AND_INQUIRY
                    } else {
                        scan::PAGE
                    };
                    if self.command(
                        tx,
                        EventFlags::INCOMING_REQUEST,
                        &Command::WriteScanEnable(mode),
                    ) {
                        info!("waiting for an incoming connection");
                        acl.waiting = true;
                        self.state = LinkState::ConnectIn;
                    }
                }
            }
            LinkState::ConnectIn => {
                if self.flags.contains(EventFlags::INCOMING_REQUEST) {
                    acl.waiting = false;
                    if self.command(
                        tx,
                        EventFlags::REMOTE_NAME_COMPLETE,
                        &Command::RemoteNameRequest(self.peer_addr),
                    ) {
                        self.state = LinkState::RemoteName;
                    }
                } else if self.flags.contains(EventFlags::DISCONNECT_COMPLETE) {
                    self.state = LinkState::Disconnect;
                }
            }
            LinkState::RemoteName => {
                if self.flags.contains(EventFlags::REMOTE_NAME_COMPLETE)
                    && self.command(
                        tx,
                        EventFlags::CONNECT_COMPLETE,
                        &Command::AcceptConnection(self.peer_addr),
                    )
                {
                    self.state = LinkState::Connected;
                }
            }
            LinkState::Connected => {
                if self.flags.contains(EventFlags::CONNECT_COMPLETE) {
                    info!("acl link up");
                    // A fresh connection: the channel machine may claim it.
                    acl.claimed = false;
                    self.flags.clear_all();
                    self.counter = 0;
                    self.state = LinkState::Done;
                }
            }
            LinkState::Done => {
                self.counter += 1;
                if self.counter > DONE_GRACE_TICKS {
                    self.counter = 0;
                    self.state = LinkState::Scanning;
                }
            }
            LinkState::Disconnect => {
                if self.flags.contains(EventFlags::DISCONNECT_COMPLETE) {
                    info!("acl link closed");
                    self.reset_link(acl);
                    self.state = LinkState::Scanning;
                }
            }
        }
    }

    /// Issue an HCI Disconnect for the current link
    pub fn request_disconnect<T: HciTransport>(&mut self, acl: &mut AclLink, tx: &mut T) {
        if let Some(handle) = acl.handle {
            self.command(
                tx,
                EventFlags::DISCONNECT_COMPLETE,
                &Command::Disconnect(handle),
            );
        }
        acl.handle = None;
    }

    /// Zero peer state and flags after a disconnect
    fn reset_link(&mut self, acl: &mut AclLink) {
        self.flags.clear_all();
        self.peer_addr = BdAddr::default();
        self.peer_class = DeviceClass::default();
        self.remote_name.clear();
        acl.handle = None;
        acl.incoming_hid = false;
    }

    /// Digest one HCI event. Runs independently of the tick.
    pub fn on_event<T: HciTransport>(
        &mut self,
        event: &Event<'_>,
        acl: &mut AclLink,
        cfg: &HostConfig,
        tx: &mut T,
    ) {
        match EventCode::from_byte(event.code) {
            Some(EventCode::CommandComplete) => self.on_command_complete(event),
            Some(EventCode::CommandStatus) => {
                // Parameters: status, allowed packets, opcode
                if event.status() != 0 {
                    warn!(
                        "hci command {} failed, status {}",
                        event.u16_at(2).unwrap_or(0),
                        event.status()
                    );
                }
            }
            Some(EventCode::InquiryComplete) => self.on_inquiry_complete(acl),
            Some(EventCode::InquiryResult) => self.on_inquiry_result(event),
            Some(EventCode::ConnectionComplete) => self.on_connection_complete(event, acl),
            Some(EventCode::DisconnectionComplete) => {
                if event.status() == 0 {
                    self.flags.set(EventFlags::DISCONNECT_COMPLETE);
                    self.flags.clear(EventFlags::CONNECT_COMPLETE);
                }
            }
            Some(EventCode::RemoteNameRequestComplete) => {
                if event.status() == 0 {
                    self.remote_name.clear();
                    for &b in event.params.get(7..).unwrap_or(&[]) {
                        if b == 0 || self.remote_name.push(b).is_err() {
                            break;
                        }
                    }
                    self.flags.set(EventFlags::REMOTE_NAME_COMPLETE);
                }
            }
            Some(EventCode::ConnectionRequest) => self.on_incoming_connection(event, acl),
            Some(EventCode::PinCodeRequest) => match cfg.pin {
                Some(pin) => {
                    info!("replying with the configured pin");
                    self.command(tx, 0, &Command::PinCodeRequestReply(self.peer_addr, pin.as_bytes()));
                }
                None => {
                    warn!("no pin configured, rejecting pairing");
                    self.command(tx, 0, &Command::PinCodeNegativeReply(self.peer_addr));
                }
            },
            Some(EventCode::LinkKeyRequest) => {
                // Link keys are never kept across resets.
                self.command(tx, 0, &Command::LinkKeyNegativeReply(self.peer_addr));
            }
            Some(EventCode::AuthenticationComplete) => {
                self.on_authentication_complete(event, acl, tx)
            }
            Some(_) => {} // recognized but not acted on
            None => trace!("unmanaged hci event {}", event.code),
        }
    }

    fn on_command_complete(&mut self, event: &Event<'_>) {
        // Parameters: allowed packets, opcode, status, return parameters
        let Some(op) = event.u16_at(1) else { return };
        let status = event.params.get(3).copied().unwrap_or(0xFF);
        if status != 0 {
            warn!("hci command {} failed, status {}", op, status);
            return;
        }
        self.flags.set(EventFlags::CMD_COMPLETE);
        match op {
            opcode::READ_BD_ADDR => {
                if let Some(addr) = event.bdaddr_at(4) {
                    self.own_addr = addr;
                    self.flags.set(EventFlags::READ_BDADDR);
                }
            }
            opcode::READ_LOCAL_VERSION => {
                if let Some(&version) = event.params.get(4) {
                    self.version = version;
                    self.flags.set(EventFlags::READ_VERSION);
                }
            }
            _ => {}
        }
    }

    /// An inquiry pass ended. Without a match, run another one; give up
    /// after enough empty passes and wait for the peripheral to page us.
    fn on_inquiry_complete(&mut self, acl: &mut AclLink) {
        if self.state != LinkState::Inquiry || self.flags.contains(EventFlags::DEVICE_FOUND) {
            return;
        }
        self.inquiry_passes += 1;
        if self.inquiry_passes >= INQUIRY_PASSES {
            self.inquiry_passes = 0;
            warn!("no hid peripheral found, switching to page scan");
            acl.pair_pending = false;
            self.state = LinkState::Scanning;
        } else {
            self.state = LinkState::CheckDeviceService;
        }
    }

    fn on_inquiry_result(&mut self, event: &Event<'_>) {
        let Some(&count) = event.params.first() else {
            return;
        };
        let n = count as usize;
        for i in 0..n {
            // Addresses come first, then the per-response parameter
            // arrays; the class of device of response i sits behind nine
            // bytes per response.
            let class_off = 1 + 9 * n + 3 * i;
            let Some(class) = event.params.get(class_off..class_off + 3) else {
                break;
            };
            let class = DeviceClass([class[0], class[1], class[2]]);
            if !class.is_hid_peripheral() {
                continue;
            }
            if let Some(addr) = event.bdaddr_at(1 + 6 * i) {
                self.peer_addr = addr;
                self.peer_class = class;
                self.flags.set(EventFlags::DEVICE_FOUND);
                break;
            }
        }
    }

    fn on_connection_complete(&mut self, event: &Event<'_>, acl: &mut AclLink) {
        self.flags.set(EventFlags::CONNECT_EVENT);
        if event.status() == 0 {
            if let Some(handle) = event.u16_at(1) {
                acl.handle = Some(ConnectionHandle::new(handle));
                self.flags.set(EventFlags::CONNECT_COMPLETE);
            }
        } else {
            warn!("connection failed, status {}", event.status());
            self.state = LinkState::CheckDeviceService;
        }
    }

    fn on_incoming_connection(&mut self, event: &Event<'_>, acl: &mut AclLink) {
        if let Some(addr) = event.bdaddr_at(0) {
            self.peer_addr = addr;
        }
        if let Some(class) = event.params.get(6..9) {
            self.peer_class = DeviceClass([class[0], class[1], class[2]]);
        }
        if self.peer_class.is_hid_peripheral() {
            info!("hid peripheral is paging us");
            acl.incoming_hid = true;
        }
        self.flags.set(EventFlags::INCOMING_REQUEST);
    }

    fn on_authentication_complete<T: HciTransport>(
        &mut self,
        event: &Event<'_>,
        acl: &mut AclLink,
        tx: &mut T,
    ) {
        if event.status() == 0 {
            if acl.pair_pending && !acl.connect_pending {
                info!("pairing complete");
                acl.connect_pending = true;
            }
        } else {
            warn!("pairing failed, status {}", event.status());
            if let Some(handle) = acl.handle {
                self.command(
                    tx,
                    EventFlags::DISCONNECT_COMPLETE,
                    &Command::Disconnect(handle),
                );
            }
            self.state = LinkState::Disconnect;
        }
    }
}

impl Default for LinkManager {
    fn default() -> Self {
        Self::new()
    }
}
