//! The assembled HID host driver.
//!
//! Owns the transport, the report consumer and both state machines, and
//! dispatches every inbound packet by its type byte. The caller provides
//! the periodic tick and delivers inbound packets; tick and delivery must
//! not run concurrently (drive both from one task, or serialize them).

use crate::channels::{ChannelManager, LinkRequest};
use crate::hci::{ConnectionHandle, Event, PacketType};
use crate::link::{EventFlags, LinkManager, LinkState};
use crate::transport::HciTransport;
use crate::DeviceClass;

/// Startup options, read once
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Name advertised to peers. When set, inquiry scan is enabled along
    /// with page scan so the device is discoverable.
    pub local_name: Option<&'static str>,
    /// PIN supplied on a PIN Code Request; None replies negatively
    pub pin: Option<&'static str>,
    /// Class of device written to the controller at init
    pub class_of_device: DeviceClass,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            local_name: None,
            pin: Some("0000"),
            class_of_device: DeviceClass::gamepad(),
        }
    }
}

/// Consumer of inbound HID input reports
pub trait HidReportSink {
    /// One report from the interrupt channel, transaction header stripped
    fn on_hid_input(&mut self, report: &[u8]);
}

/// Facts about the ACL link shared by the two state machines
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AclLink {
    /// Handle assigned by the controller, None while no link exists
    pub handle: Option<ConnectionHandle>,
    /// The controller accepts traffic (edge-triggered at boot)
    pub ready: bool,
    /// We still want to discover and pair with a peripheral
    pub pair_pending: bool,
    /// Pairing finished; the channel machine should claim the link
    pub connect_pending: bool,
    /// The channel machine owns this link
    pub claimed: bool,
    /// The paging peer looked like a HID peripheral
    pub incoming_hid: bool,
    /// Page scan is enabled and nobody has paged us yet
    pub waiting: bool,
    /// Both HID channels are established
    pub connected: bool,
    /// Channel bring-up is underway or complete
    pub active: bool,
}

/// Host-side driver for one Bluetooth Classic HID peripheral
pub struct HidHost<T, S> {
    transport: T,
    sink: S,
    config: HostConfig,
    acl: AclLink,
    link: LinkManager,
    channels: ChannelManager,
}

impl<T: HciTransport, S: HidReportSink> HidHost<T, S> {
    /// Create a new host driver
    pub fn new(transport: T, sink: S, config: HostConfig) -> Self {
        Self {
            transport,
            sink,
            config,
            acl: AclLink {
                pair_pending: true,
                ..Default::default()
            },
            link: LinkManager::new(),
            channels: ChannelManager::new(),
        }
    }

    /// Drive both machines. Call every ~100 ms.
    pub fn tick(&mut self) {
        self.link
            .tick(&mut self.acl, &self.config, &mut self.transport);
        if let Some(LinkRequest::Disconnect) = self.channels.poll(&mut self.acl, &mut self.transport)
        {
            self.link
                .request_disconnect(&mut self.acl, &mut self.transport);
        }
    }

    /// The controller signalled it is ready for traffic
    pub fn on_ready(&mut self) {
        self.acl.ready = true;
    }

    /// One complete inbound HCI packet, type byte first
    pub fn on_packet(&mut self, packet: &[u8]) {
        let Some((&kind, rest)) = packet.split_first() else {
            return;
        };
        match PacketType::from_byte(kind) {
            Some(PacketType::Event) => match Event::parse(rest) {
                Some(event) => {
                    self.link
                        .on_event(&event, &mut self.acl, &self.config, &mut self.transport);
                    // A closed link always resets the channel machine.
                    if self.link.flags().contains(EventFlags::DISCONNECT_COMPLETE) {
                        self.channels.reset(&mut self.acl);
                    }
                }
                None => warn!("truncated hci event"),
            },
            Some(PacketType::AclData) => {
                self.channels
                    .on_frame(rest, &mut self.acl, &mut self.transport, &mut self.sink);
                if let Some(LinkRequest::Disconnect) =
                    self.channels.poll(&mut self.acl, &mut self.transport)
                {
                    self.link
                        .request_disconnect(&mut self.acl, &mut self.transport);
                }
            }
            _ => debug!("unmanaged hci packet type {}", kind),
        }
    }

    /// Tear down the HID channels and then the ACL link
    pub fn disconnect(&mut self) {
        self.channels.start_disconnect(&self.acl, &mut self.transport);
    }

    /// Both HID channels are up and reports can flow
    pub fn is_connected(&self) -> bool {
        self.acl.connected
    }

    /// Waiting in page scan for a peripheral to connect
    pub fn is_waiting(&self) -> bool {
        self.acl.waiting && self.link.state() == LinkState::ConnectIn
    }

    /// Shared link facts
    pub fn acl(&self) -> &AclLink {
        &self.acl
    }

    /// The HCI link machine
    pub fn link(&self) -> &LinkManager {
        &self.link
    }

    /// The L2CAP channel machine
    pub fn channels(&self) -> &ChannelManager {
        &self.channels
    }

    /// The report consumer
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// The transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The transport, exclusively
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
