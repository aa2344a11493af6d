//! Transport seam to the Bluetooth controller.
//!
//! The stack is transport-agnostic: anything that moves complete, framed
//! HCI packets to and from the radio can drive it. Inbound packets and the
//! controller-ready edge are delivered to the host driver by the caller
//! (see [`HidHost::on_packet`](crate::host::HidHost::on_packet) and
//! [`HidHost::on_ready`](crate::host::HidHost::on_ready)).

/// Error returned by [`HciTransport::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// The controller cannot accept another packet right now
    Unavailable,
    /// The transport failed to deliver the packet
    Failed,
}

/// Outbound half of the bidirectional HCI channel.
///
/// Every packet carries the HCI packet type in its first byte
/// (0x01 command, 0x02 ACL data). Packets must reach the controller in
/// submission order.
pub trait HciTransport {
    /// May the host submit another packet right now?
    fn send_available(&self) -> bool;

    /// Enqueue one complete outbound HCI packet
    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError>;
}
