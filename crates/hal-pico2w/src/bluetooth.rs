//! CYW43439 Bluetooth HCI transport
//!
//! Queue-backed transport between the HID host stack and the CYW43439
//! controller. The stack side goes through
//! [`bt_classic::transport::HciTransport`]; the controller side drains
//! [`pop_outbound`](BluetoothHci::pop_outbound) and feeds
//! [`push_inbound`](BluetoothHci::push_inbound).

use bt_classic::transport::{HciTransport, TransportError};
use heapless::{Deque, Vec};

/// Maximum HCI packet size
pub const MAX_HCI_PACKET: usize = 512;

/// Packets buffered per direction
const QUEUE_DEPTH: usize = 4;

/// HCI transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HciState {
    /// Not initialized
    #[default]
    Uninitialized,
    /// Initializing
    Initializing,
    /// Ready for communication
    Ready,
    /// Error state
    Error,
}

/// Bluetooth HCI transport over CYW43439
///
/// Delivery to the radio requires integration with the cyw43 crate's
/// Bluetooth support; until the runner drains the queues this acts as a
/// bounded mailbox.
pub struct BluetoothHci {
    state: HciState,
    outbound: Deque<Vec<u8, MAX_HCI_PACKET>, QUEUE_DEPTH>,
    inbound: Deque<Vec<u8, MAX_HCI_PACKET>, QUEUE_DEPTH>,
}

impl BluetoothHci {
    /// Create a new HCI transport (uninitialized)
    pub const fn new() -> Self {
        Self {
            state: HciState::Uninitialized,
            outbound: Deque::new(),
            inbound: Deque::new(),
        }
    }

    /// Check if the transport is ready
    pub fn is_ready(&self) -> bool {
        self.state == HciState::Ready
    }

    /// Get the current state
    pub fn state(&self) -> HciState {
        self.state
    }

    /// Mark the controller ready for traffic
    pub fn set_ready(&mut self) {
        self.state = HciState::Ready;
    }

    /// Queue one inbound packet from the controller
    pub fn push_inbound(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        let mut copy = Vec::new();
        copy.extend_from_slice(packet)
            .map_err(|_| TransportError::Failed)?;
        self.inbound
            .push_back(copy)
            .map_err(|_| TransportError::Unavailable)
    }

    /// Take the next inbound packet, if any
    pub fn poll_inbound(&mut self) -> Option<Vec<u8, MAX_HCI_PACKET>> {
        self.inbound.pop_front()
    }

    /// Take the next queued outbound packet for the controller
    pub fn pop_outbound(&mut self) -> Option<Vec<u8, MAX_HCI_PACKET>> {
        self.outbound.pop_front()
    }
}

impl HciTransport for BluetoothHci {
    fn send_available(&self) -> bool {
        self.state == HciState::Ready && !self.outbound.is_full()
    }

    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        if self.state != HciState::Ready {
            return Err(TransportError::Unavailable);
        }
        let mut copy = Vec::new();
        copy.extend_from_slice(packet)
            .map_err(|_| TransportError::Failed)?;
        self.outbound
            .push_back(copy)
            .map_err(|_| TransportError::Unavailable)?;
        // TODO: hand off to the cyw43 HCI interface once its Bluetooth
        // support is wired up
        Ok(())
    }
}

impl Default for BluetoothHci {
    fn default() -> Self {
        Self::new()
    }
}
