//! Scripted-peer scenarios: the controller side of every exchange is
//! played back byte-for-byte and the outbound traffic is checked against
//! the expected frames.

use bt_classic::channels::ChannelState;
use bt_classic::hci::opcode;
use bt_classic::host::{HidHost, HidReportSink, HostConfig};
use bt_classic::link::LinkState;
use bt_classic::transport::{HciTransport, TransportError};
use bt_classic::BdAddr;

const HANDLE: u16 = 0x002A;
const PEER: [u8; 6] = [0x28, 0x9A, 0x4B, 0x0A, 0x1D, 0x9A];

#[derive(Default)]
struct ScriptTransport {
    sent: Vec<Vec<u8>>,
}

impl HciTransport for ScriptTransport {
    fn send_available(&self) -> bool {
        true
    }

    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        self.sent.push(packet.to_vec());
        Ok(())
    }
}

#[derive(Default)]
struct Reports(Vec<Vec<u8>>);

impl HidReportSink for Reports {
    fn on_hid_input(&mut self, report: &[u8]) {
        self.0.push(report.to_vec());
    }
}

type Host = HidHost<ScriptTransport, Reports>;

fn evt(code: u8, params: &[u8]) -> Vec<u8> {
    let mut packet = vec![0x04, code, params.len() as u8];
    packet.extend_from_slice(params);
    packet
}

fn cmd_complete(op: u16) -> Vec<u8> {
    let mut params = vec![0x01];
    params.extend_from_slice(&op.to_le_bytes());
    params.push(0x00);
    evt(0x0E, &params)
}

fn signal(code: u8, ident: u8, body: &[u8]) -> Vec<u8> {
    let mut packet = vec![0x02];
    packet.extend_from_slice(&(HANDLE | 0x2000).to_le_bytes());
    let sig = 4 + body.len() as u16;
    packet.extend_from_slice(&(4 + sig).to_le_bytes());
    packet.extend_from_slice(&sig.to_le_bytes());
    packet.extend_from_slice(&1u16.to_le_bytes());
    packet.push(code);
    packet.push(ident);
    packet.extend_from_slice(&(body.len() as u16).to_le_bytes());
    packet.extend_from_slice(body);
    packet
}

fn opcode_of(frame: &[u8]) -> u16 {
    assert_eq!(frame[0], 0x01, "not a command frame");
    u16::from_le_bytes([frame[1], frame[2]])
}

/// Walk the machine from power-on to the first Inquiry.
fn boot(host: &mut Host) {
    host.on_ready();
    for _ in 0..101 {
        host.tick();
    }
    assert_eq!(host.transport().sent[0], &[0x01, 0x03, 0x0C, 0x00]);

    host.on_packet(&cmd_complete(opcode::RESET));
    host.tick();
    assert_eq!(
        host.transport().sent[1],
        &[0x01, 0x24, 0x0C, 0x03, 0x04, 0x08, 0x00]
    );

    host.on_packet(&cmd_complete(opcode::WRITE_CLASS_OF_DEVICE));
    host.tick();
    assert_eq!(opcode_of(&host.transport().sent[2]), opcode::READ_BD_ADDR);

    host.on_packet(&evt(
        0x0E,
        &[0x01, 0x09, 0x10, 0x00, 0xE9, 0xA2, 0x06, 0xDC, 0x1B, 0x00],
    ));
    host.tick();
    assert_eq!(
        host.link().own_addr(),
        BdAddr::new([0xE9, 0xA2, 0x06, 0xDC, 0x1B, 0x00])
    );
    assert_eq!(
        opcode_of(&host.transport().sent[3]),
        opcode::READ_LOCAL_VERSION
    );

    host.on_packet(&evt(0x0E, &[0x01, 0x01, 0x10, 0x00, 0x05, 0x00, 0x00]));
    host.tick();
    host.tick();
    assert_eq!(opcode_of(&host.transport().sent[4]), opcode::INQUIRY);
    assert_eq!(host.link().state(), LinkState::Inquiry);
}

/// Play the peer-initiated channel bring-up, optionally ticking between
/// every inbound frame.
fn peer_opens_channels(host: &mut Host, ticks_between: usize) {
    let mut step = |host: &mut Host, packet: &[u8]| {
        host.on_packet(packet);
        for _ in 0..ticks_between {
            host.tick();
        }
    };

    // Control: Connection Request (ident 7, scid 0x45), our Configuration
    // Request is answered, the peer configures our endpoint.
    step(host, &signal(0x02, 0x07, &[0x11, 0x00, 0x45, 0x00]));
    step(host, &signal(0x04, 0x0B, &[0x40, 0x00, 0x00, 0x00]));
    step(host, &signal(0x05, 0x08, &[0x40, 0x00, 0x00, 0x00, 0x00, 0x00]));
    // Interrupt: the same exchange (ident 9, scid 0x46).
    step(host, &signal(0x02, 0x09, &[0x13, 0x00, 0x46, 0x00]));
    step(host, &signal(0x04, 0x0C, &[0x41, 0x00, 0x00, 0x00]));
    step(host, &signal(0x05, 0x0A, &[0x41, 0x00, 0x00, 0x00, 0x00, 0x00]));
}

#[test]
fn incoming_page_reaches_established_channels() {
    let mut host = Host::new(
        ScriptTransport::default(),
        Reports::default(),
        HostConfig::default(),
    );
    boot(&mut host);

    // Five empty inquiry passes drop us into page scanning.
    for _ in 0..5 {
        host.on_packet(&evt(0x01, &[0x00]));
        host.tick();
    }
    assert_eq!(host.link().state(), LinkState::ConnectIn);
    assert!(host.is_waiting());
    assert_eq!(
        opcode_of(host.transport().sent.last().unwrap()),
        opcode::WRITE_SCAN_ENABLE
    );
    // Page scan only: no local name is configured.
    assert_eq!(host.transport().sent.last().unwrap()[4], 0x02);

    // A gamepad pages us.
    let mut params = PEER.to_vec();
    params.extend_from_slice(&[0x08, 0x05, 0x00, 0x01]);
    host.on_packet(&evt(0x04, &params));
    assert!(host.acl().incoming_hid);
    host.tick();
    let name_request = host.transport().sent.last().unwrap().clone();
    assert_eq!(opcode_of(&name_request), opcode::REMOTE_NAME_REQUEST);
    assert_eq!(&name_request[4..10], &PEER);

    let mut params = vec![0x00];
    params.extend_from_slice(&PEER);
    params.extend_from_slice(b"Gamepad\0");
    host.on_packet(&evt(0x07, &params));
    host.tick();
    assert_eq!(host.link().remote_name(), b"Gamepad");
    let accept = host.transport().sent.last().unwrap().clone();
    assert_eq!(opcode_of(&accept), opcode::ACCEPT_CONNECTION_REQUEST);
    assert_eq!(accept[10], 0x00); // request the master role

    let mut params = vec![0x00];
    params.extend_from_slice(&HANDLE.to_le_bytes());
    params.extend_from_slice(&PEER);
    params.extend_from_slice(&[0x01, 0x00]);
    host.on_packet(&evt(0x03, &params));
    host.tick();
    assert_eq!(host.link().state(), LinkState::Done);
    assert!(!host.acl().claimed);

    // Legacy pairing: link key rejected, PIN supplied.
    host.on_packet(&evt(0x17, &PEER));
    assert_eq!(
        opcode_of(host.transport().sent.last().unwrap()),
        opcode::LINK_KEY_REQUEST_NEGATIVE_REPLY
    );
    host.on_packet(&evt(0x16, &PEER));
    let pin_reply = host.transport().sent.last().unwrap().clone();
    assert_eq!(opcode_of(&pin_reply), opcode::PIN_CODE_REQUEST_REPLY);
    assert_eq!(pin_reply[10], 4);
    assert_eq!(&pin_reply[11..15], b"0000");

    let before = host.transport().sent.len();
    peer_opens_channels(&mut host, 0);
    assert!(host.is_connected());
    assert_eq!(host.channels().state(), ChannelState::Done);
    assert_eq!(host.channels().control_dcid(), 0x0045);
    assert_eq!(host.channels().interrupt_dcid(), 0x0046);

    // Connection responses echo the peer's identifier; our configuration
    // request follows with the next one.
    let sent = &host.transport().sent[before..];
    assert_eq!(sent[0][9..11], [0x03, 0x07]);
    assert_eq!(sent[0][17], 0x01); // pending
    assert_eq!(sent[1][9..11], [0x03, 0x07]);
    assert_eq!(sent[1][17], 0x00); // success
    assert_eq!(sent[2][9..11], [0x04, 0x08]);
    assert_eq!(sent[2][13..15], [0x45, 0x00]);
    assert_eq!(sent[2][19..21], [0xFF, 0xFF]);

    // An input report flows to the sink.
    let report = [0xA1, 0x3F, 0x00, 0x7F];
    let mut frame = vec![0x02];
    frame.extend_from_slice(&(HANDLE | 0x2000).to_le_bytes());
    frame.extend_from_slice(&(4 + report.len() as u16).to_le_bytes());
    frame.extend_from_slice(&(report.len() as u16).to_le_bytes());
    frame.extend_from_slice(&0x0041u16.to_le_bytes());
    frame.extend_from_slice(&report);
    host.on_packet(&frame);
    assert_eq!(host.sink().0.len(), 1);
    assert_eq!(host.sink().0[0], vec![0x3F, 0x00, 0x7F]);
}

#[test]
fn channel_bringup_is_tick_invariant() {
    // The same scripted peer with idle ticks between every frame lands in
    // the same state.
    let mut host = Host::new(
        ScriptTransport::default(),
        Reports::default(),
        HostConfig::default(),
    );
    boot(&mut host);
    for _ in 0..5 {
        host.on_packet(&evt(0x01, &[0x00]));
        host.tick();
    }
    let mut params = PEER.to_vec();
    params.extend_from_slice(&[0x08, 0x05, 0x00, 0x01]);
    host.on_packet(&evt(0x04, &params));
    host.tick();
    let mut params = vec![0x00];
    params.extend_from_slice(&PEER);
    params.extend_from_slice(b"Gamepad\0");
    host.on_packet(&evt(0x07, &params));
    host.tick();
    let mut params = vec![0x00];
    params.extend_from_slice(&HANDLE.to_le_bytes());
    params.extend_from_slice(&PEER);
    params.extend_from_slice(&[0x01, 0x00]);
    host.on_packet(&evt(0x03, &params));
    host.tick();

    peer_opens_channels(&mut host, 7);
    assert!(host.is_connected());
    assert!(host.acl().active);
    assert_eq!(host.channels().control_dcid(), 0x0045);
    assert_eq!(host.channels().interrupt_dcid(), 0x0046);
}

#[test]
fn full_disconnect_returns_both_machines_to_wait() {
    let mut host = Host::new(
        ScriptTransport::default(),
        Reports::default(),
        HostConfig::default(),
    );
    boot(&mut host);
    for _ in 0..5 {
        host.on_packet(&evt(0x01, &[0x00]));
        host.tick();
    }
    let mut params = PEER.to_vec();
    params.extend_from_slice(&[0x08, 0x05, 0x00, 0x01]);
    host.on_packet(&evt(0x04, &params));
    host.tick();
    let mut params = vec![0x00];
    params.extend_from_slice(&PEER);
    params.extend_from_slice(b"Gamepad\0");
    host.on_packet(&evt(0x07, &params));
    host.tick();
    let mut params = vec![0x00];
    params.extend_from_slice(&HANDLE.to_le_bytes());
    params.extend_from_slice(&PEER);
    params.extend_from_slice(&[0x01, 0x00]);
    host.on_packet(&evt(0x03, &params));
    host.tick();
    peer_opens_channels(&mut host, 0);
    assert!(host.is_connected());

    // Peer tears the control channel down.
    host.on_packet(&signal(0x06, 0x0D, &[0x40, 0x00, 0x45, 0x00]));
    let response = host.transport().sent.last().unwrap().clone();
    assert_eq!(response[9..11], [0x07, 0x0D]);
    assert_eq!(response[13..17], [0x40, 0x00, 0x45, 0x00]);
    assert!(!host.is_connected());
    assert_eq!(host.channels().state(), ChannelState::Wait);
    assert_eq!(host.channels().flags().raw(), 0);

    // The link machine walks out of its grace period and back to
    // scanning before the ACL link drops.
    for _ in 0..1002 {
        host.tick();
    }
    assert_eq!(host.link().state(), LinkState::ConnectIn);

    let mut params = vec![0x00];
    params.extend_from_slice(&HANDLE.to_le_bytes());
    params.push(0x13);
    host.on_packet(&evt(0x05, &params));
    host.tick();
    assert_eq!(host.link().state(), LinkState::Disconnect);
    host.tick();
    assert_eq!(host.link().state(), LinkState::Scanning);
    assert_eq!(host.link().flags().raw(), 0);
    assert!(host.acl().handle.is_none());
    assert_eq!(host.link().peer_addr(), BdAddr::default());
    assert_eq!(host.link().remote_name(), b"");
}

#[test]
fn initiator_pairs_and_opens_channels() {
    let mut host = Host::new(
        ScriptTransport::default(),
        Reports::default(),
        HostConfig::default(),
    );
    boot(&mut host);

    // Inquiry turns up a gamepad.
    let mut params = vec![0x01];
    params.extend_from_slice(&PEER);
    params.extend_from_slice(&[0x01, 0x00, 0x00]);
    params.extend_from_slice(&[0x08, 0x05, 0x00]);
    params.extend_from_slice(&[0x00, 0x00]);
    host.on_packet(&evt(0x02, &params));
    host.tick();
    assert_eq!(
        opcode_of(host.transport().sent.last().unwrap()),
        opcode::INQUIRY_CANCEL
    );

    host.on_packet(&cmd_complete(opcode::INQUIRY_CANCEL));
    host.tick();
    let create = host.transport().sent.last().unwrap().clone();
    assert_eq!(opcode_of(&create), opcode::CREATE_CONNECTION);
    assert_eq!(&create[4..10], &PEER);
    assert_eq!(&create[10..12], &[0x18, 0xCC]);

    let mut params = vec![0x00];
    params.extend_from_slice(&HANDLE.to_le_bytes());
    params.extend_from_slice(&PEER);
    params.extend_from_slice(&[0x01, 0x00]);
    host.on_packet(&evt(0x03, &params));
    host.tick();
    let auth = host.transport().sent.last().unwrap().clone();
    assert_eq!(opcode_of(&auth), opcode::AUTHENTICATION_REQUESTED);
    assert_eq!(&auth[4..6], &HANDLE.to_le_bytes());
    assert_eq!(host.link().state(), LinkState::Scanning);

    // Pairing succeeds; the channel machine claims the link on the next
    // tick and walks the initiator bring-up.
    let mut params = vec![0x00];
    params.extend_from_slice(&HANDLE.to_le_bytes());
    host.on_packet(&evt(0x06, &params));
    assert!(host.acl().connect_pending);
    host.tick();
    assert!(host.acl().claimed);
    assert_eq!(host.channels().state(), ChannelState::ControlConnectRequest);

    host.on_packet(&signal(
        0x03,
        0x01,
        &[0x70, 0x00, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00],
    ));
    host.on_packet(&signal(0x05, 0x02, &[0x40, 0x00, 0x00, 0x00, 0x00, 0x00]));
    host.on_packet(&signal(
        0x03,
        0x03,
        &[0x71, 0x00, 0x41, 0x00, 0x00, 0x00, 0x00, 0x00],
    ));
    host.on_packet(&signal(0x05, 0x04, &[0x41, 0x00, 0x00, 0x00, 0x00, 0x00]));
    assert!(host.is_connected());
    assert_eq!(host.channels().control_dcid(), 0x0070);
    assert_eq!(host.channels().interrupt_dcid(), 0x0071);

    // Our four signalling requests used strictly increasing identifiers.
    let idents: Vec<u8> = host
        .transport()
        .sent
        .iter()
        .filter(|frame| frame[0] == 0x02 && matches!(frame[9], 0x02 | 0x04))
        .map(|frame| frame[10])
        .collect();
    assert_eq!(idents, vec![1, 2, 3, 4]);

    // Orderly teardown: interrupt, control, then the ACL link.
    host.disconnect();
    let request = host.transport().sent.last().unwrap().clone();
    assert_eq!(request[9..11], [0x06, 0x05]);
    assert_eq!(request[13..17], [0x71, 0x00, 0x41, 0x00]);

    host.on_packet(&signal(0x07, 0x05, &[0x71, 0x00, 0x41, 0x00]));
    let request = host.transport().sent.last().unwrap().clone();
    assert_eq!(request[9..11], [0x06, 0x06]);
    assert_eq!(request[13..17], [0x70, 0x00, 0x40, 0x00]);

    host.on_packet(&signal(0x07, 0x06, &[0x70, 0x00, 0x40, 0x00]));
    let disconnect = host.transport().sent.last().unwrap().clone();
    assert_eq!(opcode_of(&disconnect), opcode::DISCONNECT);
    assert_eq!(&disconnect[4..7], &[0x2A, 0x00, 0x13]);
    assert!(host.acl().handle.is_none());
    assert_eq!(host.channels().state(), ChannelState::Wait);
}
