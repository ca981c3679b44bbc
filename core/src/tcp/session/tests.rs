use super::*;
use crate::config::{default_config, NormMode, QueueLimitAction};
use crate::stats;
use crate::tcp::normalizer::ReassemblyPolicy;
use crate::tcp::segment::*;

const CLIENT: Direction = Direction::FromClient;
const SERVER: Direction = Direction::FromServer;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn session_with(f: impl FnOnce(&mut StreamConfig)) -> StreamSession {
    init_logger();
    let mut config = default_config();
    f(&mut config);
    let norm = Arc::new(Normalizer::new(&config));
    StreamSession::new(Arc::new(config), norm)
}

fn session() -> StreamSession {
    session_with(|_| ())
}

fn seg(dir: Direction, seq: u32, ack: u32, flags: u8, data: &[u8]) -> SegmentDescriptor<'_> {
    SegmentDescriptor::new(dir, seq, ack, flags, 1024, data)
}

/// SYN(100), SYN/ACK(500, ack 101), ACK(101, ack 501).
fn handshake(ssn: &mut StreamSession, out: &mut Vec<FlushedData>) {
    ssn.process(&seg(CLIENT, 100, 0, SYN, &[]), out);
    ssn.process(&seg(SERVER, 500, 101, SYN | ACK, &[]), out);
    ssn.process(&seg(CLIENT, 101, 501, ACK, &[]), out);
}

fn client_bytes(out: &[FlushedData]) -> Vec<u8> {
    out.iter()
        .filter(|d| d.dir == CLIENT)
        .flat_map(|d| d.payload.iter().copied())
        .collect()
}

#[test]
fn core_session_handshake_and_close() {
    let mut ssn = session();
    let mut out = vec![];

    ssn.process(&seg(CLIENT, 100, 0, SYN, &[]), &mut out);
    assert_eq!(ssn.talker_state(CLIENT), ConnectionState::SynSent);
    assert_eq!(ssn.listener_state(CLIENT), ConnectionState::SynRecv);

    ssn.process(&seg(SERVER, 500, 101, SYN | ACK, &[]), &mut out);
    assert_eq!(ssn.client().state(), ConnectionState::Established);
    assert_eq!(ssn.server().state(), ConnectionState::SynRecv);

    let outcome = ssn.process(&seg(CLIENT, 101, 501, ACK, &[]), &mut out);
    assert!(outcome.alerts.is_empty());
    assert_eq!(ssn.server().state(), ConnectionState::Established);
    assert!(ssn.flags().contains(SessionFlags::Established));
    assert!(!ssn.flags().contains(SessionFlags::Midstream));
    assert_eq!(ssn.base_state(), ConnectionState::Established);

    ssn.process(&seg(CLIENT, 101, 501, FIN | ACK, &[]), &mut out);
    assert_eq!(ssn.client().state(), ConnectionState::FinWait1);
    assert_eq!(ssn.server().state(), ConnectionState::CloseWait);
    assert_eq!(ssn.server().fin_final_seq(), Some(101));

    ssn.process(&seg(SERVER, 501, 102, FIN | ACK, &[]), &mut out);
    assert_eq!(ssn.client().state(), ConnectionState::TimeWait);
    assert_eq!(ssn.server().state(), ConnectionState::LastAck);

    let outcome = ssn.process(&seg(CLIENT, 102, 502, ACK, &[]), &mut out);
    assert!(!outcome.torn_down);
    assert_eq!(ssn.client().state(), ConnectionState::TimeWait);
    assert_eq!(ssn.server().state(), ConnectionState::TimeWait);

    // retransmitted FIN at the recorded final sequence
    let outcome = ssn.process(&seg(CLIENT, 101, 502, FIN | ACK, &[]), &mut out);
    assert!(outcome.alerts.is_empty());
    assert!(outcome.torn_down);
    assert!(outcome.actions.contains(PacketAction::SessionClosed));
    assert!(ssn.is_closed());
    assert_eq!(stats::snapshot().sessions_closed, 1);
}

#[test]
fn core_session_data_delivery() {
    let mut ssn = session();
    let mut out = vec![];
    handshake(&mut ssn, &mut out);

    let outcome = ssn.process(&seg(CLIENT, 101, 501, ACK | PSH, b"0123456789"), &mut out);
    assert_eq!(outcome.flushed_bytes, 10);
    ssn.process(&seg(CLIENT, 111, 501, ACK | PSH, b"abcdefghij"), &mut out);
    assert_eq!(client_bytes(&out), b"0123456789abcdefghij");
    assert_eq!(out[0].seq, 101);

    // retransmission of flushed data is not delivered twice
    let outcome = ssn.process(&seg(CLIENT, 101, 501, ACK | PSH, b"0123456789"), &mut out);
    assert_eq!(outcome.flushed_bytes, 0);
    assert_eq!(ssn.server().rcv_nxt(), 121);

    ssn.process(&seg(SERVER, 501, 121, ACK | PSH, b"HTTP"), &mut out);
    let last = out.last().map(|d| (d.dir, d.seq, d.payload.clone()));
    assert_eq!(last, Some((SERVER, 501, b"HTTP".to_vec())));
}

#[test]
fn core_session_rst_in_window() {
    let mut ssn = session();
    let mut out = vec![];
    handshake(&mut ssn, &mut out);

    let outcome = ssn.process(&seg(SERVER, 501, 0, RST, &[]), &mut out);
    assert!(outcome.actions.contains(PacketAction::Reset));
    assert_eq!(ssn.client().state(), ConnectionState::Closed);
    assert_eq!(ssn.server().state(), ConnectionState::Closed);
    assert!(ssn.flags().contains(SessionFlags::Reset));
    assert_eq!(stats::snapshot().sessions_reset, 1);

    let outcome = ssn.process(&seg(CLIENT, 101, 501, ACK, b"late"), &mut out);
    assert!(outcome.has_alert(TcpAlert::DataAfterReset));
    assert!(outcome.torn_down);
    assert!(client_bytes(&out).is_empty());
}

#[test]
fn core_session_rst_out_of_window() {
    let mut ssn = session();
    let mut out = vec![];
    handshake(&mut ssn, &mut out);

    let outcome = ssn.process(&seg(SERVER, 501 + 4096, 0, RST, &[]), &mut out);
    assert!(outcome.has_alert(TcpAlert::BadRst));
    assert!(outcome.actions.contains(PacketAction::BadPkt));
    assert!(!outcome.actions.contains(PacketAction::Reset));
    // passive normalization never drops
    assert!(!outcome.actions.contains(PacketAction::Drop));
    assert_eq!(stats::snapshot().discards, 0);
    assert_eq!(ssn.client().state(), ConnectionState::Established);
    assert_eq!(ssn.server().state(), ConnectionState::Established);
}

#[test]
fn core_session_inline_drops_rejected_packets() {
    let mut ssn = session_with(|c| {
        c.normalizer.mode = NormMode::Inline;
        c.normalizer.block = true;
    });
    let mut out = vec![];
    handshake(&mut ssn, &mut out);

    let outcome = ssn.process(&seg(SERVER, 501 + 4096, 0, RST, &[]), &mut out);
    assert!(outcome.actions.contains(PacketAction::Drop));
    assert!(outcome.actions.contains(PacketAction::Block));
    assert_eq!(stats::snapshot().discards, 1);
}

#[test]
fn core_session_rst_with_payload() {
    let mut ssn = session_with(|c| c.normalizer.trim_rst = true);
    let mut out = vec![];
    handshake(&mut ssn, &mut out);

    let outcome = ssn.process(&seg(SERVER, 501, 0, RST, b"bye"), &mut out);
    assert!(outcome.has_alert(TcpAlert::DataAfterRst));
    assert!(outcome.norm.contains(NormAction::TrimPayload));
    assert_eq!(outcome.trim_len, Some(0));
    assert!(outcome.actions.contains(PacketAction::Reset));
}

#[test]
fn core_session_paws_rejects_old_timestamp() {
    let mut ssn = session();
    let mut out = vec![];
    ssn.process(
        &seg(CLIENT, 100, 0, SYN, &[]).with_timestamp(1000, 0),
        &mut out,
    );
    ssn.process(
        &seg(SERVER, 500, 101, SYN | ACK, &[]).with_timestamp(7000, 1000),
        &mut out,
    );
    ssn.process(
        &seg(CLIENT, 101, 501, ACK, &[]).with_timestamp(1001, 7000),
        &mut out,
    );
    assert!(ssn.client().tstamp_ok);

    let stale = seg(CLIENT, 101, 501, ACK, b"evil").with_timestamp(900, 7000);
    let outcome = ssn.process(&stale, &mut out);
    assert!(outcome.has_alert(TcpAlert::BadTimestamp));
    assert!(outcome.actions.contains(PacketAction::BadPkt));
    assert!(out.is_empty());
    assert_eq!(ssn.server().queued_bytes(), 0);
    assert_eq!(stats::snapshot().paws_rejects, 1);

    let fresh = seg(CLIENT, 101, 501, ACK, b"good").with_timestamp(1002, 7000);
    let outcome = ssn.process(&fresh, &mut out);
    assert!(outcome.alerts.is_empty());
    assert_eq!(client_bytes(&out), b"good");

    let missing = seg(CLIENT, 105, 501, ACK, b"more");
    let outcome = ssn.process(&missing, &mut out);
    assert!(outcome.has_alert(TcpAlert::NoTimestamp));
}

fn overlap_run(policy: ReassemblyPolicy) -> (Vec<u8>, bool) {
    let mut ssn = session_with(|c| c.policy = policy);
    let mut out = vec![];
    handshake(&mut ssn, &mut out);

    ssn.process(&seg(CLIENT, 111, 501, ACK, &[b'B'; 10]), &mut out);
    let outcome = ssn.process(&seg(CLIENT, 115, 501, ACK, &[b'C'; 10]), &mut out);
    let inconsistent = outcome.has_alert(TcpAlert::InconsistentOverlap);
    assert!(out.is_empty());
    ssn.process(&seg(CLIENT, 101, 501, ACK, &[b'A'; 10]), &mut out);
    (client_bytes(&out), inconsistent)
}

#[test]
fn core_session_overlap_resolution_is_deterministic() {
    let (first, inconsistent) = overlap_run(ReassemblyPolicy::First);
    assert!(inconsistent);
    assert_eq!(first, b"AAAAAAAAAABBBBBBBBBBCCCC".to_vec());
    assert_eq!(overlap_run(ReassemblyPolicy::First).0, first);

    let (last, _) = overlap_run(ReassemblyPolicy::Last);
    assert_eq!(last, b"AAAAAAAAAABBBBCCCCCCCCCC".to_vec());
    assert_eq!(overlap_run(ReassemblyPolicy::Last).0, last);
}

#[test]
fn core_session_excessive_overlaps() {
    let mut ssn = session_with(|c| c.overlap_limit = 1);
    let mut out = vec![];
    handshake(&mut ssn, &mut out);

    ssn.process(&seg(CLIENT, 111, 501, ACK, &[1; 10]), &mut out);
    let outcome = ssn.process(&seg(CLIENT, 115, 501, ACK, &[1; 4]), &mut out);
    assert!(!outcome.has_alert(TcpAlert::ExcessiveOverlaps));
    let outcome = ssn.process(&seg(CLIENT, 113, 501, ACK, &[1; 4]), &mut out);
    assert!(outcome.has_alert(TcpAlert::ExcessiveOverlaps));
}

#[test]
fn core_session_midstream_pickup() {
    let mut ssn = session();
    let mut out = vec![];

    let outcome = ssn.process(&seg(CLIENT, 1000, 2000, ACK | PSH, b"hello"), &mut out);
    assert_eq!(outcome.flushed_bytes, 5);
    assert_eq!(client_bytes(&out), b"hello");
    assert!(ssn.flags().contains(SessionFlags::Midstream));
    assert_eq!(ssn.client().state(), ConnectionState::Established);
    assert_eq!(ssn.server().state(), ConnectionState::Established);
    assert_eq!(stats::snapshot().midstream_pickups, 1);

    ssn.process(&seg(SERVER, 2000, 1005, ACK | PSH, b"world"), &mut out);
    let last = out.last().map(|d| (d.dir, d.payload.clone()));
    assert_eq!(last, Some((SERVER, b"world".to_vec())));
}

#[test]
fn core_session_synack_pickup_orients_client() {
    let mut ssn = session();
    let mut out = vec![];

    ssn.process(&seg(SERVER, 500, 101, SYN | ACK, &[]), &mut out);
    assert_eq!(ssn.client_dir(), CLIENT);
    assert_eq!(ssn.server().state(), ConnectionState::SynRecv);
    assert_eq!(ssn.client().state(), ConnectionState::Established);

    ssn.process(&seg(CLIENT, 101, 501, ACK, b"req"), &mut out);
    assert_eq!(ssn.server().state(), ConnectionState::Established);
    assert_eq!(client_bytes(&out), b"req");
}

#[test]
fn core_session_require_3whs() {
    let mut ssn = session_with(|c| c.require_3whs = true);
    let mut out = vec![];

    let outcome = ssn.process(&seg(CLIENT, 1000, 2000, ACK, b"hello"), &mut out);
    assert!(outcome.has_alert(TcpAlert::No3whs));
    assert!(out.is_empty());

    ssn.process(&seg(CLIENT, 100, 0, SYN, &[]), &mut out);
    assert_eq!(ssn.client().state(), ConnectionState::SynSent);
}

#[test]
fn core_session_restart_after_reset() {
    let mut ssn = session();
    let mut out = vec![];
    handshake(&mut ssn, &mut out);
    ssn.process(&seg(SERVER, 501, 0, RST, &[]), &mut out);
    assert!(ssn.flags().contains(SessionFlags::Reset));

    let outcome = ssn.process(&seg(CLIENT, 9000, 0, SYN, &[]), &mut out);
    assert!(!outcome.torn_down);
    assert!(!ssn.flags().contains(SessionFlags::Reset));
    assert_eq!(ssn.client().state(), ConnectionState::SynSent);
    assert_eq!(ssn.server().state(), ConnectionState::SynRecv);
    assert_eq!(ssn.server().rcv_nxt(), 9001);
    assert_eq!(stats::snapshot().sessions_restarted, 1);
}

#[test]
fn core_session_repeated_syn() {
    let mut ssn = session();
    let mut out = vec![];
    handshake(&mut ssn, &mut out);

    // retransmitted original SYN
    let outcome = ssn.process(&seg(CLIENT, 100, 0, SYN, &[]), &mut out);
    assert!(!outcome.has_alert(TcpAlert::RepeatedSyn));

    let outcome = ssn.process(&seg(CLIENT, 150, 0, SYN, &[]), &mut out);
    assert!(outcome.has_alert(TcpAlert::RepeatedSyn));
    assert!(outcome.actions.contains(PacketAction::BadPkt));
    assert_eq!(ssn.server().state(), ConnectionState::Established);

    let mut ssn = session_with(|c| c.policy = ReassemblyPolicy::Windows);
    handshake(&mut ssn, &mut out);
    let outcome = ssn.process(&seg(CLIENT, 150, 0, SYN, &[]), &mut out);
    assert!(outcome.has_alert(TcpAlert::RepeatedSyn));
    assert!(outcome.actions.contains(PacketAction::Reset));
    assert_eq!(ssn.server().state(), ConnectionState::Closed);
}

#[test]
fn core_session_data_on_syn() {
    let mut ssn = session_with(|c| c.normalizer.trim_syn = true);
    let mut out = vec![];
    let outcome = ssn.process(&seg(CLIENT, 100, 0, SYN, b"payload"), &mut out);
    assert!(outcome.has_alert(TcpAlert::DataOnSyn));
    assert_eq!(outcome.trim_len, Some(0));
    assert!(out.is_empty());
}

#[test]
fn core_session_window_slam() {
    let mut ssn = session();
    let mut out = vec![];
    ssn.process(&seg(CLIENT, 100, 0, SYN, &[]), &mut out);
    ssn.process(&seg(SERVER, 500, 101, SYN | ACK, &[]), &mut out);

    let slam = SegmentDescriptor::new(CLIENT, 101, 501, ACK, 0, &[]);
    let outcome = ssn.process(&slam, &mut out);
    assert!(outcome.has_alert(TcpAlert::WindowSlam));
    assert!(outcome.actions.contains(PacketAction::BadPkt));
}

#[test]
fn core_session_hijack_detection() {
    let mut ssn = session_with(|c| c.check_session_hijacking = true);
    let mut out = vec![];
    let (a, b, c) = ([1u8; 6], [2u8; 6], [3u8; 6]);

    ssn.process(&seg(CLIENT, 100, 0, SYN, &[]).with_link_addrs(a, b), &mut out);
    ssn.process(
        &seg(SERVER, 500, 101, SYN | ACK, &[]).with_link_addrs(b, a),
        &mut out,
    );
    let outcome = ssn.process(&seg(CLIENT, 101, 501, ACK, &[]).with_link_addrs(a, b), &mut out);
    assert!(outcome.alerts.is_empty());

    let outcome = ssn.process(&seg(CLIENT, 101, 501, ACK, &[]).with_link_addrs(c, b), &mut out);
    assert!(outcome.has_alert(TcpAlert::SessionHijackClient));
    assert!(!outcome.has_alert(TcpAlert::SessionHijackServer));

    let outcome = ssn.process(&seg(SERVER, 501, 101, ACK, &[]).with_link_addrs(c, a), &mut out);
    assert!(outcome.has_alert(TcpAlert::SessionHijackServer));
}

#[test]
fn core_session_queue_limit_evicts() {
    let mut ssn = session_with(|c| c.max_queued_segs = 2);
    let mut out = vec![];
    handshake(&mut ssn, &mut out);

    ssn.process(&seg(CLIENT, 111, 501, ACK, &[1; 10]), &mut out);
    ssn.process(&seg(CLIENT, 131, 501, ACK, &[2; 10]), &mut out);
    assert!(out.is_empty());

    let outcome = ssn.process(&seg(CLIENT, 151, 501, ACK, &[3; 10]), &mut out);
    assert!(outcome.has_alert(TcpAlert::ReassemblyLimit));
    let seqs: Vec<u32> = out.iter().map(|d| d.seq).collect();
    assert_eq!(seqs, vec![111, 131]);
    assert_eq!(ssn.server().queued_segments(), 1);
    assert_eq!(stats::snapshot().queue_limit_hits, 1);
}

#[test]
fn core_session_queue_limit_terminates() {
    let mut ssn = session_with(|c| {
        c.max_queued_segs = 2;
        c.queue_limit_action = QueueLimitAction::Terminate;
    });
    let mut out = vec![];
    handshake(&mut ssn, &mut out);

    ssn.process(&seg(CLIENT, 111, 501, ACK, &[1; 10]), &mut out);
    ssn.process(&seg(CLIENT, 131, 501, ACK, &[2; 10]), &mut out);
    let outcome = ssn.process(&seg(CLIENT, 151, 501, ACK, &[3; 10]), &mut out);
    assert!(outcome.has_alert(TcpAlert::ReassemblyLimit));
    assert!(outcome.actions.contains(PacketAction::BadPkt));
    assert_eq!(ssn.server().queued_bytes(), 0);

    // connection is still tracked, its data is not
    ssn.process(&seg(CLIENT, 101, 501, ACK, &[0; 10]), &mut out);
    assert!(out.is_empty());
    assert_eq!(ssn.server().state(), ConnectionState::Established);
}

#[test]
fn core_session_flush_on_ack() {
    let mut ssn = session_with(|c| c.flush_policy = FlushPolicy::OnAck);
    let mut out = vec![];
    handshake(&mut ssn, &mut out);

    ssn.process(&seg(CLIENT, 101, 501, ACK, b"hello"), &mut out);
    assert!(out.is_empty());
    let outcome = ssn.process(&seg(SERVER, 501, 106, ACK, &[]), &mut out);
    assert_eq!(outcome.flushed_bytes, 5);
    assert_eq!(client_bytes(&out), b"hello");

    // acknowledged data the sensor never saw is skipped
    ssn.process(&seg(CLIENT, 116, 501, ACK, b"world"), &mut out);
    ssn.process(&seg(SERVER, 501, 121, ACK, &[]), &mut out);
    assert_eq!(client_bytes(&out), b"helloworld");
    assert_eq!(out.last().map(|d| d.seq), Some(116));
}

#[test]
fn core_session_explicit_flush_and_cleanup() {
    let mut ssn = session_with(|c| c.flush_policy = FlushPolicy::OnAck);
    let mut out = vec![];
    handshake(&mut ssn, &mut out);

    ssn.process(&seg(CLIENT, 101, 501, ACK, &[1; 10]), &mut out);
    ssn.process(&seg(CLIENT, 121, 501, ACK, &[2; 10]), &mut out);
    ssn.process(&seg(SERVER, 501, 101, ACK, b"resp"), &mut out);
    assert!(out.is_empty());

    let mut seen = 0;
    let delivered = ssn.flush_listener(SERVER, &mut InspectFn(|d: FlushedData| seen += d.payload.len()));
    assert_eq!(delivered, 4);
    assert_eq!(seen, 4);

    let mut surfaced: Vec<FlushedData> = vec![];
    let report = ssn.cleanup_session(Some(&mut surfaced));
    assert_eq!(
        report,
        CleanupReport {
            flushed_bytes: 10,
            discarded_bytes: 10
        }
    );
    assert_eq!(client_bytes(&surfaced), vec![1; 10]);
    assert!(ssn.is_closed());
    assert_eq!(ssn.cleanup_session(None), CleanupReport::default());
}

#[test]
fn core_session_ignore_data() {
    let mut ssn = session();
    let mut out = vec![];
    handshake(&mut ssn, &mut out);

    ssn.ignore_data(CLIENT);
    ssn.process(&seg(CLIENT, 101, 501, ACK, b"skipped"), &mut out);
    assert!(out.is_empty());
    ssn.process(&seg(SERVER, 501, 108, ACK, b"kept"), &mut out);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].dir, SERVER);
}

#[test]
fn core_session_data_after_fin() {
    let mut ssn = session();
    let mut out = vec![];
    handshake(&mut ssn, &mut out);

    ssn.process(&seg(CLIENT, 101, 501, FIN | ACK, &[]), &mut out);
    let outcome = ssn.process(&seg(CLIENT, 102, 501, ACK, b"late"), &mut out);
    assert!(outcome.has_alert(TcpAlert::DataAfterFin));
    assert!(out.is_empty());
}

#[test]
fn core_session_idle() {
    let mut ssn = session_with(|c| c.idle_timeout_secs = 10);
    let mut out = vec![];
    let syn = seg(CLIENT, 100, 0, SYN, &[]).with_time(Duration::from_secs(100));
    ssn.process(&syn, &mut out);
    assert!(!ssn.is_idle(Duration::from_secs(105)));
    assert!(ssn.is_idle(Duration::from_secs(111)));
}

#[test]
fn core_session_simultaneous_open() {
    let mut ssn = session();
    let mut out = vec![];

    ssn.process(&seg(CLIENT, 100, 0, SYN, &[]), &mut out);
    let outcome = ssn.process(&seg(SERVER, 500, 0, SYN, &[]), &mut out);
    assert!(outcome.alerts.is_empty());
    assert_eq!(ssn.client().state(), ConnectionState::SynRecv);
    assert_eq!(ssn.server().state(), ConnectionState::SynRecv);

    let outcome = ssn.process(&seg(CLIENT, 100, 501, SYN | ACK, &[]), &mut out);
    assert!(outcome.alerts.is_empty());
    assert!(!outcome.actions.contains(PacketAction::BadPkt));
    assert_eq!(ssn.server().state(), ConnectionState::Established);

    let outcome = ssn.process(&seg(SERVER, 500, 101, SYN | ACK, &[]), &mut out);
    assert!(outcome.alerts.is_empty());
    assert_eq!(ssn.client().state(), ConnectionState::Established);

    let outcome = ssn.process(&seg(CLIENT, 101, 501, ACK, &[]), &mut out);
    assert!(outcome.alerts.is_empty());
    assert!(ssn.flags().contains(SessionFlags::Established));
    assert!(!ssn.flags().contains(SessionFlags::Midstream));

    ssn.process(&seg(CLIENT, 101, 501, ACK | PSH, b"both"), &mut out);
    assert_eq!(client_bytes(&out), b"both");
}

#[test]
fn core_session_resyn_with_lower_isn() {
    let mut ssn = session();
    let mut out = vec![];

    ssn.process(&seg(CLIENT, 100, 0, SYN, &[]), &mut out);
    ssn.process(&seg(CLIENT, 50, 0, SYN, &[]), &mut out);
    assert_eq!(ssn.server().rcv_nxt(), 51);
    ssn.process(&seg(SERVER, 500, 51, SYN | ACK, &[]), &mut out);
    ssn.process(&seg(CLIENT, 51, 501, ACK, &[]), &mut out);
    assert_eq!(ssn.server().state(), ConnectionState::Established);

    let data = [9u8; 60];
    let outcome = ssn.process(&seg(CLIENT, 51, 501, ACK | PSH, &data), &mut out);
    assert!(outcome.alerts.is_empty());
    assert_eq!(outcome.flushed_bytes, 60);
    assert_eq!(client_bytes(&out), data.to_vec());
    assert_eq!(ssn.server().rcv_nxt(), 111);
}

#[test]
fn core_session_time_wait_rejects_fin_beyond_final() {
    let mut ssn = session();
    let mut out = vec![];
    handshake(&mut ssn, &mut out);
    ssn.process(&seg(CLIENT, 101, 501, FIN | ACK, &[]), &mut out);
    ssn.process(&seg(SERVER, 501, 102, FIN | ACK, &[]), &mut out);
    ssn.process(&seg(CLIENT, 102, 502, ACK, &[]), &mut out);
    assert_eq!(ssn.server().state(), ConnectionState::TimeWait);

    let outcome = ssn.process(&seg(CLIENT, 150, 502, FIN | ACK, &[]), &mut out);
    assert!(outcome.has_alert(TcpAlert::BadFin));
    assert!(outcome.actions.contains(PacketAction::BadPkt));
    assert!(!outcome.torn_down);
    assert!(!ssn.is_closed());
    assert_eq!(ssn.server().fin_final_seq(), Some(101));
}

#[test]
fn core_session_crossing_fins() {
    let mut ssn = session();
    let mut out = vec![];
    handshake(&mut ssn, &mut out);

    ssn.process(&seg(CLIENT, 101, 501, FIN | ACK, &[]), &mut out);
    assert_eq!(ssn.client().state(), ConnectionState::FinWait1);

    // the server's FIN does not acknowledge the client's
    let outcome = ssn.process(&seg(SERVER, 501, 101, FIN | ACK, &[]), &mut out);
    assert!(outcome.alerts.is_empty());
    assert_eq!(ssn.client().state(), ConnectionState::Closing);
    assert_eq!(ssn.server().state(), ConnectionState::LastAck);

    ssn.process(&seg(SERVER, 502, 102, ACK, &[]), &mut out);
    assert_eq!(ssn.client().state(), ConnectionState::TimeWait);

    let outcome = ssn.process(&seg(CLIENT, 102, 502, ACK, &[]), &mut out);
    assert!(!outcome.torn_down);
    assert_eq!(ssn.server().state(), ConnectionState::TimeWait);

    let outcome = ssn.process(&seg(CLIENT, 102, 502, ACK, &[]), &mut out);
    assert!(outcome.torn_down);
    assert!(ssn.is_closed());
}

#[test]
fn core_session_window_reopen_slam() {
    let mut ssn = session_with(|c| c.max_window_reopens = 2);
    let mut out = vec![];
    handshake(&mut ssn, &mut out);

    let closed = SegmentDescriptor::new(SERVER, 501, 101, ACK, 0, &[]);
    let open = SegmentDescriptor::new(SERVER, 501, 101, ACK, 1024, &[]);
    for _ in 0..2 {
        ssn.process(&closed, &mut out);
        let outcome = ssn.process(&open, &mut out);
        assert!(outcome.alerts.is_empty());
    }
    ssn.process(&closed, &mut out);
    let outcome = ssn.process(&open, &mut out);
    assert!(outcome.has_alert(TcpAlert::WindowSlam));
    assert!(outcome.actions.contains(PacketAction::BadPkt));
}

#[test]
fn core_session_window_too_large() {
    let mut ssn = session_with(|c| c.max_window = 2048);
    let mut out = vec![];
    handshake(&mut ssn, &mut out);

    let wide = SegmentDescriptor::new(CLIENT, 101, 501, ACK, 4096, &[]);
    let outcome = ssn.process(&wide, &mut out);
    assert!(outcome.has_alert(TcpAlert::WindowTooLarge));
    assert!(outcome.actions.contains(PacketAction::BadPkt));
}

#[test]
fn core_session_reports_discarded_bytes() {
    let mut ssn = session();
    let mut out = vec![];
    handshake(&mut ssn, &mut out);

    // hole at 101..111
    let outcome = ssn.process(&seg(CLIENT, 111, 501, ACK, &[5; 10]), &mut out);
    assert_eq!(outcome.discarded_bytes, 0);
    assert_eq!(ssn.server().queued_bytes(), 10);

    let outcome = ssn.process(&seg(SERVER, 501, 0, RST, &[]), &mut out);
    assert!(outcome.actions.contains(PacketAction::Reset));
    assert_eq!(outcome.discarded_bytes, 10);
    assert_eq!(outcome.flushed_bytes, 0);
    assert_eq!(stats::snapshot().bytes_discarded, 10);
}
