use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use gamenet::{ChannelType, Delivery, ReliabilityConfig, Session, UdpTransport};

static PORT_COUNTER: AtomicU16 = AtomicU16::new(41000);

fn next_port() -> u16 {
    PORT_COUNTER.fetch_add(10, Ordering::SeqCst)
}

fn bind_pair() -> (Session<UdpTransport>, Session<UdpTransport>) {
    let port = next_port();
    let a_addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
    let b_addr: SocketAddr = format!("127.0.0.1:{}", port + 1).parse().unwrap();

    let a = UdpTransport::bind(a_addr, b_addr).unwrap();
    let b = UdpTransport::bind(b_addr, a_addr).unwrap();

    (
        Session::new(a, ReliabilityConfig::default()).unwrap(),
        Session::new(b, ReliabilityConfig::default()).unwrap(),
    )
}

fn wait_for_deliveries(
    receiver: &mut Session<UdpTransport>,
    sender: &mut Session<UdpTransport>,
    count: usize,
    timeout_ms: u64,
) -> Vec<Delivery> {
    let start = Instant::now();
    let mut delivered = Vec::new();
    while start.elapsed() < Duration::from_millis(timeout_ms) && delivered.len() < count {
        receiver.poll().unwrap();
        sender.poll().unwrap();
        delivered.extend(receiver.drain_deliveries());
        thread::sleep(Duration::from_millis(1));
    }
    delivered
}

#[test]
fn test_reliable_over_loopback() {
    let (mut a, mut b) = bind_pair();

    for i in 0..20u8 {
        a.send_reliable(vec![i; 32]).unwrap();
    }

    let delivered = wait_for_deliveries(&mut b, &mut a, 20, 1_000);
    assert_eq!(delivered.len(), 20);
    for (i, delivery) in delivered.iter().enumerate() {
        assert_eq!(delivery.channel, ChannelType::Reliable);
        assert_eq!(delivery.metadata.sequence, i as u16);
        assert_eq!(delivery.payload, vec![i as u8; 32]);
    }

    let start = Instant::now();
    while a.in_flight_count() > 0 && start.elapsed() < Duration::from_millis(1_000) {
        a.poll().unwrap();
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(a.in_flight_count(), 0);
    assert!(a.stats().srtt_ms.is_some());
}

#[test]
fn test_channels_share_one_socket() {
    let (mut a, mut b) = bind_pair();

    a.send_unreliable(b"state".to_vec()).unwrap();
    a.send_reliable(b"event".to_vec()).unwrap();

    let delivered = wait_for_deliveries(&mut b, &mut a, 2, 1_000);
    let mut channels: Vec<_> = delivered.iter().map(|d| d.channel).collect();
    channels.sort_by_key(|c| c.as_byte());
    assert_eq!(channels, vec![ChannelType::Reliable, ChannelType::Unreliable]);
}
