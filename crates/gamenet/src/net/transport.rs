use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::rc::Rc;

/// Largest payload a UDP datagram can carry over IPv4.
pub const RECV_BUFFER_SIZE: usize = 65_507;

/// Non-blocking datagram pipe to exactly one peer.
///
/// Every `send` writes one whole datagram, so frames from the reliable and
/// unreliable channels never interleave on the wire.
pub trait Transport {
    fn send(&self, datagram: &[u8]) -> io::Result<usize>;

    /// Returns `Ok(None)` when nothing is waiting.
    fn recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>>;
}

pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
    peer_addr: SocketAddr,
}

impl UdpTransport {
    pub fn bind<A: ToSocketAddrs>(addr: A, peer_addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            peer_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn set_peer(&mut self, addr: SocketAddr) {
        self.peer_addr = addr;
    }
}

impl Transport for UdpTransport {
    fn send(&self, datagram: &[u8]) -> io::Result<usize> {
        self.socket.send_to(datagram, self.peer_addr)
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        loop {
            match self.socket.recv_from(buf) {
                Ok((size, addr)) if addr == self.peer_addr => return Ok(Some(size)),
                Ok((_, addr)) => {
                    log::trace!("Ignoring datagram from unknown peer {}", addr);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                // ICMP port unreachable from a peer that is not up yet
                Err(ref e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
                    ) =>
                {
                    log::debug!("Peer {} unreachable: {}", self.peer_addr, e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

type DropFilter = Box<dyn FnMut(&[u8]) -> bool>;

/// In-process transport. Two ends created by [`MemoryTransport::pair`]
/// deliver to each other in send order.
pub struct MemoryTransport {
    inbox: Rc<RefCell<VecDeque<Vec<u8>>>>,
    outbox: Rc<RefCell<VecDeque<Vec<u8>>>>,
    drop_filter: RefCell<Option<DropFilter>>,
    sent: RefCell<Vec<Vec<u8>>>,
}

impl MemoryTransport {
    pub fn pair() -> (Self, Self) {
        let a_to_b = Rc::new(RefCell::new(VecDeque::new()));
        let b_to_a = Rc::new(RefCell::new(VecDeque::new()));

        let a = Self::new(Rc::clone(&b_to_a), Rc::clone(&a_to_b));
        let b = Self::new(a_to_b, b_to_a);
        (a, b)
    }

    /// An endpoint whose outgoing datagrams go nowhere but are recorded.
    pub fn detached() -> Self {
        Self::new(
            Rc::new(RefCell::new(VecDeque::new())),
            Rc::new(RefCell::new(VecDeque::new())),
        )
    }

    fn new(inbox: Rc<RefCell<VecDeque<Vec<u8>>>>, outbox: Rc<RefCell<VecDeque<Vec<u8>>>>) -> Self {
        Self {
            inbox,
            outbox,
            drop_filter: RefCell::new(None),
            sent: RefCell::new(Vec::new()),
        }
    }

    /// Outgoing datagrams for which `filter` returns `true` are discarded.
    pub fn set_drop_filter<F>(&self, filter: F)
    where
        F: FnMut(&[u8]) -> bool + 'static,
    {
        *self.drop_filter.borrow_mut() = Some(Box::new(filter));
    }

    /// Places a datagram straight into this endpoint's receive queue.
    pub fn inject(&self, datagram: Vec<u8>) {
        self.inbox.borrow_mut().push_back(datagram);
    }

    /// Every datagram passed to `send`, including dropped ones.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.sent.borrow_mut())
    }

    pub fn pending_inbound(&self) -> usize {
        self.inbox.borrow().len()
    }
}

impl Transport for MemoryTransport {
    fn send(&self, datagram: &[u8]) -> io::Result<usize> {
        self.sent.borrow_mut().push(datagram.to_vec());

        let dropped = self
            .drop_filter
            .borrow_mut()
            .as_mut()
            .is_some_and(|filter| filter(datagram));
        if !dropped {
            self.outbox.borrow_mut().push_back(datagram.to_vec());
        }

        Ok(datagram.len())
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        let Some(datagram) = self.inbox.borrow_mut().pop_front() else {
            return Ok(None);
        };

        let size = datagram.len().min(buf.len());
        buf[..size].copy_from_slice(&datagram[..size]);
        Ok(Some(size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_pair_delivers_in_order() {
        let (a, b) = MemoryTransport::pair();
        a.send(b"one").unwrap();
        a.send(b"two").unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(b.recv(&mut buf).unwrap(), Some(3));
        assert_eq!(&buf[..3], b"one");
        assert_eq!(b.recv(&mut buf).unwrap(), Some(3));
        assert_eq!(&buf[..3], b"two");
        assert_eq!(b.recv(&mut buf).unwrap(), None);
        assert_eq!(a.recv(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_drop_filter_discards_but_records() {
        let (a, b) = MemoryTransport::pair();
        a.set_drop_filter(|datagram| datagram == b"lost");

        a.send(b"lost").unwrap();
        a.send(b"kept").unwrap();

        assert_eq!(b.pending_inbound(), 1);
        assert_eq!(a.take_sent().len(), 2);
    }

    #[test]
    fn test_udp_transport_filters_peer() {
        let a_addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut a = UdpTransport::bind(a_addr, a_addr).unwrap();
        let b = UdpTransport::bind("127.0.0.1:0", a.local_addr()).unwrap();
        let stranger = UdpTransport::bind("127.0.0.1:0", a.local_addr()).unwrap();
        a.set_peer(b.local_addr());

        stranger.send(b"noise").unwrap();
        b.send(b"hello").unwrap();

        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let start = std::time::Instant::now();
        let mut got = None;
        while start.elapsed() < std::time::Duration::from_millis(500) {
            if let Some(size) = a.recv(&mut buf).unwrap() {
                got = Some(buf[..size].to_vec());
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        assert_eq!(got.as_deref(), Some(&b"hello"[..]));
    }
}
