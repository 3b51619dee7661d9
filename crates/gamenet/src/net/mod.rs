mod clock;
mod frame;
mod stats;
mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use frame::{
    ACK_BODY_SIZE, ACK_MARKER, ChannelType, EncodingError, Frame, HEADER_SIZE, MAX_DATAGRAM_SIZE,
    MalformedFrame, ReliablePayload, ack_frame, decode, encode, sequence_greater_than,
    wire_timestamp,
};
pub use stats::SessionStats;
pub use transport::{MemoryTransport, RECV_BUFFER_SIZE, Transport, UdpTransport};
