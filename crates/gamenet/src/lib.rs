pub mod config;
pub mod error;
pub mod event;
pub mod net;
pub mod reliability;
pub mod session;
pub mod unreliable;

pub use config::{ConfigError, ReliabilityConfig};
pub use error::{Result, SessionError};
pub use event::{ArrivalMetadata, Delivery, SessionEvent};
pub use net::{
    ChannelType, Clock, EncodingError, Frame, MalformedFrame, ManualClock, MemoryTransport,
    SessionStats, SystemClock, Transport, UdpTransport,
};
pub use reliability::{DeliveryFailure, ReliableReceiver, ReliableSender, RttEstimator};
pub use session::Session;
pub use unreliable::UnreliableChannel;
