mod receiver;
mod reorder;
mod rtt;
mod scheduler;
mod sender;

pub use receiver::{ArrivalKind, ReceiveOutcome, ReliableReceiver, SkipOutcome};
pub use reorder::{Arrival, BufferedPacket, ReadyPacket, ReorderBuffer, Skip};
pub use rtt::RttEstimator;
pub use scheduler::{RetransmissionScheduler, TimerHandle};
pub use sender::{AckOutcome, DeliveryFailure, InFlightPacket, ReliableSender, TimerOutcome};
