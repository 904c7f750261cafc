//! TCP protocol logic: sequence numbers, sender, receiver, and glue.
//!
//! The sender and receiver halves are independent state machines exchanging
//! [`SenderMessage`]s one way and [`ReceiverMessage`]s the other. A
//! [`TcpPeer`] pairs one of each into a full-duplex connection; a
//! [`over_ip::TcpOverIp`] adapter maps the paired [`Message`] onto IPv4
//! datagrams.

pub mod over_ip;
pub mod peer;
pub mod receiver;
pub mod sender;
pub mod seqno;

pub use peer::TcpPeer;
pub use receiver::TcpReceiver;
pub use sender::TcpSender;
pub use seqno::Wrap32;

/// Per-segment payload cap, a conservative fit for real-world MTUs.
pub const MAX_PAYLOAD_SIZE: usize = 1000;

/// Consecutive retransmissions after which a connection counts as failed.
pub const MAX_RETX_ATTEMPTS: u64 = 8;

/// Default capacity of the inbound and outbound byte streams.
pub const DEFAULT_CAPACITY: usize = 64000;

/// Default initial retransmission timeout, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Everything a sender tells its peer's receiver.
///
/// `seqno` is the sequence number of the SYN flag if present, otherwise of
/// the first payload byte. SYN and FIN each occupy one sequence number; RST
/// signals a fatal stream error.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SenderMessage {
    pub seqno: Wrap32,
    pub syn: bool,
    pub payload: Vec<u8>,
    pub fin: bool,
    pub rst: bool,
}

impl SenderMessage {
    /// Number of sequence numbers the message occupies.
    pub fn sequence_length(&self) -> u64 {
        self.syn as u64 + self.payload.len() as u64 + self.fin as u64
    }
}

/// Everything a receiver tells its peer's sender.
///
/// `ackno` is the next sequence number the receiver needs, absent until the
/// initial SYN has arrived. `window_size` is how many further sequence
/// numbers the receiver is willing to buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReceiverMessage {
    pub ackno: Option<Wrap32>,
    pub window_size: u16,
    pub rst: bool,
}

/// One segment's worth of information in both directions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    pub sender: SenderMessage,
    pub receiver: ReceiverMessage,
}

/// Connection parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Initial retransmission timeout, in milliseconds.
    pub rt_timeout: u64,
    /// Capacity of the inbound stream.
    pub recv_capacity: usize,
    /// Capacity of the outbound stream.
    pub send_capacity: usize,
    /// Initial sequence number.
    pub isn: Wrap32,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            rt_timeout: DEFAULT_TIMEOUT_MS,
            recv_capacity: DEFAULT_CAPACITY,
            send_capacity: DEFAULT_CAPACITY,
            isn: Wrap32::new(137),
        }
    }
}

impl Config {
    /// The default configuration with a freshly drawn random ISN.
    pub fn with_random_isn() -> Config {
        Config {
            isn: Wrap32::new(rand::random()),
            ..Config::default()
        }
    }
}
