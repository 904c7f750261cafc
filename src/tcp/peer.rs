//! One endpoint of a TCP connection.

use crate::reassembler::Reassembler;
use crate::stream::{ByteStream, Reader, Writer};
use crate::tcp::{Config, Message, TcpReceiver, TcpSender};

/// A sender and a receiver run as one full-duplex connection.
///
/// The peer forwards the sender half of every incoming [`Message`] to its
/// receiver and the receiver half to its sender, piggybacks the local
/// acknowledgment on every outgoing segment, and answers segments that
/// occupy sequence space even when it has nothing to say itself.
#[derive(Debug)]
pub struct TcpPeer {
    config: Config,
    sender: TcpSender,
    receiver: TcpReceiver,
    need_send: bool,
    // After both streams finish, the active closer hangs around long enough
    // to re-ack a retransmitted FIN.
    linger_after_finish: bool,
    cumulative_time_ms: u64,
    last_receipt_ms: u64,
}

impl TcpPeer {
    pub fn new(config: Config) -> TcpPeer {
        TcpPeer {
            config,
            sender: TcpSender::new(
                ByteStream::new(config.send_capacity),
                config.isn,
                config.rt_timeout,
            ),
            receiver: TcpReceiver::new(Reassembler::new(ByteStream::new(config.recv_capacity))),
            need_send: false,
            linger_after_finish: true,
            cumulative_time_ms: 0,
            last_receipt_ms: 0,
        }
    }

    /// Write end of the outbound stream.
    pub fn outbound_writer(&mut self) -> Writer<'_> {
        self.sender.writer()
    }

    /// Read end of the inbound stream.
    pub fn inbound_reader(&mut self) -> Reader<'_> {
        self.receiver.reader()
    }

    /// Has the receiver seen the peer's SYN yet?
    pub fn has_ackno(&self) -> bool {
        self.receiver.send().ackno.is_some()
    }

    /// Is the connection still doing useful work?
    pub fn active(&self) -> bool {
        let any_errors = self.receiver.stream().has_error() || self.sender.stream().has_error();
        let sender_active = self.sender.sequence_numbers_in_flight() > 0
            || !self.sender.stream().is_finished();
        let receiver_active = !self.receiver.stream().is_closed();
        let lingering = self.linger_after_finish
            && self.cumulative_time_ms < self.last_receipt_ms + 10 * self.config.rt_timeout;

        !any_errors && (sender_active || receiver_active || lingering)
    }

    /// Let the sender fill the peer's window from the outbound stream.
    pub fn push(&mut self, mut transmit: impl FnMut(Message)) {
        let receiver = &self.receiver;
        let need_send = &mut self.need_send;
        self.sender.push(|sender_message| {
            transmit(Message {
                sender: sender_message.clone(),
                receiver: receiver.send(),
            });
            *need_send = false;
        });
    }

    /// Advance time; drives the sender's retransmission timer.
    pub fn tick(&mut self, ms_since_last_tick: u64, mut transmit: impl FnMut(Message)) {
        self.cumulative_time_ms += ms_since_last_tick;
        let receiver = &self.receiver;
        let need_send = &mut self.need_send;
        self.sender.tick(ms_since_last_tick, |sender_message| {
            transmit(Message {
                sender: sender_message.clone(),
                receiver: receiver.send(),
            });
            *need_send = false;
        });
    }

    /// Process one segment from the peer, transmitting whatever it provokes.
    pub fn receive(&mut self, message: Message, mut transmit: impl FnMut(Message)) {
        if !self.active() {
            return;
        }
        self.last_receipt_ms = self.cumulative_time_ms;

        // Segments that occupy sequence space always get an answer, as do
        // keep-alive probes one below our ackno.
        self.need_send |= message.sender.sequence_length() > 0;
        let our_ackno = self.receiver.send().ackno;
        self.need_send |= our_ackno.is_some_and(|ackno| message.sender.seqno + 1 == ackno);

        // The passive closer need not linger: its FIN was acked by the
        // peer's own FIN exchange.
        if self.receiver.stream().is_closed() && !self.sender.stream().is_finished() {
            self.linger_after_finish = false;
        }

        self.receiver.receive(message.sender);
        self.sender.receive(&message.receiver);

        self.push(&mut transmit);
        if self.need_send {
            transmit(Message {
                sender: self.sender.make_empty_message(),
                receiver: self.receiver.send(),
            });
            self.need_send = false;
        }
    }

    pub fn sender(&self) -> &TcpSender {
        &self.sender
    }

    pub fn receiver(&self) -> &TcpReceiver {
        &self.receiver
    }
}
