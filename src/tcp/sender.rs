//! The sending half of a TCP connection.

use std::collections::VecDeque;

use crate::stream::{self, ByteStream, Writer};
use crate::tcp::{ReceiverMessage, SenderMessage, Wrap32, MAX_PAYLOAD_SIZE};

/// The sender's single retransmission timer.
///
/// The timer measures wall-clock time fed in through `tick` and expires when
/// the accumulated time reaches the current retransmission timeout. Backoff
/// doubles the timeout in place; `reload` restores the initial one.
#[derive(Debug)]
pub struct RetransmissionTimer {
    rto_ms: u64,
    elapsed_ms: u64,
    active: bool,
}

impl RetransmissionTimer {
    pub fn new(initial_rto_ms: u64) -> RetransmissionTimer {
        RetransmissionTimer {
            rto_ms: initial_rto_ms,
            elapsed_ms: 0,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_expired(&self) -> bool {
        self.active && self.elapsed_ms >= self.rto_ms
    }

    /// Restart the elapsed count, keeping the current timeout.
    pub fn reset(&mut self) {
        self.elapsed_ms = 0;
    }

    /// Double the timeout.
    pub fn backoff(&mut self) {
        self.rto_ms <<= 1;
    }

    /// Restore the initial timeout and restart.
    pub fn reload(&mut self, initial_rto_ms: u64) {
        self.rto_ms = initial_rto_ms;
        self.reset();
    }

    pub fn start(&mut self) {
        self.active = true;
        self.reset();
    }

    pub fn stop(&mut self) {
        self.active = false;
        self.reset();
    }

    /// Advance the timer; no-op while stopped.
    pub fn tick(&mut self, ms_since_last_tick: u64) -> &mut RetransmissionTimer {
        if self.active {
            self.elapsed_ms += ms_since_last_tick;
        }
        self
    }
}

/// Slices an outgoing byte stream into segments and sees them through.
///
/// Segments are transmitted through the callback handed to [`push`] and
/// [`tick`] and retained in FIFO order until their whole sequence range is
/// acknowledged. On timeout the oldest outstanding segment is retransmitted
/// verbatim; each retransmission under a non-zero window doubles the timeout.
///
/// [`push`]: TcpSender::push
/// [`tick`]: TcpSender::tick
#[derive(Debug)]
pub struct TcpSender {
    input: ByteStream,
    isn: Wrap32,
    initial_rto_ms: u64,

    timer: RetransmissionTimer,
    syn_sent: bool,
    fin_sent: bool,
    seqnos_in_flight: u64,
    retransmissions: u64,

    // The window starts at one so the initial SYN goes out unprompted.
    window_size: u16,
    next_absseq: u64,
    ack_absseq: u64,
    outstanding: VecDeque<SenderMessage>,
}

impl TcpSender {
    pub fn new(input: ByteStream, isn: Wrap32, initial_rto_ms: u64) -> TcpSender {
        TcpSender {
            input,
            isn,
            initial_rto_ms,
            timer: RetransmissionTimer::new(initial_rto_ms),
            syn_sent: false,
            fin_sent: false,
            seqnos_in_flight: 0,
            retransmissions: 0,
            window_size: 1,
            next_absseq: 0,
            ack_absseq: 0,
            outstanding: VecDeque::new(),
        }
    }

    /// Fill the peer's window with segments from the outgoing stream.
    ///
    /// A zero window is treated as one so a single byte keeps probing for a
    /// reopening.
    pub fn push(&mut self, mut transmit: impl FnMut(&SenderMessage)) {
        let window = u64::from(self.window_size).max(1);
        while window > self.seqnos_in_flight && !self.fin_sent {
            let mut message = self.make_empty_message();
            if !self.syn_sent {
                message.syn = true;
                self.syn_sent = true;
            }

            let remaining = window - self.seqnos_in_flight;
            let limit = MAX_PAYLOAD_SIZE.min((remaining - message.sequence_length()) as usize);
            stream::read(&mut self.input.reader(), limit, &mut message.payload);

            if !self.fin_sent
                && remaining > message.sequence_length()
                && self.input.is_finished()
            {
                message.fin = true;
                self.fin_sent = true;
            }

            if message.sequence_length() == 0 {
                break;
            }

            transmit(&message);
            if !self.timer.is_active() {
                self.timer.start();
            }
            self.next_absseq += message.sequence_length();
            self.seqnos_in_flight += message.sequence_length();
            self.outstanding.push_back(message);
        }
    }

    /// A zero-length message at the current sequence number, for acks.
    pub fn make_empty_message(&self) -> SenderMessage {
        SenderMessage {
            seqno: Wrap32::wrap(self.next_absseq, self.isn),
            rst: self.input.has_error(),
            ..SenderMessage::default()
        }
    }

    /// Process a window update and acknowledgment from the peer.
    pub fn receive(&mut self, message: &ReceiverMessage) {
        if self.input.has_error() {
            return;
        }
        if message.rst {
            net_debug!("sender: peer reset the connection");
            self.input.set_error();
            return;
        }

        self.window_size = message.window_size;
        let Some(ackno) = message.ackno else {
            return;
        };

        let recv_ack = ackno.unwrap(self.isn, self.next_absseq);
        if recv_ack > self.next_absseq {
            // Acknowledges something never sent.
            return;
        }

        let mut progressed = false;
        while let Some(front) = self.outstanding.front() {
            let length = front.sequence_length();
            if self.ack_absseq + length > recv_ack {
                break;
            }
            self.ack_absseq += length;
            self.seqnos_in_flight -= length;
            self.outstanding.pop_front();
            progressed = true;
        }

        if progressed {
            self.retransmissions = 0;
            self.timer.reload(self.initial_rto_ms);
            if self.outstanding.is_empty() {
                self.timer.stop();
            } else {
                self.timer.start();
            }
        }
    }

    /// Advance time by `ms_since_last_tick` milliseconds.
    ///
    /// On expiry the oldest outstanding segment is retransmitted. The timeout
    /// only backs off (and the retransmission only counts) when the window is
    /// non-zero; a zero window means the retransmission is a probe, not a
    /// congestion signal.
    pub fn tick(&mut self, ms_since_last_tick: u64, mut transmit: impl FnMut(&SenderMessage)) {
        if !self.timer.tick(ms_since_last_tick).is_expired() {
            return;
        }
        let Some(front) = self.outstanding.front() else {
            return;
        };
        net_trace!("sender: retransmitting seqno {}", front.seqno);
        transmit(front);
        if self.window_size != 0 {
            self.retransmissions += 1;
            self.timer.backoff();
        }
        self.timer.reset();
    }

    /// Sum of the sequence lengths of all outstanding segments.
    pub fn sequence_numbers_in_flight(&self) -> u64 {
        self.seqnos_in_flight
    }

    /// Retransmissions since the last acknowledged progress.
    pub fn consecutive_retransmissions(&self) -> u64 {
        self.retransmissions
    }

    /// The outgoing stream.
    pub fn stream(&self) -> &ByteStream {
        &self.input
    }

    pub fn stream_mut(&mut self) -> &mut ByteStream {
        &mut self.input
    }

    /// Write end of the outgoing stream.
    pub fn writer(&mut self) -> Writer<'_> {
        self.input.writer()
    }
}
