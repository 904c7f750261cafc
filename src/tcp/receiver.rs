//! The receiving half of a TCP connection.

use crate::reassembler::Reassembler;
use crate::stream::{ByteStream, Reader};
use crate::tcp::{ReceiverMessage, SenderMessage, Wrap32};

/// Consumes a peer sender's segments and produces acknowledgments.
///
/// The receiver pins the connection's zero point to the first SYN it sees,
/// translates each segment's sequence number into a stream index, and feeds
/// the payload to its [`Reassembler`]. [`TcpReceiver::send`] reports the next
/// needed sequence number and how much more the receiver can buffer.
#[derive(Debug)]
pub struct TcpReceiver {
    reassembler: Reassembler,
    isn: Option<Wrap32>,
}

impl TcpReceiver {
    pub fn new(reassembler: Reassembler) -> TcpReceiver {
        TcpReceiver {
            reassembler,
            isn: None,
        }
    }

    /// Process one segment from the peer.
    pub fn receive(&mut self, message: SenderMessage) {
        if self.reassembler.stream().has_error() {
            return;
        }
        if message.rst {
            net_debug!("receiver: peer reset the connection");
            self.reassembler.stream_mut().set_error();
            return;
        }

        let isn = match self.isn {
            Some(isn) => isn,
            None => {
                if !message.syn {
                    // Nothing can be placed before the handshake.
                    return;
                }
                self.isn = Some(message.seqno);
                message.seqno
            }
        };

        // The checkpoint is the last reassembled position in sequence space;
        // the +1 accounts for the SYN.
        let checkpoint = self.reassembler.stream().bytes_pushed() + 1;
        let absseq = message.seqno.unwrap(isn, checkpoint);
        let stream_index = if message.syn {
            0
        } else if absseq == 0 {
            // A data byte cannot occupy the ISN's slot.
            return;
        } else {
            absseq - 1
        };

        self.reassembler
            .insert(stream_index, &message.payload, message.fin);
    }

    /// The acknowledgment to piggyback on the next outgoing segment.
    pub fn send(&self) -> ReceiverMessage {
        let stream = self.reassembler.stream();
        let ackno = self.isn.map(|isn| {
            // SYN occupies one sequence number; so does FIN once the stream
            // has closed.
            let absseq = stream.bytes_pushed() + 1 + stream.is_closed() as u64;
            Wrap32::wrap(absseq, isn)
        });
        ReceiverMessage {
            ackno,
            window_size: stream.available_capacity().min(u16::MAX as usize) as u16,
            rst: stream.has_error(),
        }
    }

    pub fn reassembler(&self) -> &Reassembler {
        &self.reassembler
    }

    /// The reassembled inbound stream.
    pub fn stream(&self) -> &ByteStream {
        self.reassembler.stream()
    }

    pub fn stream_mut(&mut self) -> &mut ByteStream {
        self.reassembler.stream_mut()
    }

    /// Read end of the inbound stream.
    pub fn reader(&mut self) -> Reader<'_> {
        self.reassembler.reader()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stream::read;

    fn receiver(capacity: usize) -> TcpReceiver {
        TcpReceiver::new(Reassembler::new(ByteStream::new(capacity)))
    }

    fn segment(seqno: Wrap32, payload: &[u8]) -> SenderMessage {
        SenderMessage {
            seqno,
            payload: payload.to_vec(),
            ..SenderMessage::default()
        }
    }

    #[test]
    fn no_ackno_before_syn() {
        let mut recv = receiver(4000);
        assert_eq!(recv.send().ackno, None);
        assert_eq!(recv.send().window_size, 4000);

        // Data before the handshake goes nowhere.
        recv.receive(segment(Wrap32::new(100), b"hello"));
        assert_eq!(recv.send().ackno, None);
        assert_eq!(recv.stream().bytes_pushed(), 0);
    }

    #[test]
    fn syn_pins_the_isn() {
        let isn = Wrap32::new(10_000);
        let mut recv = receiver(4000);
        recv.receive(SenderMessage {
            seqno: isn,
            syn: true,
            ..SenderMessage::default()
        });
        assert_eq!(recv.send().ackno, Some(isn + 1));
    }

    #[test]
    fn in_order_data_advances_ackno() {
        let isn = Wrap32::new(5);
        let mut recv = receiver(4000);
        recv.receive(SenderMessage {
            seqno: isn,
            syn: true,
            payload: b"abc".to_vec(),
            ..SenderMessage::default()
        });
        recv.receive(segment(isn + 4, b"defg"));
        assert_eq!(recv.send().ackno, Some(isn + 8));

        let mut out = Vec::new();
        read(&mut recv.reader(), 16, &mut out);
        assert_eq!(out, b"abcdefg");
    }

    #[test]
    fn out_of_order_data_waits() {
        let isn = Wrap32::new(0);
        let mut recv = receiver(4000);
        recv.receive(SenderMessage {
            seqno: isn,
            syn: true,
            ..SenderMessage::default()
        });
        recv.receive(segment(isn + 4, b"def"));
        assert_eq!(recv.send().ackno, Some(isn + 1));
        assert_eq!(recv.reassembler().bytes_pending(), 3);

        recv.receive(segment(isn + 1, b"abc"));
        assert_eq!(recv.send().ackno, Some(isn + 7));
    }

    #[test]
    fn fin_occupies_a_sequence_number() {
        let isn = Wrap32::new(42);
        let mut recv = receiver(4000);
        recv.receive(SenderMessage {
            seqno: isn,
            syn: true,
            ..SenderMessage::default()
        });
        recv.receive(SenderMessage {
            seqno: isn + 1,
            payload: b"bye".to_vec(),
            fin: true,
            ..SenderMessage::default()
        });
        assert!(recv.stream().is_closed());
        assert_eq!(recv.send().ackno, Some(isn + 5));
    }

    #[test]
    fn window_is_clamped_to_u16() {
        let recv = receiver(100_000);
        assert_eq!(recv.send().window_size, u16::MAX);
    }

    #[test]
    fn window_shrinks_with_buffered_bytes() {
        let isn = Wrap32::new(0);
        let mut recv = receiver(10);
        recv.receive(SenderMessage {
            seqno: isn,
            syn: true,
            payload: b"abcd".to_vec(),
            ..SenderMessage::default()
        });
        assert_eq!(recv.send().window_size, 6);
    }

    #[test]
    fn rst_marks_the_stream() {
        let mut recv = receiver(4000);
        recv.receive(SenderMessage {
            seqno: Wrap32::new(0),
            rst: true,
            ..SenderMessage::default()
        });
        assert!(recv.stream().has_error());
        assert!(recv.send().rst);

        // Later segments are ignored.
        recv.receive(SenderMessage {
            seqno: Wrap32::new(0),
            syn: true,
            ..SenderMessage::default()
        });
        assert_eq!(recv.send().ackno, None);
    }
}
