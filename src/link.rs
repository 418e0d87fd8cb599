//! Point-to-point links between neighbouring stages.
//!
//! Each link carries two FIFO sub-channels, one per [`Tag`]. Order is kept per
//! tag only; the receiving side takes whichever sub-channel has data next.

use std::collections::VecDeque;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tracing::trace;

use crate::error::{Result, SortError};

/// Which of a stage's two queues an element belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    A,
    B,
}

impl Tag {
    pub fn flip(self) -> Tag {
        match self {
            Tag::A => Tag::B,
            Tag::B => Tag::A,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    Element(u8),
    EndOfStream,
}

/// Creates the link feeding stage `downstream`.
pub fn link(downstream: usize, capacity: Option<usize>) -> (Outlet, Inlet) {
    let channel = || match capacity {
        Some(cap) => crossbeam_channel::bounded(cap),
        None => crossbeam_channel::unbounded(),
    };
    let (a_tx, a_rx) = channel();
    let (b_tx, b_rx) = channel();
    let outlet = Outlet {
        from: downstream - 1,
        a: a_tx,
        b: b_tx,
    };
    let inlet = Inlet {
        stage: downstream,
        a: a_rx,
        b: b_rx,
        backlog: VecDeque::new(),
        ended: false,
        a_open: true,
        b_open: true,
    };
    (outlet, inlet)
}

/// Sending half of a link. Dropping it disconnects both sub-channels.
pub struct Outlet {
    from: usize,
    a: Sender<Message>,
    b: Sender<Message>,
}

impl Outlet {
    pub fn send(&self, tag: Tag, message: Message) -> Result<()> {
        let tx = match tag {
            Tag::A => &self.a,
            Tag::B => &self.b,
        };
        tx.send(message)
            .map_err(|_| SortError::LinkClosed { stage: self.from })
    }
}

/// Receiving half of a link.
pub struct Inlet {
    stage: usize,
    a: Receiver<Message>,
    b: Receiver<Message>,
    // Messages already delivered when end-of-stream arrived, end-of-stream last.
    backlog: VecDeque<(Tag, Message)>,
    ended: bool,
    // A sub-channel stays open until it is disconnected and empty.
    a_open: bool,
    b_open: bool,
}

impl Inlet {
    /// Blocks until a message is available on either sub-channel.
    ///
    /// End-of-stream is sent on one tag only and the two tags are not ordered
    /// against each other, so on receipt everything still queued on both
    /// sub-channels is handed out first. Everything the sender emitted before
    /// end-of-stream is already queued at that point.
    pub fn recv(&mut self) -> Result<(Tag, Message)> {
        if let Some(next) = self.backlog.pop_front() {
            return Ok(next);
        }
        if self.ended {
            return Err(self.violation("receive after end-of-stream"));
        }

        let closed = crossbeam_channel::never();
        let (tag, message) = loop {
            if !self.a_open && !self.b_open {
                return Err(SortError::LinkClosed { stage: self.stage });
            }
            // A disconnected channel is always ready; swap it out so only the
            // live tag is waited on.
            let a = if self.a_open { &self.a } else { &closed };
            let b = if self.b_open { &self.b } else { &closed };
            let (tag, received) = crossbeam_channel::select! {
                recv(a) -> msg => (Tag::A, msg),
                recv(b) -> msg => (Tag::B, msg),
            };
            match received {
                Ok(message) => break (tag, message),
                Err(_) => {
                    trace!(stage = self.stage, ?tag, "sub-channel disconnected");
                    match tag {
                        Tag::A => self.a_open = false,
                        Tag::B => self.b_open = false,
                    }
                }
            }
        };
        if message != Message::EndOfStream {
            return Ok((tag, message));
        }

        self.ended = true;
        self.drain(Tag::A)?;
        self.drain(Tag::B)?;
        trace!(
            stage = self.stage,
            pending = self.backlog.len(),
            "end-of-stream received"
        );
        self.backlog.push_back((tag, Message::EndOfStream));
        Ok(self.backlog.pop_front().unwrap_or((tag, Message::EndOfStream)))
    }

    #[cfg(test)]
    pub(crate) fn into_receivers(self) -> (Receiver<Message>, Receiver<Message>) {
        (self.a, self.b)
    }

    fn drain(&mut self, tag: Tag) -> Result<()> {
        let rx = match tag {
            Tag::A => &self.a,
            Tag::B => &self.b,
        };
        loop {
            match rx.try_recv() {
                Ok(Message::Element(value)) => self.backlog.push_back((tag, Message::Element(value))),
                Ok(Message::EndOfStream) => return Err(self.violation("second end-of-stream")),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return Ok(()),
            }
        }
    }

    fn violation(&self, reason: &'static str) -> SortError {
        SortError::Protocol {
            stage: self.stage,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_of_stream_is_delivered_after_pending_elements() {
        let (outlet, mut inlet) = link(1, None);
        outlet.send(Tag::A, Message::Element(4)).unwrap();
        outlet.send(Tag::B, Message::Element(7)).unwrap();
        outlet.send(Tag::A, Message::Element(9)).unwrap();
        outlet.send(Tag::B, Message::EndOfStream).unwrap();
        drop(outlet);

        let mut a = Vec::new();
        let mut b = Vec::new();
        loop {
            match inlet.recv().unwrap() {
                (Tag::A, Message::Element(v)) => a.push(v),
                (Tag::B, Message::Element(v)) => b.push(v),
                (_, Message::EndOfStream) => break,
            }
        }
        assert_eq!(a, vec![4, 9]);
        assert_eq!(b, vec![7]);
    }

    #[test]
    fn finished_sender_on_one_tag_is_not_a_closed_link() {
        for _ in 0..500 {
            let (outlet, mut inlet) = link(1, None);
            outlet.send(Tag::A, Message::Element(1)).unwrap();
            outlet.send(Tag::A, Message::EndOfStream).unwrap();
            drop(outlet);

            assert_eq!(inlet.recv().unwrap(), (Tag::A, Message::Element(1)));
            assert_eq!(inlet.recv().unwrap(), (Tag::A, Message::EndOfStream));
        }
    }

    #[test]
    fn sender_finishing_concurrently_is_not_a_closed_link() {
        for _ in 0..200 {
            let (outlet, mut inlet) = link(1, Some(1));
            let sender = std::thread::spawn(move || {
                outlet.send(Tag::B, Message::Element(8)).unwrap();
                outlet.send(Tag::B, Message::EndOfStream).unwrap();
            });
            assert_eq!(inlet.recv().unwrap(), (Tag::B, Message::Element(8)));
            assert_eq!(inlet.recv().unwrap(), (Tag::B, Message::EndOfStream));
            sender.join().unwrap();
        }
    }

    #[test]
    fn disconnect_without_end_of_stream_closes_the_link() {
        let (outlet, mut inlet) = link(2, None);
        outlet.send(Tag::B, Message::Element(3)).unwrap();
        drop(outlet);
        assert_eq!(inlet.recv().unwrap(), (Tag::B, Message::Element(3)));
        assert!(matches!(inlet.recv(), Err(SortError::LinkClosed { stage: 2 })));
    }

    #[test]
    fn second_end_of_stream_is_a_protocol_violation() {
        let (outlet, mut inlet) = link(2, None);
        outlet.send(Tag::A, Message::EndOfStream).unwrap();
        outlet.send(Tag::A, Message::EndOfStream).unwrap();
        let err = inlet.recv().unwrap_err();
        assert!(matches!(err, SortError::Protocol { stage: 2, .. }));
    }

    #[test]
    fn vanished_sender_closes_the_link() {
        let (outlet, mut inlet) = link(3, Some(1));
        drop(outlet);
        assert!(matches!(inlet.recv(), Err(SortError::LinkClosed { stage: 3 })));
    }

    #[test]
    fn send_to_vanished_receiver_fails() {
        let (outlet, inlet) = link(1, None);
        drop(inlet);
        let err = outlet.send(Tag::B, Message::Element(1)).unwrap_err();
        assert!(matches!(err, SortError::LinkClosed { stage: 0 }));
    }
}
