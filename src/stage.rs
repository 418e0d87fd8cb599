//! The merge stage: one two-way merger in the chain.
//!
//! Stage `k` sees its predecessor's output as two interleaved streams of sorted
//! runs of length `R = 2^(k-1)`, one on each tag. It merges run `i` of A with
//! run `i` of B into one sorted run of length `S = 2^k` and emits it under a
//! single output tag, flipping the tag every `S` elements so that stage `k+1`
//! sees two interleaved streams of runs of length `S` in turn.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::error::Result;
use crate::link::{Inlet, Message, Tag};
use crate::sink::Emit;

/// Key of a queue that has nothing to offer the current run. Larger than any
/// element, so it never wins a comparison.
const NO_CANDIDATE: u16 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Receiving,
    Draining,
    Done,
}

/// What one queue can contribute to the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Candidate {
    Front(u8),
    /// The queue's part of the run is complete.
    Spent,
    /// The run continues but the next element has not arrived yet.
    Starved,
}

impl Candidate {
    fn key(self) -> u16 {
        match self {
            Candidate::Front(value) => value as u16,
            Candidate::Spent | Candidate::Starved => NO_CANDIDATE,
        }
    }
}

enum Action {
    Emit(Tag),
    Receive,
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageReport {
    pub index: usize,
    pub emitted: usize,
    /// Largest number of elements held in both queues at once.
    pub peak_buffered: usize,
}

#[derive(Debug)]
pub struct MergeStage {
    index: usize,
    run_len: usize,
    out_run_len: usize,
    queue_a: VecDeque<u8>,
    queue_b: VecDeque<u8>,
    receiving: bool,
    sending: bool,
    read_a: usize,
    read_b: usize,
    out_tag: Tag,
    sent: usize,
    emitted: usize,
    peak_buffered: usize,
}

impl MergeStage {
    /// `index` is the stage's position in the chain, 1 for the first merger.
    pub fn new(index: usize) -> Self {
        assert!(index >= 1, "stage 0 is the source");
        // Past the width of usize a run can never fill up; the stage then
        // forwards everything at end-of-stream.
        let run_len = u32::try_from(index - 1)
            .ok()
            .and_then(|shift| 1usize.checked_shl(shift))
            .unwrap_or(usize::MAX);
        Self {
            index,
            run_len,
            out_run_len: run_len.saturating_mul(2),
            queue_a: VecDeque::new(),
            queue_b: VecDeque::new(),
            receiving: true,
            sending: false,
            read_a: 0,
            read_b: 0,
            out_tag: Tag::A,
            sent: 0,
            emitted: 0,
            peak_buffered: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.receiving {
            Phase::Receiving
        } else if self.queue_a.is_empty() && self.queue_b.is_empty() {
            Phase::Done
        } else {
            Phase::Draining
        }
    }

    /// Runs the stage until its input is exhausted and every buffered element
    /// has been emitted, then closes `out`.
    pub fn run<E: Emit>(mut self, inlet: &mut Inlet, out: &mut E) -> Result<StageReport> {
        loop {
            match self.next_action() {
                Action::Receive => {
                    let (tag, message) = inlet.recv()?;
                    self.accept(tag, message);
                }
                Action::Emit(tag) => {
                    let value = self.take(tag);
                    out.emit(self.out_tag, value)?;
                    self.advance_output();
                }
                Action::Finish => {
                    out.close(self.out_tag)?;
                    let report = StageReport {
                        index: self.index,
                        emitted: self.emitted,
                        peak_buffered: self.peak_buffered,
                    };
                    debug!(?report, "stage done");
                    return Ok(report);
                }
            }
        }
    }

    fn accept(&mut self, tag: Tag, message: Message) {
        match message {
            Message::Element(value) => {
                match tag {
                    Tag::A => self.queue_a.push_back(value),
                    Tag::B => self.queue_b.push_back(value),
                }
                self.peak_buffered = self
                    .peak_buffered
                    .max(self.queue_a.len() + self.queue_b.len());
            }
            Message::EndOfStream => {
                trace!(
                    stage = self.index,
                    a = self.queue_a.len(),
                    b = self.queue_b.len(),
                    "input exhausted"
                );
                self.receiving = false;
                // Short final runs never reach the threshold; send what is there.
                self.sending = true;
            }
        }
    }

    fn next_action(&mut self) -> Action {
        if self.phase() == Phase::Done {
            return Action::Finish;
        }
        if !self.sending {
            if self.queue_a.len() >= self.run_len && !self.queue_b.is_empty() {
                self.sending = true;
            } else {
                return Action::Receive;
            }
        }

        let (mut a, mut b) = (self.candidate(Tag::A), self.candidate(Tag::B));
        if a == Candidate::Spent && b == Candidate::Spent {
            // Run boundary. Both sides spent by exhaustion means Done, caught above.
            self.read_a = 0;
            self.read_b = 0;
            (a, b) = (self.candidate(Tag::A), self.candidate(Tag::B));
        }

        match (a, b) {
            (Candidate::Starved, _) | (_, Candidate::Starved) => Action::Receive,
            _ if a.key() <= b.key() => Action::Emit(Tag::A),
            _ => Action::Emit(Tag::B),
        }
    }

    fn candidate(&self, tag: Tag) -> Candidate {
        let (queue, read) = match tag {
            Tag::A => (&self.queue_a, self.read_a),
            Tag::B => (&self.queue_b, self.read_b),
        };
        if read >= self.run_len {
            return Candidate::Spent;
        }
        match queue.front() {
            Some(&value) => Candidate::Front(value),
            None if self.receiving => Candidate::Starved,
            None => Candidate::Spent,
        }
    }

    fn take(&mut self, tag: Tag) -> u8 {
        let (queue, read) = match tag {
            Tag::A => (&mut self.queue_a, &mut self.read_a),
            Tag::B => (&mut self.queue_b, &mut self.read_b),
        };
        *read += 1;
        match queue.pop_front() {
            Some(value) => value,
            None => unreachable!("emit chosen for an empty queue"),
        }
    }

    fn advance_output(&mut self) {
        self.emitted += 1;
        self.sent += 1;
        if self.sent == self.out_run_len {
            self.sent = 0;
            self.out_tag = self.out_tag.flip();
        }
    }
}
