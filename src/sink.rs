use crate::error::Result;
use crate::link::{Message, Outlet, Tag};

/// Where a merge stage puts the elements it emits.
pub trait Emit {
    fn emit(&mut self, tag: Tag, value: u8) -> Result<()>;

    /// Called once after the last element.
    fn close(&mut self, tag: Tag) -> Result<()>;
}

/// Forwards to the successor stage.
impl Emit for Outlet {
    fn emit(&mut self, tag: Tag, value: u8) -> Result<()> {
        self.send(tag, Message::Element(value))
    }

    fn close(&mut self, tag: Tag) -> Result<()> {
        self.send(tag, Message::EndOfStream)
    }
}

/// Terminal stage output: the result stream in final order.
#[derive(Debug, Default)]
pub struct Sink {
    sorted: Vec<u8>,
    closed: bool,
}

impl Sink {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sorted: Vec::with_capacity(capacity),
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn into_sorted(self) -> Vec<u8> {
        self.sorted
    }
}

impl Emit for Sink {
    fn emit(&mut self, _tag: Tag, value: u8) -> Result<()> {
        self.sorted.push(value);
        Ok(())
    }

    fn close(&mut self, _tag: Tag) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
