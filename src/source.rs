//! Stage 0: validates the input and feeds it into the chain.

use tracing::debug;

use crate::error::{Result, SortError};
use crate::link::{Message, Outlet, Tag};

/// Minimum chain length, `ceil(log2(n) + 1)`, for `n` elements.
///
/// The last stage emits runs of `2^(N-1)` elements, which must cover the whole
/// input.
pub fn required_stages(elements: usize) -> usize {
    elements.max(1).next_power_of_two().trailing_zeros() as usize + 1
}

#[derive(Debug)]
pub struct Source<'a> {
    numbers: &'a [u8],
}

impl<'a> Source<'a> {
    /// Admission control: rejects empty input and chains too short for it.
    pub fn new(numbers: &'a [u8], stages: usize) -> Result<Self> {
        if numbers.is_empty() {
            return Err(SortError::EmptyInput);
        }
        let required = required_stages(numbers.len());
        if stages < required {
            return Err(SortError::InsufficientStages {
                elements: numbers.len(),
                required,
                available: stages,
            });
        }
        Ok(Self { numbers })
    }

    pub fn numbers(&self) -> &'a [u8] {
        self.numbers
    }

    /// Sends every element to stage 1 with alternating tags starting at A,
    /// then end-of-stream on the tag that would come next.
    pub fn run(self, outlet: &Outlet) -> Result<usize> {
        let mut tag = Tag::A;
        for &number in self.numbers {
            outlet.send(tag, Message::Element(number))?;
            tag = tag.flip();
        }
        outlet.send(tag, Message::EndOfStream)?;
        debug!(sent = self.numbers.len(), "source done");
        Ok(self.numbers.len())
    }
}

/// The verification echo: input numbers separated by single spaces.
pub fn echo(numbers: &[u8]) -> String {
    let mut line = String::with_capacity(numbers.len() * 4);
    for (i, number) in numbers.iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        line.push_str(&number.to_string());
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link;

    #[test]
    fn required_stage_counts() {
        assert_eq!(required_stages(1), 1);
        assert_eq!(required_stages(2), 2);
        assert_eq!(required_stages(3), 3);
        assert_eq!(required_stages(4), 3);
        assert_eq!(required_stages(5), 4);
        assert_eq!(required_stages(8), 4);
        assert_eq!(required_stages(9), 5);
        assert_eq!(required_stages(1024), 11);
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(Source::new(&[], 8), Err(SortError::EmptyInput)));
    }

    #[test]
    fn rejects_short_chain() {
        let numbers = [5, 3, 8, 1, 9, 2, 7, 4];
        let err = Source::new(&numbers, 3).unwrap_err();
        assert!(matches!(
            err,
            SortError::InsufficientStages {
                elements: 8,
                required: 4,
                available: 3
            }
        ));
        assert!(Source::new(&numbers, 4).is_ok());
    }

    #[test]
    fn alternates_tags_and_ends_on_next_tag() {
        let (outlet, inlet) = link::link(1, None);
        let numbers = [10, 20, 30];
        let sent = Source::new(&numbers, 3).unwrap().run(&outlet).unwrap();
        assert_eq!(sent, 3);
        drop(outlet);

        // Inspect the raw sub-channels rather than going through the select.
        let (a, b) = inlet.into_receivers();
        let a: Vec<_> = a.try_iter().collect();
        let b: Vec<_> = b.try_iter().collect();
        assert_eq!(a, vec![Message::Element(10), Message::Element(30)]);
        assert_eq!(b, vec![Message::Element(20), Message::EndOfStream]);
    }

    #[test]
    fn echo_is_space_separated() {
        assert_eq!(echo(&[5, 3, 255, 0]), "5 3 255 0");
        assert_eq!(echo(&[7]), "7");
    }
}
