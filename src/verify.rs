//! Checks on a finished run: the output is sorted and is a permutation of the
//! input.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("output not sorted at position {position}: {before} > {after}")]
    Unsorted {
        position: usize,
        before: u8,
        after: u8,
    },

    #[error("output has {output} elements, input had {input}")]
    LengthMismatch { input: usize, output: usize },

    #[error("value {value} appears {output} times in output, {input} times in input")]
    CountMismatch {
        value: u8,
        input: usize,
        output: usize,
    },
}

pub fn check_sorted(output: &[u8]) -> Result<(), VerifyError> {
    match output.windows(2).position(|w| w[0] > w[1]) {
        Some(i) => Err(VerifyError::Unsorted {
            position: i + 1,
            before: output[i],
            after: output[i + 1],
        }),
        None => Ok(()),
    }
}

fn histogram(data: &[u8]) -> [usize; 256] {
    let mut counts = [0usize; 256];
    for &d in data {
        counts[d as usize] += 1;
    }
    counts
}

pub fn check_permutation(input: &[u8], output: &[u8]) -> Result<(), VerifyError> {
    if input.len() != output.len() {
        return Err(VerifyError::LengthMismatch {
            input: input.len(),
            output: output.len(),
        });
    }
    let (expected, actual) = (histogram(input), histogram(output));
    for value in 0..=255u8 {
        let (input, output) = (expected[value as usize], actual[value as usize]);
        if input != output {
            return Err(VerifyError::CountMismatch {
                value,
                input,
                output,
            });
        }
    }
    Ok(())
}

pub fn check(input: &[u8], output: &[u8]) -> Result<(), VerifyError> {
    check_permutation(input, output)?;
    check_sorted(output)
}
