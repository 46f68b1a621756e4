//! Message sequence sets
//!
//! `seq-number = nz-number / "*"` and friends. A [`SequenceSet`] is validated
//! on construction so that command encoding can rely on it being well-formed.

use std::{
    fmt,
    num::NonZeroU32,
    ops::{RangeFrom, RangeFull, RangeInclusive},
    str::FromStr,
};

use thiserror::Error;

/// `seq-number = nz-number / "*"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeqOrUid {
    Value(NonZeroU32),
    /// "*" represents the largest number in use.
    Asterisk,
}

impl fmt::Display for SeqOrUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => write!(f, "{value}"),
            Self::Asterisk => f.write_str("*"),
        }
    }
}

impl From<NonZeroU32> for SeqOrUid {
    fn from(value: NonZeroU32) -> Self {
        Self::Value(value)
    }
}

impl FromStr for SeqOrUid {
    type Err = SequenceSetError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value == "*" {
            return Ok(Self::Asterisk);
        }

        // A leading `+` or `-` is accepted by `u32::from_str` but is not
        // valid in the IMAP grammar.
        if !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SequenceSetError::Invalid(value.to_owned()));
        }

        let value = NonZeroU32::from_str(value)
            .map_err(|_| SequenceSetError::Invalid(value.to_owned()))?;

        Ok(Self::Value(value))
    }
}

/// `sequence-set =/ seq-number / seq-range`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sequence {
    Single(SeqOrUid),
    Range(SeqOrUid, SeqOrUid),
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(seq) => write!(f, "{seq}"),
            Self::Range(from, to) => write!(f, "{from}:{to}"),
        }
    }
}

impl From<NonZeroU32> for Sequence {
    fn from(value: NonZeroU32) -> Self {
        Self::Single(SeqOrUid::Value(value))
    }
}

impl From<RangeFull> for Sequence {
    fn from(_: RangeFull) -> Self {
        Self::Range(
            SeqOrUid::Value(NonZeroU32::MIN),
            SeqOrUid::Asterisk,
        )
    }
}

impl From<RangeFrom<NonZeroU32>> for Sequence {
    fn from(range: RangeFrom<NonZeroU32>) -> Self {
        Self::Range(SeqOrUid::Value(range.start), SeqOrUid::Asterisk)
    }
}

impl From<RangeInclusive<NonZeroU32>> for Sequence {
    fn from(range: RangeInclusive<NonZeroU32>) -> Self {
        Self::Range(
            SeqOrUid::Value(*range.start()),
            SeqOrUid::Value(*range.end()),
        )
    }
}

impl FromStr for Sequence {
    type Err = SequenceSetError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.split_once(':') {
            None => Ok(Self::Single(SeqOrUid::from_str(value)?)),
            Some((from, to)) => Ok(Self::Range(
                SeqOrUid::from_str(from)?,
                SeqOrUid::from_str(to)?,
            )),
        }
    }
}

/// `sequence-set = (seq-number / seq-range) *("," sequence-set)`
///
/// Invariant: contains at least one [`Sequence`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequenceSet(pub(crate) Vec<Sequence>);

impl SequenceSet {
    pub fn sequences(&self) -> &[Sequence] {
        &self.0
    }
}

impl fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, sequence) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{sequence}")?;
        }

        Ok(())
    }
}

impl From<Sequence> for SequenceSet {
    fn from(sequence: Sequence) -> Self {
        Self(vec![sequence])
    }
}

impl From<NonZeroU32> for SequenceSet {
    fn from(value: NonZeroU32) -> Self {
        Self::from(Sequence::from(value))
    }
}

impl From<RangeFull> for SequenceSet {
    fn from(range: RangeFull) -> Self {
        Self::from(Sequence::from(range))
    }
}

impl From<RangeFrom<NonZeroU32>> for SequenceSet {
    fn from(range: RangeFrom<NonZeroU32>) -> Self {
        Self::from(Sequence::from(range))
    }
}

impl From<RangeInclusive<NonZeroU32>> for SequenceSet {
    fn from(range: RangeInclusive<NonZeroU32>) -> Self {
        Self::from(Sequence::from(range))
    }
}

impl TryFrom<Vec<Sequence>> for SequenceSet {
    type Error = SequenceSetError;

    fn try_from(sequences: Vec<Sequence>) -> Result<Self, Self::Error> {
        if sequences.is_empty() {
            return Err(SequenceSetError::Empty);
        }

        Ok(Self(sequences))
    }
}

impl FromStr for SequenceSet {
    type Err = SequenceSetError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.is_empty() {
            return Err(SequenceSetError::Empty);
        }

        let sequences = value
            .split(',')
            .map(Sequence::from_str)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self(sequences))
    }
}

impl TryFrom<&str> for SequenceSet {
    type Error = SequenceSetError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::from_str(value)
    }
}

#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum SequenceSetError {
    #[error("Must not be empty")]
    Empty,
    #[error("Invalid sequence: `{0}`")]
    Invalid(String),
}
