//! Delimited reply tokenizer and field decoders
//!
//! Replies are split once, the token count is validated up front, and each
//! field is converted through a named decoder so a malformed token reports
//! which field it belongs to.

use std::ops::RangeInclusive;
use std::str::FromStr;

use tracing::debug;

use crate::error::ParseError;

/// Decode a fixed-point value with one implied decimal
///
/// Firmware encodes decivolts, deciamps and decihertz either with an
/// explicit decimal point (`235.0`, `51.20`) or as a bare integer in tenths
/// (`2350`, `512`). Both forms decode to the physical unit.
pub fn tenths(token: &str) -> Option<f32> {
    if token.contains('.') {
        token.parse().ok()
    } else {
        token.parse::<i32>().ok().map(|raw| raw as f32 / 10.0)
    }
}

/// Tokens of a single reply
#[derive(Debug)]
pub(crate) struct Fields<'a> {
    tokens: Vec<&'a str>,
}

impl<'a> Fields<'a> {
    /// Split on runs of whitespace
    pub(crate) fn whitespace(
        input: &'a str,
        reply: &'static str,
        count: RangeInclusive<usize>,
    ) -> Result<Self, ParseError> {
        Self::validated(input.split_whitespace().collect(), reply, count)
    }

    /// Split on commas
    pub(crate) fn comma(
        input: &'a str,
        reply: &'static str,
        count: RangeInclusive<usize>,
    ) -> Result<Self, ParseError> {
        let tokens = if input.is_empty() {
            Vec::new()
        } else {
            input.split(',').map(str::trim).collect()
        };
        Self::validated(tokens, reply, count)
    }

    fn validated(
        tokens: Vec<&'a str>,
        reply: &'static str,
        count: RangeInclusive<usize>,
    ) -> Result<Self, ParseError> {
        if !count.contains(&tokens.len()) {
            let expected = if tokens.len() < *count.start() {
                *count.start()
            } else {
                *count.end()
            };
            debug!("{} reply has {} fields: {:?}", reply, tokens.len(), tokens);
            return Err(ParseError::FieldCount {
                reply,
                expected,
                actual: tokens.len(),
            });
        }
        Ok(Self { tokens })
    }

    pub(crate) fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Raw token; callers only index within the validated count
    pub(crate) fn raw(&self, index: usize) -> &'a str {
        self.tokens.get(index).copied().unwrap_or_default()
    }

    pub(crate) fn get(&self, index: usize) -> Option<&'a str> {
        self.tokens.get(index).copied()
    }

    pub(crate) fn tenths(&self, index: usize, field: &'static str) -> Result<f32, ParseError> {
        let token = self.raw(index);
        tenths(token).ok_or_else(|| invalid(field, token))
    }

    /// Literal decimal, no implied scaling
    pub(crate) fn decimal(&self, index: usize, field: &'static str) -> Result<f32, ParseError> {
        let token = self.raw(index);
        token.parse().map_err(|_| invalid(field, token))
    }

    pub(crate) fn number<T: FromStr>(
        &self,
        index: usize,
        field: &'static str,
    ) -> Result<T, ParseError> {
        let token = self.raw(index);
        token.parse().map_err(|_| invalid(field, token))
    }

    /// Decode an enumerated field through a code table
    pub(crate) fn code<T>(
        &self,
        index: usize,
        field: &'static str,
        decode: fn(&str) -> Option<T>,
    ) -> Result<T, ParseError> {
        let token = self.raw(index);
        decode(token).ok_or_else(|| ParseError::UnknownCode {
            field,
            code: token.to_string(),
        })
    }

    /// Enumerated field that only newer firmware sends
    pub(crate) fn optional_code<T>(
        &self,
        index: usize,
        field: &'static str,
        decode: fn(&str) -> Option<T>,
    ) -> Result<Option<T>, ParseError> {
        if index >= self.len() {
            return Ok(None);
        }
        self.code(index, field, decode).map(Some)
    }

    /// `0`/`1` flag
    pub(crate) fn flag(&self, index: usize, field: &'static str) -> Result<bool, ParseError> {
        self.code(index, field, |t| match t {
            "0" => Some(false),
            "1" => Some(true),
            _ => None,
        })
    }
}

fn invalid(field: &'static str, token: &str) -> ParseError {
    ParseError::InvalidNumber {
        field,
        value: token.to_string(),
    }
}

/// Parse a string of `0`/`1` characters, most significant bit first
pub(crate) fn bits(input: &str) -> Result<Vec<bool>, ParseError> {
    input
        .chars()
        .enumerate()
        .map(|(position, value)| match value {
            '0' => Ok(false),
            '1' => Ok(true),
            _ => Err(ParseError::InvalidBit { position, value }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn tenths_both_forms() {
        assert_eq!(tenths("2350"), Some(235.0));
        assert_eq!(tenths("235.0"), Some(235.0));
        assert_eq!(tenths("512"), Some(51.2));
        assert_eq!(tenths("51.20"), Some(51.2));
        assert_eq!(tenths("-05"), Some(-0.5));
        assert_eq!(tenths(""), None);
        assert_eq!(tenths("12a"), None);
    }

    #[test]
    fn count_is_validated_up_front() {
        let err = Fields::whitespace("1 2", "QTEST", 3..=4).unwrap_err();
        assert_eq!(
            err,
            ParseError::FieldCount {
                reply: "QTEST",
                expected: 3,
                actual: 2
            }
        );

        let err = Fields::comma("1,2,3", "TEST", 2..=2).unwrap_err();
        assert!(matches!(err, ParseError::FieldCount { expected: 2, actual: 3, .. }));

        let err = Fields::comma("", "TEST", 1..=1).unwrap_err();
        assert!(matches!(err, ParseError::FieldCount { actual: 0, .. }));
    }

    #[test]
    fn field_decoders_name_the_field() {
        let fields = Fields::whitespace("230.0 xx 1", "QTEST", 3..=3).unwrap();
        assert_eq!(fields.tenths(0, "grid voltage"), Ok(230.0));
        assert_eq!(
            fields.number::<u32>(1, "load"),
            Err(ParseError::InvalidNumber {
                field: "load",
                value: "xx".into()
            })
        );
        assert_eq!(fields.flag(2, "load connection"), Ok(true));
    }

    #[test]
    fn bit_strings() {
        assert_eq!(bits("0110").unwrap(), vec![false, true, true, false]);
        assert_eq!(
            bits("01x"),
            Err(ParseError::InvalidBit {
                position: 2,
                value: 'x'
            })
        );
    }

    proptest! {
        #[test]
        fn integer_and_decimal_forms_agree(raw in 0u32..100_000) {
            let integer = raw.to_string();
            let decimal = format!("{}.{}", raw / 10, raw % 10);
            prop_assert_eq!(tenths(&integer), tenths(&decimal));
        }
    }
}
