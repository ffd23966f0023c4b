/*!
  The textual listing of a flattened program, one word per line:

    [0]: b7
    [1]: 2a00001118   # comments run to the end of the line

  Blank lines are ignored. Indices must count up from zero without gaps.
*/

use nom::{
  bytes::complete::tag,
  character::complete::{char as one_char, digit1, hex_digit1, space0},
  combinator::{all_consuming, map_res, opt},
  sequence::{delimited, preceded, separated_pair},
  IResult
};

use crate::ebpf::Word;
use crate::error::ListingError;

pub fn format_listing(words: &[Word]) -> String {
  words
    .iter()
    .enumerate()
    .map(|(index, word)| format!("[{}]: {:x}\n", index, word))
    .collect()
}

fn index_p(text: &str) -> IResult<&str, usize> {
  map_res(
    delimited(one_char('['), delimited(space0, digit1, space0), one_char(']')),
    |digits: &str| digits.parse::<usize>()
  )(text)
}

fn word_p(text: &str) -> IResult<&str, Word> {
  map_res(
    preceded(opt(tag("0x")), hex_digit1),
    |digits: &str| Word::from_str_radix(digits, 16)
  )(text)
}

fn line_p(text: &str) -> IResult<&str, (usize, Word)> {
  all_consuming(
    delimited(
      space0,
      separated_pair(index_p, delimited(space0, one_char(':'), space0), word_p),
      space0
    )
  )(text)
}

pub fn parse_listing(text: &str) -> Result<Vec<Word>, ListingError> {
  let mut words = Vec::new();

  for (line_index, raw_line) in text.lines().enumerate() {
    let line = match raw_line.find('#') {
      Some(comment) => &raw_line[..comment],
      None          => raw_line
    };
    if line.trim().is_empty() {
      continue;
    }

    let (_, (index, word)) =
      line_p(line).map_err(|_| ListingError::Syntax { line: line_index + 1, text: raw_line.to_string() })?;

    if index != words.len() {
      return Err(ListingError::OutOfOrder { line: line_index + 1, expected: words.len(), found: index });
    }
    words.push(word);
  }

  Ok(words)
}
