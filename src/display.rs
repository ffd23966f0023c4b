//! Tabular dump of an encoded program.

use std::fmt::{Display, Formatter};

use prettytable::{format as TableFormat, Table};

use crate::ebpf::{decode_wide, is_wide_instruction, try_decode_instruction, TwoWords, Word};
use crate::program::Program;

lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

fn make_word_table(words: &[Word]) -> Table {
  let mut table = Table::new();

  table.set_format(*TABLE_DISPLAY_FORMAT);
  table.set_titles(row![ubr->"pc", ubr->"word", ubl->"opcode", ubl->"dst", ubl->"src", ubr->"off", ubr->"imm"]);

  let mut pc = 0;
  while pc < words.len() {
    let word = words[pc];
    let decoded =
      match (is_wide_instruction(word), words.get(pc + 1)) {
        (true, Some(second)) => decode_wide(TwoWords { first: word, second: *second }),
        (true, None)         => None,
        (false, _)           => try_decode_instruction(word)
      };

    match decoded {

      Some(instruction) => {
        table.add_row(row![
          r->pc,
          r->format!("{:#x}", word),
          instruction.opcode,
          instruction.dst,
          instruction.src,
          r->instruction.offset,
          r->instruction.imm
        ]);
        if instruction.is_wide() {
          table.add_row(row![r->pc + 1, r->format!("{:#x}", words[pc + 1]), "", "", "", "", ""]);
        }
        pc += instruction.width() as usize;
      }

      None => {
        table.add_row(row![r->pc, r->format!("{:#x}", word), "?", "", "", "", ""]);
        pc += 1;
      }

    }
  }

  table
}

impl Display for Program {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self.encode() {
      Ok(words)  => write!(f, "{}", make_word_table(&words)),
      Err(error) => write!(f, "Program does not encode: {}", error)
    }
  }
}
