//! The declarative output-styling model consumed by the code emitter.
//!
//! Three layers, by descending priority: per-column instructions, per-type
//! instructions (number/string/rest), and the base format. Two built-in
//! bases exist: `plain` and `color`.

use crate::ast::{Const, ConstVal, Select};
use crate::error::Error;

use super::Planner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Color {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    #[default]
    None,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormatInstruction {
    /// Whether this field is dropped entirely.
    pub ignore: bool,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub color: Color,
    /// Column index, only meaningful for per-column instructions.
    pub index: usize,
    pub str_option: String,
    pub int_option: i64,
}

impl FormatInstruction {
    pub fn has_style(&self) -> bool {
        self.bold || self.italic || self.underline || self.color != Color::None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormatPlan {
    pub title: FormatInstruction,
    pub border: FormatInstruction,
    pub padding: FormatInstruction,
    pub number: Option<FormatInstruction>,
    pub string: Option<FormatInstruction>,
    pub rest: Option<FormatInstruction>,
    pub columns: Vec<FormatInstruction>,
    /// Whether the query spelled out a border; when it did not, the
    /// emitter falls back to the configured output separator.
    pub border_set: bool,
}

impl FormatPlan {
    pub fn get_column(&self, idx: usize) -> Option<&FormatInstruction> {
        self.columns.iter().find(|c| c.index == idx)
    }

    pub fn border_string(&self) -> &str {
        &self.border.str_option
    }

    pub fn has_type_format(&self) -> bool {
        self.number.is_some() || self.string.is_some() || self.rest.is_some()
    }

    pub fn padding(&self) -> i64 {
        self.padding.int_option
    }
}

const DEF_PADDING: i64 = 16;

fn def_padding_instruction() -> FormatInstruction {
    FormatInstruction {
        int_option: DEF_PADDING,
        ..Default::default()
    }
}

/// The default: no title, single-space border, padding 16, no styling.
pub(crate) fn plain_format() -> FormatPlan {
    FormatPlan {
        title: FormatInstruction {
            ignore: true,
            ..Default::default()
        },
        border: FormatInstruction {
            str_option: " ".to_string(),
            ..Default::default()
        },
        padding: def_padding_instruction(),
        number: None,
        string: None,
        rest: None,
        columns: Vec::new(),
        border_set: false,
    }
}

pub(crate) fn color_format() -> FormatPlan {
    FormatPlan {
        title: FormatInstruction {
            color: Color::Blue,
            bold: true,
            ..Default::default()
        },
        border: FormatInstruction {
            str_option: "|".to_string(),
            ..Default::default()
        },
        padding: def_padding_instruction(),
        number: Some(FormatInstruction {
            color: Color::Green,
            bold: true,
            ..Default::default()
        }),
        string: Some(FormatInstruction {
            color: Color::Red,
            italic: true,
            ..Default::default()
        }),
        rest: Some(FormatInstruction::default()),
        columns: Vec::new(),
        border_set: true,
    }
}

fn parse_format_instruction(val: &Const) -> Option<FormatInstruction> {
    match &val.value {
        ConstVal::Bool(b) => Some(FormatInstruction {
            ignore: !b,
            ..Default::default()
        }),
        ConstVal::Str(s) => {
            let mut f = FormatInstruction::default();
            for part in s.split(';') {
                match part {
                    "bold" => f.bold = true,
                    "italic" => f.italic = true,
                    "underline" => f.underline = true,
                    "black" => f.color = Color::Black,
                    "red" => f.color = Color::Red,
                    "green" => f.color = Color::Green,
                    "yellow" => f.color = Color::Yellow,
                    "blue" => f.color = Color::Blue,
                    "magenta" => f.color = Color::Magenta,
                    "cyan" => f.color = Color::Cyan,
                    "white" => f.color = Color::White,
                    "ignore" => f.ignore = true,
                    _ => {} // unknown fragments are ignored
                }
            }
            Some(f)
        }
        _ => None,
    }
}

impl Planner {
    pub(crate) fn plan_format(&self, s: &Select) -> Result<FormatPlan, Error> {
        let opts = match &s.format {
            None => return Ok(plain_format()),
            Some(f) => f,
        };

        let mut out = match &opts.base {
            Some(Const {
                value: ConstVal::Str(base),
                ..
            }) if base == "color" => color_format(),
            _ => plain_format(),
        };

        if let Some(v) = &opts.title {
            if let Some(ins) = parse_format_instruction(v) {
                out.title = ins;
            }
        }

        if let Some(Const {
            value: ConstVal::Int(pad),
            ..
        }) = &opts.padding
        {
            if *pad >= 0 {
                out.padding = FormatInstruction {
                    int_option: *pad,
                    ..Default::default()
                };
            }
        }

        if let Some(v) = &opts.number {
            if let Some(ins) = parse_format_instruction(v) {
                out.number = Some(ins);
            }
        }
        if let Some(v) = &opts.string {
            if let Some(ins) = parse_format_instruction(v) {
                out.string = Some(ins);
            }
        }
        if let Some(v) = &opts.rest {
            if let Some(ins) = parse_format_instruction(v) {
                out.rest = Some(ins);
            }
        }

        if let Some(Const {
            value: ConstVal::Str(border),
            ..
        }) = &opts.border
        {
            out.border = FormatInstruction {
                str_option: border.clone(),
                ..Default::default()
            };
            out.border_set = true;
        }

        for (idx, v) in &opts.columns {
            let mut ins = parse_format_instruction(v).unwrap_or_default();
            ins.index = *idx as usize;
            out.columns.push(ins);
        }

        Ok(out)
    }
}
