//! Parser for the supported G-code dialect.
//!
//! One instruction per line, whitespace-separated words, `;` starts a comment.
//! Codes are normalized so `G1` and `G01` are the same instruction.

use std::fmt;

use crate::error::ParseError;

/// A parsed, supported instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// `G0` / `G1`.
    Move(Move),
    /// `G90`.
    AbsolutePositioning,
    /// `G21`.
    Millimetres,
    /// `G28`: rapid to the origin.
    Home,
    /// `M101`: laser on for subsequent drawing moves.
    ExtruderOn,
    /// `M103`.
    ExtruderOff,
    /// `M113 S<pwm>`: drawing moves run at `feed / pwm`; zero turns them
    /// into rapids. Without `S` the current value is kept.
    ExtruderPwm(Option<f64>),
    /// Anything else; the compiler warns once per code.
    Unsupported(Code),
}

/// A linear move. Feed rate is stored in mm/s.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Move {
    pub rapid: bool,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub feed_rate: Option<f64>,
    pub extrude: bool,
    /// Parameter letters this dialect does not understand.
    pub ignored: Vec<char>,
}

impl Move {
    pub fn is_lateral(&self) -> bool {
        self.x.is_some() || self.y.is_some()
    }
}

/// A normalized command word such as `G1` or `M104`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code {
    pub letter: char,
    pub number: u32,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.letter, self.number)
    }
}

/// Strip the comment and surrounding whitespace from a line.
pub fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(at) => line[..at].trim(),
        None => line.trim(),
    }
}

/// Parse one line. Blank and comment-only lines yield `None`.
pub fn parse_line(number: usize, line: &str) -> Result<Option<Instruction>, ParseError> {
    let body = strip_comment(line);
    let mut words = body.split_whitespace();
    let Some(first) = words.next() else {
        return Ok(None);
    };

    let code = parse_code(first).ok_or_else(|| {
        ParseError::new(number, line.trim(), format!("malformed command word {first:?}"))
    })?;

    let instruction = match (code.letter, code.number) {
        ('G', 0) | ('G', 1) => {
            let mut mv = Move {
                rapid: code.number == 0,
                ..Move::default()
            };
            for word in words {
                parse_move_word(number, line, word, &mut mv)?;
            }
            if mv.rapid {
                mv.extrude = false;
            }
            Instruction::Move(mv)
        }
        ('G', 20) => {
            return Err(ParseError::new(
                number,
                line.trim(),
                "inch units (G20) are not supported; use millimetres",
            ))
        }
        ('G', 21) => Instruction::Millimetres,
        ('G', 28) => Instruction::Home,
        ('G', 90) => Instruction::AbsolutePositioning,
        ('G', 91) => {
            return Err(ParseError::new(
                number,
                line.trim(),
                "relative positioning (G91) is not supported; only G90 is",
            ))
        }
        ('M', 101) => Instruction::ExtruderOn,
        ('M', 103) => Instruction::ExtruderOff,
        ('M', 113) => Instruction::ExtruderPwm(parse_pwm(number, line, words)?),
        _ => Instruction::Unsupported(code),
    };
    Ok(Some(instruction))
}

fn parse_code(word: &str) -> Option<Code> {
    let mut chars = word.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    if !letter.is_ascii_alphabetic() {
        return None;
    }
    let number = chars.as_str().parse::<u32>().ok()?;
    Some(Code { letter, number })
}

fn parse_pwm<'a>(
    number: usize,
    line: &str,
    words: impl Iterator<Item = &'a str>,
) -> Result<Option<f64>, ParseError> {
    let mut pwm = None;
    for word in words {
        let Some(rest) = word.strip_prefix(['S', 's']) else {
            continue;
        };
        let value = rest
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .ok_or_else(|| {
                ParseError::new(
                    number,
                    line.trim(),
                    format!("malformed extruder PWM {word:?}; expected a number >= 0"),
                )
            })?;
        pwm = Some(value);
    }
    Ok(pwm)
}

fn parse_move_word(number: usize, line: &str, word: &str, mv: &mut Move) -> Result<(), ParseError> {
    let mut chars = word.chars();
    let Some(letter) = chars.next().map(|c| c.to_ascii_uppercase()) else {
        return Ok(());
    };
    let rest = chars.as_str();
    let value = || {
        rest.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                ParseError::new(
                    number,
                    line.trim(),
                    format!("malformed {letter} parameter {word:?}; expected a number"),
                )
            })
    };

    match letter {
        'X' => mv.x = Some(value()?),
        'Y' => mv.y = Some(value()?),
        'Z' => mv.z = Some(value()?),
        'F' => {
            let per_minute = value()?;
            if per_minute <= 0.0 {
                return Err(ParseError::new(
                    number,
                    line.trim(),
                    format!("feed rate must be positive, got {per_minute}"),
                ));
            }
            mv.feed_rate = Some(per_minute / 60.0);
        }
        // Extrusion amount is meaningless here; its presence means "draw".
        'E' => mv.extrude = true,
        other => {
            if !mv.ignored.contains(&other) {
                mv.ignored.push(other);
            }
        }
    }
    Ok(())
}
