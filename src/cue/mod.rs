//! Cue protocol: the text file that tells the player which frame ranges to
//! play once and which to loop until the print reaches a height.
//!
//! ```text
//! CUE_FILE
//! VERSION 2
//! BEGIN_CUES
//! PLAY 0 4410
//! LOOP 4410 4418 UNTIL HEIGHT 0.01
//! END_CUES
//! END
//! ```
//!
//! Reading is all-or-nothing: [`read_cues`] returns every cue in order or an
//! error naming the offending line.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{ConfigError, Error, ParseError, Result};

/// Version written to, and required of, every cue file.
pub const FORMAT_VERSION: u32 = 2;

/// Heights closer than this are the same height. Targets are products of
/// a sublayer count and a float step, while measured heights are drip
/// ratios, so the two rarely agree to the last bit.
pub const HEIGHT_TOLERANCE: f64 = 1e-9;

/// A frame range in the compiled audio. Bounds are half-open `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cue {
    Play {
        start_frame: u64,
        end_frame: u64,
    },
    LoopUntilHeight {
        start_frame: u64,
        end_frame: u64,
        until_height: f64,
    },
}

impl Cue {
    pub fn start_frame(&self) -> u64 {
        match *self {
            Cue::Play { start_frame, .. } | Cue::LoopUntilHeight { start_frame, .. } => {
                start_frame
            }
        }
    }

    pub fn end_frame(&self) -> u64 {
        match *self {
            Cue::Play { end_frame, .. } | Cue::LoopUntilHeight { end_frame, .. } => end_frame,
        }
    }

    pub fn len(&self) -> u64 {
        self.end_frame().saturating_sub(self.start_frame())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cue::Play {
                start_frame,
                end_frame,
            } => write!(f, "PLAY {start_frame} {end_frame}"),
            Cue::LoopUntilHeight {
                start_frame,
                end_frame,
                until_height,
            } => write!(
                f,
                "LOOP {start_frame} {end_frame} UNTIL HEIGHT {until_height}"
            ),
        }
    }
}

/// Streams cues to a writer, framing them with the header and trailer.
pub struct CueWriter<W: Write> {
    out: W,
    last_end: u64,
}

impl<W: Write> CueWriter<W> {
    /// Write the header.
    pub fn new(mut out: W) -> Result<Self> {
        writeln!(out, "CUE_FILE")?;
        writeln!(out, "VERSION {FORMAT_VERSION}")?;
        writeln!(out, "BEGIN_CUES")?;
        Ok(Self { out, last_end: 0 })
    }

    pub fn write_cue(&mut self, cue: &Cue) -> Result<()> {
        debug_assert!(cue.start_frame() >= self.last_end, "cues must not overlap");
        self.last_end = cue.end_frame();
        writeln!(self.out, "{cue}")?;
        Ok(())
    }

    /// Write the trailer and hand back the writer.
    pub fn finish(mut self) -> Result<W> {
        writeln!(self.out, "END_CUES")?;
        writeln!(self.out, "END")?;
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Write a complete cue file to `out`.
pub fn write_cues<W: Write>(out: W, cues: &[Cue]) -> Result<W> {
    let mut writer = CueWriter::new(out)?;
    for cue in cues {
        writer.write_cue(cue)?;
    }
    writer.finish()
}

/// Write a complete cue file to `path`.
pub fn save_cues(path: &Path, cues: &[Cue]) -> Result<()> {
    write_cues(BufWriter::new(File::create(path)?), cues)?;
    Ok(())
}

/// Read a complete cue file from `path`.
pub fn load_cues(path: &Path) -> Result<Vec<Cue>> {
    read_cues(BufReader::new(File::open(path)?))
}

/// Non-blank, trimmed lines with their 1-based line numbers.
struct Lines<R> {
    inner: std::io::Lines<R>,
    number: usize,
}

impl<R: BufRead> Lines<R> {
    fn next_line(&mut self, looking_for: &'static str) -> Result<(usize, String)> {
        for line in self.inner.by_ref() {
            self.number += 1;
            let line = line?;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok((self.number, trimmed.to_string()));
            }
        }
        Err(ConfigError::CueTruncated(looking_for).into())
    }
}

/// Read every cue from a cue file.
pub fn read_cues<R: BufRead>(reader: R) -> Result<Vec<Cue>> {
    let mut lines = Lines {
        inner: reader.lines(),
        number: 0,
    };

    let (_, line) = lines.next_line("CUE_FILE")?;
    if line != "CUE_FILE" {
        return Err(ConfigError::NotCueFile(line).into());
    }

    let (number, line) = lines.next_line("VERSION")?;
    let version = match line.split_whitespace().collect::<Vec<_>>()[..] {
        ["VERSION", v] => v
            .parse::<u32>()
            .map_err(|_| ParseError::new(number, &line, "VERSION must be an integer"))?,
        _ => return Err(ParseError::new(number, &line, "expected VERSION <int>").into()),
    };
    if version != FORMAT_VERSION {
        return Err(ConfigError::CueVersion {
            found: version,
            expected: FORMAT_VERSION,
        }
        .into());
    }

    let (number, line) = lines.next_line("BEGIN_CUES")?;
    if line != "BEGIN_CUES" {
        return Err(ParseError::new(number, line, "expected BEGIN_CUES").into());
    }

    let mut cues: Vec<Cue> = Vec::new();
    loop {
        let (number, line) = lines.next_line("END_CUES")?;
        if line == "END_CUES" {
            break;
        }
        let cue = parse_cue(number, &line)?;
        if cue.start_frame() > cue.end_frame() {
            return Err(ParseError::new(number, line, "cue ends before it starts").into());
        }
        if let Some(prev) = cues.last() {
            if cue.start_frame() < prev.end_frame() {
                return Err(
                    ParseError::new(number, line, "cue overlaps the previous cue").into(),
                );
            }
        }
        cues.push(cue);
    }

    let (number, line) = lines.next_line("END")?;
    if line != "END" {
        return Err(ParseError::new(number, line, "expected END").into());
    }
    Ok(cues)
}

fn parse_cue(number: usize, line: &str) -> Result<Cue> {
    let frame = |s: &str| -> Result<u64> {
        s.parse::<u64>()
            .map_err(|_| Error::from(ParseError::new(number, line, "frame must be an integer")))
    };
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts[..] {
        ["PLAY", start, end] => Ok(Cue::Play {
            start_frame: frame(start)?,
            end_frame: frame(end)?,
        }),
        ["LOOP", start, end, "UNTIL", "HEIGHT", height] => Ok(Cue::LoopUntilHeight {
            start_frame: frame(start)?,
            end_frame: frame(end)?,
            until_height: height
                .parse::<f64>()
                .ok()
                .filter(|h| h.is_finite())
                .ok_or_else(|| ParseError::new(number, line, "height must be a finite number"))?,
        }),
        _ => Err(ParseError::new(
            number,
            line,
            "expected PLAY, LOOP ... UNTIL HEIGHT or END_CUES",
        )
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_cues() -> Vec<Cue> {
        vec![
            Cue::Play {
                start_frame: 0,
                end_frame: 4410,
            },
            Cue::LoopUntilHeight {
                start_frame: 4410,
                end_frame: 4418,
                until_height: 0.01,
            },
            Cue::Play {
                start_frame: 4418,
                end_frame: 9000,
            },
            Cue::LoopUntilHeight {
                start_frame: 9000,
                end_frame: 9008,
                until_height: 0.1 + 0.2,
            },
        ]
    }

    fn to_text(cues: &[Cue]) -> String {
        String::from_utf8(write_cues(Vec::new(), cues).unwrap()).unwrap()
    }

    fn read_str(text: &str) -> Result<Vec<Cue>> {
        read_cues(Cursor::new(text.as_bytes()))
    }

    #[test]
    fn round_trip_mixed_cues() {
        let cues = sample_cues();
        assert_eq!(read_str(&to_text(&cues)).unwrap(), cues);
    }

    #[test]
    fn written_format() {
        let text = to_text(&sample_cues()[..2]);
        assert_eq!(
            text,
            "CUE_FILE\nVERSION 2\nBEGIN_CUES\nPLAY 0 4410\nLOOP 4410 4418 UNTIL HEIGHT 0.01\nEND_CUES\nEND\n"
        );
    }

    #[test]
    fn empty_cue_list() {
        assert!(read_str(&to_text(&[])).unwrap().is_empty());
    }

    #[test]
    fn blank_lines_are_skipped() {
        let text = "\nCUE_FILE\n\nVERSION 2\nBEGIN_CUES\n\n  PLAY 0 10  \nEND_CUES\nEND\n\n";
        assert_eq!(read_str(text).unwrap().len(), 1);
    }

    #[test]
    fn wrong_magic_rejected() {
        let err = read_str("WAV_FILE\nVERSION 2\n").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::NotCueFile(_))));
    }

    #[test]
    fn version_mismatch_is_fatal() {
        let err = read_str("CUE_FILE\nVERSION 1\nBEGIN_CUES\nEND_CUES\nEND\n").unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::CueVersion {
                found: 1,
                expected: FORMAT_VERSION
            })
        ));
    }

    #[test]
    fn bad_record_carries_line() {
        let err = read_str("CUE_FILE\nVERSION 2\nBEGIN_CUES\nPLAY 0 10\n4410\nEND_CUES\nEND\n")
            .unwrap_err();
        match err {
            Error::Parse(e) => {
                assert_eq!(e.line, 5);
                assert_eq!(e.text, "4410");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn loop_without_height_rejected() {
        let err = read_str("CUE_FILE\nVERSION 2\nBEGIN_CUES\nLOOP 0 10 UNTIL\nEND_CUES\nEND\n")
            .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn non_finite_height_rejected() {
        for height in ["NaN", "inf", "-inf"] {
            let text = format!(
                "CUE_FILE\nVERSION 2\nBEGIN_CUES\nLOOP 0 8 UNTIL HEIGHT {height}\nEND_CUES\nEND\n"
            );
            match read_str(&text).unwrap_err() {
                Error::Parse(e) => assert_eq!(e.line, 4, "{height}"),
                other => panic!("expected parse error for {height}, got {other}"),
            }
        }
    }

    #[test]
    fn truncated_file_rejected() {
        let err = read_str("CUE_FILE\nVERSION 2\nBEGIN_CUES\nPLAY 0 10\n").unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::CueTruncated("END_CUES"))
        ));
    }

    #[test]
    fn missing_end_rejected() {
        let err = read_str("CUE_FILE\nVERSION 2\nBEGIN_CUES\nEND_CUES\n").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::CueTruncated("END"))));
    }

    #[test]
    fn overlapping_cues_rejected() {
        let err = read_str("CUE_FILE\nVERSION 2\nBEGIN_CUES\nPLAY 0 10\nPLAY 5 20\nEND_CUES\nEND\n")
            .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("print.cue");
        save_cues(&path, &sample_cues()).unwrap();
        assert_eq!(load_cues(&path).unwrap(), sample_cues());
    }

    #[test]
    fn cue_accessors() {
        let cue = sample_cues()[1];
        assert_eq!(cue.start_frame(), 4410);
        assert_eq!(cue.end_frame(), 4418);
        assert_eq!(cue.len(), 8);
        assert!(!cue.is_empty());
    }
}
