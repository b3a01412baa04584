//! Layer start-point rotation.
//!
//! Slicers start every layer at the same point, so the seam where the laser
//! starts and stops stacks into a visible ridge. These helpers rotate each
//! layer's drawing moves so the seam wanders: [`LayerMixer`] shifts each layer
//! one move further than the last, [`scramble_layers`] picks a seeded random
//! shift per layer. Z moves always stay at the end of their layer.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::instruction::{parse_line, strip_comment, Instruction};

/// One layer of a program: setup lines, drawing moves, and the Z move that
/// closes it (absent for the last layer).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Layer {
    pub preamble: Vec<String>,
    pub body: Vec<String>,
    pub z_move: Option<String>,
    /// Feed word (`F600`) in effect when the layer starts, set by an
    /// earlier layer.
    pub entry_feed: Option<String>,
}

impl Layer {
    /// Rotate the drawing moves left by `offset` (wrapping). The move that
    /// becomes first travels to the new start point, so it no longer draws.
    ///
    /// Feed rates are modal, so the first move of each rotated run is given
    /// the feed word it ran with before. Every move keeps its feed rate and
    /// the layer no longer depends on the feed left by the previous one.
    pub fn rotate(&mut self, offset: usize) {
        if self.body.is_empty() {
            return;
        }
        let len = self.body.len();
        let offset = offset % len;
        let start_feed = self.body[..offset]
            .iter()
            .rev()
            .find_map(|line| feed_word(line))
            .or_else(|| self.entry_feed.clone());

        self.body.rotate_left(offset);
        let wrapped = len - offset;
        if offset > 0 {
            if let Some(first) = first_move(&self.body[..wrapped]) {
                self.body[first] = without_extrusion(&self.body[first]);
            }
        }
        if let (Some(first), Some(feed)) = (first_move(&self.body[..wrapped]), &start_feed) {
            self.body[first] = with_feed(&self.body[first], feed);
        }
        if let (Some(first), Some(feed)) = (first_move(&self.body[wrapped..]), &self.entry_feed) {
            let at = wrapped + first;
            self.body[at] = with_feed(&self.body[at], feed);
        }
    }

    fn push_lines(&self, out: &mut String) {
        for line in self
            .preamble
            .iter()
            .chain(self.body.iter())
            .chain(self.z_move.iter())
        {
            out.push_str(line);
            out.push('\n');
        }
    }
}

fn classify(line: &str) -> Option<Instruction> {
    // Unparseable lines are carried along untouched; the compiler reports them.
    parse_line(0, line).ok().flatten()
}

/// Split a program into layers at Z moves.
pub fn split_layers(program: &str) -> Vec<Layer> {
    let mut layers = Vec::new();
    let mut current = Layer::default();
    let mut feed: Option<String> = None;
    for line in program.lines() {
        let line = line.trim_end().to_string();
        let instruction = classify(&line);
        if current.body.is_empty() {
            current.entry_feed = feed.clone();
        }
        if let Some(word) = feed_word(&line) {
            feed = Some(word);
        }
        match instruction {
            Some(Instruction::Move(mv)) if mv.z.is_some() => {
                current.z_move = Some(line);
                layers.push(std::mem::take(&mut current));
            }
            Some(Instruction::Move(_)) => current.body.push(line),
            _ if current.body.is_empty() => current.preamble.push(line),
            _ => current.body.push(line),
        }
    }
    if !current.preamble.is_empty() || !current.body.is_empty() {
        layers.push(current);
    }
    layers
}

/// Join layers back into program text.
pub fn join_layers(layers: &[Layer]) -> String {
    let mut out = String::new();
    for layer in layers {
        layer.push_lines(&mut out);
    }
    out
}

fn first_move(lines: &[String]) -> Option<usize> {
    lines
        .iter()
        .position(|line| matches!(classify(line), Some(Instruction::Move(_))))
}

/// The `F` word of a move, if it has one.
fn feed_word(line: &str) -> Option<String> {
    if !matches!(classify(line), Some(Instruction::Move(_))) {
        return None;
    }
    strip_comment(line)
        .split_whitespace()
        .skip(1)
        .find(|w| w.starts_with(['F', 'f']))
        .map(str::to_string)
}

fn comment_of(line: &str) -> &str {
    &line[line.find(';').unwrap_or(line.len())..]
}

fn rebuild(words: &[&str], comment: &str) -> String {
    let mut out = words.join(" ");
    if !comment.is_empty() {
        out.push(' ');
        out.push_str(comment);
    }
    out
}

/// Drop the `E` word from a move, keeping any comment.
fn without_extrusion(line: &str) -> String {
    let words: Vec<&str> = strip_comment(line)
        .split_whitespace()
        .filter(|w| !w.starts_with(['E', 'e']))
        .collect();
    rebuild(&words, comment_of(line))
}

/// Give a move an explicit feed word unless it already has one.
fn with_feed(line: &str, feed: &str) -> String {
    if feed_word(line).is_some() {
        return line.to_string();
    }
    let mut words: Vec<&str> = strip_comment(line).split_whitespace().collect();
    words.push(feed);
    rebuild(&words, comment_of(line))
}

/// Rotates each successive layer one move further than the previous one.
#[derive(Debug, Clone)]
pub struct LayerMixer {
    next_offset: usize,
}

impl Default for LayerMixer {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerMixer {
    pub fn new() -> Self {
        Self { next_offset: 1 }
    }

    pub fn mix_layer(&mut self, layer: &mut Layer) {
        if layer.body.is_empty() {
            return;
        }
        if layer.body.len() < self.next_offset {
            self.next_offset = 0;
        }
        layer.rotate(self.next_offset);
        self.next_offset += 1;
    }

    pub fn mix(&mut self, program: &str) -> String {
        let mut layers = split_layers(program);
        for layer in &mut layers {
            self.mix_layer(layer);
        }
        join_layers(&layers)
    }
}

/// Rotate every layer to a random start point. The same seed always gives
/// the same output.
pub fn scramble_layers(program: &str, seed: u64) -> String {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut layers = split_layers(program);
    for layer in &mut layers {
        if !layer.body.is_empty() {
            let offset = rng.gen_range(0..layer.body.len());
            layer.rotate(offset);
        }
    }
    join_layers(&layers)
}
