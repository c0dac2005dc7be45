use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::sample::Sample;

/// Order-list entry meaning "skip to the next entry".
pub const ORDER_SKIP: u8 = 254;
/// Order-list entry meaning "end of song".
pub const ORDER_END: u8 = 255;

pub const NOTE_SYMBOLS: [&str; 12] = [
    "C-", "C#", "D-", "D#", "E-", "F-", "F#", "G-", "G#", "A-", "A#", "B-",
];

/// Highest playable semitone, B-9.
const NOTE_MAX: u8 = 119;

/// The note column of a pattern cell. Playable notes pack octave and
/// semitone index into a single value, `octave * 12 + index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Note {
    #[default]
    Empty,
    Off,
    Cut,
    Playable(u8),
}

impl Note {
    pub fn playable(index: u8, octave: u8) -> Note {
        Note::Playable(octave * 12 + index)
    }

    pub fn is_empty(self) -> bool {
        self == Note::Empty
    }

    pub fn is_playable(self) -> bool {
        matches!(self, Note::Playable(_))
    }

    /// Semitone index within the octave, 0 = C.
    pub fn index(self) -> u8 {
        match self {
            Note::Playable(value) => value % 12,
            _ => 0,
        }
    }

    pub fn octave(self) -> u8 {
        match self {
            Note::Playable(value) => value / 12,
            _ => 0,
        }
    }

    /// Shift a playable note up by `semitones`, clamped to the playable
    /// range. Non-playable notes are unchanged.
    pub fn transposed(self, semitones: u8) -> Note {
        match self {
            Note::Playable(value) => Note::Playable((value + semitones).min(NOTE_MAX)),
            other => other,
        }
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Note::Empty => write!(f, "..."),
            Note::Off => write!(f, "---"),
            Note::Cut => write!(f, "^^^"),
            Note::Playable(_) => {
                write!(f, "{}{}", NOTE_SYMBOLS[self.index() as usize], self.octave())
            }
        }
    }
}

/// Effect-column commands shared by S3M and IT. `SetVolume` only ever
/// appears in the volume column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Command {
    #[default]
    None,
    SetSpeed,
    JumpToOrder,
    BreakToRow,
    VolumeSlide,
    PitchSlideDown,
    PitchSlideUp,
    PortamentoToNote,
    Vibrato,
    VibratoAndVolumeSlide,
    PortamentoAndVolumeSlide,
    Arpeggio,
    SetSampleOffset,
    SetTempo,
    SetVolume,
}

impl Command {
    /// The S3M/IT effect-letter mapping. Letters outside the supported
    /// subset are not commands.
    pub fn from_letter(letter: char) -> Option<Command> {
        Some(match letter {
            'A' => Command::SetSpeed,
            'B' => Command::JumpToOrder,
            'C' => Command::BreakToRow,
            'D' => Command::VolumeSlide,
            'E' => Command::PitchSlideDown,
            'F' => Command::PitchSlideUp,
            'G' => Command::PortamentoToNote,
            'H' => Command::Vibrato,
            'J' => Command::Arpeggio,
            'K' => Command::VibratoAndVolumeSlide,
            'L' => Command::PortamentoAndVolumeSlide,
            'O' => Command::SetSampleOffset,
            'T' => Command::SetTempo,
            _ => return None,
        })
    }

    pub fn letter(self) -> Option<char> {
        Some(match self {
            Command::SetSpeed => 'A',
            Command::JumpToOrder => 'B',
            Command::BreakToRow => 'C',
            Command::VolumeSlide => 'D',
            Command::PitchSlideDown => 'E',
            Command::PitchSlideUp => 'F',
            Command::PortamentoToNote => 'G',
            Command::Vibrato => 'H',
            Command::Arpeggio => 'J',
            Command::VibratoAndVolumeSlide => 'K',
            Command::PortamentoAndVolumeSlide => 'L',
            Command::SetSampleOffset => 'O',
            Command::SetTempo => 'T',
            Command::None | Command::SetVolume => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Effect {
    pub command: Command,
    pub data: u8,
}

impl Effect {
    pub fn new(command: Command, data: u8) -> Self {
        Effect { command, data }
    }
}

/// One cell of a pattern. All four columns are independent; an instrument
/// of 0 means "no change".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatternEntry {
    pub note: Note,
    pub instrument: u8,
    pub volume_effect: Effect,
    pub effect: Effect,
}

impl fmt::Display for PatternEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.note)?;
        if self.instrument == 0 {
            write!(f, ".. ")?;
        } else {
            write!(f, "{:02} ", self.instrument)?;
        }
        if self.volume_effect.command == Command::SetVolume {
            write!(f, "{:02} ", self.volume_effect.data)?;
        } else {
            write!(f, ".. ")?;
        }
        match self.effect.command.letter() {
            Some(letter) => write!(f, "{}{:02X}", letter, self.effect.data),
            None => write!(f, ".{:02X}", self.effect.data),
        }
    }
}

#[derive(Debug, Error)]
pub enum PatternTextError {
    #[error("pattern text is empty")]
    Empty,
    #[error("line {0}: expected 4 tokens per channel, got {1}")]
    MisalignedRow(usize, usize),
    #[error("line {0}: rows must agree on channel count")]
    RaggedRows(usize),
    #[error("line {0}: bad {1} field {2:?}")]
    BadField(usize, &'static str, String),
}

/// All rows of one channel, in playback order.
#[derive(Debug, Clone, Default)]
pub struct PatternChannel {
    rows: Vec<PatternEntry>,
}

impl PatternChannel {
    pub fn row(&self, r: usize) -> &PatternEntry {
        &self.rows[r]
    }

    pub fn row_mut(&mut self, r: usize) -> &mut PatternEntry {
        &mut self.rows[r]
    }

    pub fn rows(&self) -> &[PatternEntry] {
        &self.rows
    }
}

/// A `channels x rows` grid of cells. The channel count is fixed by the
/// module; the row count varies per pattern.
#[derive(Debug, Clone, Default)]
pub struct Pattern {
    channels: Vec<PatternChannel>,
}

impl Pattern {
    pub fn new(channel_count: usize, row_count: usize) -> Self {
        Pattern {
            channels: vec![
                PatternChannel {
                    rows: vec![PatternEntry::default(); row_count],
                };
                channel_count
            ],
        }
    }

    pub fn channel(&self, c: usize) -> &PatternChannel {
        &self.channels[c]
    }

    pub fn channel_mut(&mut self, c: usize) -> &mut PatternChannel {
        &mut self.channels[c]
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn row_count(&self) -> usize {
        self.channels.first().map_or(0, |ch| ch.rows.len())
    }

    /// Parse the row-per-line text form. Each channel cell is four
    /// whitespace-separated fields, `NNO II VV Exx`; a bare `|` between
    /// cells is accepted and ignored. The channel count is taken from the
    /// first row.
    pub fn from_text(text: &str) -> Result<Pattern, PatternTextError> {
        let mut rows: Vec<Vec<PatternEntry>> = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let lineno = i + 1;
            let tokens: Vec<&str> = line.split_whitespace().filter(|t| *t != "|").collect();
            if tokens.is_empty() {
                continue;
            }
            if tokens.len() % 4 != 0 {
                return Err(PatternTextError::MisalignedRow(lineno, tokens.len()));
            }
            let mut entries = Vec::with_capacity(tokens.len() / 4);
            for cell in tokens.chunks(4) {
                entries.push(parse_entry(lineno, cell)?);
            }
            if let Some(first) = rows.first() {
                if entries.len() != first.len() {
                    return Err(PatternTextError::RaggedRows(lineno));
                }
            }
            rows.push(entries);
        }
        if rows.is_empty() {
            return Err(PatternTextError::Empty);
        }

        let mut pattern = Pattern::new(rows[0].len(), rows.len());
        for (r, row) in rows.into_iter().enumerate() {
            for (c, entry) in row.into_iter().enumerate() {
                *pattern.channels[c].row_mut(r) = entry;
            }
        }
        Ok(pattern)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.row_count() {
            for (c, channel) in self.channels.iter().enumerate() {
                if c > 0 {
                    write!(f, " ")?;
                }
                write!(f, "{}", channel.row(r))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn parse_entry(lineno: usize, cell: &[&str]) -> Result<PatternEntry, PatternTextError> {
    Ok(PatternEntry {
        note: parse_note(lineno, cell[0])?,
        instrument: parse_two_digits(lineno, "instrument", cell[1])?,
        volume_effect: match parse_two_digits(lineno, "volume", cell[2])? {
            0 if cell[2] == ".." => Effect::default(),
            volume => Effect::new(Command::SetVolume, volume),
        },
        effect: parse_effect(lineno, cell[3])?,
    })
}

fn parse_note(lineno: usize, text: &str) -> Result<Note, PatternTextError> {
    match text {
        "..." => return Ok(Note::Empty),
        "---" => return Ok(Note::Off),
        "^^^" => return Ok(Note::Cut),
        _ => {}
    }
    let bad = || PatternTextError::BadField(lineno, "note", text.to_string());
    if text.len() != 3 || !text.is_ascii() {
        return Err(bad());
    }
    let octave = text[2..].parse::<u8>().map_err(|_| bad())?;
    let index = NOTE_SYMBOLS
        .iter()
        .position(|sym| *sym == &text[..2])
        .ok_or_else(bad)?;
    Ok(Note::playable(index as u8, octave))
}

fn parse_two_digits(lineno: usize, field: &'static str, text: &str) -> Result<u8, PatternTextError> {
    if text == ".." {
        return Ok(0);
    }
    text.parse::<u8>()
        .map_err(|_| PatternTextError::BadField(lineno, field, text.to_string()))
}

fn parse_effect(lineno: usize, text: &str) -> Result<Effect, PatternTextError> {
    if text == "..." {
        return Ok(Effect::default());
    }
    let bad = || PatternTextError::BadField(lineno, "effect", text.to_string());
    if text.len() != 3 || !text.is_ascii() {
        return Err(bad());
    }
    let data = u8::from_str_radix(&text[1..], 16).map_err(|_| bad())?;
    let letter = text.as_bytes()[0] as char;
    let command = if letter == '.' {
        Command::None
    } else {
        Command::from_letter(letter).unwrap_or_else(|| {
            tracing::warn!(letter = %letter, "unrecognized effect letter, treating as none");
            Command::None
        })
    };
    Ok(Effect::new(command, data))
}

/// A sample plus its module-level default volume (0..=64).
#[derive(Debug, Clone)]
pub struct ModuleSample {
    pub sample: Arc<Sample>,
    pub default_volume: u8,
}

impl ModuleSample {
    pub fn new(sample: Sample, default_volume: u8) -> Self {
        ModuleSample {
            sample: Arc::new(sample),
            default_volume,
        }
    }
}

/// A fully loaded song: sample bank, pattern bank, and the order in which
/// patterns play. Immutable during playback; the player holds it behind an
/// `Arc`.
#[derive(Debug, Clone)]
pub struct Module {
    pub samples: Vec<ModuleSample>,
    pub patterns: Vec<Pattern>,
    pub pattern_order: Vec<u8>,
    pub initial_speed: u8,
    pub initial_tempo: u8,
}

impl Default for Module {
    fn default() -> Self {
        Module {
            samples: Vec::new(),
            patterns: Vec::new(),
            pattern_order: Vec::new(),
            initial_speed: 6,
            initial_tempo: 125,
        }
    }
}
