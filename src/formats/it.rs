use crate::bytereader::ByteReader;
use crate::module::{Command, Effect, Module, ModuleSample, Note, Pattern, PatternEntry};
use crate::sample::{LoopKind, LoopParams, Sample};

use super::{command_from_raw, unpack_decimal, LoadError};

const CHANNEL_COUNT: usize = 64;

const FLAG_16BIT: u8 = 0x02;
const FLAG_COMPRESSED: u8 = 0x08;
const FLAG_LOOPING: u8 = 0x10;

/// Impulse Tracker. Counts at 0x20, speed/tempo at 0x32, the order list at
/// 0xC0 followed by u32 offset tables for instruments, samples and
/// patterns. Instrument headers are skipped: this player is sample-driven.
pub(super) fn load(data: &[u8]) -> Result<Module, LoadError> {
    let mut reader = ByteReader::new(data);
    let mut module = Module::default();

    reader.seek(0x20)?;
    let order_count = reader.read_u16()? as usize;
    let instrument_count = reader.read_u16()? as usize;
    let sample_count = reader.read_u16()? as usize;
    let pattern_count = reader.read_u16()? as usize;

    reader.seek(0x32)?;
    module.initial_speed = reader.read_u8()?;
    module.initial_tempo = reader.read_u8()?;

    reader.seek(0xC0)?;
    module.pattern_order = reader.read_bytes(order_count)?.to_vec();

    reader.skip(instrument_count * 4)?;
    let mut sample_offsets = Vec::with_capacity(sample_count);
    for _ in 0..sample_count {
        sample_offsets.push(reader.read_u32()? as usize);
    }
    let mut pattern_offsets = Vec::with_capacity(pattern_count);
    for _ in 0..pattern_count {
        pattern_offsets.push(reader.read_u32()? as usize);
    }

    for offset in sample_offsets {
        reader.seek(offset)?;
        module.samples.push(load_sample(&mut reader)?);
    }
    for offset in pattern_offsets {
        if offset == 0 {
            // A zero offset is an empty 64-row pattern.
            module.patterns.push(Pattern::new(CHANNEL_COUNT, 64));
        } else {
            reader.seek(offset)?;
            module.patterns.push(load_pattern(&mut reader)?);
        }
    }

    tracing::debug!(
        orders = order_count,
        samples = module.samples.len(),
        patterns = module.patterns.len(),
        "loaded IT module"
    );
    Ok(module)
}

fn load_sample(reader: &mut ByteReader) -> Result<ModuleSample, LoadError> {
    let header_start = reader.position();

    reader.seek(header_start + 0x12)?;
    let flags = reader.read_u8()?;
    let default_volume = reader.read_u8()?;

    reader.seek(header_start + 0x30)?;
    let length = reader.read_u32()? as usize;
    let loop_begin = reader.read_u32()? as usize;
    let loop_end = reader.read_u32()? as usize;
    let c5_rate = reader.read_u32()?;
    let _sustain_begin = reader.read_u32()?;
    let _sustain_end = reader.read_u32()?;
    let data_pointer = reader.read_u32()? as usize;

    let empty = |c5_rate| {
        Sample::new(Vec::new(), c5_rate, LoopParams::new(LoopKind::NonLooping, 0, 0))
    };
    if length == 0 {
        return Ok(ModuleSample::new(empty(c5_rate), default_volume.min(64)));
    }
    if flags & FLAG_COMPRESSED != 0 {
        tracing::warn!("compressed IT sample data is unsupported, loading silence");
        return Ok(ModuleSample::new(empty(c5_rate), default_volume.min(64)));
    }

    reader.seek(data_pointer)?;
    let frames: Vec<f32> = if flags & FLAG_16BIT != 0 {
        let raw = reader.read_bytes(length * 2)?;
        raw.chunks_exact(2)
            .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
            .collect()
    } else {
        let raw = reader.read_bytes(length)?;
        raw.iter().map(|byte| f32::from(*byte as i8) / 128.0).collect()
    };

    let loop_end = loop_end.min(length);
    let params = if flags & FLAG_LOOPING != 0 && loop_begin < loop_end {
        LoopParams::new(LoopKind::ForwardLooping, loop_begin, loop_end)
    } else {
        LoopParams::new(LoopKind::NonLooping, 0, 0)
    };

    Ok(ModuleSample::new(
        Sample::new(frames, c5_rate, params),
        default_volume.min(64),
    ))
}

fn load_pattern(reader: &mut ByteReader) -> Result<Pattern, LoadError> {
    let data_length = reader.read_u16()? as usize;
    let row_count = reader.read_u16()? as usize;
    reader.skip(4)?;
    let mut data = reader.read_bytes(data_length)?.iter();

    let mut pattern = Pattern::new(CHANNEL_COUNT, row_count);
    let mut last_masks = [0u8; CHANNEL_COUNT];
    let mut last_entries = [PatternEntry::default(); CHANNEL_COUNT];

    let mut row = 0;
    while row < row_count {
        let Some(&channel_variable) = data.next() else { break };
        if channel_variable == 0 {
            row += 1;
            continue;
        }

        let channel = ((channel_variable as usize).wrapping_sub(1)) & 63;
        let mut mask = last_masks[channel];
        if channel_variable & 0x80 != 0 {
            mask = *data.next().unwrap_or(&0);
        }

        let mut entry = PatternEntry::default();
        if mask & 1 != 0 {
            entry.note = decode_note(*data.next().unwrap_or(&253));
        }
        if mask & 2 != 0 {
            entry.instrument = *data.next().unwrap_or(&0);
        }
        if mask & 4 != 0 {
            let volume = *data.next().unwrap_or(&0);
            if volume <= 64 {
                entry.volume_effect = Effect::new(Command::SetVolume, volume);
            }
        }
        if mask & 8 != 0 {
            let command = command_from_raw(*data.next().unwrap_or(&0));
            let mut info = *data.next().unwrap_or(&0);
            if command == Command::BreakToRow {
                info = unpack_decimal(info);
            }
            entry.effect = Effect::new(command, info);
        }
        if mask & 16 != 0 {
            entry.note = last_entries[channel].note;
        }
        if mask & 32 != 0 {
            entry.instrument = last_entries[channel].instrument;
        }
        if mask & 64 != 0 {
            entry.volume_effect = last_entries[channel].volume_effect;
        }
        if mask & 128 != 0 {
            entry.effect = last_entries[channel].effect;
        }

        *pattern.channel_mut(channel).row_mut(row) = entry;
        last_masks[channel] = mask;
        last_entries[channel] = entry;
    }
    Ok(pattern)
}

/// IT note byte: a plain semitone count from C-0; 253 empty, 254 off,
/// 255 cut.
fn decode_note(note: u8) -> Note {
    match note {
        253 => Note::Empty,
        254 => Note::Off,
        255 => Note::Cut,
        _ => Note::Playable(note.min(119)),
    }
}
