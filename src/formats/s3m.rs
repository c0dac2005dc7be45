use crate::bytereader::ByteReader;
use crate::module::{Command, Effect, Module, ModuleSample, Note, Pattern, PatternEntry};
use crate::sample::{LoopKind, LoopParams, Sample};

use super::{command_from_raw, unpack_decimal, LoadError};

const CHANNEL_COUNT: usize = 32;
const ROW_COUNT: usize = 64;

/// Scream Tracker 3. Counts live at 0x20, speed/tempo at 0x31, the order
/// list at 0x60, and everything else hangs off 16-byte parapointers.
pub(super) fn load(data: &[u8]) -> Result<Module, LoadError> {
    let mut reader = ByteReader::new(data);
    let mut module = Module::default();

    reader.seek(0x20)?;
    let order_count = reader.read_u16()? as usize;
    let instrument_count = reader.read_u16()? as usize;
    let pattern_count = reader.read_u16()? as usize;

    reader.seek(0x31)?;
    module.initial_speed = reader.read_u8()?;
    module.initial_tempo = reader.read_u8()?;

    reader.seek(0x60)?;
    module.pattern_order = reader.read_bytes(order_count)?.to_vec();

    let mut instrument_pointers = Vec::with_capacity(instrument_count);
    for _ in 0..instrument_count {
        instrument_pointers.push(reader.read_u16()? as usize * 16);
    }
    let mut pattern_pointers = Vec::with_capacity(pattern_count);
    for _ in 0..pattern_count {
        pattern_pointers.push(reader.read_u16()? as usize * 16);
    }

    for pointer in instrument_pointers {
        reader.seek(pointer)?;
        module.samples.push(load_sample(&mut reader)?);
    }
    for pointer in pattern_pointers {
        reader.seek(pointer)?;
        module.patterns.push(load_pattern(&mut reader)?);
    }

    tracing::debug!(
        orders = order_count,
        samples = module.samples.len(),
        patterns = module.patterns.len(),
        "loaded S3M module"
    );
    Ok(module)
}

fn load_sample(reader: &mut ByteReader) -> Result<ModuleSample, LoadError> {
    // Instrument header: type byte and DOS filename, then the fields we
    // care about.
    reader.skip(0x0E)?;
    let data_pointer = reader.read_u16()? as usize * 16;
    let length = reader.read_u16()? as usize;
    let _length_hi = reader.read_u16()?;
    let loop_begin = reader.read_u16()? as usize;
    let _loop_begin_hi = reader.read_u16()?;
    let loop_end = reader.read_u16()? as usize;
    let _loop_end_hi = reader.read_u16()?;
    let default_volume = reader.read_u8()?;
    let _reserved = reader.read_u8()?;
    let pack = reader.read_u8()?;
    let flags = reader.read_u8()?;
    let c5_rate = reader.read_u16()? as u32;

    if pack != 0 {
        tracing::warn!("packed S3M sample data is unsupported, loading silence");
        return Ok(ModuleSample::new(
            Sample::new(Vec::new(), c5_rate, LoopParams::new(LoopKind::NonLooping, 0, 0)),
            default_volume.min(64),
        ));
    }

    reader.seek(data_pointer)?;
    let raw = reader.read_bytes(length)?;
    // S3M PCM is unsigned 8-bit.
    let frames: Vec<f32> = raw
        .iter()
        .map(|byte| f32::from(*byte) / 255.0 * 2.0 - 1.0)
        .collect();

    let looping = flags & 0x01 != 0;
    let loop_end = loop_end.min(length);
    let params = if looping && loop_begin < loop_end {
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
    // The length field counts itself.
    let data_length = (reader.read_u16()? as usize).saturating_sub(2);
    let mut data = reader.read_bytes(data_length)?.iter();

    let mut pattern = Pattern::new(CHANNEL_COUNT, ROW_COUNT);
    let mut row = 0;
    while row < ROW_COUNT {
        let Some(&control) = data.next() else { break };
        if control == 0 {
            row += 1;
            continue;
        }

        let channel = (control & 31) as usize;
        let mut entry = PatternEntry::default();
        if control & 0x20 != 0 {
            let note = *data.next().unwrap_or(&255);
            let instrument = *data.next().unwrap_or(&0);
            entry.note = decode_note(note);
            entry.instrument = instrument;
        }
        if control & 0x40 != 0 {
            let volume = *data.next().unwrap_or(&0);
            entry.volume_effect = Effect::new(Command::SetVolume, volume.min(64));
        }
        if control & 0x80 != 0 {
            let command = command_from_raw(*data.next().unwrap_or(&0));
            let mut info = *data.next().unwrap_or(&0);
            if command == Command::BreakToRow {
                info = unpack_decimal(info);
            }
            entry.effect = Effect::new(command, info);
        }
        *pattern.channel_mut(channel).row_mut(row) = entry;
    }
    Ok(pattern)
}

/// S3M note byte: high nibble octave (one below ours), low nibble
/// semitone; 255 empty, 254 key off.
fn decode_note(note: u8) -> Note {
    match note {
        255 => Note::Empty,
        254 => Note::Off,
        _ => {
            let index = note & 0x0F;
            if index > 11 {
                tracing::warn!(note, "S3M note byte out of range, treating as empty");
                return Note::Empty;
            }
            Note::playable(index, (note >> 4) + 1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Hand-built single-pattern S3M: two orders, no instruments, one
    /// pattern with `C-5 01 .. A03` on channel 0.
    fn tiny_s3m() -> Vec<u8> {
        let mut data = vec![0u8; 0x70];
        data[0x20] = 2; // order count
        data[0x24] = 1; // pattern count
        data[0x2C..0x30].copy_from_slice(b"SCRM");
        data[0x31] = 6; // initial speed
        data[0x32] = 125; // initial tempo
        data[0x60] = 0; // order list
        data[0x61] = 255;
        data[0x62..0x64].copy_from_slice(&7u16.to_le_bytes()); // pattern parapointer, 7 * 16 = 0x70

        let mut packed = vec![
            0xA0, // channel 0, note+instrument and command follow
            0x40, // C, octave 4 in file terms
            0x01, // instrument 1
            0x01, // command A
            0x03, // info
            0x00, // end of row 0
        ];
        packed.extend(std::iter::repeat(0).take(63));
        data.extend_from_slice(&((packed.len() as u16 + 2).to_le_bytes()));
        data.extend_from_slice(&packed);
        data
    }

    #[test]
    fn loads_the_header_and_pattern() {
        let module = super::super::load(&tiny_s3m()).unwrap();

        assert_eq!(module.initial_speed, 6);
        assert_eq!(module.initial_tempo, 125);
        assert_eq!(module.pattern_order, vec![0, 255]);
        assert_eq!(module.patterns.len(), 1);

        let entry = module.patterns[0].channel(0).row(0);
        assert_eq!(entry.note, Note::playable(0, 5));
        assert_eq!(entry.instrument, 1);
        assert_eq!(entry.effect, Effect::new(Command::SetSpeed, 3));
    }

    #[test]
    fn break_rows_are_decimal_unpacked() {
        let mut data = tiny_s3m();
        // Rewrite the command to C21 (break to row 21).
        let command_at = 0x70 + 2 + 3;
        data[command_at] = 3;
        data[command_at + 1] = 0x21;

        let module = super::super::load(&data).unwrap();
        let entry = module.patterns[0].channel(0).row(0);
        assert_eq!(entry.effect, Effect::new(Command::BreakToRow, 21));
    }
}
