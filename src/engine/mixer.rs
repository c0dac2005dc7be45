use super::{TickHandler, Voice, VoiceEvent};

/// A [`VoiceEvent`] addressed to one of the mixer's voices.
#[derive(Debug, Clone, PartialEq)]
pub struct MixerEvent {
    pub channel: usize,
    pub action: VoiceEvent,
}

impl MixerEvent {
    pub fn new(channel: usize, action: VoiceEvent) -> Self {
        MixerEvent { channel, action }
    }
}

const SCRATCH_LEN: usize = 1024;

/// Owns the voice bank and the clock. `render` counts samples down to the
/// next tick boundary, fires the handler there, and sums every voice into
/// the output in between. Nothing here allocates after construction.
pub struct Mixer {
    voices: Vec<Voice>,
    scratch: Vec<f32>,
    output_rate: u32,
    samples_per_tick: usize,
    samples_until_next_tick: usize,
}

impl Mixer {
    pub fn new(output_rate: u32, voice_count: usize) -> Self {
        Mixer {
            voices: (0..voice_count).map(|_| Voice::new()).collect(),
            scratch: vec![0.0; SCRATCH_LEN],
            output_rate,
            samples_per_tick: 1,
            samples_until_next_tick: 0,
        }
    }

    /// Give `handler` its pre-roll: it installs `samples_per_tick` here so
    /// the first `render` call starts on a correctly sized tick.
    pub fn attach_handler(&mut self, handler: &mut dyn TickHandler) {
        handler.on_attachment(self);
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn set_samples_per_tick(&mut self, samples_per_tick: usize) {
        self.samples_per_tick = samples_per_tick.max(1);
    }

    pub fn voice(&self, channel: usize) -> &Voice {
        &self.voices[channel]
    }

    pub fn voice_mut(&mut self, channel: usize) -> &mut Voice {
        &mut self.voices[channel]
    }

    /// Forward an event to its voice. Events addressed past the voice bank
    /// are dropped rather than trusted.
    pub fn process_event(&mut self, event: MixerEvent) {
        if let Some(voice) = self.voices.get_mut(event.channel) {
            voice.process_event(event.action);
        }
    }

    /// The pull entry point: fill `out`, firing `handler.on_tick` at every
    /// tick boundary. All handler work for a tick happens before any frame
    /// of that tick is rendered.
    pub fn render(&mut self, out: &mut [f32], handler: &mut dyn TickHandler) {
        out.fill(0.0);
        let mut offset = 0;
        while offset < out.len() {
            if self.samples_until_next_tick == 0 {
                handler.on_tick(self);
                self.samples_until_next_tick = self.samples_per_tick;
            }
            let take = self
                .samples_until_next_tick
                .min(out.len() - offset)
                .min(self.scratch.len());
            let span = &mut out[offset..offset + take];
            for voice in &mut self.voices {
                voice.render(&mut self.scratch[..take], self.output_rate);
                for (frame, rendered) in span.iter_mut().zip(&self.scratch[..take]) {
                    *frame += rendered;
                }
            }
            offset += take;
            self.samples_until_next_tick -= take;
        }
    }
}
