mod mixer;
mod player;
mod voice;

pub use mixer::{Mixer, MixerEvent};
pub use player::{ChannelState, Player, PROVISIONED_CHANNELS};
pub use voice::{Voice, VoiceEvent};

/// Capability the mixer pulls from at tick boundaries. `on_attachment` runs
/// once, before any rendering, so the handler can install its tick length;
/// `on_tick` runs before any frame of the tick it opens.
pub trait TickHandler {
    fn on_attachment(&mut self, mixer: &mut Mixer);
    fn on_tick(&mut self, mixer: &mut Mixer);
}
