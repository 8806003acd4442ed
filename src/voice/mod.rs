//! Voice output
//!
//! Speech synthesis, loudness envelopes and speaker playback. The frame
//! loop only ever touches [`TtsPipeline::start`]; synthesis runs on a task
//! and playback on its own thread.

pub mod envelope;
mod pipeline;
mod playback;
mod resample;
mod tts;
mod wav;

pub use pipeline::{
    FALLBACK_ENVELOPE_POINTS, FALLBACK_SAMPLE_RATE, PlaybackEnded, Speech, Synthesis, TtsPipeline,
    Utterance, synthesize,
};
pub use playback::{
    ActiveOutput, AudioSink, ClockSink, CpalSink, FinishedCallback, PlaybackId, PlaybackWorker,
};
pub use resample::{apply_speaking_rate, resample};
pub use tts::{
    ElevenLabsSynth, MAX_RATE, MIN_RATE, OpenAiSynth, Pcm, Synthesizer, VoiceSettings, decode_mp3,
};
pub use wav::{read_wav, samples_to_wav, write_wav};
