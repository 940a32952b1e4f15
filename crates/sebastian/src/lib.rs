pub mod classify;
pub mod event;
pub mod frame;
pub mod generator;
pub mod gm;
pub mod meta;
pub mod ngram;
pub mod note;
pub mod pipeline;
pub mod policy;
pub mod reader;
pub mod scheduler;
pub mod track;
pub mod transcript;
pub mod validate;
pub mod writer;

pub use classify::{classify, EventClass};
pub use event::{decode, DecodedSong, KeySignature, MidiEvent, TimeSignature, TimedEvent};
pub use frame::{Frame, FrameComponent, FrameStats};
pub use generator::{
    generate_transcript, GeneratedPart, GeneratedTranscript, GenerationStats, GenerationTarget,
    Generator, GeneratorConfig, GeneratorState,
};
pub use meta::{ContextTimeline, ContextTracker, MetaContext, SongMeta};
pub use ngram::{train, ModelSet, ModelSetBuilder, NGramBuilder, NGramModel, Voice, VoiceModel};
pub use note::{Note, NoteKey, SoundEvent, SoundEventBuilder, Tick};
pub use pipeline::{
    load_transcripts, remix, remix_files, resolve_meta, PipelineConfig, RemixOutput,
};
pub use policy::{
    ChannelMixingPolicy, MetadataResolutionPolicy, ParsePolicyError, PolicyConfiguration,
    SelectionPolicy, ValidationPolicy,
};
pub use reader::{load_transcript, load_transcript_bytes, TranscriptBuilder};
pub use scheduler::{schedule, schedule_part, PatternSchedule, ScheduledTrack};
pub use track::{Track, TrackBuilder};
pub use transcript::{TrackSummary, Transcript, TranscriptSummary};
pub use validate::{enforce, validate, InputIssue};
pub use writer::{encode, write_file};

use std::path::PathBuf;

/// Errors from loading, modeling and generating MIDI.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("MIDI parse error: {0}")]
    MidiParse(String),

    #[error("MIDI write error: {0}")]
    MidiWrite(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid input: {0}")]
    InvalidInput(#[from] InputIssue),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no frames to generate from: every training track is shorter than the n-gram size")]
    EmptyModel,

    #[error("generation gave up after {iterations} iterations without reaching the target length")]
    GenerationBudgetExceeded { iterations: usize },

    #[error("no input files given")]
    NoInput,
}

pub type Result<T> = std::result::Result<T, Error>;
