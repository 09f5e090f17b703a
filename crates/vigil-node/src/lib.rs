pub mod config;
pub mod sequencer;

pub use config::{NodeConfig, StandingEntry, SubmissionRequest};
pub use sequencer::{Clock, Sequencer, SequencerHandle, SystemClock};
