pub mod ban;
pub mod constants;
pub mod error;
pub mod event;
pub mod operation;
pub mod params;
pub mod records;
pub mod types;

pub use ban::{BanTier, BanTiers};
pub use constants::*;
pub use error::VigilError;
pub use event::{Event, EventRecord};
pub use operation::*;
pub use params::ProtocolParams;
pub use records::*;
pub use types::*;
