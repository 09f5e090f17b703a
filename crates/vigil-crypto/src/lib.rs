pub mod hash;

pub use hash::{blake3_hash, commitment_key, evidence_hash, op_id_from_body, seal_submission};
