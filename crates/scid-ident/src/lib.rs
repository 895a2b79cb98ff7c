pub mod chain;
pub mod generator;
pub mod hash;

pub use chain::{chain_code_for_chain_id, resolve_chain};
pub use generator::{
    checksum, format_for_display, format_sequence, format_year, generate, generate_batch,
    generate_with_checksum, next_sequence_from_scids, parse, same_artist, validate,
    GenerateOptions, ScidComponents,
};
pub use hash::artist_hash;
