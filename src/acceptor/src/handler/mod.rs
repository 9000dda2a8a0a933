pub mod decoder;
pub mod insert_handler;

pub use decoder::{DecodeError, DecodeOptions, decode_samples};
pub use insert_handler::{
    IngestError, IngestSummary, InsertHandler, InsertHandlerState, handle_insert,
};
