//! Item storage: envelope framing, transparent compression, and large-value
//! chunking over the host KV.

mod compress;
mod envelope;
mod item;

pub use compress::Compression;
pub use envelope::{CorruptValue, Envelope, EnvelopePayload, MAGIC, SplitDescriptor, VERSION};
pub use item::{ItemStore, StoreError};
