pub mod events;
pub mod protocol;
pub mod roster;
pub mod types;

pub use events::{EventBus, EventStream};
pub use protocol::{
    ChatEnvelope, CodecError, EnvelopeKind, Intent, decode, decode_bytes, decode_contact_list,
    encode, encode_contact_list, encode_envelope,
};
pub use roster::Roster;
pub use types::*;
