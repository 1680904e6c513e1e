pub mod nip01;
pub mod nip25;

pub use nip01::{
    Event, Filter, KIND_METADATA, KIND_REACTION, KIND_TEXT_NOTE, UnsignedEvent, is_timeline_kind,
    unix_now,
};
pub use nip25::{REACTION_LIKE, reaction_tags, reacted_event_id};
