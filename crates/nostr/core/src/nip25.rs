//! NIP-25 reactions.

use crate::nip01::Event;

/// Content of a "like" reaction.
pub const REACTION_LIKE: &str = "+";

/// Tags for a reaction to `target`: the reacted event and its author.
pub fn reaction_tags(target: &Event) -> Vec<Vec<String>> {
    vec![
        vec!["e".to_string(), target.id.clone()],
        vec!["p".to_string(), target.pubkey.clone()],
    ]
}

/// Id of the event a reaction points at (last `e` tag wins, per NIP-25).
pub fn reacted_event_id(reaction: &Event) -> Option<&str> {
    reaction
        .tags
        .iter()
        .rev()
        .find(|tag| tag.first().map(String::as_str) == Some("e"))
        .and_then(|tag| tag.get(1))
        .map(String::as_str)
}
