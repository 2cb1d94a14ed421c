use crate::models::{MemoryHit, Message, Role};
use crate::oai::ContentBlock;
use crate::prompts::Prompts;

/// Builds the generation prompt: one `user` block carrying the recalled
/// long-term memory, then the recent transcript verbatim. The transcript
/// always comes last, whatever the recency of the recalled entries.
pub fn assemble_context(long_term: &[MemoryHit], recent: &[Message]) -> Vec<ContentBlock> {
    let recalled = long_term
        .iter()
        .map(|hit| hit.metadata.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    let mut blocks = Vec::with_capacity(recent.len() + 1);
    blocks.push(ContentBlock::new(
        Role::User,
        format!("{}\n\n{}", Prompts::LONG_TERM_PREAMBLE, recalled),
    ));
    blocks.extend(
        recent
            .iter()
            .map(|message| ContentBlock::new(message.role, message.content.clone())),
    );
    blocks
}
