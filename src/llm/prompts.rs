//! Prompt construction for translation and rolling-minutes summarization.
//!
//! The texts are part of the product's compatibility surface; change them
//! and downstream parsing of the minutes sections changes too.

use super::client::Message;

pub const SUMMARY_SYSTEM_PROMPT: &str = "You are a meeting assistant.\n\
Summarize ONLY what is in the transcript.\n\
Output Markdown with sections:\n\
## Summary\n## Decisions\n## Action Items\n## Open Questions\n\
If a section has none, write 'None'.\n\
Do not invent.\n";

pub const ROLLING_SUMMARY_SYSTEM_PROMPT: &str = "You are a meeting assistant.\n\
Summarize ONLY what is in the transcript.\n\
Update the summary to incorporate the new transcript.\n\
Output Markdown with sections:\n\
## Summary\n## Decisions\n## Action Items\n## Open Questions\n\
If a section has none, write 'None'.\n\
Do not invent.\n";

pub fn translation_system_prompt(target_lang: &str) -> String {
    format!(
        "Translate the user text to {target_lang}.\n\
         Rules:\n\
         - Output ONLY the translation.\n\
         - No explanations, no notes, no options, no extra lines.\n\
         - Preserve meaning and tone.\n"
    )
}

/// Messages for one translation call. Runs at temperature 0.0.
pub fn translation_messages(target_lang: &str, text: &str) -> Vec<Message> {
    vec![
        Message::system(translation_system_prompt(target_lang)),
        Message::user(text),
    ]
}

/// Messages for one minutes regeneration. With a previous summary the
/// rolling variant is used and the block is framed as new material.
/// Runs at temperature 0.2.
pub fn summary_messages(transcript_block: &str, previous_summary: &str) -> Vec<Message> {
    if previous_summary.trim().is_empty() {
        vec![
            Message::system(SUMMARY_SYSTEM_PROMPT),
            Message::user(transcript_block),
        ]
    } else {
        vec![
            Message::system(ROLLING_SUMMARY_SYSTEM_PROMPT),
            Message::user(format!(
                "Previous summary:\n{previous_summary}\n\nNew transcript since last summary:\n{transcript_block}"
            )),
        ]
    }
}
