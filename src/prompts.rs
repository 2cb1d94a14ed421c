pub struct Prompts;

impl Prompts {
    /// Leads the long-term memory block. Sent even when nothing was recalled.
    pub const LONG_TERM_PREAMBLE: &'static str =
        "these are some previous messages from the chat, use them to generate a response";

    pub const FALLBACK_REPLY: &'static str =
        "Sorry, I could not generate a response right now. Please try again.";

    pub const WELCOME_MESSAGE: &'static str =
        "Welcome! This is the start of your new chat. Ask anything to begin.";
}
