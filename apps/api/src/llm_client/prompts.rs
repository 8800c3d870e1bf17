// Prompt fragments shared by every completion call.
// Task-specific prompts live next to the code that builds them.

/// System message sent ahead of every user prompt.
pub const STRICT_JSON_SYSTEM: &str =
    "You are a strict JSON extractor. Reply with only one valid JSON object and no extra text.";
