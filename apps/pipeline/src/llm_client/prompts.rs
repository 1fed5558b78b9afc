// Prompt fragments shared by several stages.
// Stage-specific templates live in stages/prompts.rs.

/// Appended to every document-generation prompt.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Only use facts present in the job posting or the candidate profile provided. \
    Do NOT invent employers, dates, certifications or technologies. \
    Never leave template placeholders such as [Company] or {{name}} in the output.";
