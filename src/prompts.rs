//! Fixed instruction strings sent to the model endpoint.
//!
//! Agent prompts are user-editable and live in [`crate::agents`]; everything
//! here is constant: the OCR instruction, the separators that frame a
//! document body, and the quick-notes presets.

/// Instruction sent with every OCR request, ahead of the page images.
pub const OCR_INSTRUCTION: &str = "You are a high-precision OCR engine. Transcribe the text in these document pages exactly as it appears. Maintain the original structure. If there are tables, format them as Markdown tables. Do not add conversational text, just the transcription.";

/// Returned by the OCR step when the endpoint yields no text.
pub const NO_TEXT_EXTRACTED: &str = "No text extracted.";

/// Fixed prompt of the "transform notes to Markdown" action.
pub const MARKDOWN_TRANSFORM_PROMPT: &str = "Convert the following text into clean, well-structured Markdown. Use headers, bullet points, and bold text where appropriate to improve readability. Do not remove information.";

/// Initial content of the quick-notes buffer.
pub const DEFAULT_NOTES: &str = "# Quick Notes\n\n- [ ] Check contraindications\n- [ ] Verify dosage";

/// Sampling temperature of every refinement call.
pub const REFINEMENT_TEMPERATURE: f32 = 0.3;

/// One-click refinement prompts offered next to the notes editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotePreset {
    FixGrammar,
    Checklist,
}

impl NotePreset {
    pub const ALL: [NotePreset; 2] = [NotePreset::FixGrammar, NotePreset::Checklist];

    pub fn label(self) -> &'static str {
        match self {
            NotePreset::FixGrammar => "Fix Grammar",
            NotePreset::Checklist => "Checklist",
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            NotePreset::FixGrammar => "Fix grammar and improve readability.",
            NotePreset::Checklist => "Convert to a Markdown checklist.",
        }
    }
}

/// Content part of a stage call: the agent's prefix, then the document body.
pub fn stage_content(user_prefix: &str, input: &str) -> String {
    format!("{user_prefix}\n\n---Document Content---\n{input}")
}

/// Content part of a refinement call.
pub fn refinement_content(prompt: &str, text: &str) -> String {
    format!("{prompt}\n\n---Input Text---\n{text}")
}
