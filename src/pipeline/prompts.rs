//! Prompt templates and the fixed answers substituted when a dependency fails.

use crate::index::SearchHit;

/// Characters of document text forwarded to the summarizer.
pub const SUMMARY_INPUT_CHARS: usize = 2_000;

/// Chat answer when embedding or generation is unavailable.
pub const DEGRADED_ANSWER: &str =
    "The AI service is temporarily unavailable. Please try again in a moment.";
/// Chat answer when retrieval found nothing to ground the answer on.
pub const NO_DOCUMENT_ANSWER: &str = "No relevant document was found for this question.";
/// Upload summary when the summarizer call failed.
pub const SUMMARY_FAILED: &str = "summary generation failed";
/// Upload summary when the summarizer answered with nothing, or the text was blank.
pub const SUMMARY_MISSING: &str = "no summary available";
/// Upload summary for content that is not valid UTF-8 text.
pub const BINARY_SUMMARY: &str = "analysis unavailable (binary file)";
/// Listing summary for documents without an indexed record.
pub const LISTING_PLACEHOLDER: &str = "No AI summary available for this document.";

/// Separator between retrieved passages in the chat context.
const CONTEXT_SEPARATOR: &str = "\n\n";

/// Instruction asking for a one-sentence summary of the document prefix.
pub fn summary_prompt(text: &str) -> String {
    let prefix = match text.char_indices().nth(SUMMARY_INPUT_CHARS) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    };
    format!(
        "Summarize the following document in a single sentence of at most 50 characters. \
         Reply with the sentence only.\n\n{prefix}"
    )
}

/// Join retrieved passages into the context block.
pub fn build_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| hit.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// Instruction that confines the answer to the retrieved context.
pub fn answer_prompt(context: &str, question: &str) -> String {
    format!(
        "You are an assistant that answers questions using only the document below.\n\
         If the document does not contain the answer, say that you don't know.\n\n\
         [Document]\n{context}\n\n\
         [Question]\n{question}\n\n\
         [Answer]\n"
    )
}
