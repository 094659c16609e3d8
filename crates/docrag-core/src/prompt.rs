//! Prompt Builder.
//!
//! [`build_prompt`] renders the single instruction template used for every
//! answer. It is a pure function of its inputs.
//!
//! Neither the query nor the context is escaped. Text from indexed documents
//! and from callers is injected verbatim, so instructions embedded in either
//! can steer the model; callers that accept untrusted documents or queries
//! must treat the prompt as a trust boundary.

/// Substituted for the context when retrieval found nothing.
pub const NO_CONTEXT: &str = "No matching context found.";

const INSTRUCTION: &str = "Answer the question using only the context below. \
If the context does not contain the answer, say that you don't know.";

/// Render the answer prompt for `query` over `context`.
///
/// A blank `context` is replaced by [`NO_CONTEXT`], so the model is told
/// explicitly that nothing relevant was found.
///
/// ```rust
/// use docrag_core::prompt::{build_prompt, NO_CONTEXT};
///
/// let p = build_prompt("Who wrote it?", "");
/// assert!(p.contains("Who wrote it?"));
/// assert!(p.contains(NO_CONTEXT));
/// assert!(p.ends_with("Answer:"));
/// ```
pub fn build_prompt(query: &str, context: &str) -> String {
    let context = if context.trim().is_empty() {
        NO_CONTEXT
    } else {
        context
    };
    format!(
        "{}\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
        INSTRUCTION, context, query
    )
}
