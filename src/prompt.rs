//! Grounded prompt construction.
//!
//! Builds the completion prompt from the user question and the retrieved
//! context, trimming the context to fit the model's context window. The
//! word budget reserves roughly 35% of the window for the instruction
//! block, the question, and the model's own output; words are a coarse
//! proxy for tokens and the reserved margin absorbs the estimation error.

const BASE_INSTRUCTION: &str = "You are a helpful assistant. Answer strictly using the provided \
    context. If the context is insufficient, say you don't know or that the documents do not \
    contain the answer.";

/// Fraction of the context window granted to retrieved context.
const CONTEXT_BUDGET_RATIO: f64 = 0.65;
/// Floor on the context word budget, so tiny windows still carry context.
const MIN_CONTEXT_WORDS: usize = 64;

/// Render the full prompt: instruction block, context section, question.
///
/// The shape is deterministic — identical inputs produce an identical
/// prompt string.
pub fn build_prompt(query: &str, context: &str, context_window_tokens: usize) -> String {
    let instructions = if context.trim().is_empty() {
        format!("{} (Note: no context was provided.)", BASE_INSTRUCTION)
    } else {
        BASE_INSTRUCTION.to_string()
    };

    let budget = MIN_CONTEXT_WORDS.max((context_window_tokens as f64 * CONTEXT_BUDGET_RATIO) as usize);
    let snippet = context
        .split_whitespace()
        .take(budget)
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "{}\n\nContext:\n{}\n\nQuestion: {}\nAnswer:",
        instructions, snippet, query
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_section(prompt: &str) -> &str {
        let start = prompt.find("Context:\n").unwrap() + "Context:\n".len();
        let end = prompt.find("\n\nQuestion:").unwrap();
        &prompt[start..end]
    }

    #[test]
    fn context_is_truncated_to_the_word_budget() {
        let context = vec!["word"; 1000].join(" ");
        let prompt = build_prompt("q?", &context, 100);
        // max(64, floor(100 * 0.65)) = 65
        assert_eq!(context_section(&prompt).split_whitespace().count(), 65);
        assert!(prompt.len() < context.len());
    }

    #[test]
    fn small_windows_fall_back_to_the_floor() {
        let context = vec!["word"; 500].join(" ");
        let prompt = build_prompt("q?", &context, 10);
        assert_eq!(context_section(&prompt).split_whitespace().count(), 64);
    }

    #[test]
    fn empty_context_appends_the_note() {
        let prompt = build_prompt("what is up?", "  ", 4096);
        assert!(prompt.contains("(Note: no context was provided.)"));
        assert!(prompt.contains("Question: what is up?"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn nonempty_context_omits_the_note() {
        let prompt = build_prompt("q", "some retrieved text", 4096);
        assert!(!prompt.contains("no context was provided"));
        assert!(prompt.contains("Context:\nsome retrieved text"));
    }

    #[test]
    fn prompt_is_deterministic() {
        let a = build_prompt("q", "ctx ctx ctx", 2048);
        let b = build_prompt("q", "ctx ctx ctx", 2048);
        assert_eq!(a, b);
    }

    #[test]
    fn context_whitespace_is_collapsed_to_single_spaces() {
        let prompt = build_prompt("q", "a\n\nb\t c", 2048);
        assert_eq!(context_section(&prompt), "a b c");
    }
}
