use super::traits::Exchange;
use crate::constants::prompts::FOLLOW_UP_INSTRUCTION;

const MISSING_ANSWER: &str = "[no answer recorded]";

/// Builds a follow-up prompt that replays the conversation so far.
///
/// Ollama's generate endpoint is stateless, so each follow-up restates the
/// initial prompt, the first answer, every question/answer pair on the path
/// and finally the new question.
pub fn composite(initial_prompt: &str, history: &[Exchange], question: &str) -> String {
    let mut parts = vec![format!(
        "You were given an image with the initial system prompt: \"{}\"",
        initial_prompt
    )];

    for (index, exchange) in history.iter().enumerate() {
        let answer = exchange.answer.as_deref().unwrap_or(MISSING_ANSWER);
        if index == 0 {
            parts.push(format!("Your initial response to this was: \"{}\"", answer));
        } else {
            parts.push(format!("Then the user asked: \"{}\"", exchange.question));
            parts.push(format!("And you responded: \"{}\"", answer));
        }
    }

    parts.push(format!("Now the user asks: \"{}\"", question));
    parts.push(FOLLOW_UP_INSTRUCTION.to_string());
    parts.join("\n\n")
}
