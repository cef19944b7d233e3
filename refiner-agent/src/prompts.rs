//! Prompt text for the optimizer and evaluator roles

pub const OPTIMIZER_SYSTEM: &str =
    "You are a helpful assistant that refines text based on evaluator feedback.";

pub const EVALUATOR_SYSTEM: &str =
    "You are a strict evaluator judging the quality of LLM outputs.";

/// User instruction for a rewrite. Without feedback the text is sent as is.
pub fn optimizer_prompt(text: &str, feedback: Option<&str>) -> String {
    match feedback {
        Some(feedback) => format!(
            "Refine this text to address the feedback: '{}'\n\nText:\n{}",
            feedback, text
        ),
        None => text.to_string(),
    }
}

/// User instruction for judging `response` against the original `prompt`
pub fn evaluator_prompt(prompt: &str, response: &str, threshold: f32) -> String {
    format!(
        "Evaluate the following response to the prompt. \
         Score it 0–1. If under {threshold}, explain what must be improved.\n\
         Begin your reply with a line of the form `Score: <number between 0 and 1>`.\n\n\
         Prompt: {prompt}\n\nResponse: {response}"
    )
}
