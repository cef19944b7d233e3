//! Refiner implementation - the optimize/evaluate feedback loop

use crate::prompts::{evaluator_prompt, optimizer_prompt, EVALUATOR_SYSTEM, OPTIMIZER_SYSTEM};
use crate::verdict::{AcceptancePolicy, Verdict};
use refiner_error::Result;
use refiner_provider::{CompletionRequest, LlmProvider, UsageTracker};

/// Configuration for the refiner
#[derive(Debug, Clone)]
pub struct RefinerConfig {
    /// Upper bound on optimizer/evaluator rounds
    pub max_iterations: usize,
    /// Sampling temperature for rewrites
    pub optimizer_temperature: f32,
    /// Sampling temperature for judging; 0 keeps verdicts repeatable
    pub evaluator_temperature: f32,
    /// How judge replies become accept/reject decisions
    pub acceptance: AcceptancePolicy,
    /// Print per-iteration progress to stdout
    pub verbose: bool,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            optimizer_temperature: 0.7,
            evaluator_temperature: 0.0,
            acceptance: AcceptancePolicy::default(),
            verbose: true,
        }
    }
}

/// Where a refinement run ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefinementState {
    Iterating,
    /// The judge approved the last draft
    Accepted,
    /// The iteration cap was hit without approval
    Exhausted,
}

/// Result of a refinement run
#[derive(Debug, Clone)]
pub struct Refinement {
    /// Accepted draft, or the last draft produced
    pub text: String,
    pub state: RefinementState,
    /// Optimizer/evaluator rounds performed
    pub iterations: usize,
    /// Snapshot of the refiner's token usage when the run ended
    pub usage: UsageTracker,
}

impl Refinement {
    pub fn is_accepted(&self) -> bool {
        self.state == RefinementState::Accepted
    }
}

/// Drives a provider through rewrite and judge rounds
pub struct Refiner<P: LlmProvider> {
    provider: P,
    config: RefinerConfig,
    usage: UsageTracker,
}

impl<P: LlmProvider> Refiner<P> {
    /// Create a refiner with default configuration
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, RefinerConfig::default())
    }

    pub fn with_config(provider: P, config: RefinerConfig) -> Self {
        Self {
            provider,
            config,
            usage: UsageTracker::new(),
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &RefinerConfig {
        &self.config
    }

    /// Token usage accumulated over every call made so far
    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Same request as `LlmProvider::generate`, but keeps the usage figures
    async fn ask(&mut self, system: &str, user: String, temperature: f32) -> Result<String> {
        let request = CompletionRequest::instruct(system, user, temperature);
        let response = self.provider.complete(request).await?;

        let model = if response.model.is_empty() {
            self.provider.default_model()
        } else {
            response.model.as_str()
        };
        self.usage.track(model, &response.usage);

        response.text()
    }

    /// Ask for a rewrite of `text`, steered by `feedback` when there is some
    pub async fn optimizer_step(&mut self, text: &str, feedback: Option<&str>) -> Result<String> {
        let temperature = self.config.optimizer_temperature;
        self.ask(OPTIMIZER_SYSTEM, optimizer_prompt(text, feedback), temperature)
            .await
    }

    /// Judge `candidate` against the prompt the run started from
    pub async fn evaluator_step(&mut self, original_prompt: &str, candidate: &str) -> Result<Verdict> {
        let temperature = self.config.evaluator_temperature;
        let user = evaluator_prompt(original_prompt, candidate, self.config.acceptance.threshold());
        let reply = self.ask(EVALUATOR_SYSTEM, user, temperature).await?;

        Ok(self.config.acceptance.judge(&reply))
    }

    /// Run the loop and report how it ended.
    ///
    /// Provider failures abort the run and are returned unchanged.
    pub async fn refine(&mut self, initial_text: &str) -> Result<Refinement> {
        let max_iterations = self.config.max_iterations;
        let mut current = initial_text.to_string();
        let mut feedback: Option<String> = None;
        let mut state = RefinementState::Iterating;
        let mut iterations = 0;

        while iterations < max_iterations {
            iterations += 1;
            tracing::info!(iteration = iterations, max_iterations, "starting iteration");
            if self.config.verbose {
                println!("\nIteration {}", iterations);
            }

            let candidate = self.optimizer_step(&current, feedback.as_deref()).await?;
            if self.config.verbose {
                println!("Optimized: {}\n", candidate);
            }

            let verdict = self.evaluator_step(initial_text, &candidate).await?;
            tracing::info!(
                iteration = iterations,
                accepted = verdict.is_accepted(),
                score = ?verdict.score(),
                "evaluated draft"
            );

            current = candidate;
            let (accepted, critique) = verdict.into_parts();
            if accepted {
                state = RefinementState::Accepted;
                if self.config.verbose {
                    println!("Accepted by evaluator");
                }
                break;
            }

            if self.config.verbose {
                if let Some(critique) = &critique {
                    println!("Feedback: {}\n", critique);
                }
            }
            feedback = critique;
        }

        if state == RefinementState::Iterating {
            state = RefinementState::Exhausted;
            tracing::warn!(max_iterations, "no draft accepted within the iteration cap");
            if self.config.verbose {
                println!("Max iterations reached.");
            }
        }

        tracing::info!(
            ?state,
            iterations,
            total_tokens = self.usage.total_tokens(),
            "refinement finished"
        );

        Ok(Refinement {
            text: current,
            state,
            iterations,
            usage: self.usage.clone(),
        })
    }

    /// Run the loop and return only the final text
    pub async fn optimize(&mut self, initial_text: &str) -> Result<String> {
        Ok(self.refine(initial_text).await?.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refiner_error::{Error, ErrorKind};
    use refiner_provider::{CompletionResponse, FinishReason, Role, Usage};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies in order and records every request
    struct ScriptedProvider {
        replies: Mutex<VecDeque<Result<String>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn replying(replies: &[&str]) -> Self {
            Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }

        fn user_message(&self, call: usize) -> String {
            self.requests()[call]
                .messages
                .iter()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .unwrap()
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn default_model(&self) -> &str {
            "scripted-model"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
            self.requests.lock().unwrap().push(request);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("script ran out of replies")?;

            Ok(CompletionResponse {
                id: "cmpl".into(),
                model: String::new(),
                content: Some(reply),
                finish_reason: FinishReason::Stop,
                usage: Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                },
            })
        }
    }

    fn quiet(max_iterations: usize) -> RefinerConfig {
        RefinerConfig {
            max_iterations,
            verbose: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_draft_accepted() {
        let provider = ScriptedProvider::replying(&["Draft one", "Score: 0.9\nGood."]);
        let mut refiner = Refiner::with_config(provider, quiet(5));

        let outcome = refiner.refine("Summarize X.").await.unwrap();

        assert_eq!(outcome.text, "Draft one");
        assert_eq!(outcome.state, RefinementState::Accepted);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(refiner.provider().requests().len(), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_draft() {
        let provider = ScriptedProvider::replying(&[
            "Draft one",
            "Score: 0.3\nToo short.",
            "Draft two",
            "Score: 0.5\nStill vague.",
            "Draft three",
            "Score: 0.6\nCloser.",
        ]);
        let mut refiner = Refiner::with_config(provider, quiet(3));

        let outcome = refiner.refine("Summarize X.").await.unwrap();

        assert_eq!(outcome.text, "Draft three");
        assert_eq!(outcome.state, RefinementState::Exhausted);
        assert!(!outcome.is_accepted());
        assert_eq!(outcome.iterations, 3);
        assert_eq!(refiner.provider().requests().len(), 6);
    }

    #[tokio::test]
    async fn test_feedback_steers_next_rewrite() {
        let critique = "Score: 0.4\nMention Brotli.";
        let provider =
            ScriptedProvider::replying(&["Draft one", critique, "Draft two", "Score: 1"]);
        let mut refiner = Refiner::with_config(provider, quiet(5));

        let text = refiner.optimize("Summarize X.").await.unwrap();
        assert_eq!(text, "Draft two");

        let provider = refiner.provider();
        // First rewrite sees the raw prompt, the second the critique and previous draft.
        assert_eq!(provider.user_message(0), "Summarize X.");
        assert_eq!(
            provider.user_message(2),
            format!("Refine this text to address the feedback: '{}'\n\nText:\nDraft one", critique)
        );
        // The judge always measures against the original prompt.
        assert!(provider.user_message(1).contains("Prompt: Summarize X.\n\nResponse: Draft one"));
        assert!(provider.user_message(3).contains("Prompt: Summarize X.\n\nResponse: Draft two"));
    }

    #[tokio::test]
    async fn test_role_temperatures() {
        let provider = ScriptedProvider::replying(&["Draft", "Score: 1"]);
        let mut refiner = Refiner::with_config(provider, quiet(1));
        refiner.optimize("Summarize X.").await.unwrap();

        let requests = refiner.provider().requests();
        assert_eq!(requests[0].temperature, Some(0.7));
        assert_eq!(requests[0].messages[0].content, OPTIMIZER_SYSTEM);
        assert_eq!(requests[1].temperature, Some(0.0));
        assert_eq!(requests[1].messages[0].content, EVALUATOR_SYSTEM);
    }

    #[tokio::test]
    async fn test_single_iteration_accepted_end_to_end() {
        let provider = ScriptedProvider::replying(&[
            "  X compresses payloads with gzip and Brotli.  ",
            "Score: 1\nComplete and accurate.",
        ]);
        let mut refiner = Refiner::with_config(provider, quiet(1));

        let text = refiner.optimize("Summarize X.").await.unwrap();
        assert_eq!(text, "X compresses payloads with gzip and Brotli.");
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let provider = ScriptedProvider::new(vec![
            Ok("Draft one".into()),
            Err(Error::rate_limited("429").with_operation("openai::complete")),
            Ok("never used".into()),
        ]);
        let mut refiner = Refiner::with_config(provider, quiet(3));

        let err = refiner.refine("Summarize X.").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.operation(), "openai::complete");
        assert_eq!(refiner.provider().requests().len(), 2);
    }

    #[tokio::test]
    async fn test_blank_rewrite_is_an_error() {
        let provider = ScriptedProvider::replying(&["   "]);
        let mut refiner = Refiner::with_config(provider, quiet(3));

        let err = refiner.optimize("Summarize X.").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InferenceFailed);
    }

    #[tokio::test]
    async fn test_zero_iterations_returns_input() {
        let provider = ScriptedProvider::replying(&[]);
        let mut refiner = Refiner::with_config(provider, quiet(0));

        let outcome = refiner.refine("Summarize X.").await.unwrap();

        assert_eq!(outcome.text, "Summarize X.");
        assert_eq!(outcome.state, RefinementState::Exhausted);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(outcome.usage.total_calls, 0);
        assert!(refiner.provider().requests().is_empty());
    }

    #[tokio::test]
    async fn test_marker_policy_in_loop() {
        let replies = ["Draft one", "Score: 0.85", "Draft two", "Score: 0.7"];

        let mut strict = Refiner::with_config(
            ScriptedProvider::replying(&replies),
            RefinerConfig {
                acceptance: AcceptancePolicy::markers(),
                ..quiet(2)
            },
        );
        let outcome = strict.refine("Summarize X.").await.unwrap();
        assert_eq!(outcome.text, "Draft two");
        assert_eq!(outcome.iterations, 2);

        let mut lenient = Refiner::with_config(ScriptedProvider::replying(&replies), quiet(2));
        let outcome = lenient.refine("Summarize X.").await.unwrap();
        assert_eq!(outcome.text, "Draft one");
        assert_eq!(outcome.iterations, 1);
    }

    #[tokio::test]
    async fn test_usage_is_tracked() {
        let provider = ScriptedProvider::replying(&["Draft", "Score: 0.2", "Draft 2", "Score: 0.9"]);
        let mut refiner = Refiner::with_config(provider, quiet(5));
        let outcome = refiner.refine("Summarize X.").await.unwrap();

        let usage = &outcome.usage;
        assert_eq!(usage.total_calls, 4);
        assert_eq!(usage.total_tokens(), 60);
        assert_eq!(usage.by_model["scripted-model"].total_tokens, 60);
        assert_eq!(refiner.usage().total_calls, 4);
    }
}
