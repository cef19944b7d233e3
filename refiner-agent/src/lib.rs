//! # Refiner Agent
//!
//! The agent runs the rewrite <-> judge loop:
//! 1. The optimizer rewrites the current draft, steered by the last critique
//! 2. The evaluator scores the rewrite against the original prompt
//! 3. An accepted draft ends the run; otherwise its critique feeds step 1
//! 4. After `max_iterations` rounds the last draft is returned as is
//!
//! The loop is strictly sequential: every call finishes before the next
//! one is issued.

mod prompts;
mod refiner;
mod verdict;

pub use prompts::{evaluator_prompt, optimizer_prompt, EVALUATOR_SYSTEM, OPTIMIZER_SYSTEM};
pub use refiner::{Refinement, RefinementState, Refiner, RefinerConfig};
pub use verdict::{parse_score, AcceptancePolicy, Verdict, ACCEPTANCE_THRESHOLD, PASSING_MARKERS};

use refiner_error::Result;
use refiner_provider::{Credentials, OpenAIProvider, ProviderId};

/// Refine `initial_text` with the named provider and return the final draft.
///
/// An unrecognised `provider` fails with `ErrorKind::Unsupported` before the
/// environment is read or any request is made.
pub async fn optimize(initial_text: &str, provider: &str, max_iterations: usize) -> Result<String> {
    let id: ProviderId = provider.parse()?;
    optimize_with(initial_text, id, max_iterations, &Credentials::from_env()).await
}

/// Like [`optimize`], with explicit credentials
pub async fn optimize_with(
    initial_text: &str,
    provider: ProviderId,
    max_iterations: usize,
    credentials: &Credentials,
) -> Result<String> {
    let provider = OpenAIProvider::from_id(provider, credentials)?;
    let config = RefinerConfig {
        max_iterations,
        ..Default::default()
    };

    Refiner::with_config(provider, config).optimize(initial_text).await
}
