//! Prompt resolution for a job about to run.
//!
//! Literal submissions use the submitted prompt (or a per-endpoint
//! override). Random submissions ask a [`PromptSource`] and fall back to
//! [`FallbackPrompts`] whenever the source fails.

use std::future::Future;

use rand::seq::SliceRandom;
use thiserror::Error;

use crate::config::EndpointConfig;
use crate::job::{PromptOrigin, Submission};

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt source unavailable: {0}")]
    Unavailable(String),

    #[error("prompt source returned an empty prompt")]
    Empty,
}

/// Something that writes image prompts, typically an LLM.
pub trait PromptSource: Send + Sync + 'static {
    fn generate(
        &self,
        steering: Option<&str>,
    ) -> impl Future<Output = Result<String, PromptError>> + Send;
}

const SUBJECTS: &[&str] = &[
    "a lighthouse on a basalt cliff",
    "a clockwork hummingbird",
    "an abandoned greenhouse",
    "a desert caravan at dusk",
    "a deep-sea research station",
    "a fox in a snowy birch forest",
];
const STYLES: &[&str] = &[
    "oil painting",
    "digital illustration",
    "photorealistic",
    "watercolor",
    "ink wash",
    "isometric 3d render",
];
const LIGHTING: &[&str] = &[
    "cinematic lighting",
    "golden hour",
    "neon glow",
    "soft overcast light",
    "volumetric fog",
];
const DETAILS: &[&str] = &[
    "highly detailed",
    "sharp focus",
    "intricate textures",
    "rich color palette",
    "wide-angle composition",
];

/// Offline prompt generator built from fixed word lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackPrompts;

impl FallbackPrompts {
    /// Compose a prompt around `steering`, or around a random subject.
    pub fn compose(steering: Option<&str>) -> String {
        let mut rng = rand::thread_rng();
        let subject = match steering {
            Some(concept) => concept,
            None => SUBJECTS.choose(&mut rng).copied().unwrap_or("a landscape"),
        };
        let style = STYLES.choose(&mut rng).copied().unwrap_or("digital art");
        let light = LIGHTING.choose(&mut rng).copied().unwrap_or("soft light");
        let details: Vec<&str> = DETAILS.choose_multiple(&mut rng, 2).copied().collect();
        format!("{subject}, {style}, {light}, {}", details.join(", "))
    }
}

impl PromptSource for FallbackPrompts {
    async fn generate(&self, steering: Option<&str>) -> Result<String, PromptError> {
        Ok(Self::compose(steering))
    }
}

/// One prompt per endpoint, in endpoint order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrompts {
    pub prompts: Vec<String>,
    pub origin: PromptOrigin,
}

pub async fn resolve_prompts<P: PromptSource>(
    submission: &Submission,
    endpoints: &[EndpointConfig],
    source: &P,
) -> ResolvedPrompts {
    if !submission.random {
        let prompts = endpoints
            .iter()
            .map(|endpoint| {
                submission
                    .overrides
                    .get(&endpoint.name)
                    .filter(|p| !p.trim().is_empty())
                    .unwrap_or(&submission.prompt)
                    .trim()
                    .to_string()
            })
            .collect();
        return ResolvedPrompts {
            prompts,
            origin: PromptOrigin::Submitted,
        };
    }

    let steering = submission.steering();
    let rounds = if submission.distinct_prompts {
        endpoints.len()
    } else {
        1
    };

    let mut origin = PromptOrigin::Generated;
    let mut generated = Vec::with_capacity(rounds);
    for _ in 0..rounds {
        let prompt = match source.generate(steering).await {
            Ok(prompt) if !clean(&prompt).is_empty() => clean(&prompt).to_string(),
            Ok(_) => {
                tracing::warn!(error = %PromptError::Empty, "Using fallback prompt");
                origin = PromptOrigin::Fallback;
                FallbackPrompts::compose(steering)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Using fallback prompt");
                origin = PromptOrigin::Fallback;
                FallbackPrompts::compose(steering)
            }
        };
        generated.push(prompt);
    }

    let prompts = if submission.distinct_prompts {
        generated
    } else {
        let prompt = generated.pop().unwrap_or_default();
        vec![prompt; endpoints.len()]
    };
    ResolvedPrompts { prompts, origin }
}

// Models sometimes wrap the prompt in quotes despite instructions.
fn clean(prompt: &str) -> &str {
    prompt.trim().trim_matches(|c| c == '"' || c == '\'').trim()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::job::GenerationParams;

    fn endpoints() -> Vec<EndpointConfig> {
        vec![
            EndpointConfig::new("alpha", "http://alpha:2222"),
            EndpointConfig::new("beta", "http://beta:2222"),
        ]
    }

    struct MockSource {
        responses: Mutex<Vec<Result<String, PromptError>>>,
        seen: Mutex<Vec<Option<String>>>,
    }

    impl MockSource {
        fn new(responses: Vec<Result<String, PromptError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl PromptSource for MockSource {
        async fn generate(&self, steering: Option<&str>) -> Result<String, PromptError> {
            self.seen.lock().unwrap().push(steering.map(String::from));
            self.responses.lock().unwrap().remove(0)
        }
    }

    #[tokio::test]
    async fn literal_prompt_is_shared() {
        let submission = Submission::new("  a paper boat  ", GenerationParams::default());
        let resolved = resolve_prompts(&submission, &endpoints(), &FallbackPrompts).await;
        assert_eq!(resolved.origin, PromptOrigin::Submitted);
        assert_eq!(resolved.prompts, vec!["a paper boat", "a paper boat"]);
    }

    #[tokio::test]
    async fn override_replaces_prompt_for_one_endpoint() {
        let submission = Submission::new("a paper boat", GenerationParams::default())
            .with_override("beta", "a steel ship");
        let resolved = resolve_prompts(&submission, &endpoints(), &FallbackPrompts).await;
        assert_eq!(resolved.prompts, vec!["a paper boat", "a steel ship"]);
    }

    #[tokio::test]
    async fn blank_override_is_ignored() {
        let submission =
            Submission::new("a paper boat", GenerationParams::default()).with_override("alpha", " ");
        let resolved = resolve_prompts(&submission, &endpoints(), &FallbackPrompts).await;
        assert_eq!(resolved.prompts[0], "a paper boat");
    }

    #[tokio::test]
    async fn random_mode_asks_source_once_by_default() {
        let source = MockSource::new(vec![Ok("\"a neon koi pond\"".into())]);
        let submission = Submission::random("koi", GenerationParams::default());
        let resolved = resolve_prompts(&submission, &endpoints(), &source).await;
        assert_eq!(resolved.origin, PromptOrigin::Generated);
        assert_eq!(resolved.prompts, vec!["a neon koi pond", "a neon koi pond"]);
        assert_eq!(*source.seen.lock().unwrap(), vec![Some("koi".to_string())]);
    }

    #[tokio::test]
    async fn distinct_random_prompts_per_endpoint() {
        let source = MockSource::new(vec![Ok("first".into()), Ok("second".into())]);
        let submission =
            Submission::random("", GenerationParams::default()).with_distinct_prompts(true);
        let resolved = resolve_prompts(&submission, &endpoints(), &source).await;
        assert_eq!(resolved.prompts, vec!["first", "second"]);
        assert_eq!(*source.seen.lock().unwrap(), vec![None, None]);
    }

    #[tokio::test]
    async fn source_failure_falls_back() {
        let source = MockSource::new(vec![Err(PromptError::Unavailable("offline".into()))]);
        let submission = Submission::random("a cathedral", GenerationParams::default());
        let resolved = resolve_prompts(&submission, &endpoints(), &source).await;
        assert_eq!(resolved.origin, PromptOrigin::Fallback);
        assert!(resolved.prompts[0].starts_with("a cathedral, "));
        assert_eq!(resolved.prompts[0], resolved.prompts[1]);
    }

    #[tokio::test]
    async fn empty_generation_falls_back() {
        let source = MockSource::new(vec![Ok("  \"\" ".into())]);
        let submission = Submission::random("", GenerationParams::default());
        let resolved = resolve_prompts(&submission, &endpoints(), &source).await;
        assert_eq!(resolved.origin, PromptOrigin::Fallback);
        assert!(!resolved.prompts[0].is_empty());
    }

    #[test]
    fn fallback_compose_uses_steering_concept() {
        let prompt = FallbackPrompts::compose(Some("a glass whale"));
        assert!(prompt.starts_with("a glass whale, "));
        assert_eq!(prompt.matches(", ").count(), 4);
    }

    #[test]
    fn fallback_compose_picks_subject() {
        let prompt = FallbackPrompts::compose(None);
        assert!(SUBJECTS.iter().any(|s| prompt.starts_with(s)));
    }
}
