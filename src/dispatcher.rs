use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::client::{EndpointError, ImageGenerator};
use crate::config::EndpointConfig;
use crate::job::{EndpointResult, GenerationParams, JobResult};

/// Fans one job out to every configured endpoint and joins the outcomes.
///
/// Each endpoint call runs in its own task. The join waits for all of
/// them; a failing or slow endpoint never cuts another one short.
pub struct Dispatcher<G> {
    generator: Arc<G>,
    endpoints: Arc<[EndpointConfig]>,
}

impl<G> Clone for Dispatcher<G> {
    fn clone(&self) -> Self {
        Self {
            generator: Arc::clone(&self.generator),
            endpoints: Arc::clone(&self.endpoints),
        }
    }
}

impl<G: ImageGenerator> Dispatcher<G> {
    pub fn new(generator: G, endpoints: Vec<EndpointConfig>) -> Self {
        Self::with_shared(Arc::new(generator), endpoints)
    }

    pub fn with_shared(generator: Arc<G>, endpoints: Vec<EndpointConfig>) -> Self {
        Self {
            generator,
            endpoints: endpoints.into(),
        }
    }

    pub fn endpoints(&self) -> &[EndpointConfig] {
        &self.endpoints
    }

    /// Run `prompts[i]` against endpoint `i`, all at once.
    ///
    /// `on_settle` sees each result as soon as its call finishes, in
    /// completion order. The returned [`JobResult`] is always in endpoint
    /// declaration order.
    pub async fn run<F>(&self, prompts: &[String], params: &GenerationParams, mut on_settle: F) -> JobResult
    where
        F: FnMut(usize, &EndpointResult),
    {
        let params = Arc::new(params.clone());
        let mut tasks = JoinSet::new();
        let mut slot_of = HashMap::with_capacity(self.endpoints.len());

        for (index, endpoint) in self.endpoints.iter().enumerate() {
            let generator = Arc::clone(&self.generator);
            let endpoint = endpoint.clone();
            let prompt = prompts.get(index).cloned().unwrap_or_default();
            let params = Arc::clone(&params);
            let handle = tasks.spawn(async move {
                generator.generate(&endpoint, &prompt, &params).await
            });
            slot_of.insert(handle.id(), index);
        }
        tracing::debug!(endpoints = self.endpoints.len(), "Dispatched endpoint calls");

        let mut slots: Vec<Option<EndpointResult>> = self.endpoints.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (index, result) = match joined {
                Ok((id, result)) => match slot_of.get(&id) {
                    Some(&index) => (index, result),
                    None => continue,
                },
                Err(err) => match slot_of.get(&err.id()) {
                    Some(&index) => {
                        tracing::error!(endpoint = %self.endpoints[index].name, error = %err, "Endpoint task died");
                        let result = self.aborted(index, prompts, err.to_string());
                        (index, result)
                    }
                    None => continue,
                },
            };
            on_settle(index, &result);
            slots[index] = Some(result);
        }

        let endpoints = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| self.aborted(index, prompts, "no result reported".into()))
            })
            .collect();
        JobResult::new(endpoints)
    }

    fn aborted(&self, index: usize, prompts: &[String], detail: String) -> EndpointResult {
        EndpointResult::new(
            self.endpoints[index].name.clone(),
            prompts.get(index).cloned().unwrap_or_default(),
            Err(EndpointError::Aborted { detail }),
            Duration::ZERO,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::job::JobStatus;
    use crate::testing::{Script, ScriptedGenerator, endpoints};

    fn prompts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("prompt {i}")).collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn results_follow_declaration_order() {
        let generator = ScriptedGenerator::new()
            .script("alpha", Script::succeed_after(150))
            .script("beta", Script::succeed_after(10));
        let dispatcher = Dispatcher::new(generator, endpoints());

        let mut settled = Vec::new();
        let result = dispatcher
            .run(&prompts(2), &GenerationParams::default(), |index, _| settled.push(index))
            .await;

        assert_eq!(settled, vec![1, 0]);
        let names: Vec<_> = result.endpoints.iter().map(|r| r.endpoint.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert_eq!(result.status(), JobStatus::Completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn calls_run_concurrently() {
        let generator = ScriptedGenerator::new()
            .script("alpha", Script::succeed_after(200))
            .script("beta", Script::succeed_after(200));
        let dispatcher = Dispatcher::new(generator, endpoints());

        let started = Instant::now();
        dispatcher
            .run(&prompts(2), &GenerationParams::default(), |_, _| {})
            .await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(390), "{elapsed:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn join_waits_for_slowest() {
        let generator = ScriptedGenerator::new()
            .script("alpha", Script::succeed_after(50))
            .script("beta", Script::fail_after(200));
        let dispatcher = Dispatcher::new(generator, endpoints());

        let started = Instant::now();
        let result = dispatcher
            .run(&prompts(2), &GenerationParams::default(), |_, _| {})
            .await;
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(result.status(), JobStatus::PartialFailure);
        assert!(result.endpoints[0].is_success());
        assert!(result.endpoints[1].error().is_some());
    }

    #[tokio::test]
    async fn each_endpoint_gets_its_prompt() {
        let generator = Arc::new(ScriptedGenerator::new());
        let dispatcher = Dispatcher::with_shared(Arc::clone(&generator), endpoints());
        let prompts = vec!["a red door".to_string(), "a blue door".to_string()];

        let result = dispatcher
            .run(&prompts, &GenerationParams::default(), |_, _| {})
            .await;

        assert_eq!(result.endpoints[0].prompt, "a red door");
        assert_eq!(result.endpoints[1].prompt, "a blue door");
        let mut calls = generator.calls();
        calls.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        assert_eq!(calls[0].prompt, "a red door");
        assert_eq!(calls[1].prompt, "a blue door");
    }

    #[tokio::test]
    async fn panicking_call_only_fails_its_slot() {
        let generator = ScriptedGenerator::new().script("alpha", Script::panic());
        let dispatcher = Dispatcher::new(generator, endpoints());

        let mut settled = 0;
        let result = dispatcher
            .run(&prompts(2), &GenerationParams::default(), |_, _| settled += 1)
            .await;

        assert_eq!(settled, 2);
        assert!(matches!(
            result.endpoints[0].error(),
            Some(EndpointError::Aborted { .. })
        ));
        assert_eq!(result.endpoints[0].endpoint, "alpha");
        assert!(result.endpoints[1].is_success());
        assert_eq!(result.status(), JobStatus::PartialFailure);
    }

    #[tokio::test]
    async fn fans_out_to_any_number_of_endpoints() {
        let mut three = endpoints();
        three.push(EndpointConfig::new("gamma", "http://gamma:2222"));
        let generator = ScriptedGenerator::new().script("beta", Script::fail_after(0));
        let dispatcher = Dispatcher::new(generator, three);

        let result = dispatcher
            .run(&prompts(3), &GenerationParams::default(), |_, _| {})
            .await;

        let names: Vec<_> = result.endpoints.iter().map(|r| r.endpoint.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
        assert_eq!(result.succeeded(), 2);
        assert_eq!(result.status(), JobStatus::PartialFailure);
    }
}
