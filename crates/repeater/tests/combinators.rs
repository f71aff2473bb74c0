//! Combinator composition integration tests
//!
//! Tests the combinators working together:
//! - Retrying timeout-guarded calls
//! - Sequences whose steps retry
//! - Retrying a sequence, which resumes on every attempt
//! - Policies loaded from YAML files

mod common;

use std::future::IntoFuture;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use common::*;
use repeater::retry::TimeoutPolicy;
use repeater::{
    resumable, retry, retry_with_policy, sequence_step, timeout, Cause, RetryError, RetryOptions,
    RetryPolicy, SequenceError, SequenceOptions, Task,
};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
enum PipelineError {
    #[error("download failed after {0} attempts")]
    Download(u32),
    #[error("storage unavailable")]
    Storage,
}

#[cfg(test)]
mod retry_with_timeout {
    use super::*;

    #[tokio::test]
    async fn test_timed_out_attempts_are_retried() {
        let service = Service::new("inventory", 2);
        let fetcher = retry(3, timeout(DEADLINE, fetch), RetryOptions::new());

        let start = Instant::now();
        let value = fetcher.call(&service, 7).await.unwrap();

        assert_eq!(value, 700);
        assert_eq!(service.calls(), 3);
        assert!(start.elapsed() < HANG);
    }

    #[tokio::test]
    async fn test_every_attempt_times_out() {
        let service = Service::new("inventory", u32::MAX);
        let fetcher = retry(
            2,
            timeout(DEADLINE, fetch),
            RetryOptions::new().provide_all_errors(true),
        );

        let err = fetcher.call(&service, 1).await.unwrap_err();

        assert_eq!(err.attempts(), 2);
        let errors = err.into_errors().unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|cause| cause.error().is_some_and(|e| e.is_timeout())));
    }

    #[tokio::test]
    async fn test_hook_sees_timeout_cause() {
        let service = Service::new("inventory", 1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();

        let fetcher = retry(
            2,
            timeout(DEADLINE, fetch),
            RetryOptions::new().before_retry(
                move |svc: &Arc<Service>, cause: &Cause<u32, repeater::Error>, attempt| {
                    recorder
                        .lock()
                        .unwrap()
                        .push(format!("{} attempt {}: {}", svc.name, attempt, cause));
                    Task::ok(())
                },
            ),
        );

        assert_eq!(fetcher.call(&service, 3).await.unwrap(), 300);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].starts_with("inventory attempt 1: "));
        assert!(seen[0].contains("TimeoutError"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_calls_on_worker_threads() {
        let fetcher = retry(3, timeout(DEADLINE, fetch), RetryOptions::new());

        let handles: Vec<_> = (0..8u32)
            .map(|key| {
                let service = Service::new("inventory", key % 3);
                let call = fetcher.call(&service, key).into_future();
                tokio::spawn(async move { (service, call.await) })
            })
            .collect();

        for (key, handle) in handles.into_iter().enumerate() {
            let (service, result) = handle.await.unwrap();
            assert_eq!(result.unwrap(), key as u32 * 100);
            assert_eq!(service.calls(), key as u32 % 3 + 1);
        }
    }
}

#[cfg(test)]
mod sequences {
    use super::*;

    #[tokio::test]
    async fn test_sequence_resumes_after_retried_step() {
        let service = Service::new("warehouse", 1);
        let fetcher = retry(2, timeout(DEADLINE, fetch), RetryOptions::new());
        let stored = Arc::new(AtomicU32::new(0));
        let store_calls = stored.clone();
        let failures = Arc::new(Mutex::new(Vec::new()));
        let recorder = failures.clone();

        let pipeline = resumable(
            service.clone(),
            vec![
                sequence_step(move |svc: &Arc<Service>, key: u32| {
                    fetcher
                        .call(svc, key)
                        .map_err(|err: RetryError<u32, repeater::Error>| {
                            PipelineError::Download(err.attempts())
                        })
                }),
                sequence_step(move |_: &Arc<Service>, value: u32| -> Task<u32, PipelineError> {
                    if store_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Task::err(PipelineError::Storage)
                    } else {
                        Task::ok(value + 1)
                    }
                }),
            ],
            SequenceOptions::new(5).on_error(move |svc: &Arc<Service>, err: &PipelineError| {
                recorder.lock().unwrap().push(format!("{}: {}", svc.name, err));
            }),
        );

        let err = pipeline.invoke().await.unwrap_err();
        assert_eq!(err.index(), Some(1));
        assert_eq!(err.to_string(), "Sequence step 1 failed: storage unavailable");
        assert_eq!(service.calls(), 2);
        assert_eq!(pipeline.last_result(), 500);

        assert_eq!(pipeline.invoke().await.unwrap(), 501);
        assert_eq!(service.calls(), 2);
        assert_eq!(stored.load(Ordering::SeqCst), 2);
        assert_eq!(*failures.lock().unwrap(), vec!["warehouse: storage unavailable"]);
    }

    #[tokio::test]
    async fn test_download_step_gives_up() {
        let service = Service::new("warehouse", u32::MAX);
        let fetcher = retry(2, timeout(DEADLINE, fetch), RetryOptions::new());

        let pipeline = resumable(
            service.clone(),
            vec![sequence_step(move |svc: &Arc<Service>, key: u32| {
                fetcher
                    .call(svc, key)
                    .map_err(|err: RetryError<u32, repeater::Error>| {
                        PipelineError::Download(err.attempts())
                    })
            })],
            SequenceOptions::new(1),
        );

        let err = pipeline.invoke().await.unwrap_err();
        assert!(matches!(
            err,
            SequenceError::Step {
                index: 0,
                source: PipelineError::Download(2)
            }
        ));
        assert_eq!(pipeline.progress(), 0);
        assert_eq!(pipeline.last_result(), 1);
    }

    #[tokio::test]
    async fn test_retried_sequence_resumes_each_attempt() {
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));
        let first_calls = first.clone();
        let second_calls = second.clone();

        let pipeline = resumable(
            (),
            vec![
                sequence_step(move |_: &(), n: u32| -> Task<u32, String> {
                    first_calls.fetch_add(1, Ordering::SeqCst);
                    Task::ok(n + 1)
                }),
                sequence_step(move |_: &(), n: u32| -> Task<u32, String> {
                    if second_calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Task::err("not yet".to_string())
                    } else {
                        Task::ok(n * 2)
                    }
                }),
            ],
            SequenceOptions::new(1),
        );

        let value = retry(3, pipeline.clone(), RetryOptions::new())
            .call(&(), ())
            .await
            .unwrap();

        assert_eq!(value, 4);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 3);
        assert!(pipeline.is_complete());
    }
}

#[cfg(test)]
mod configuration {
    use super::*;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    struct ClientConfig {
        retry: RetryPolicy,
        timeout: TimeoutPolicy,
    }

    const CLIENT_YAML: &str = r#"
retry:
  max-attempts: 3
  strategy: fixed-delay
  initial-delay-ms: 10
  max-delay-ms: 100
  jitter: false
timeout:
  timeout-ms: 20
"#;

    #[tokio::test]
    async fn test_policies_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.yaml");
        std::fs::write(&path, CLIENT_YAML).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let config: ClientConfig = serde_yaml_ng::from_str(&content).unwrap();
        config.retry.validate().unwrap();

        let service = Service::new("catalog", 1);
        let fetcher = retry_with_policy(&config.retry, timeout(config.timeout, fetch));

        let start = Instant::now();
        assert_eq!(fetcher.call(&service, 4).await.unwrap(), 400);
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(service.calls(), 2);
    }

    #[tokio::test]
    async fn test_policy_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("retry.yaml");

        let policy = RetryPolicy {
            max_attempts: 5,
            provide_all_errors: true,
            ..RetryPolicy::default()
        };
        std::fs::write(&path, serde_yaml_ng::to_string(&policy).unwrap()).unwrap();

        assert_eq!(RetryPolicy::load(&path).unwrap(), policy);
    }
}
