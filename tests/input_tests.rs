// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for attaching to a published virtual camera

use camfx::backends::virtual_camera::{InputAdapter, NodeDirectory, NodeInfo, RetryPolicy};
use camfx::errors::InputError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Node directory that replays scripted listings, one per call
struct Scripted {
    replies: Mutex<VecDeque<Result<Vec<NodeInfo>, InputError>>>,
    calls: Mutex<u32>,
}

impl Scripted {
    fn new(replies: Vec<Result<Vec<NodeInfo>, InputError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

impl NodeDirectory for Scripted {
    fn video_sources(&self) -> Result<Vec<NodeInfo>, InputError> {
        *self.calls.lock() += 1;
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

fn node(id: u32, name: &str) -> NodeInfo {
    NodeInfo {
        id,
        serial: None,
        node_name: Some(name.to_string()),
        media_name: None,
        description: None,
    }
}

fn policy(max_attempts: u32, base_ms: u64) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(base_ms),
    }
}

#[test]
fn test_transient_discovery_failures_are_retried() {
    let directory = Scripted::new(vec![
        Err(InputError::Discovery("pw-dump exited with 1".into())),
        Err(InputError::Discovery("pw-dump exited with 1".into())),
        Ok(vec![node(41, "webcam")]),
    ]);

    let started = Instant::now();
    let result = InputAdapter::open_with(&directory, "camfx", policy(3, 20));
    let elapsed = started.elapsed();

    assert_eq!(directory.calls(), 3);
    // Waits after attempts 1 and 2 are base and 2 * base
    assert!(elapsed >= Duration::from_millis(60), "elapsed {:?}", elapsed);
    match result {
        Err(InputError::Exhausted { attempts, last }) => {
            assert_eq!(attempts, 3);
            assert!(last.contains("camfx"), "last error: {}", last);
        }
        Err(other) => panic!("expected Exhausted, got {}", other),
        Ok(_) => panic!("no source called camfx was listed"),
    }
}

#[test]
fn test_missing_source_reports_not_found() {
    let directory = Scripted::new(vec![
        Ok(vec![node(41, "webcam")]),
        Ok(vec![node(41, "webcam")]),
    ]);

    let result = InputAdapter::open_with(&directory, "camfx", policy(2, 0));

    assert_eq!(directory.calls(), 2);
    assert!(matches!(result, Err(InputError::NotFound(name)) if name == "camfx"));
}

#[test]
fn test_single_attempt_does_not_wait() {
    let directory = Scripted::new(vec![Err(InputError::Discovery("no pw-dump".into()))]);

    let started = Instant::now();
    let result = InputAdapter::open_with(&directory, "camfx", policy(1, 1_000));

    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(directory.calls(), 1);
    assert!(matches!(result, Err(InputError::Exhausted { attempts: 1, .. })));
}

#[test]
fn test_retry_recovers_before_exhaustion() {
    let mut seen = Vec::new();
    let result = policy(4, 0).run("attach", |attempt| {
        seen.push(attempt);
        match attempt {
            1 => Err(InputError::NotFound("camfx".into())),
            2 => Err(InputError::Pipeline("not negotiated".into())),
            _ => Ok("attached"),
        }
    });

    assert_eq!(result, Ok("attached"));
    assert_eq!(seen, vec![1, 2, 3]);
}

#[test]
fn test_mixed_failures_are_exhausted_not_missing() {
    let result: Result<(), _> = policy(3, 0).run("attach", |attempt| {
        if attempt == 2 {
            Err(InputError::Pipeline("not negotiated".into()))
        } else {
            Err(InputError::NotFound("camfx".into()))
        }
    });

    match result {
        Err(InputError::Exhausted { attempts, last }) => {
            assert_eq!(attempts, 3);
            assert_eq!(last, InputError::NotFound("camfx".into()).to_string());
        }
        other => panic!("expected Exhausted, got {:?}", other),
    }
}

#[test]
fn test_zero_attempts_still_tries_once() {
    let mut calls = 0;
    let result: Result<(), _> = policy(0, 0).run("attach", |_| {
        calls += 1;
        Err(InputError::NotFound("camfx".into()))
    });

    assert_eq!(calls, 1);
    assert_eq!(result, Err(InputError::NotFound("camfx".into())));
}
