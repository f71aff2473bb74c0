//! Shared fixtures for repeater integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use repeater::{delay_then, Error, Task};

/// How long a hanging call sleeps; far beyond any deadline used in tests
pub const HANG: Duration = Duration::from_millis(1500);

/// Deadline used when a call is expected to time out
pub const DEADLINE: Duration = Duration::from_millis(20);

/// Context shared by calls against one remote service
#[derive(Debug, Default)]
pub struct Service {
    pub name: String,
    pub calls: AtomicU32,
    pub hang_first: u32,
}

impl Service {
    pub fn new(name: &str, hang_first: u32) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: AtomicU32::new(0),
            hang_first,
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Fetch `key` from the service; the first `hang_first` calls never answer in time
pub fn fetch(service: &Arc<Service>, key: u32) -> Task<u32, Error> {
    let call = service.calls.fetch_add(1, Ordering::SeqCst) + 1;
    if call <= service.hang_first {
        delay_then(HANG, move || Task::ok(key))
    } else {
        delay_then(Duration::from_millis(1), move || Task::ok(key * 100))
    }
}
