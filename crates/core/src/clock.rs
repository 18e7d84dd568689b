//! Time and identity collaborators
//!
//! Workflows never call `Utc::now()` or `Uuid::new_v4()` directly. They receive
//! a [`Clock`] and an [`IdGenerator`] so tests and replays are deterministic.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Source of unique identifiers and one-time codes
pub trait IdGenerator: Send + Sync {
    fn next_uuid(&self) -> Uuid;

    /// A numeric code of exactly `len` digits
    fn next_code(&self, len: usize) -> String;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Random v4 UUIDs and uniformly random digit codes
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn next_uuid(&self) -> Uuid {
        Uuid::new_v4()
    }

    fn next_code(&self, len: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..len)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Starts at 2024-01-01T00:00:00Z
    pub fn at_epoch() -> Self {
        Self::new(DateTime::<Utc>::from_timestamp(1_704_067_200, 0).unwrap_or_default())
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = instant;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|e| *e.into_inner())
    }
}

/// Deterministic ids: UUIDs count up from 1, codes come from a queue
///
/// Once the queued codes run out, codes are the zero-padded counter.
#[derive(Debug, Default)]
pub struct SequentialIds {
    counter: AtomicU64,
    codes: Mutex<VecDeque<String>>,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            counter: AtomicU64::new(0),
            codes: Mutex::new(codes.into_iter().map(Into::into).collect()),
        }
    }

    /// Queue a code for the next `next_code` call
    pub fn push_code(&self, code: impl Into<String>) {
        if let Ok(mut codes) = self.codes.lock() {
            codes.push_back(code.into());
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_uuid(&self) -> Uuid {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Uuid::from_u128(n as u128)
    }

    fn next_code(&self, len: usize) -> String {
        if let Some(code) = self.codes.lock().ok().and_then(|mut q| q.pop_front()) {
            return code;
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let digits = format!("{:0width$}", n, width = len);
        digits[digits.len() - len..].to_string()
    }
}
