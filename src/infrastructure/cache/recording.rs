//! Call-recording cache backend for tests
//!
//! Behaves like [`NoCache`](super::NoCache) but keeps every call so tests
//! can assert on the exact cache traffic an operation produced.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::DomainError;
use crate::domain::cache::{CacheBackend, CacheValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallMethod {
    Has,
    Get,
    Set,
    Delete,
}

impl fmt::Display for CallMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Has => "has",
            Self::Get => "get",
            Self::Set => "set",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Arguments of one recorded call
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub args: Vec<Value>,
}

#[derive(Debug, Default)]
pub struct RecordingCache {
    calls: Mutex<HashMap<CallMethod, Vec<Call>>>,
}

impl RecordingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets every recorded call
    pub fn reset(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CallMethod, Vec<Call>>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, method: CallMethod, args: Vec<Value>) {
        self.lock().entry(method).or_default().push(Call { args });
    }

    /// Recorded calls of `method`, in call order
    pub fn calls(&self, method: CallMethod) -> Vec<Call> {
        self.lock().get(&method).cloned().unwrap_or_default()
    }

    /// Keys passed to `method`, in call order
    pub fn keys(&self, method: CallMethod) -> Vec<String> {
        self.calls(method)
            .into_iter()
            .filter_map(|call| call.args.first().and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    /// Number of calls of `method` whose arguments equal `args`.
    ///
    /// An empty `args` matches every call.
    pub fn count(&self, method: CallMethod, args: &[Value]) -> usize {
        self.lock()
            .get(&method)
            .map(|calls| {
                calls
                    .iter()
                    .filter(|call| args.is_empty() || call.args == args)
                    .count()
            })
            .unwrap_or(0)
    }

    fn args_message(args: &[Value]) -> String {
        if args.is_empty() {
            String::new()
        } else {
            format!(" with args {:?}", args)
        }
    }

    /// Panics unless `method` was called exactly once with `args`
    pub fn assert_called_once(&self, method: CallMethod, args: &[Value]) {
        let count = self.count(method, args);
        let message = Self::args_message(args);
        if count < 1 {
            panic!("method {} was not called{}", method, message);
        }
        if count > 1 {
            panic!("method {} was called {} times{}", method, count, message);
        }
    }

    pub fn assert_called_times(&self, method: CallMethod, times: usize, args: &[Value]) {
        let count = self.count(method, args);
        if count != times {
            panic!(
                "method {} was called {} times{} ({} times expected)",
                method,
                count,
                Self::args_message(args),
                times
            );
        }
    }

    pub fn assert_called(&self, method: CallMethod, args: &[Value]) {
        if self.count(method, args) == 0 {
            panic!("method {} was not called{}", method, Self::args_message(args));
        }
    }

    pub fn assert_not_called(&self, method: CallMethod, args: &[Value]) {
        let count = self.count(method, args);
        if count != 0 {
            panic!(
                "method {} was called{} {} times",
                method,
                Self::args_message(args),
                count
            );
        }
    }
}

#[async_trait]
impl CacheBackend for RecordingCache {
    fn name(&self) -> &'static str {
        "RecordingCache"
    }

    async fn initialise(&self) -> Result<(), DomainError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Option<CacheValue> {
        self.record(CallMethod::Get, vec![Value::from(key)]);
        None
    }

    async fn set(&self, key: &str, value: CacheValue) {
        self.record(CallMethod::Set, vec![Value::from(key), value]);
    }

    async fn has(&self, key: &str) -> bool {
        self.record(CallMethod::Has, vec![Value::from(key)]);
        false
    }

    async fn delete(&self, key: &str) -> bool {
        self.record(CallMethod::Delete, vec![Value::from(key)]);
        false
    }
}
