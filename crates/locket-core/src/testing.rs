//! Test doubles shared by the core test modules

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use locket_common::{Lock, LocketError, Resource, Result};
use locket_persistence::LockDb;
use parking_lot::Mutex;

type FetchStub = Arc<dyn Fn(&str) -> Result<Lock> + Send + Sync>;

/// Recording `LockDb` with programmable results
#[derive(Default)]
pub(crate) struct FakeLockDb {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    lock_result: Option<Result<Lock>>,
    lock_args: Vec<(Resource, i64)>,
    release_result: Option<Result<()>>,
    release_args: Vec<Resource>,
    fetch_result: Option<Result<Lock>>,
    fetch_by_key: HashMap<String, Lock>,
    fetch_stub: Option<FetchStub>,
    fetch_args: Vec<String>,
    fetch_all_result: Option<Result<Vec<Lock>>>,
    fetch_all_args: Vec<String>,
    count_result: Option<Result<usize>>,
    count_by_type: HashMap<String, usize>,
    count_args: Vec<String>,
}

impl FakeLockDb {
    pub fn lock_returns(&self, result: Result<Lock>) {
        self.state.lock().lock_result = Some(result);
    }

    pub fn lock_args(&self) -> Vec<(Resource, i64)> {
        self.state.lock().lock_args.clone()
    }

    pub fn release_returns(&self, result: Result<()>) {
        self.state.lock().release_result = Some(result);
    }

    pub fn release_args(&self) -> Vec<Resource> {
        self.state.lock().release_args.clone()
    }

    pub fn release_call_count(&self) -> usize {
        self.state.lock().release_args.len()
    }

    pub fn fetch_returns(&self, result: Result<Lock>) {
        self.state.lock().fetch_result = Some(result);
    }

    /// Answer fetches of `lock.key()` with `lock`
    pub fn fetch_by_key(&self, lock: Lock) {
        self.state
            .lock()
            .fetch_by_key
            .insert(lock.key().to_string(), lock);
    }

    pub fn fetch_stub(&self, stub: impl Fn(&str) -> Result<Lock> + Send + Sync + 'static) {
        self.state.lock().fetch_stub = Some(Arc::new(stub));
    }

    pub fn fetch_args(&self) -> Vec<String> {
        self.state.lock().fetch_args.clone()
    }

    pub fn fetch_call_count(&self) -> usize {
        self.state.lock().fetch_args.len()
    }

    pub fn fetch_all_returns(&self, result: Result<Vec<Lock>>) {
        self.state.lock().fetch_all_result = Some(result);
    }

    pub fn fetch_all_args(&self) -> Vec<String> {
        self.state.lock().fetch_all_args.clone()
    }

    pub fn count_returns(&self, result: Result<usize>) {
        self.state.lock().count_result = Some(result);
    }

    pub fn count_for_type(&self, lock_type: &str, count: usize) {
        self.state
            .lock()
            .count_by_type
            .insert(lock_type.to_string(), count);
    }

    pub fn count_args(&self) -> Vec<String> {
        self.state.lock().count_args.clone()
    }
}

#[async_trait]
impl LockDb for FakeLockDb {
    async fn lock(&self, resource: &Resource, ttl_in_seconds: i64) -> Result<Lock> {
        let mut state = self.state.lock();
        state.lock_args.push((resource.clone(), ttl_in_seconds));
        state.lock_result.clone().unwrap_or_else(|| {
            Ok(Lock {
                resource: resource.normalized(),
                modified_index: 1,
                modified_id: "guid".to_string(),
                ttl_in_seconds,
            })
        })
    }

    async fn release(&self, resource: &Resource) -> Result<()> {
        let mut state = self.state.lock();
        state.release_args.push(resource.clone());
        state.release_result.clone().unwrap_or(Ok(()))
    }

    async fn fetch(&self, key: &str) -> Result<Lock> {
        let stub = {
            let mut state = self.state.lock();
            state.fetch_args.push(key.to_string());
            if let Some(stub) = state.fetch_stub.clone() {
                stub
            } else if let Some(lock) = state.fetch_by_key.get(key) {
                return Ok(lock.clone());
            } else {
                return state
                    .fetch_result
                    .clone()
                    .unwrap_or(Err(LocketError::ResourceNotFound));
            }
        };
        stub(key)
    }

    async fn fetch_all(&self, lock_type: &str) -> Result<Vec<Lock>> {
        let mut state = self.state.lock();
        state.fetch_all_args.push(lock_type.to_string());
        state.fetch_all_result.clone().unwrap_or(Ok(Vec::new()))
    }

    async fn count(&self, lock_type: &str) -> Result<usize> {
        let mut state = self.state.lock();
        state.count_args.push(lock_type.to_string());
        if let Some(result) = state.count_result.clone() {
            return result;
        }
        Ok(state.count_by_type.get(lock_type).copied().unwrap_or(0))
    }
}

/// Wait until `condition` holds, failing after two seconds
pub(crate) async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition was not met in time");
}

/// Check that `condition` stays false for a while
pub(crate) async fn never(condition: impl Fn() -> bool) {
    for _ in 0..20 {
        assert!(!condition(), "condition unexpectedly held");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
