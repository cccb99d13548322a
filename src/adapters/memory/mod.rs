//! インメモリアダプター
//!
//! テストとローカル実行用。ストアごとに1つのMutexで行単位の原子性を再現する。

pub mod broker;
pub mod inventory_repository;
pub mod loan_repository;

pub use broker::InMemoryBroker;
pub use inventory_repository::InMemoryInventoryRepository;
pub use loan_repository::InMemoryLoanRepository;

use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
