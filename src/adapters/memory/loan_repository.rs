use crate::domain::{Loan, LoanEvent, LoanId};
use crate::ports::{LoanOutbox, LoanRepository, OutboxEntry, PortError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

use super::lock;

#[derive(Default)]
struct State {
    loans: HashMap<LoanId, Loan>,
    last_loan_id: i64,
    outbox: Vec<(OutboxEntry, bool)>,
    last_outbox_id: i64,
    failing_writes: usize,
}

impl State {
    fn take_failure(&mut self) -> Result<()> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(PortError::unavailable("injected loan store failure"));
        }
        Ok(())
    }

    fn append_outbox(&mut self, event: &LoanEvent) {
        self.last_outbox_id += 1;
        let entry = OutboxEntry {
            id: self.last_outbox_id,
            event: *event,
            created_at: Utc::now(),
        };
        self.outbox.push((entry, false));
    }
}

/// インメモリの貸出リポジトリ兼アウトボックス
///
/// 貸出の書き込みとアウトボックスへの追加は同じロックの中で行う。
/// 1つのコピーに有効な貸出は1件までとし、2件目の追加はConflictになる。
pub struct InMemoryLoanRepository {
    state: Mutex<State>,
}

impl InMemoryLoanRepository {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// 次のn回の書き込み（insert/update）を失敗させる
    pub fn fail_next_writes(&self, count: usize) {
        lock(&self.state).failing_writes = count;
    }

    /// テスト用に貸出を直接置く
    pub fn put(&self, loan: Loan) {
        let mut state = lock(&self.state);
        state.last_loan_id = state.last_loan_id.max(loan.loan_id.value());
        state.loans.insert(loan.loan_id, loan);
    }

    /// テスト用にアウトボックスへ直接追加する
    pub fn enqueue(&self, event: LoanEvent) {
        lock(&self.state).append_outbox(&event);
    }

    pub fn loan_count(&self) -> usize {
        lock(&self.state).loans.len()
    }

    /// 未発行のアウトボックスエントリ数
    pub fn unpublished_count(&self) -> usize {
        lock(&self.state)
            .outbox
            .iter()
            .filter(|(_, published)| !published)
            .count()
    }
}

impl Default for InMemoryLoanRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LoanRepository for InMemoryLoanRepository {
    async fn next_id(&self) -> Result<LoanId> {
        let mut state = lock(&self.state);
        state.last_loan_id += 1;
        Ok(LoanId::from_raw(state.last_loan_id))
    }

    async fn insert(&self, loan: &Loan, event: Option<&LoanEvent>) -> Result<Loan> {
        let mut state = lock(&self.state);
        state.take_failure()?;

        if state.loans.contains_key(&loan.loan_id) {
            return Err(PortError::Conflict(format!(
                "A loan with id {} already exists",
                loan.loan_id
            )));
        }

        let copy_id = loan.copy.edition_copy_id;
        let copy_on_loan = loan.status.is_active()
            && state
                .loans
                .values()
                .any(|other| other.copy.edition_copy_id == copy_id && other.status.is_active());
        if copy_on_loan {
            return Err(PortError::Conflict(format!(
                "The edition copy with id {copy_id} already has an active loan"
            )));
        }

        let saved = Loan {
            version: 1,
            ..loan.clone()
        };
        state.loans.insert(saved.loan_id, saved.clone());
        if let Some(event) = event {
            state.append_outbox(event);
        }

        Ok(saved)
    }

    async fn update(&self, loan: &Loan, event: Option<&LoanEvent>) -> Result<Loan> {
        let mut state = lock(&self.state);
        state.take_failure()?;

        let current_version = match state.loans.get(&loan.loan_id) {
            Some(current) => current.version,
            None => {
                return Err(PortError::NotFound(format!(
                    "The loan with id {} could not be found",
                    loan.loan_id
                )));
            }
        };

        if current_version != loan.version {
            return Err(PortError::Conflict(format!(
                "The loan with id {} was modified concurrently",
                loan.loan_id
            )));
        }

        let saved = Loan {
            version: loan.version + 1,
            ..loan.clone()
        };
        state.loans.insert(saved.loan_id, saved.clone());
        if let Some(event) = event {
            state.append_outbox(event);
        }

        Ok(saved)
    }

    async fn find_by_id(&self, loan_id: LoanId) -> Result<Option<Loan>> {
        Ok(lock(&self.state).loans.get(&loan_id).cloned())
    }
}

#[async_trait]
impl LoanOutbox for InMemoryLoanRepository {
    async fn pending(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        Ok(lock(&self.state)
            .outbox
            .iter()
            .filter(|(_, published)| !published)
            .take(limit)
            .map(|(entry, _)| entry.clone())
            .collect())
    }

    async fn mark_published(&self, ids: &[i64]) -> Result<()> {
        let mut state = lock(&self.state);
        for (entry, published) in state.outbox.iter_mut() {
            if ids.contains(&entry.id) {
                *published = true;
            }
        }
        Ok(())
    }
}
