use crate::domain::{
    Barcode, Book, BookFormat, BookId, CopyStatus, Edition, EditionCopy, EditionCopyId, EditionId,
};
use crate::ports::{InventoryRepository, PortError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::lock;

#[derive(Default)]
struct State {
    books: HashMap<BookId, Book>,
    editions: HashMap<EditionId, Edition>,
    copies: BTreeMap<EditionCopyId, EditionCopy>,
    last_id: i64,
    failing_operations: usize,
    lose_next_race: bool,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn take_failure(&mut self) -> Result<()> {
        if self.failing_operations > 0 {
            self.failing_operations -= 1;
            return Err(PortError::unavailable("injected inventory store failure"));
        }
        Ok(())
    }
}

/// インメモリの在庫リポジトリ
pub struct InMemoryInventoryRepository {
    state: Mutex<State>,
}

impl InMemoryInventoryRepository {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    pub fn add_book(&self, title: &str, author: &str) -> Book {
        let mut state = lock(&self.state);
        let book = Book {
            book_id: BookId::from_raw(state.next_id()),
            title: title.to_string(),
            author: author.to_string(),
        };
        state.books.insert(book.book_id, book.clone());
        book
    }

    pub fn add_edition(&self, book_id: BookId, edition: &str, format: BookFormat) -> Edition {
        let mut state = lock(&self.state);
        let id = state.next_id();
        let edition = Edition {
            edition_id: EditionId::from_raw(id),
            book_id,
            isbn: format!("978-0-00-{id:06}-0"),
            publisher: "Library Press".to_string(),
            publication_year: 1965,
            edition: edition.to_string(),
            format,
        };
        state.editions.insert(edition.edition_id, edition.clone());
        edition
    }

    pub fn add_copy(&self, edition_id: EditionId, status: CopyStatus) -> EditionCopy {
        let copy_id = EditionCopyId::from_raw(lock(&self.state).next_id());
        let copy = EditionCopy {
            status,
            ..EditionCopy::acquire(copy_id, edition_id, Utc::now())
        };
        self.put_copy(copy.clone());
        copy
    }

    /// IDとバーコードを指定してコピーを置く
    pub fn put_copy(&self, copy: EditionCopy) {
        let mut state = lock(&self.state);
        state.last_id = state.last_id.max(copy.copy_id.value());
        state.copies.insert(copy.copy_id, copy);
    }

    pub fn put_copy_with_barcode(
        &self,
        copy_id: EditionCopyId,
        barcode: &str,
        edition_id: EditionId,
        status: CopyStatus,
    ) -> EditionCopy {
        let copy = EditionCopy {
            copy_id,
            barcode: Barcode::new(barcode),
            status,
            edition_id,
            acquired_at: Utc::now(),
        };
        self.put_copy(copy.clone());
        copy
    }

    /// 次のn回の操作をストア停止として失敗させる
    pub fn fail_next_operations(&self, count: usize) {
        lock(&self.state).failing_operations = count;
    }

    /// 次のcompare-and-setを競合負けにする
    pub fn lose_next_compare_and_set(&self) {
        lock(&self.state).lose_next_race = true;
    }

    pub fn copy_status(&self, copy_id: EditionCopyId) -> Option<CopyStatus> {
        lock(&self.state).copies.get(&copy_id).map(|copy| copy.status)
    }
}

impl Default for InMemoryInventoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InventoryRepository for InMemoryInventoryRepository {
    async fn next_copy_id(&self) -> Result<EditionCopyId> {
        Ok(EditionCopyId::from_raw(lock(&self.state).next_id()))
    }

    async fn insert_copy(&self, copy: &EditionCopy) -> Result<()> {
        let mut state = lock(&self.state);
        state.take_failure()?;

        if state.copies.values().any(|existing| existing.barcode == copy.barcode) {
            return Err(PortError::Conflict(format!(
                "The barcode {} is already in use",
                copy.barcode
            )));
        }
        state.copies.insert(copy.copy_id, copy.clone());
        Ok(())
    }

    async fn find_copy(&self, copy_id: EditionCopyId) -> Result<Option<EditionCopy>> {
        let mut state = lock(&self.state);
        state.take_failure()?;
        Ok(state.copies.get(&copy_id).cloned())
    }

    async fn find_copies_by_edition(&self, edition_id: EditionId) -> Result<Vec<EditionCopy>> {
        Ok(lock(&self.state)
            .copies
            .values()
            .filter(|copy| copy.edition_id == edition_id)
            .cloned()
            .collect())
    }

    async fn compare_and_set_status(
        &self,
        copy_id: EditionCopyId,
        expected: CopyStatus,
        new_status: CopyStatus,
    ) -> Result<bool> {
        let mut state = lock(&self.state);
        state.take_failure()?;

        if std::mem::take(&mut state.lose_next_race) {
            return Ok(false);
        }

        match state.copies.get_mut(&copy_id) {
            Some(copy) if copy.status == expected => {
                copy.status = new_status;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(PortError::NotFound(format!(
                "An edition copy with the id {} could not be found",
                copy_id
            ))),
        }
    }

    async fn find_edition(&self, edition_id: EditionId) -> Result<Option<Edition>> {
        Ok(lock(&self.state).editions.get(&edition_id).cloned())
    }

    async fn find_book(&self, book_id: BookId) -> Result<Option<Book>> {
        Ok(lock(&self.state).books.get(&book_id).cloned())
    }
}
