mod copy_service;
mod errors;
pub mod subscriber;

pub use copy_service::{
    CopyUpdate, InventoryDependencies, add_copy, apply_loan_event, borrow_copy, get_book,
    get_copy, get_edition, list_copies, mark_copy_lost, return_copy,
};
pub use errors::{InventoryApplicationError, Result};
pub use subscriber::{ConsumeOutcome, SubscriberDependencies, handle_record, spawn_consumers};
