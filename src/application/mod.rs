pub mod copy;
pub mod loan;
pub mod retry;
