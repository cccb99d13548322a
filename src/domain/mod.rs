pub mod catalog;
pub mod commands;
pub mod copy;
pub mod errors;
pub mod events;
pub mod loan;
pub mod value_objects;

pub use catalog::*;
pub use copy::{CopyOperation, CopyStatus, EditionCopy};
pub use errors::*;
pub use events::*;
pub use loan::{Borrower, Loan, LoanOperation, LoanStatus, LoanedCopy};
pub use value_objects::*;
