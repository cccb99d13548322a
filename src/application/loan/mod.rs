mod errors;
mod loan_service;
mod outbox_relay;

pub use errors::{LoanApplicationError, Result};
pub use loan_service::{
    LoanPolicy, ServiceDependencies, create_loan, find_loan, mark_loan_lost, renew_loan,
    return_loan,
};
pub use outbox_relay::{OutboxRelay, RelayTarget};
