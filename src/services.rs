pub mod quota;
pub mod transfer;
pub mod vault;

pub use quota::{Admission, QuotaLedger};
pub use vault::Vault;
