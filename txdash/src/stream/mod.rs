pub mod scheduler;
pub mod transactions;

pub mod prelude {
    pub use super::{scheduler::Scheduler, transactions::Producer};
}
