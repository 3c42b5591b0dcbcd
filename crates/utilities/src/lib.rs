pub mod backoff;
pub mod task_scope;

pub use backoff::Backoff;
pub use task_scope::TaskScope;
