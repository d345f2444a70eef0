pub(crate) mod context;
mod coordinator;
pub mod hook;
pub(crate) mod registry;
pub(crate) mod stream;
pub(crate) mod worker;
