pub mod clock;
pub mod hook_delegate;
pub mod sink;
