pub mod critical_section;
pub mod semaphore;
