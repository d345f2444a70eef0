pub mod layout;
pub mod negotiator;
pub mod wire_format;
