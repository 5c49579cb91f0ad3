pub mod broadcast;
pub mod processor;
pub mod producer;
pub mod reader;
pub mod relay;
pub mod simulated;
pub mod use_case;

pub use processor::Processor;
