pub mod adapter;

pub use adapter::{GeminiConfig, GeminiGenerator, DEFAULT_MODEL, DEFAULT_STORE_NAME};
