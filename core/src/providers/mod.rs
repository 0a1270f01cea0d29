pub mod factory;
pub mod openai;

pub use factory::{ModelRef, available_providers, create_provider, resolve_api_key};
pub use openai::OpenAIProvider;
