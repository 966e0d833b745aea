//! Vendor adapters and the registry that selects between them

pub mod gemini;
pub mod http;
pub mod openai;
pub mod registry;
pub mod stability;
pub mod traits;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use registry::{ProviderFactory, ProviderRegistry, ProviderSummary, AUTO};
pub use stability::StabilityProvider;
pub use traits::{GeneratedImage, GenerationOutcome, ImagePayload, ImageProvider};
