pub mod analyst;
pub mod chat;
pub mod tokenizer;

pub use analyst::{Analysis, AnalysisRequest, DocumentAnalyst, OpenAiAnalyst};
pub use chat::{ChatClient, Usage};
pub use tokenizer::{TiktokenTokenizer, Tokenizer};
