use anyhow::{Result, anyhow};
use tiktoken_rs::{CoreBPE, o200k_base};

pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;
    fn decode(&self, tokens: &[u32]) -> Result<String>;
}

pub struct TiktokenTokenizer {
    bpe: CoreBPE,
}

impl TiktokenTokenizer {
    pub fn new() -> Result<Self> {
        let bpe = o200k_base().map_err(|err| anyhow!("failed to load o200k_base: {err}"))?;
        Ok(Self { bpe })
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_with_special_tokens(text)
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.bpe.decode(tokens.to_vec())
    }
}

/// A UTF-8 character is at most four bytes, and each byte may sit in its own
/// token.
const MAX_SPLIT_TOKENS: usize = 3;

/// Cuts `text` down to at most `max_tokens` tokens. Text already within
/// budget is returned unchanged. When the cut lands inside a multi-byte
/// character, the partial character is dropped.
pub fn truncate_to_budget(tokenizer: &dyn Tokenizer, text: &str, max_tokens: usize) -> Result<String> {
    let tokens = tokenizer.encode(text);
    if tokens.len() <= max_tokens {
        return Ok(text.to_string());
    }

    let floor = max_tokens.saturating_sub(MAX_SPLIT_TOKENS);
    let mut last_err = None;
    for end in (floor..=max_tokens).rev() {
        match tokenizer.decode(&tokens[..end]) {
            Ok(decoded) => return Ok(decoded),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("no decodable prefix within {max_tokens} tokens")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_untouched() {
        let tokenizer = TiktokenTokenizer::new().unwrap();
        let text = "A short document.";
        assert_eq!(truncate_to_budget(&tokenizer, text, 8000).unwrap(), text);
    }

    #[test]
    fn long_text_is_cut_to_budget() {
        let tokenizer = TiktokenTokenizer::new().unwrap();
        let text = "word ".repeat(500);
        let truncated = truncate_to_budget(&tokenizer, &text, 50).unwrap();
        assert!(tokenizer.encode(&truncated).len() <= 50);
        assert!(text.starts_with(&truncated));
    }

    #[test]
    fn multibyte_text_is_cut_on_character_boundaries() {
        let tokenizer = TiktokenTokenizer::new().unwrap();
        let text = "📄🧾✅ 文档分析服务 ".repeat(400);
        for budget in 1..200 {
            let truncated = truncate_to_budget(&tokenizer, &text, budget)
                .unwrap_or_else(|err| panic!("budget {budget}: {err}"));
            assert!(text.starts_with(&truncated), "budget {budget}");
            assert!(truncated.len() < text.len(), "budget {budget}");
        }
    }
}
