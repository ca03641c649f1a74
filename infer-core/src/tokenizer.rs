//! # Tokenizador WordPiece (estilo BERT)
//!
//! Converte texto bruto em sub-palavras do vocabulário do modelo e depois em ids.
//! Os serviços só dependem do contrato [`Tokenizer`]; [`BertTokenizer`] é a
//! implementação padrão, carregada de `vocab.txt` e montada com os componentes
//! do crate `tokenizers`.
//!
//! ## Etapas
//!
//! 1. **Normalização** ([`BertNormalizer`]): remove caracteres de controle e de
//!    formatação, isola ideogramas CJK e, se `do_lower_case`, converte para
//!    minúsculas e remove acentos.
//! 2. **Pré-tokenização** ([`BertPreTokenizer`]): separa por espaços e por
//!    qualquer pontuação Unicode.
//! 3. **WordPiece**: casamento guloso pelo maior prefixo presente no vocabulário,
//!    continuações prefixadas com `##`.
//!
//! ## Exemplo
//!
//! ```rust
//! use infer_core::tokenizer::{BertTokenizer, Tokenizer, Vocab};
//!
//! let vocab = Vocab::from_tokens(["[PAD]", "[UNK]", "[CLS]", "[SEP]", "un", "##aff", "##able", "北", "京"]);
//! let tokenizer = BertTokenizer::new(vocab, true)?;
//!
//! assert_eq!(tokenizer.tokenize("Unaffable 北京")?, vec!["un", "##aff", "##able", "北", "京"]);
//! # Ok::<(), infer_core::InferenceError>(())
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tokenizers::models::wordpiece::WordPiece;
use tokenizers::normalizers::bert::BertNormalizer;
use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
use tokenizers::{
    Model as _, NormalizedString, Normalizer, OffsetReferential, OffsetType, PreTokenizedString,
    PreTokenizer,
};

use crate::error::{InferenceError, Result};

pub const CLS_TOKEN: &str = "[CLS]";
pub const SEP_TOKEN: &str = "[SEP]";
pub const UNK_TOKEN: &str = "[UNK]";

/// Palavras mais longas que isso viram `[UNK]` direto, sem tentar o WordPiece.
const MAX_INPUT_CHARS_PER_WORD: usize = 100;

/// Contrato consumido pelos construtores de entrada.
///
/// A divisão em sub-palavras é tratada como caixa-preta: qualquer implementação
/// que respeite "texto → sequência ordenada de tokens" e "token → id" serve.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Result<Vec<String>>;

    /// Tokens fora do vocabulário devem mapear para o id de `[UNK]`.
    fn convert_tokens_to_ids(&self, tokens: &[String]) -> Vec<u32>;
}

/// Vocabulário token → id, na ordem das linhas de `vocab.txt`.
#[derive(Debug, Clone, Default)]
pub struct Vocab {
    ids: HashMap<String, u32>,
}

impl Vocab {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| InferenceError::config_load(path, e))?;
        let vocab = Self::from_tokens(raw.lines().map(str::trim));
        if vocab.is_empty() {
            return Err(InferenceError::config_load(path, "vocabulary is empty"));
        }
        Ok(vocab)
    }

    /// Monta o vocabulário atribuindo ids pela posição. Tokens repetidos mantêm o primeiro id.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids = HashMap::new();
        for (i, token) in tokens.into_iter().enumerate() {
            ids.entry(token.into()).or_insert(i as u32);
        }
        Self { ids }
    }

    pub fn get(&self, token: &str) -> Option<u32> {
        self.ids.get(token).copied()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.ids.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Normalizador BERT + pré-tokenizador BERT + WordPiece sobre um [`Vocab`].
#[derive(Debug, Clone)]
pub struct BertTokenizer {
    normalizer: BertNormalizer,
    model: WordPiece,
    unk_id: u32,
}

impl BertTokenizer {
    /// Exige que o vocabulário contenha `[UNK]`, `[CLS]` e `[SEP]`.
    pub fn new(vocab: Vocab, do_lower_case: bool) -> Result<Self> {
        for special in [CLS_TOKEN, SEP_TOKEN] {
            if !vocab.contains(special) {
                return Err(InferenceError::tokenizer(format!(
                    "vocabulary has no {special} token"
                )));
            }
        }
        let unk_id = vocab.get(UNK_TOKEN).ok_or_else(|| {
            InferenceError::tokenizer(format!("vocabulary has no {UNK_TOKEN} token"))
        })?;

        let model = WordPiece::builder()
            .vocab(vocab.ids.into_iter().collect())
            .unk_token(UNK_TOKEN.to_string())
            .continuing_subword_prefix("##".to_string())
            .max_input_chars_per_word(MAX_INPUT_CHARS_PER_WORD)
            .build()
            .map_err(InferenceError::tokenizer)?;

        // strip_accents = None: acompanha o lowercase, como no BERT original
        let normalizer = BertNormalizer::new(true, true, None, do_lower_case);

        Ok(Self {
            normalizer,
            model,
            unk_id,
        })
    }

    pub fn from_file(path: &Path, do_lower_case: bool) -> Result<Self> {
        let vocab = Vocab::from_file(path)?;
        Self::new(vocab, do_lower_case).map_err(|e| InferenceError::config_load(path, e))
    }

    pub fn vocab_size(&self) -> usize {
        self.model.get_vocab_size()
    }

    fn pieces(&self, text: &str) -> tokenizers::Result<Vec<String>> {
        let mut normalized = NormalizedString::from(text);
        self.normalizer.normalize(&mut normalized)?;

        let mut pretokenized = PreTokenizedString::from(normalized);
        BertPreTokenizer.pre_tokenize(&mut pretokenized)?;

        let mut pieces = Vec::new();
        for (word, _, _) in pretokenized.get_splits(OffsetReferential::Normalized, OffsetType::Byte) {
            pieces.extend(self.model.tokenize(word)?.into_iter().map(|t| t.value));
        }
        Ok(pieces)
    }
}

impl Tokenizer for BertTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<String>> {
        self.pieces(text).map_err(InferenceError::tokenizer)
    }

    fn convert_tokens_to_ids(&self, tokens: &[String]) -> Vec<u32> {
        tokens
            .iter()
            .map(|t| self.model.token_to_id(t).unwrap_or(self.unk_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer(lower: bool) -> BertTokenizer {
        let vocab = Vocab::from_tokens([
            "[PAD]", "[UNK]", "[CLS]", "[SEP]", "want", "##want", "##ed", "wa", "un", "runn",
            "##ing", ",", "北", "京", "。", "Hello",
        ]);
        BertTokenizer::new(vocab, lower).unwrap()
    }

    #[test]
    fn test_wordpiece_greedy_longest_match() {
        let tok = tokenizer(true);
        assert_eq!(
            tok.tokenize("unwanted running").unwrap(),
            vec!["un", "##want", "##ed", "runn", "##ing"]
        );
    }

    #[test]
    fn test_unmatchable_word_becomes_unk() {
        let tok = tokenizer(true);
        assert_eq!(tok.tokenize("unwantedX").unwrap(), vec!["[UNK]"]);
    }

    #[test]
    fn test_cjk_chars_are_isolated() {
        let tok = tokenizer(true);
        assert_eq!(tok.tokenize("北京。").unwrap(), vec!["北", "京", "。"]);
    }

    #[test]
    fn test_punctuation_split_and_whitespace_dropped() {
        let tok = tokenizer(true);
        assert_eq!(tok.tokenize(" want ,\twant\n").unwrap(), vec!["want", ",", "want"]);
        assert!(tok.tokenize("   ").unwrap().is_empty());
    }

    #[test]
    fn test_lowercase_flag() {
        assert_eq!(tokenizer(false).tokenize("Hello").unwrap(), vec!["Hello"]);
        assert_eq!(tokenizer(true).tokenize("Hello").unwrap(), vec!["[UNK]"]);
    }

    #[test]
    fn test_control_and_format_chars_removed() {
        let tok = tokenizer(true);
        assert_eq!(tok.tokenize("wa\u{0007}nt").unwrap(), vec!["want"]);
        assert_eq!(tok.tokenize("wa\u{200b}nt").unwrap(), vec!["want"]);
    }

    #[test]
    fn test_long_word_is_unk() {
        let tok = tokenizer(true);
        let long = "a".repeat(MAX_INPUT_CHARS_PER_WORD + 1);
        assert_eq!(tok.tokenize(&long).unwrap(), vec!["[UNK]"]);
    }

    fn latin_tokenizer() -> BertTokenizer {
        let vocab = Vocab::from_tokens([
            "[PAD]", "[UNK]", "[CLS]", "[SEP]", "cafe", "«", "»", "paris", "¿", "que",
        ]);
        BertTokenizer::new(vocab, true).unwrap()
    }

    #[test]
    fn test_lowercase_strips_accents() {
        assert_eq!(latin_tokenizer().tokenize("Café").unwrap(), vec!["cafe"]);
    }

    #[test]
    fn test_unicode_punctuation_is_split() {
        let tok = latin_tokenizer();
        assert_eq!(tok.tokenize("«paris»").unwrap(), vec!["«", "paris", "»"]);
        assert_eq!(tok.tokenize("¿que").unwrap(), vec!["¿", "que"]);
    }

    #[test]
    fn test_ids_with_unknown_fallback() {
        let tok = tokenizer(true);
        let ids = tok.convert_tokens_to_ids(&["[CLS]".into(), "北".into(), "zzz".into(), "[SEP]".into()]);
        assert_eq!(ids, vec![2, 12, 1, 3]);
    }

    #[test]
    fn test_vocab_requires_special_tokens() {
        let vocab = Vocab::from_tokens(["[PAD]", "[CLS]", "[SEP]"]);
        assert!(matches!(
            BertTokenizer::new(vocab, true),
            Err(InferenceError::Tokenizer(_))
        ));
    }

    #[test]
    fn test_vocab_from_file_trims_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.txt");
        fs::write(&path, "[PAD]\r\n[UNK]\n[CLS]\n[SEP]\n北\n").unwrap();
        let tok = BertTokenizer::from_file(&path, true).unwrap();
        assert_eq!(tok.convert_tokens_to_ids(&["北".into()]), vec![4]);
        assert_eq!(tok.vocab_size(), 5);
    }
}
