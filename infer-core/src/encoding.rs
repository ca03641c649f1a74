//! # Construção da Entrada do Modelo
//!
//! Transforma texto bruto na tripla `(input_ids, input_mask, segment_ids)`.
//!
//! | Tarefa         | Tokenização          | Comprimento final            |
//! |----------------|----------------------|------------------------------|
//! | Classificação  | texto inteiro        | variável (apenas trunca)     |
//! | NER            | caractere a caractere| exatamente `max_seq_length`  |
//!
//! Nos dois casos a sequência é `[CLS] tokens... [SEP]`, com no máximo
//! `max_seq_length - 2` sub-palavras, e o segmento é sempre 0.
//!
//! Textos com mais de `max_seq_length` caracteres são rejeitados com
//! [`InferenceError::InputTooLong`]: não há estratégia de divisão.

use ndarray::Array2;
use tracing::debug;

use crate::error::{InferenceError, Result};
use crate::tokenizer::{Tokenizer, CLS_TOKEN, SEP_TOKEN};

/// Tripla de sequências de mesmo comprimento consumida pelo modelo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedInput {
    /// Ids do vocabulário, zero no padding.
    pub input_ids: Vec<u32>,
    /// 1 para tokens reais, 0 para padding.
    pub input_mask: Vec<u32>,
    /// Sempre 0: entradas de um único segmento.
    pub segment_ids: Vec<u32>,
}

impl EncodedInput {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// Número de posições reais (marcadores incluídos).
    pub fn real_len(&self) -> usize {
        self.input_mask.iter().filter(|&&m| m == 1).count()
    }

    /// As três sequências como lotes `(1, len)` de inteiros longos,
    /// na ordem `(input_ids, segment_ids, input_mask)` da chamada ao modelo.
    pub fn to_batch(&self) -> (Array2<i64>, Array2<i64>, Array2<i64>) {
        (
            as_batch(&self.input_ids),
            as_batch(&self.segment_ids),
            as_batch(&self.input_mask),
        )
    }
}

fn as_batch(values: &[u32]) -> Array2<i64> {
    Array2::from_shape_fn((1, values.len()), |(_, j)| i64::from(values[j]))
}

/// Entrada NER com o alinhamento caractere ↔ posição do modelo.
#[derive(Debug, Clone)]
pub struct NerEncoding {
    pub input: EncodedInput,
    /// Tokens com marcadores, antes do padding.
    pub tokens: Vec<String>,
    /// 1 para a primeira sub-palavra de cada caractere, 0 para continuações.
    /// Truncado junto com os tokens.
    pub valid: Vec<u8>,
    /// Para cada caractere do texto, se a tokenização gerou ao menos um token
    /// (espaços não geram).
    pub has_tokens: Vec<bool>,
}

impl NerEncoding {
    /// Caracteres do texto original.
    pub fn char_len(&self) -> usize {
        self.has_tokens.len()
    }

    /// Para cada caractere, a posição (na sequência com `[CLS]` em 0) da sua
    /// primeira sub-palavra, lida das flags `valid`. `None` se o caractere não
    /// gerou token ou se a primeira sub-palavra foi cortada pela truncagem.
    pub fn char_positions(&self) -> Vec<Option<usize>> {
        // +1 pelo [CLS] na posição 0
        let mut firsts = self
            .valid
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v == 1)
            .map(|(i, _)| i + 1);
        self.has_tokens
            .iter()
            .map(|&has| if has { firsts.next() } else { None })
            .collect()
    }
}

fn check_length(text: &str, max_seq_length: usize) -> Result<usize> {
    let len = text.chars().count();
    if len > max_seq_length {
        return Err(InferenceError::InputTooLong {
            len,
            max: max_seq_length,
        });
    }
    Ok(len)
}

fn wrap_with_markers(tokens: Vec<String>) -> Vec<String> {
    let mut wrapped = Vec::with_capacity(tokens.len() + 2);
    wrapped.push(CLS_TOKEN.to_string());
    wrapped.extend(tokens);
    wrapped.push(SEP_TOKEN.to_string());
    wrapped
}

/// Entrada da classificação: trunca, mas não completa com padding.
pub fn encode_classification(
    tokenizer: &dyn Tokenizer,
    text: &str,
    max_seq_length: usize,
) -> Result<EncodedInput> {
    check_length(text, max_seq_length)?;

    let mut tokens = tokenizer.tokenize(text)?;
    let limit = max_seq_length.saturating_sub(2);
    if tokens.len() > limit {
        debug!(from = tokens.len(), to = limit, "truncating classification tokens");
        tokens.truncate(limit);
    }

    let tokens = wrap_with_markers(tokens);
    let input_ids = tokenizer.convert_tokens_to_ids(&tokens);
    let len = input_ids.len();

    Ok(EncodedInput {
        input_ids,
        input_mask: vec![1; len],
        segment_ids: vec![0; len],
    })
}

/// Entrada NER: tokeniza cada caractere isoladamente e completa com zeros até
/// exatamente `max_seq_length`.
pub fn encode_ner(
    tokenizer: &dyn Tokenizer,
    text: &str,
    max_seq_length: usize,
) -> Result<NerEncoding> {
    let char_len = check_length(text, max_seq_length)?;

    let mut tokens: Vec<String> = Vec::new();
    let mut valid: Vec<u8> = Vec::new();
    let mut has_tokens = Vec::with_capacity(char_len);

    let mut buf = [0u8; 4];
    for c in text.chars() {
        let pieces = tokenizer.tokenize(c.encode_utf8(&mut buf))?;
        has_tokens.push(!pieces.is_empty());
        for m in 0..pieces.len() {
            valid.push(u8::from(m == 0));
        }
        tokens.extend(pieces);
    }

    let limit = max_seq_length.saturating_sub(2);
    if tokens.len() > limit {
        debug!(from = tokens.len(), to = limit, "truncating ner tokens");
        tokens.truncate(limit);
        valid.truncate(limit);
    }

    let tokens = wrap_with_markers(tokens);
    let mut input_ids = tokenizer.convert_tokens_to_ids(&tokens);
    let mut input_mask = vec![1; input_ids.len()];
    let mut segment_ids = vec![0; input_ids.len()];

    input_ids.resize(max_seq_length, 0);
    input_mask.resize(max_seq_length, 0);
    segment_ids.resize(max_seq_length, 0);

    assert_eq!(input_ids.len(), max_seq_length);
    assert_eq!(input_mask.len(), max_seq_length);
    assert_eq!(segment_ids.len(), max_seq_length);

    Ok(NerEncoding {
        input: EncodedInput {
            input_ids,
            input_mask,
            segment_ids,
        },
        tokens,
        valid,
        has_tokens,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tokenizer::{BertTokenizer, Vocab};

    /// Vocabulário mínimo: marcadores, alguns ideogramas e "ab" que vira duas sub-palavras.
    pub(crate) fn test_tokenizer() -> BertTokenizer {
        let vocab = Vocab::from_tokens([
            "[PAD]", "[UNK]", "[CLS]", "[SEP]", "张", "三", "在", "北", "京", "a", "##b", "b",
        ]);
        BertTokenizer::new(vocab, true).unwrap()
    }

    #[test]
    fn test_classification_wraps_without_padding() {
        let tok = test_tokenizer();
        let enc = encode_classification(&tok, "张三在北京", 128).unwrap();
        assert_eq!(enc.input_ids, vec![2, 4, 5, 6, 7, 8, 3]);
        assert_eq!(enc.input_mask, vec![1; 7]);
        assert_eq!(enc.segment_ids, vec![0; 7]);
    }

    #[test]
    fn test_classification_truncates_to_reserved_slots() {
        let tok = test_tokenizer();
        let enc = encode_classification(&tok, "张三在北京", 5).unwrap();
        assert_eq!(enc.input_ids, vec![2, 4, 5, 6, 3]);
    }

    #[test]
    fn test_classification_rejects_long_text() {
        let tok = test_tokenizer();
        let err = encode_classification(&tok, "张三在北京", 4).unwrap_err();
        assert!(matches!(err, InferenceError::InputTooLong { len: 5, max: 4 }));
    }

    #[test]
    fn test_ner_pads_to_max_length() {
        let tok = test_tokenizer();
        let enc = encode_ner(&tok, "张三", 8).unwrap();
        assert_eq!(enc.input.input_ids, vec![2, 4, 5, 3, 0, 0, 0, 0]);
        assert_eq!(enc.input.input_mask, vec![1, 1, 1, 1, 0, 0, 0, 0]);
        assert_eq!(enc.input.segment_ids, vec![0; 8]);
        assert_eq!(enc.input.real_len(), 4);
        assert_eq!(enc.char_positions(), vec![Some(1), Some(2)]);
    }

    #[test]
    fn test_ner_empty_text_keeps_length_invariant() {
        let tok = test_tokenizer();
        for max in [3, 16, 128] {
            let enc = encode_ner(&tok, "", max).unwrap();
            assert_eq!(enc.input.input_ids.len(), max);
            assert_eq!(enc.input.input_mask.len(), max);
            assert_eq!(enc.input.segment_ids.len(), max);
            assert_eq!(enc.tokens, vec!["[CLS]", "[SEP]"]);
        }
    }

    /// Divide "ß" em duas sub-palavras; o resto vira um token por caractere.
    struct SplittingTokenizer;

    impl Tokenizer for SplittingTokenizer {
        fn tokenize(&self, text: &str) -> Result<Vec<String>> {
            Ok(text
                .chars()
                .flat_map(|c| match c {
                    'ß' => vec!["s".to_string(), "##s".to_string()],
                    c if c.is_whitespace() => vec![],
                    c => vec![c.to_string()],
                })
                .collect())
        }

        fn convert_tokens_to_ids(&self, tokens: &[String]) -> Vec<u32> {
            tokens.iter().map(|t| t.len() as u32).collect()
        }
    }

    #[test]
    fn test_ner_valid_flags_mark_first_subword() {
        let enc = encode_ner(&SplittingTokenizer, "aßb", 8).unwrap();
        assert_eq!(enc.valid, vec![1, 1, 0, 1]);
        assert_eq!(enc.char_positions(), vec![Some(1), Some(2), Some(4)]);
        assert_eq!(enc.tokens, vec!["[CLS]", "a", "s", "##s", "b", "[SEP]"]);
    }

    #[test]
    fn test_ner_truncation_inside_a_char_keeps_its_first_subword() {
        // limite 2: "a" e "s" cabem, "##s" e "b" são cortados
        let enc = encode_ner(&SplittingTokenizer, "aßb", 4).unwrap();
        assert_eq!(enc.valid, vec![1, 1]);
        assert_eq!(enc.char_positions(), vec![Some(1), Some(2), None]);
        assert_eq!(enc.tokens, vec!["[CLS]", "a", "s", "[SEP]"]);
    }

    #[test]
    fn test_ner_positions_skip_tokenless_chars() {
        let enc = encode_ner(&SplittingTokenizer, "ß a", 8).unwrap();
        assert_eq!(enc.valid, vec![1, 0, 1]);
        assert_eq!(enc.char_positions(), vec![Some(1), None, Some(3)]);
    }

    #[test]
    fn test_ner_whitespace_char_has_no_position() {
        let tok = test_tokenizer();
        let enc = encode_ner(&tok, "张 三", 8).unwrap();
        assert_eq!(enc.char_positions(), vec![Some(1), None, Some(2)]);
        assert_eq!(enc.tokens, vec!["[CLS]", "张", "三", "[SEP]"]);
    }

    #[test]
    fn test_ner_no_truncation_below_limit() {
        let tok = test_tokenizer();
        // len(text) == max_seq_length - 3
        let enc = encode_ner(&tok, "张三在北京", 8).unwrap();
        assert_eq!(enc.tokens.len(), 7);
        assert!(enc.char_positions().iter().all(Option::is_some));
        assert_eq!(enc.input.real_len(), 7);
    }

    #[test]
    fn test_ner_truncation_drops_trailing_chars() {
        let tok = test_tokenizer();
        let enc = encode_ner(&tok, "张三在北京", 5).unwrap();
        assert_eq!(enc.tokens, vec!["[CLS]", "张", "三", "在", "[SEP]"]);
        assert_eq!(
            enc.char_positions(),
            vec![Some(1), Some(2), Some(3), None, None]
        );
        assert_eq!(enc.valid.len(), 3);
    }

    #[test]
    fn test_to_batch_shapes() {
        let tok = test_tokenizer();
        let enc = encode_ner(&tok, "张三", 6).unwrap();
        let (ids, segments, mask) = enc.input.to_batch();
        assert_eq!(ids.shape(), &[1, 6]);
        assert_eq!(segments.shape(), &[1, 6]);
        assert_eq!(mask[[0, 3]], 1);
        assert_eq!(mask[[0, 4]], 0);
        assert_eq!(ids[[0, 0]], 2);
    }
}
