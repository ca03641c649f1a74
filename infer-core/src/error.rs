//! # Erros do Pipeline de Inferência
//!
//! Taxonomia única usada pelos dois serviços:
//!
//! | Variante              | Quando ocorre                                             | Política        |
//! |-----------------------|-----------------------------------------------------------|-----------------|
//! | `ConfigLoad`          | artefato do diretório do modelo ausente ou malformado     | fatal (construção) |
//! | `LabelMap`            | conteúdo de `label_map` inválido (buracos, duplicatas)    | fatal (construção) |
//! | `Tokenizer`           | vocabulário incompleto ou falha ao tokenizar              | fatal / por chamada |
//! | `InputTooLong`        | texto maior que `max_seq_length` caracteres               | por chamada     |
//! | `DecodeConsistency`   | sequência de tags inválida (sem `[CLS]`, `I-` incoerente) | por chamada     |
//! | `ShapeMismatch`       | logits com formato diferente do esperado                  | por chamada     |
//! | `InvalidInput`        | parâmetro fora do domínio (ex: limiar NaN)                | por chamada     |
//! | `Model`               | falha reportada pelo próprio modelo                       | por chamada     |

use std::path::PathBuf;

use thiserror::Error;

use crate::decoder::DecodeIssue;

/// Resultado padrão do crate.
pub type Result<T> = std::result::Result<T, InferenceError>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum InferenceError {
    /// Artefato do diretório do modelo ausente ou inválido.
    #[error("failed to load {}: {reason}", path.display())]
    ConfigLoad { path: PathBuf, reason: String },

    /// Mapa de rótulos que não cobre `0..n` sem repetição.
    #[error("invalid label map: {0}")]
    LabelMap(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// Texto excede o comprimento máximo e nenhuma estratégia de divisão se aplica.
    #[error("input has {len} characters, maximum is {max}")]
    InputTooLong { len: usize, max: usize },

    /// Sequência de tags que a máquina de estados BIO não aceita.
    #[error("inconsistent tag sequence: {0}")]
    DecodeConsistency(DecodeIssue),

    /// Logits com formato incompatível com a tarefa ou com o mapa de rótulos.
    #[error("unexpected logits shape {actual:?}, expected {expected}")]
    ShapeMismatch { actual: Vec<usize>, expected: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Erro repassado pelo modelo externo (forward pass, dispositivo, pesos).
    #[error("model error: {0}")]
    Model(String),
}

impl InferenceError {
    /// Cria um erro de carregamento de configuração para o caminho informado.
    pub fn config_load(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        InferenceError::ConfigLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn label_map(reason: impl std::fmt::Display) -> Self {
        InferenceError::LabelMap(reason.to_string())
    }

    pub fn tokenizer(reason: impl std::fmt::Display) -> Self {
        InferenceError::Tokenizer(reason.to_string())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        InferenceError::Model(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        InferenceError::InvalidInput(msg.into())
    }

    pub fn shape(actual: &[usize], expected: impl Into<String>) -> Self {
        InferenceError::ShapeMismatch {
            actual: actual.to_vec(),
            expected: expected.into(),
        }
    }
}
