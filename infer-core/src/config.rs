//! # Configuração e Diretório do Modelo
//!
//! Um diretório de modelo tem o seguinte layout:
//!
//! ```text
//! model_dir/
//! ├── label_map            # JSON {"0": "rótulo", ...} (somente classificação)
//! ├── vocab.txt            # vocabulário WordPiece, um token por linha
//! ├── bert_config.json     # hiperparâmetros da arquitetura
//! └── pytorch_model.bin    # pesos (opacos para este crate)
//! ```
//!
//! Os pesos e a arquitetura são responsabilidade do [`ModelLoader`](crate::model::ModelLoader);
//! aqui apenas validamos que os artefatos existem e que `bert_config.json` é legível.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{InferenceError, Result};

pub const LABEL_MAP_NAME: &str = "label_map";
pub const VOCAB_NAME: &str = "vocab.txt";
pub const CONFIG_NAME: &str = "bert_config.json";
pub const WEIGHTS_NAME: &str = "pytorch_model.bin";

pub const DEFAULT_MAX_SEQ_LENGTH: usize = 128;
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Política aplicada quando uma tag `I-X` não continua a entidade aberta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// **Melhor esforço**: registra o problema como diagnóstico, emite um `warn!`
    /// e continua decodificando. As fronteiras das demais entidades continuam válidas.
    BestEffort,
    /// **Estrito**: qualquer inconsistência aborta a chamada com
    /// [`InferenceError::DecodeConsistency`].
    Strict,
}

impl Default for DecodePolicy {
    fn default() -> Self {
        DecodePolicy::BestEffort
    }
}

/// Opções de execução de um serviço, fixadas na construção.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceOptions {
    /// Comprimento máximo da sequência, marcadores `[CLS]`/`[SEP]` incluídos.
    pub max_seq_length: usize,
    /// Limiar padrão de decisão por rótulo (classificação).
    pub threshold: f32,
    /// Converte o texto para minúsculas antes do WordPiece.
    pub do_lower_case: bool,
    pub decode_policy: DecodePolicy,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            max_seq_length: DEFAULT_MAX_SEQ_LENGTH,
            threshold: DEFAULT_THRESHOLD,
            do_lower_case: true,
            decode_policy: DecodePolicy::default(),
        }
    }
}

impl ServiceOptions {
    pub fn validate(&self) -> Result<()> {
        // Precisa caber ao menos [CLS] + 1 token + [SEP]
        if self.max_seq_length < 3 {
            return Err(InferenceError::invalid_input(format!(
                "max_seq_length must be at least 3, got {}",
                self.max_seq_length
            )));
        }
        validate_threshold(self.threshold)
    }
}

/// Limiares aceitos: `0.0..=1.0`, nunca NaN.
pub fn validate_threshold(thresh: f32) -> Result<()> {
    if (0.0..=1.0).contains(&thresh) {
        Ok(())
    } else {
        Err(InferenceError::invalid_input(format!(
            "threshold must be within [0, 1], got {thresh}"
        )))
    }
}

/// Hiperparâmetros de `bert_config.json`.
///
/// Campos específicos de variantes (ex: posição relativa) ficam em `extra`
/// e são repassados intactos ao carregador do modelo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BertConfig {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub max_position_embeddings: usize,
    #[serde(default)]
    pub intermediate_size: Option<usize>,
    #[serde(default)]
    pub hidden_act: Option<String>,
    #[serde(default)]
    pub type_vocab_size: Option<usize>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl BertConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| InferenceError::config_load(path, e))?;
        serde_json::from_str(&raw).map_err(|e| InferenceError::config_load(path, e))
    }
}

/// Caminhos validados de um diretório de modelo.
#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub dir: PathBuf,
    pub label_map: Option<PathBuf>,
    pub vocab: PathBuf,
    pub weights: PathBuf,
    pub config: BertConfig,
}

impl ModelArtifacts {
    /// Resolve e valida os artefatos. `with_label_map` exige o arquivo `label_map`
    /// (apenas o serviço de classificação o utiliza).
    pub fn resolve(dir: impl AsRef<Path>, with_label_map: bool) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(InferenceError::config_load(dir, "not a directory"));
        }

        let label_map = if with_label_map {
            Some(require_file(dir, LABEL_MAP_NAME)?)
        } else {
            None
        };
        let vocab = require_file(dir, VOCAB_NAME)?;
        let config_path = require_file(dir, CONFIG_NAME)?;
        let weights = require_file(dir, WEIGHTS_NAME)?;
        let config = BertConfig::from_file(&config_path)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            label_map,
            vocab,
            weights,
            config,
        })
    }

    /// Garante que a sequência configurada cabe nas posições do modelo.
    pub fn check_seq_length(&self, max_seq_length: usize) -> Result<()> {
        if max_seq_length > self.config.max_position_embeddings {
            return Err(InferenceError::config_load(
                self.dir.join(CONFIG_NAME),
                format!(
                    "max_seq_length {} exceeds max_position_embeddings {}",
                    max_seq_length, self.config.max_position_embeddings
                ),
            ));
        }
        Ok(())
    }

    /// Avisa quando `vocab.txt` e `bert_config.json` discordam do tamanho do
    /// vocabulário. Não é fatal: ids além da tabela de embeddings só falham no modelo.
    pub fn check_vocab_size(&self, vocab_txt: usize) -> bool {
        let matches = vocab_txt == self.config.vocab_size;
        if !matches {
            warn!(
                vocab_txt,
                bert_config = self.config.vocab_size,
                "vocabulary size differs from bert_config.json"
            );
        }
        matches
    }
}

fn require_file(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(InferenceError::config_load(path, "file not found"))
    }
}
