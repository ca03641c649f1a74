//! # infer-core — Pós-processamento de Inferência para Modelos BERT
//!
//! Este crate transforma texto em entradas para um transformer pré-treinado e
//! transforma a saída do modelo (logits) em resultados legíveis, para duas tarefas:
//!
//! - **Classificação multi-rótulo**: um texto → qualquer subconjunto de rótulos.
//! - **NER**: um texto → entidades com tipo e posição em caracteres.
//!
//! O modelo em si (arquitetura, pesos, GPU) é um colaborador externo, acessado
//! pelo trait [`Model`].
//!
//! ## Arquitetura
//!
//! Cada serviço é um pipeline linear e independente:
//!
//! 1.  **Tokenização** ([`tokenizer`]): texto → sub-palavras → ids (WordPiece).
//! 2.  **Entrada** ([`encoding`]): tripla `(input_ids, input_mask, segment_ids)`.
//! 3.  **Modelo** ([`model`]): forward pass bloqueante, serializado por `Mutex`.
//! 4.  **Decodificação** ([`decoder`]):
//!     *   **Limiar** por rótulo após sigmoide (classificação).
//!     *   **Máquina de estados BIO** sobre as tags previstas (NER, [`tagger`]).
//! 5.  **Saída**: `Vec<String>` de rótulos ou [`EntityRecord`]s.
//!
//! ## Exemplo de Uso
//!
//! ```rust,no_run
//! use infer_core::{InferenceError, Model, ModelArtifacts, NerInferenceService};
//!
//! # fn load_weights(_: &ModelArtifacts, _: usize) -> Result<Box<dyn Model>, InferenceError> { unimplemented!() }
//! // 1. Carrega o diretório do modelo (vocab.txt, bert_config.json, pesos)
//! let service = NerInferenceService::new("models/ner", &load_weights)?;
//!
//! // 2. Extrai as entidades
//! for record in service.inference("张三在北京工作")? {
//!     println!("{} ({}) {:?}", record.entity, record.kind, record.offset);
//! }
//! # Ok::<(), InferenceError>(())
//! ```
//!
//! ## Módulos Principais
//!
//! - [`multilabel`] e [`ner`]: os dois serviços.
//! - [`config`]: opções, política de decodificação e layout do diretório do modelo.
//! - [`error`]: taxonomia de erros.

pub mod config;
pub mod decoder;
pub mod encoding;
pub mod error;
pub mod label_map;
pub mod model;
pub mod multilabel;
pub mod ner;
pub mod tagger;
pub mod tokenizer;

pub use config::{DecodePolicy, ModelArtifacts, ServiceOptions};
pub use decoder::{DecodeIssue, Entity, EntityRecord, LabelScore};
pub use encoding::EncodedInput;
pub use error::{InferenceError, Result};
pub use label_map::LabelMap;
pub use model::{Model, ModelLoader};
pub use multilabel::MultiLabelingInferenceService;
pub use ner::{NerAnalysis, NerInferenceService};
pub use tagger::{EntityType, Tag, TagSet};
pub use tokenizer::{BertTokenizer, Tokenizer};
