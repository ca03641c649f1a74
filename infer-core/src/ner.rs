//! # Serviço de Reconhecimento de Entidades (NER)
//!
//! Fluxo de uma chamada:
//!
//! 1. **Entrada** ([`encode_ner`]): um caractere por vez, padding até `max_seq_length`.
//! 2. **Modelo**: logits `(1, max_seq_length, num_labels)`.
//! 3. **Argmax** ([`predict_tags`]): uma tag por posição real.
//! 4. **Alinhamento** ([`align_to_chars`]): volta das sub-palavras para os caracteres.
//! 5. **Máquina BIO** ([`decode_entities`]): spans `[início, fim)` sobre os caracteres.
//! 6. **Saída**: `{entity, type, offset}` com o nome de exibição do tipo.
//!
//! ## Política de decodificação
//!
//! Com [`DecodePolicy::BestEffort`] (padrão), tags incoerentes viram diagnósticos
//! em [`NerAnalysis::issues`] e a chamada devolve o que foi possível reconstruir.
//! Com [`DecodePolicy::Strict`], a primeira incoerência aborta a chamada.
//! A ausência do `[CLS]` inicial é sempre um erro.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, info_span, warn, Span};

use crate::config::{DecodePolicy, ModelArtifacts, ServiceOptions};
use crate::decoder::{
    align_to_chars, decode_entities, predict_tags, DecodeIssue, Entity, EntityRecord,
    TagPrediction,
};
use crate::encoding::encode_ner;
use crate::error::{InferenceError, Result};
use crate::model::{Model, ModelLoader, SerializedModel};
use crate::tagger::{Tag, TagSet};
use crate::tokenizer::{BertTokenizer, Tokenizer};

/// Resultado completo de uma análise NER.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NerAnalysis {
    pub entities: Vec<Entity>,
    /// Tag atribuída a cada caractere do texto.
    pub char_tags: Vec<Tag>,
    /// Inconsistências toleradas pela política de melhor esforço.
    pub issues: Vec<DecodeIssue>,
}

impl NerAnalysis {
    pub fn records(&self) -> Vec<EntityRecord> {
        self.entities.iter().map(EntityRecord::from).collect()
    }
}

/// Serviço NER sobre um modelo de classificação de tokens com tags BIO.
pub struct NerInferenceService {
    tag_set: TagSet,
    tokenizer: Box<dyn Tokenizer>,
    model: SerializedModel,
    options: ServiceOptions,
    span: Span,
}

impl NerInferenceService {
    pub fn new(model_dir: impl AsRef<Path>, loader: &dyn ModelLoader) -> Result<Self> {
        Self::with_options(model_dir, loader, ServiceOptions::default())
    }

    /// Lê `vocab.txt` e `bert_config.json`, valida os pesos e delega a
    /// construção do modelo ao `loader` com `num_labels = tags + 1`.
    pub fn with_options(
        model_dir: impl AsRef<Path>,
        loader: &dyn ModelLoader,
        options: ServiceOptions,
    ) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        let span = info_span!("ner_service", model_dir = %model_dir.display());
        Self::with_options_in_span(model_dir, loader, options, span)
    }

    /// Como [`with_options`](Self::with_options), mas a construção e todas as
    /// chamadas seguintes registram seus eventos em `span`.
    pub fn with_options_in_span(
        model_dir: impl AsRef<Path>,
        loader: &dyn ModelLoader,
        options: ServiceOptions,
        span: Span,
    ) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        let _enter = span.enter();

        options.validate()?;
        let artifacts = ModelArtifacts::resolve(model_dir, false)?;
        artifacts.check_seq_length(options.max_seq_length)?;

        let tag_set = TagSet::standard();
        let tokenizer = BertTokenizer::from_file(&artifacts.vocab, options.do_lower_case)?;
        artifacts.check_vocab_size(tokenizer.vocab_size());
        let model = loader.load(&artifacts, tag_set.num_labels())?;
        info!(num_labels = tag_set.num_labels(), policy = ?options.decode_policy, "ner service ready");
        drop(_enter);

        Self::from_parts(tag_set, Box::new(tokenizer), model, options).map(|s| s.with_span(span))
    }

    pub fn from_parts(
        tag_set: TagSet,
        tokenizer: Box<dyn Tokenizer>,
        model: Box<dyn Model>,
        options: ServiceOptions,
    ) -> Result<Self> {
        options.validate()?;
        if tag_set.class_id(Tag::Cls).is_none() {
            return Err(InferenceError::invalid_input("tag set has no [CLS] tag"));
        }
        Ok(Self {
            tag_set,
            tokenizer,
            model: SerializedModel::new(model),
            options,
            span: info_span!("ner_service"),
        })
    }

    /// Substitui o span em que os eventos do serviço são registrados.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn tag_set(&self) -> &TagSet {
        &self.tag_set
    }

    /// Entidades no formato público `{entity, type, offset: [início, fim]}`.
    pub fn inference(&self, text: &str) -> Result<Vec<EntityRecord>> {
        Ok(self.analyze(text)?.records())
    }

    /// Executa o fluxo completo e devolve entidades, tags por caractere e diagnósticos.
    pub fn analyze(&self, text: &str) -> Result<NerAnalysis> {
        self.span.in_scope(|| -> Result<NerAnalysis> {
            let encoding = encode_ner(self.tokenizer.as_ref(), text, self.options.max_seq_length)?;
            let real_len = encoding.input.real_len();
            debug!(chars = encoding.char_len(), tokens = real_len, "encoded ner input");

            let logits = self.model.run(&encoding.input)?;
            let (predictions, mut issues) = predict_tags(&logits, &self.tag_set, real_len)?;
            if let Some(issue) = issues.first() {
                if self.options.decode_policy == DecodePolicy::Strict {
                    return Err(InferenceError::DecodeConsistency(issue.clone()));
                }
                for issue in &issues {
                    warn!(%issue, "tolerating unknown class id");
                }
            }

            let aligned = align_to_chars(&predictions, &encoding.char_positions());
            let tags: Vec<Tag> = aligned.iter().map(|p| p.tag).collect();
            let chars: Vec<char> = text.chars().collect();

            let decoded = decode_entities(&chars, &tags, self.options.decode_policy)?;
            issues.extend(decoded.issues);

            let entities = decoded
                .entities
                .into_iter()
                .map(|mut e| {
                    e.confidence = mean_confidence(&aligned, e.start, e.end);
                    e
                })
                .collect::<Vec<_>>();
            debug!(entities = entities.len(), issues = issues.len(), "ner decoded");

            Ok(NerAnalysis {
                entities,
                char_tags: tags.into_iter().skip(1).take(chars.len()).collect(),
                issues,
            })
        })
    }
}

/// Média das probabilidades dos caracteres `[start, end)`; `aligned[0]` é o `[CLS]`.
fn mean_confidence(aligned: &[TagPrediction], start: usize, end: usize) -> Option<f32> {
    let probs: Vec<f32> = aligned
        .iter()
        .skip(1 + start)
        .take(end.saturating_sub(start))
        .map(|p| p.prob)
        .collect();
    if probs.is_empty() {
        return None;
    }
    Some(probs.iter().sum::<f32>() / probs.len() as f32)
}
