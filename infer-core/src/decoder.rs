//! # Decodificação da Saída do Modelo
//!
//! Converte logits em resultados estruturados.
//!
//! ## Classificação multi-rótulo
//!
//! Cada coluna dos logits `(1, num_labels)` passa por uma sigmoide e é comparada
//! com o limiar de forma **independente**: qualquer subconjunto de rótulos é uma
//! resposta válida, inclusive o vazio.
//!
//! ## NER — máquina de estados BIO
//!
//! ```text
//!            B-T                      I-T (mesmo tipo)
//!   ┌──────┐ ───────────────▶ ┌─────────┐ ◀──┐
//!   │ FORA │                  │ ABERTA T│ ───┘
//!   └──────┘ ◀─────────────── └─────────┘
//!        O / X / [SEP]: fecha e emite [início, i)
//!        B-U dentro de ABERTA: emite e reabre com U
//! ```
//!
//! Uma entidade ainda aberta ao final da sequência **não** é emitida; no fluxo
//! normal o `[SEP]` previsto pelo modelo a fecha.

use ndarray::{ArrayD, ArrayView2, Axis, Ix2, Ix3};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::DecodePolicy;
use crate::error::{InferenceError, Result};
use crate::label_map::LabelMap;
use crate::tagger::{EntityType, Tag, TagSet};

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Softmax numericamente estável (subtrai o máximo antes da exponencial).
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return vec![];
    }
    let max_score = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|&s| (s - max_score).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return vec![1.0 / scores.len() as f32; scores.len()];
    }
    exps.iter().map(|e| e / sum).collect()
}

// ============ Classificação ============

/// Rótulo aceito pelo limiar, com a probabilidade da sigmoide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub index: usize,
    pub label: String,
    pub score: f32,
}

/// Aplica sigmoide + limiar sobre logits `(1, num_labels)`.
///
/// A comparação é estrita (`score > thresh`). O resultado vem em ordem
/// crescente de índice de classe.
pub fn decode_multilabel(
    logits: &ArrayD<f32>,
    labels: &LabelMap,
    thresh: f32,
) -> Result<Vec<LabelScore>> {
    let expected = format!("[1, {}]", labels.len());
    let logits = logits
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| InferenceError::shape(logits.shape(), expected.clone()))?;
    if logits.nrows() != 1 || logits.ncols() != labels.len() {
        return Err(InferenceError::shape(logits.shape(), expected));
    }

    let mut accepted = Vec::new();
    for (index, &logit) in logits.row(0).iter().enumerate() {
        let score = sigmoid(logit);
        if score > thresh {
            // ncols == labels.len(), então o índice sempre existe
            if let Some(label) = labels.get(index) {
                accepted.push(LabelScore {
                    index,
                    label: label.to_string(),
                    score,
                });
            }
        }
    }
    Ok(accepted)
}

// ============ NER ============

/// Problema encontrado ao decodificar uma sequência de tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodeIssue {
    /// A primeira tag não é `[CLS]` (ou a sequência está vazia).
    MissingCls { found: Option<Tag> },
    /// `I-T` sem uma entidade `T` aberta.
    MismatchedContinuation {
        position: usize,
        open: Option<EntityType>,
        found: EntityType,
    },
    /// Id de classe sem tag correspondente (ex: o id 0 de padding).
    UnknownClassId { position: usize, class_id: usize },
}

impl std::fmt::Display for DecodeIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeIssue::MissingCls { found: Some(tag) } => {
                write!(f, "first tag must be [CLS], found {tag}")
            }
            DecodeIssue::MissingCls { found: None } => write!(f, "empty tag sequence"),
            DecodeIssue::MismatchedContinuation {
                position,
                open: Some(open),
                found,
            } => write!(f, "I-{found} at {position} continues an open {open} entity"),
            DecodeIssue::MismatchedContinuation {
                position,
                open: None,
                found,
            } => write!(f, "I-{found} at {position} with no open entity"),
            DecodeIssue::UnknownClassId { position, class_id } => {
                write!(f, "class id {class_id} at {position} has no tag")
            }
        }
    }
}

/// Entidade sobre a sequência **original de caracteres**.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Índice do primeiro caractere (inclusivo).
    pub start: usize,
    /// Índice final (exclusivo).
    pub end: usize,
    pub text: String,
    pub entity_type: EntityType,
    /// Média das probabilidades das tags dos caracteres da entidade, quando disponíveis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Registro público `{entity, type, offset: [start, end]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: [usize; 2],
}

impl From<&Entity> for EntityRecord {
    fn from(e: &Entity) -> Self {
        Self {
            entity: e.text.clone(),
            kind: e.entity_type.display_name().to_string(),
            offset: [e.start, e.end],
        }
    }
}

/// Entidades decodificadas e os diagnósticos tolerados pela política.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Decoded {
    pub entities: Vec<Entity>,
    pub issues: Vec<DecodeIssue>,
}

/// Reconstrói as entidades a partir de `[CLS] tag_0 tag_1 ...`, onde `tag_i`
/// é a tag do caractere `i` de `text`.
///
/// Falha com `DecodeConsistency` se a primeira tag não for `[CLS]` e com
/// `InvalidInput` se houver mais tags que `[CLS]` + caracteres + `[SEP]`.
/// Tags `I-` incoerentes seguem a `policy`.
pub fn decode_entities(text: &[char], tags: &[Tag], policy: DecodePolicy) -> Result<Decoded> {
    match tags.first() {
        Some(Tag::Cls) => {}
        found => {
            let issue = DecodeIssue::MissingCls {
                found: found.copied(),
            };
            warn!(%issue, "rejecting tag sequence");
            return Err(InferenceError::DecodeConsistency(issue));
        }
    }
    if tags.len() > text.len() + 2 {
        return Err(InferenceError::invalid_input(format!(
            "{} tags for {} characters, at most {} expected",
            tags.len(),
            text.len(),
            text.len() + 2
        )));
    }

    let mut decoded = Decoded::default();
    let mut current: Option<(EntityType, usize)> = None;

    for (index, tag) in tags[1..].iter().enumerate() {
        match *tag {
            Tag::Begin(entity_type) => {
                if let Some((open_type, start)) = current.take() {
                    decoded.entities.push(make_entity(text, start, index, open_type));
                }
                current = Some((entity_type, index));
            }
            Tag::Inside(entity_type) => {
                let open = current.map(|(t, _)| t);
                if open != Some(entity_type) {
                    let issue = DecodeIssue::MismatchedContinuation {
                        position: index,
                        open,
                        found: entity_type,
                    };
                    match policy {
                        DecodePolicy::Strict => {
                            return Err(InferenceError::DecodeConsistency(issue));
                        }
                        DecodePolicy::BestEffort => {
                            warn!(%issue, "tolerating inconsistent continuation");
                            decoded.issues.push(issue);
                        }
                    }
                }
            }
            Tag::Outside | Tag::X | Tag::Cls | Tag::Sep => {
                if let Some((open_type, start)) = current.take() {
                    decoded.entities.push(make_entity(text, start, index, open_type));
                }
            }
        }
    }

    // `current` ainda aberta aqui é descartada de propósito
    Ok(decoded)
}

/// `start < end <= text.len()`, garantido pelo limite de tags em [`decode_entities`].
fn make_entity(text: &[char], start: usize, end: usize, entity_type: EntityType) -> Entity {
    Entity {
        start,
        end,
        text: text[start..end].iter().collect(),
        entity_type,
        confidence: None,
    }
}

/// Tag escolhida para uma posição e sua probabilidade (softmax).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagPrediction {
    pub tag: Tag,
    pub prob: f32,
}

/// Argmax por posição sobre logits `(1, seq_len, num_labels)`, limitado às
/// `real_len` primeiras posições (o restante é padding).
///
/// Ids sem tag viram `X` e geram um [`DecodeIssue::UnknownClassId`].
pub fn predict_tags(
    logits: &ArrayD<f32>,
    tag_set: &TagSet,
    real_len: usize,
) -> Result<(Vec<TagPrediction>, Vec<DecodeIssue>)> {
    let expected = format!("[1, >= {}, {}]", real_len, tag_set.num_labels());
    let logits3 = logits
        .view()
        .into_dimensionality::<Ix3>()
        .map_err(|_| InferenceError::shape(logits.shape(), expected.clone()))?;
    let (batch, seq_len, num_labels) = logits3.dim();
    if batch != 1 || seq_len < real_len || num_labels != tag_set.num_labels() {
        return Err(InferenceError::shape(logits.shape(), expected));
    }

    let positions: ArrayView2<f32> = logits3.index_axis(Axis(0), 0);
    let mut predictions = Vec::with_capacity(real_len);
    let mut issues = Vec::new();

    for (position, row) in positions.rows().into_iter().take(real_len).enumerate() {
        let scores = row.to_vec();
        let probs = softmax(&scores);
        let (class_id, prob) = argmax(&probs);
        let tag = match tag_set.tag(class_id) {
            Some(tag) => tag,
            None => {
                issues.push(DecodeIssue::UnknownClassId { position, class_id });
                Tag::X
            }
        };
        predictions.push(TagPrediction { tag, prob });
    }
    Ok((predictions, issues))
}

/// Primeiro índice com o maior valor.
fn argmax(values: &[f32]) -> (usize, f32) {
    let mut best = (0, f32::NEG_INFINITY);
    for (i, &v) in values.iter().enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best
}

/// Projeta as predições por posição do modelo sobre os caracteres do texto.
///
/// Retorna `[posição 0] + uma predição por caractere + [última posição real]`:
/// - caractere com token: a predição da sua primeira sub-palavra;
/// - caractere sem token (espaço) entre duas partes da mesma entidade: `I-T`;
/// - demais caracteres sem posição (espaço solto, truncados): `O`.
///
/// A última posição real é a do `[SEP]`; mantê-la permite que a máquina BIO
/// feche uma entidade que termina no último caractere.
pub fn align_to_chars(
    predictions: &[TagPrediction],
    char_positions: &[Option<usize>],
) -> Vec<TagPrediction> {
    let outside = TagPrediction {
        tag: Tag::Outside,
        prob: 0.0,
    };
    let lookup = |pos: Option<usize>| pos.and_then(|p| predictions.get(p)).copied();

    let mut aligned = Vec::with_capacity(char_positions.len() + 1);
    // Sem posição 0 a decodificação falha adiante com MissingCls
    if let Some(first) = predictions.first() {
        aligned.push(*first);
    }

    for (i, pos) in char_positions.iter().enumerate() {
        if let Some(pred) = lookup(*pos) {
            aligned.push(pred);
            continue;
        }

        let prev_type = aligned.last().and_then(|p| p.tag.entity_type());
        let next = char_positions[i + 1..]
            .iter()
            .find(|p| p.is_some())
            .and_then(|p| lookup(*p));

        let bridged = match (prev_type, next) {
            (Some(t), Some(n)) if n.tag == Tag::Inside(t) => Some(TagPrediction {
                tag: Tag::Inside(t),
                prob: n.prob,
            }),
            _ => None,
        };
        aligned.push(bridged.unwrap_or(outside));
    }

    if predictions.len() > 1 {
        if let Some(last) = predictions.last() {
            aligned.push(*last);
        }
    }
    aligned
}
