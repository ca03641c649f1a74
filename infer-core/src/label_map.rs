//! # Mapa de Rótulos da Classificação
//!
//! Persistido como objeto JSON cujas chaves são índices inteiros em forma de string:
//!
//! ```json
//! {"0": "esporte", "1": "política", "2": "economia"}
//! ```
//!
//! Os índices devem ser contíguos a partir de zero, pois cada índice corresponde a
//! uma coluna dos logits do modelo.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{InferenceError, Result};

/// Índice de classe → rótulo. Imutável após a construção.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    labels: Vec<String>,
}

impl LabelMap {
    /// Carrega e valida o arquivo `label_map`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| InferenceError::config_load(path, e))?;
        Self::from_json(raw.trim()).map_err(|e| InferenceError::config_load(path, e))
    }

    /// Interpreta o JSON já lido.
    pub fn from_json(raw: &str) -> Result<Self> {
        let parsed: BTreeMap<String, String> =
            serde_json::from_str(raw).map_err(InferenceError::label_map)?;

        let mut by_index = BTreeMap::new();
        for (key, label) in parsed {
            let index: usize = key
                .trim()
                .parse()
                .map_err(|_| {
                    InferenceError::label_map(format!("label index {key:?} is not an integer"))
                })?;
            if by_index.insert(index, label).is_some() {
                return Err(InferenceError::label_map(format!(
                    "label index {index} appears more than once"
                )));
            }
        }

        if by_index.is_empty() {
            return Err(InferenceError::label_map("label map is empty"));
        }

        // BTreeMap itera em ordem crescente: basta conferir que não há buracos
        for (expected, index) in by_index.keys().enumerate() {
            if *index != expected {
                return Err(InferenceError::label_map(format!(
                    "label indices must be contiguous from 0, missing {expected}"
                )));
            }
        }

        Ok(Self {
            labels: by_index.into_values().collect(),
        })
    }

    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Número de classes (colunas esperadas nos logits).
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
