//! # Modelo Externo
//!
//! O transformer pré-treinado é um colaborador opaco: recebe a tripla
//! `(input_ids, segment_ids, input_mask)` e devolve logits. Arquitetura, pesos e
//! dispositivo (CPU/GPU) ficam do lado de quem implementa [`Model`].
//!
//! | Tarefa        | Formato dos logits           |
//! |---------------|------------------------------|
//! | Classificação | `(1, num_labels)`            |
//! | NER           | `(1, seq_len, num_labels)`   |
//!
//! ## Concorrência
//!
//! A execução do modelo não é garantida reentrante, por isso `forward` recebe
//! `&mut self` e cada serviço guarda o modelo em um [`SerializedModel`]: chamadas
//! concorrentes ao mesmo serviço fazem fila no `Mutex`.

use std::sync::Mutex;

use ndarray::{Array2, ArrayD};
use tracing::debug;

use crate::config::ModelArtifacts;
use crate::encoding::EncodedInput;
use crate::error::{InferenceError, Result};

pub trait Model: Send {
    /// Forward pass bloqueante sobre um lote de tamanho 1.
    fn forward(
        &mut self,
        input_ids: &Array2<i64>,
        segment_ids: &Array2<i64>,
        input_mask: &Array2<i64>,
    ) -> Result<ArrayD<f32>>;
}

/// Constrói o modelo a partir dos artefatos já validados.
///
/// `num_labels` é o número de classes da cabeça de saída, derivado do mapa de
/// rótulos (classificação) ou do conjunto de tags (NER).
pub trait ModelLoader {
    fn load(&self, artifacts: &ModelArtifacts, num_labels: usize) -> Result<Box<dyn Model>>;
}

impl<F> ModelLoader for F
where
    F: Fn(&ModelArtifacts, usize) -> Result<Box<dyn Model>>,
{
    fn load(&self, artifacts: &ModelArtifacts, num_labels: usize) -> Result<Box<dyn Model>> {
        self(artifacts, num_labels)
    }
}

/// Modelo protegido por `Mutex`: uma chamada de cada vez.
pub struct SerializedModel {
    inner: Mutex<Box<dyn Model>>,
}

impl SerializedModel {
    pub fn new(model: Box<dyn Model>) -> Self {
        Self {
            inner: Mutex::new(model),
        }
    }

    pub fn run(&self, input: &EncodedInput) -> Result<ArrayD<f32>> {
        let (input_ids, segment_ids, input_mask) = input.to_batch();
        let mut model = self
            .inner
            .lock()
            .map_err(|_| InferenceError::model("model lock poisoned by a previous panic"))?;
        let logits = model.forward(&input_ids, &segment_ids, &input_mask)?;
        debug!(shape = ?logits.shape(), "forward pass done");
        Ok(logits)
    }
}
