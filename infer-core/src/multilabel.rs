//! # Serviço de Classificação Multi-rótulo
//!
//! Orquestra `texto → entrada → modelo → sigmoide/limiar → rótulos`.
//!
//! ```rust,no_run
//! use infer_core::{InferenceError, Model, ModelArtifacts, MultiLabelingInferenceService};
//!
//! # fn load_weights(_: &ModelArtifacts, _: usize) -> Result<Box<dyn Model>, InferenceError> { unimplemented!() }
//! let service = MultiLabelingInferenceService::new("models/news-topics", &load_weights)?;
//! let labels = service.inference("国足今晚迎战日本队", 0.5)?;
//! # Ok::<(), InferenceError>(())
//! ```

use std::path::Path;

use tracing::{debug, info, info_span, Span};

use crate::config::{validate_threshold, ModelArtifacts, ServiceOptions};
use crate::decoder::{decode_multilabel, LabelScore};
use crate::encoding::encode_classification;
use crate::error::{InferenceError, Result};
use crate::label_map::LabelMap;
use crate::model::{Model, ModelLoader, SerializedModel};
use crate::tokenizer::{BertTokenizer, Tokenizer};

/// Classificador multi-rótulo: cada rótulo é decidido de forma independente.
///
/// Mapa de rótulos, tokenizador e modelo são montados uma única vez e não mudam
/// entre chamadas. O serviço é `Send + Sync`; chamadas concorrentes são
/// serializadas no modelo.
pub struct MultiLabelingInferenceService {
    label_map: LabelMap,
    tokenizer: Box<dyn Tokenizer>,
    model: SerializedModel,
    options: ServiceOptions,
    span: Span,
}

impl MultiLabelingInferenceService {
    /// Carrega o serviço de `model_dir` com as opções padrão.
    pub fn new(model_dir: impl AsRef<Path>, loader: &dyn ModelLoader) -> Result<Self> {
        Self::with_options(model_dir, loader, ServiceOptions::default())
    }

    /// Lê `label_map`, `vocab.txt` e `bert_config.json`, valida os pesos e
    /// delega a construção do modelo ao `loader`. Qualquer falha aqui é fatal.
    pub fn with_options(
        model_dir: impl AsRef<Path>,
        loader: &dyn ModelLoader,
        options: ServiceOptions,
    ) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        let span = info_span!("multilabel_service", model_dir = %model_dir.display());
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
        let artifacts = ModelArtifacts::resolve(model_dir, true)?;
        artifacts.check_seq_length(options.max_seq_length)?;

        let label_map_path = artifacts
            .label_map
            .as_deref()
            .ok_or_else(|| InferenceError::config_load(model_dir, "label_map not resolved"))?;
        let label_map = LabelMap::from_file(label_map_path)?;
        let tokenizer = BertTokenizer::from_file(&artifacts.vocab, options.do_lower_case)?;
        artifacts.check_vocab_size(tokenizer.vocab_size());

        let model = loader.load(&artifacts, label_map.len())?;
        info!(num_labels = label_map.len(), "multi-label service ready");
        drop(_enter);

        Self::from_parts(label_map, Box::new(tokenizer), model, options).map(|s| s.with_span(span))
    }

    /// Monta o serviço com componentes já construídos.
    pub fn from_parts(
        label_map: LabelMap,
        tokenizer: Box<dyn Tokenizer>,
        model: Box<dyn Model>,
        options: ServiceOptions,
    ) -> Result<Self> {
        options.validate()?;
        if label_map.is_empty() {
            return Err(InferenceError::invalid_input("label map has no labels"));
        }
        Ok(Self {
            label_map,
            tokenizer,
            model: SerializedModel::new(model),
            options,
            span: info_span!("multilabel_service"),
        })
    }

    /// Substitui o span em que os eventos do serviço são registrados.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn label_map(&self) -> &LabelMap {
        &self.label_map
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Rótulos cuja probabilidade supera `thresh`, em ordem de índice de classe.
    pub fn inference(&self, text: &str, thresh: f32) -> Result<Vec<String>> {
        Ok(self
            .inference_with_scores(text, thresh)?
            .into_iter()
            .map(|l| l.label)
            .collect())
    }

    /// Igual a [`inference`](Self::inference) com o limiar configurado nas opções.
    pub fn classify(&self, text: &str) -> Result<Vec<String>> {
        self.inference(text, self.options.threshold)
    }

    /// Rótulos aceitos com a probabilidade da sigmoide.
    pub fn inference_with_scores(&self, text: &str, thresh: f32) -> Result<Vec<LabelScore>> {
        self.span.in_scope(|| -> Result<Vec<LabelScore>> {
            validate_threshold(thresh)?;
            let input =
                encode_classification(self.tokenizer.as_ref(), text, self.options.max_seq_length)?;
            debug!(tokens = input.len(), "encoded classification input");

            let logits = self.model.run(&input)?;
            let accepted = decode_multilabel(&logits, &self.label_map, thresh)?;
            debug!(accepted = accepted.len(), thresh, "labels decoded");
            Ok(accepted)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::tests::test_tokenizer;
    use ndarray::{Array2, ArrayD};

    /// Devolve sempre os mesmos logits, independente da entrada.
    struct FixedLogits(Vec<f32>);

    impl Model for FixedLogits {
        fn forward(
            &mut self,
            input_ids: &Array2<i64>,
            _segment_ids: &Array2<i64>,
            input_mask: &Array2<i64>,
        ) -> Result<ArrayD<f32>> {
            assert_eq!(input_ids.shape(), input_mask.shape());
            assert!(input_mask.iter().all(|&m| m == 1));
            Ok(Array2::from_shape_vec((1, self.0.len()), self.0.clone())
                .map_err(|e| InferenceError::model(e.to_string()))?
                .into_dyn())
        }
    }

    fn logit(p: f32) -> f32 {
        (p / (1.0 - p)).ln()
    }

    fn service(probs: &[f32], options: ServiceOptions) -> MultiLabelingInferenceService {
        let labels = LabelMap::from_labels(["体育", "财经", "娱乐"]);
        let logits = probs.iter().map(|&p| logit(p)).collect();
        MultiLabelingInferenceService::from_parts(
            labels,
            Box::new(test_tokenizer()),
            Box::new(FixedLogits(logits)),
            options,
        )
        .unwrap()
    }

    #[test]
    fn test_inference_returns_labels_above_threshold() {
        let svc = service(&[0.9, 0.3, 0.6], ServiceOptions::default());
        assert_eq!(svc.inference("张三在北京", 0.5).unwrap(), vec!["体育", "娱乐"]);
    }

    #[test]
    fn test_threshold_argument_is_honoured() {
        let svc = service(&[0.9, 0.3, 0.6], ServiceOptions::default());
        assert_eq!(svc.inference("张三", 0.8).unwrap(), vec!["体育"]);
        assert_eq!(svc.inference("张三", 0.2).unwrap().len(), 3);
    }

    #[test]
    fn test_empty_result_is_valid() {
        let svc = service(&[0.1, 0.2, 0.3], ServiceOptions::default());
        assert!(svc.inference("张三", 0.5).unwrap().is_empty());
    }

    #[test]
    fn test_classify_uses_configured_threshold() {
        let options = ServiceOptions {
            threshold: 0.65,
            ..ServiceOptions::default()
        };
        let svc = service(&[0.9, 0.3, 0.6], options);
        assert_eq!(svc.classify("张三").unwrap(), vec!["体育"]);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let svc = service(&[0.9, 0.3, 0.6], ServiceOptions::default());
        assert!(matches!(
            svc.inference("张三", 2.0),
            Err(InferenceError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_too_long_text_is_an_error() {
        let options = ServiceOptions {
            max_seq_length: 4,
            ..ServiceOptions::default()
        };
        let svc = service(&[0.9, 0.3, 0.6], options);
        assert!(matches!(
            svc.inference("张三在北京", 0.5),
            Err(InferenceError::InputTooLong { len: 5, max: 4 })
        ));
    }

    #[test]
    fn test_scores_are_reported() {
        let svc = service(&[0.9, 0.3, 0.6], ServiceOptions::default());
        let scores = svc.inference_with_scores("张三", 0.5).unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[1].index, 2);
        assert!((scores[1].score - 0.6).abs() < 1e-5);
    }

    #[test]
    fn test_repeated_inference_is_identical() {
        let svc = service(&[0.9, 0.3, 0.6], ServiceOptions::default());
        let first = svc.inference_with_scores("张三在北京", 0.5).unwrap();
        let second = svc.inference_with_scores("张三在北京", 0.5).unwrap();
        assert_eq!(first, second);
    }
}
