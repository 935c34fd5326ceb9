//! In-process dense fine-tuning model.
//!
//! The artifact is a JSON stack of dense layers. Layers up to and including
//! the fine-tune layer act as a frozen feature extractor; the final layer is
//! the head retrained by [`LocalModel::fine_tune`].

use std::path::{Path, PathBuf};

use model_session_core::{ModelConfig, traits::Sample};
use serde::{Deserialize, Serialize};
use tokio::{fs, io::AsyncWriteExt};

use super::ModelError;

/// Format tag written into every local snapshot.
const SNAPSHOT_FORMAT: &str = "dense-fine-tune/v1";

const LEARNING_RATE: f32 = 0.1;
const EPOCHS: usize = 50;

/// One fully connected layer; `weights` is `outputs x inputs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

impl DenseLayer {
    fn inputs(&self) -> usize {
        self.weights.first().map_or(0, Vec::len)
    }

    fn outputs(&self) -> usize {
        self.bias.len()
    }

    fn forward(&self, input: &[f32]) -> Vec<f32> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>() + b)
            .collect()
    }
}

/// A stack of dense layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseNetwork {
    pub layers: Vec<DenseLayer>,
}

impl DenseNetwork {
    fn validate(&self) -> Result<(), String> {
        if self.layers.is_empty() {
            return Err("network has no layers".to_string());
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.weights.len() != layer.outputs() || layer.outputs() == 0 {
                return Err(format!("layer {i} weight rows do not match bias length"));
            }
            if layer.weights.iter().any(|row| row.len() != layer.inputs()) {
                return Err(format!("layer {i} has ragged weight rows"));
            }
            if i > 0 && layer.inputs() != self.layers[i - 1].outputs() {
                return Err(format!("layer {i} input size does not match layer {}", i - 1));
            }
        }
        Ok(())
    }

    /// `(inputs, outputs)` of every layer.
    fn shape(&self) -> Vec<(usize, usize)> {
        self.layers.iter().map(|l| (l.inputs(), l.outputs())).collect()
    }

    fn input_size(&self) -> usize {
        self.layers.first().map_or(0, DenseLayer::inputs)
    }

    fn head(&self) -> &DenseLayer {
        &self.layers[self.layers.len() - 1]
    }

    /// Output of every layer but the head, ReLU applied.
    fn features(&self, input: &[f32]) -> Vec<f32> {
        let body = &self.layers[..self.layers.len() - 1];
        body.iter().fold(input.to_vec(), |acc, layer| {
            layer.forward(&acc).into_iter().map(|v| v.max(0.0)).collect()
        })
    }

    fn predict(&self, input: &[f32]) -> Vec<f32> {
        softmax(&self.head().forward(&self.features(input)))
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.into_iter().map(|v| v / sum).collect()
}

/// On-disk snapshot of a local model.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    format: String,
    base: DenseNetwork,
    network: DenseNetwork,
    device: u32,
    #[serde(default)]
    seed: Vec<Sample>,
}

/// Dense classifier executing in this process.
#[derive(Debug, Clone)]
pub struct LocalModel {
    base: DenseNetwork,
    network: DenseNetwork,
    device: u32,
    seed: Vec<Sample>,
}

impl LocalModel {
    /// Load the base artifact and optional seed data named by `config`.
    ///
    /// # Errors
    /// Returns error if the artifact or seed data cannot be read, or the
    /// fine-tune layer does not leave exactly one trainable head layer.
    pub async fn from_config(config: &ModelConfig) -> Result<Self, ModelError> {
        let base: DenseNetwork = read_json(&config.artifact_path).await?;
        base.validate()
            .map_err(|message| ModelError::decode(&config.artifact_path, message))?;
        check_fine_tune_layer(config.fine_tune_layer, base.layers.len())?;

        let seed = match &config.seed_data_path {
            Some(path) => read_json(path).await?,
            None => Vec::new(),
        };

        let mut model = Self {
            network: base.clone(),
            base,
            device: config.device,
            seed,
        };
        let seed = model.seed.clone();
        model.fine_tune(&seed)?;

        tracing::debug!(
            artifact = %config.artifact_path.display(),
            layers = model.base.layers.len(),
            seed_samples = model.seed.len(),
            "Loaded local model"
        );
        Ok(model)
    }

    /// Build directly from a network, for callers that already hold one.
    ///
    /// # Errors
    /// Returns error if the network is malformed.
    pub fn from_network(network: DenseNetwork, device: u32) -> Result<Self, ModelError> {
        network
            .validate()
            .map_err(|message| ModelError::decode("<memory>", message))?;
        Ok(Self {
            base: network.clone(),
            network,
            device,
            seed: Vec::new(),
        })
    }

    /// Target device id.
    #[must_use]
    pub const fn device(&self) -> u32 {
        self.device
    }

    /// Current weights.
    #[must_use]
    pub const fn network(&self) -> &DenseNetwork {
        &self.network
    }

    /// Class probabilities for each input.
    ///
    /// # Errors
    /// Returns error if an input has the wrong length.
    pub fn predict(&self, inputs: &[Vec<f32>]) -> Result<Vec<Vec<f32>>, ModelError> {
        inputs
            .iter()
            .map(|input| {
                self.check_input(input)?;
                Ok(self.network.predict(input))
            })
            .collect()
    }

    /// Retrain the head layer on `samples`.
    ///
    /// # Errors
    /// Returns error if a sample has the wrong length or an unknown label.
    pub fn fine_tune(&mut self, samples: &[Sample]) -> Result<(), ModelError> {
        let classes = self.network.head().outputs();
        for sample in samples {
            self.check_input(&sample.input)?;
            if sample.label >= classes {
                return Err(ModelError::LabelOutOfRange {
                    label: sample.label,
                    classes,
                });
            }
        }

        let prepared: Vec<(Vec<f32>, usize)> = samples
            .iter()
            .map(|s| (self.network.features(&s.input), s.label))
            .collect();

        let last = self.network.layers.len() - 1;
        let head = &mut self.network.layers[last];
        for _ in 0..EPOCHS {
            for (features, label) in &prepared {
                let probs = softmax(&head.forward(features));
                for (class, p) in probs.iter().enumerate() {
                    let grad = p - if class == *label { 1.0 } else { 0.0 };
                    for (w, x) in head.weights[class].iter_mut().zip(features) {
                        *w -= LEARNING_RATE * grad * x;
                    }
                    head.bias[class] -= LEARNING_RATE * grad;
                }
            }
        }
        Ok(())
    }

    /// Discard fine-tuning: restore the base weights and re-apply seed data.
    pub fn reset(&mut self) {
        self.network = self.base.clone();
        let seed = self.seed.clone();
        if let Err(e) = self.fine_tune(&seed) {
            tracing::warn!(error = %e, "Seed fine-tuning failed during reset");
        }
    }

    /// Write a snapshot to `path`; an existing file is never overwritten.
    ///
    /// # Errors
    /// Returns error if the file exists or cannot be written.
    pub async fn save(&self, path: &Path) -> Result<(), ModelError> {
        let snapshot = Snapshot {
            format: SNAPSHOT_FORMAT.to_string(),
            base: self.base.clone(),
            network: self.network.clone(),
            device: self.device,
            seed: self.seed.clone(),
        };
        let bytes = serde_json::to_vec(&snapshot).map_err(|e| ModelError::decode(path, e.to_string()))?;
        write_new(path, &bytes).await
    }

    /// Read a snapshot written by [`LocalModel::save`].
    ///
    /// # Errors
    /// Returns error if the file is missing, malformed or of another format.
    pub async fn restore(path: &Path) -> Result<Self, ModelError> {
        let value: serde_json::Value = read_json(path).await?;
        let found = value
            .get("format")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("<none>");
        if found != SNAPSHOT_FORMAT {
            return Err(ModelError::IncompatibleArtifact {
                path: path.to_path_buf(),
                found: found.to_string(),
            });
        }

        let snapshot: Snapshot =
            serde_json::from_value(value).map_err(|e| ModelError::decode(path, e.to_string()))?;
        snapshot
            .base
            .validate()
            .map_err(|message| ModelError::decode(path, format!("base: {message}")))?;
        snapshot
            .network
            .validate()
            .map_err(|message| ModelError::decode(path, message))?;
        if snapshot.base.shape() != snapshot.network.shape() {
            return Err(ModelError::decode(
                path,
                "base and fine-tuned networks differ in shape",
            ));
        }
        Ok(Self {
            base: snapshot.base,
            network: snapshot.network,
            device: snapshot.device,
            seed: snapshot.seed,
        })
    }

    fn check_input(&self, input: &[f32]) -> Result<(), ModelError> {
        let expected = self.network.input_size();
        if input.len() == expected {
            Ok(())
        } else {
            Err(ModelError::Shape {
                expected,
                found: input.len(),
            })
        }
    }
}

/// The head must be exactly the last layer, so the embedding is the one before it.
fn check_fine_tune_layer(layer: i32, layers: usize) -> Result<(), ModelError> {
    let count = i64::try_from(layers).unwrap_or(i64::MAX);
    let resolved = if layer < 0 { count + i64::from(layer) } else { i64::from(layer) };
    if resolved == count - 2 {
        Ok(())
    } else {
        Err(ModelError::UnsupportedFineTuneLayer { layer, layers })
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    let bytes = fs::read(path).await.map_err(|e| ModelError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| ModelError::decode(path, e.to_string()))
}

async fn write_new(path: &Path, bytes: &[u8]) -> Result<(), ModelError> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                ModelError::ArtifactExists(PathBuf::from(path))
            } else {
                ModelError::io(path, e)
            }
        })?;
    file.write_all(bytes).await.map_err(|e| ModelError::io(path, e))?;
    file.sync_all().await.map_err(|e| ModelError::io(path, e))?;
    Ok(())
}
