//! Model file resolution: local directories and HuggingFace Hub downloads.
//!
//! Remote downloads need the `hub` feature; local model directories work
//! without it.
//!
//! # Example
//!
//! ```rust,ignore
//! use hubert_frontend::hub::ModelPaths;
//!
//! // Hub model id, downloaded into the HuggingFace cache
//! let paths = ModelPaths::resolve("TencentGameMate/chinese-hubert-base")?;
//!
//! // Or a directory holding config.json + model.safetensors
//! let paths = ModelPaths::resolve("./checkpoints/chinese-hubert-base")?;
//! let (config, preprocessor) = paths.load_configs()?;
//! ```

use std::path::{Path, PathBuf};

use crate::models::{HubertConfig, PreprocessorConfig};
use crate::{Error, Result};

const CONFIG_FILE: &str = "config.json";
const PREPROCESSOR_FILE: &str = "preprocessor_config.json";
const WEIGHT_FILES: [&str; 2] = ["model.safetensors", "pytorch_model.bin"];

/// Paths to a model's files.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    /// Path to config.json
    pub config: PathBuf,
    /// Path to preprocessor_config.json, when the model ships one
    pub preprocessor_config: Option<PathBuf>,
    /// Path to the weights; `None` when only the configs were resolved
    pub weights: Option<PathBuf>,
}

impl ModelPaths {
    /// Resolve configs and weights for `model_id`, a local directory or a
    /// Hub model id.
    pub fn resolve(model_id: &str) -> Result<Self> {
        Self::resolve_inner(model_id, true)
    }

    /// Resolve only the configs, for models whose weights come from
    /// elsewhere.
    pub fn resolve_configs(model_id: &str) -> Result<Self> {
        Self::resolve_inner(model_id, false)
    }

    fn resolve_inner(model_id: &str, with_weights: bool) -> Result<Self> {
        let dir = Path::new(model_id);
        if dir.is_dir() {
            return Self::from_dir(dir, with_weights);
        }
        Self::download(model_id, with_weights)
    }

    /// Files inside a local model directory.
    pub fn from_dir(dir: &Path, with_weights: bool) -> Result<Self> {
        let config = dir.join(CONFIG_FILE);
        if !config.is_file() {
            return Err(Error::Config(format!(
                "{} has no {CONFIG_FILE}",
                dir.display()
            )));
        }

        let preprocessor_config = Some(dir.join(PREPROCESSOR_FILE)).filter(|p| p.is_file());

        let weights = if with_weights {
            let found = WEIGHT_FILES
                .iter()
                .map(|name| dir.join(name))
                .find(|p| p.is_file());
            match found {
                Some(path) => Some(path),
                None => {
                    return Err(Error::WeightLoad(format!(
                        "{} has neither {} nor {}",
                        dir.display(),
                        WEIGHT_FILES[0],
                        WEIGHT_FILES[1]
                    )))
                }
            }
        } else {
            None
        };

        Ok(Self {
            config,
            preprocessor_config,
            weights,
        })
    }

    #[cfg(feature = "hub")]
    fn download(model_id: &str, with_weights: bool) -> Result<Self> {
        use hf_hub::api::sync::Api;

        let api = Api::new()?;
        let repo = api.model(model_id.to_string());

        tracing::info!("Resolving {} from HuggingFace Hub", model_id);
        let config = repo.get(CONFIG_FILE)?;

        let preprocessor_config = match repo.get(PREPROCESSOR_FILE) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(
                    "{} has no {}, using defaults: {}",
                    model_id,
                    PREPROCESSOR_FILE,
                    e
                );
                None
            }
        };

        let weights = if with_weights {
            let weights = match repo.get(WEIGHT_FILES[0]) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(
                        "{} not available for {} ({}), falling back to {}",
                        WEIGHT_FILES[0],
                        model_id,
                        e,
                        WEIGHT_FILES[1]
                    );
                    repo.get(WEIGHT_FILES[1])?
                }
            };
            Some(weights)
        } else {
            None
        };

        Ok(Self {
            config,
            preprocessor_config,
            weights,
        })
    }

    #[cfg(not(feature = "hub"))]
    fn download(model_id: &str, _with_weights: bool) -> Result<Self> {
        Err(Error::Hub(format!(
            "{model_id} is not a local directory and hub support is not compiled in. \
             Rebuild with: cargo build --features hub"
        )))
    }

    /// Weight file, or [`Error::WeightLoad`] when it was not resolved.
    pub fn weights_path(&self) -> Result<&Path> {
        self.weights.as_deref().ok_or_else(|| {
            Error::WeightLoad(format!(
                "no weights resolved next to {}",
                self.config.display()
            ))
        })
    }

    /// Parse config.json and preprocessor_config.json (defaults when absent).
    pub fn load_configs(&self) -> Result<(HubertConfig, PreprocessorConfig)> {
        let config = HubertConfig::from_file(&self.config)?;
        let preprocessor = match &self.preprocessor_config {
            Some(path) => PreprocessorConfig::from_file(path)?,
            None => PreprocessorConfig::default(),
        };
        Ok((config, preprocessor))
    }
}

/// Download a released checkpoint once into the HuggingFace cache directory
/// and return its local path.
#[cfg(feature = "hub")]
pub fn download_release_checkpoint(url: &str) -> Result<PathBuf> {
    let file_name = url
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::Hub(format!("cannot derive a file name from {url}")))?;

    let cache_dir = hf_hub::Cache::from_env().path().join("releases");
    let target = cache_dir.join(file_name);
    if target.is_file() {
        tracing::debug!("Using cached checkpoint {}", target.display());
        return Ok(target);
    }

    std::fs::create_dir_all(&cache_dir)?;
    tracing::info!("Downloading {}", url);

    let response = ureq::get(url)
        .call()
        .map_err(|e| Error::Hub(format!("failed to download {url}: {e}")))?;

    save_streamed(&mut response.into_reader(), &target)?;

    tracing::info!("Saved checkpoint to {}", target.display());
    Ok(target)
}

/// Stream `reader` into `<target>.part`, then rename it onto `target`.
/// A failed transfer leaves nothing behind.
#[cfg_attr(not(feature = "hub"), allow(dead_code))]
fn save_streamed(reader: &mut impl std::io::Read, target: &Path) -> Result<()> {
    use std::io::Write;

    let mut partial = target.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    let written = std::fs::File::create(&partial).and_then(|mut file| {
        std::io::copy(reader, &mut file)?;
        file.flush()
    });
    if let Err(e) = written {
        let _ = std::fs::remove_file(&partial);
        return Err(e.into());
    }
    std::fs::rename(&partial, target)?;
    Ok(())
}

#[cfg(not(feature = "hub"))]
pub fn download_release_checkpoint(url: &str) -> Result<PathBuf> {
    Err(Error::Hub(format!(
        "cannot download {url}: hub support is not compiled in"
    )))
}
