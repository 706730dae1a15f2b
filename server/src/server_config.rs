use config::Config;
use lazy_static::lazy_static;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrimaryModelConfig {
    pub endpoint: String,
    pub model_id: String,
}

impl Default for PrimaryModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/v1/chat/completions".to_string(),
            model_id: "qwen2.5:14b-instruct".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FallbackModelConfig {
    pub endpoint: String,
    pub model_id: String,
    pub api_key: String,
}

impl Default for FallbackModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.mistral.ai/v1/chat/completions".to_string(),
            model_id: "mistral-small-latest".to_string(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub primary: PrimaryModelConfig,
    pub fallback: FallbackModelConfig,
    pub timeout_ms: u64,
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            primary: PrimaryModelConfig::default(),
            fallback: FallbackModelConfig::default(),
            timeout_ms: 30_000,
            temperature: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LayerWeights {
    pub rule: f32,
    pub history: f32,
    pub model: f32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WeightsConfig {
    pub bootstrap: LayerWeights,
    pub steady: LayerWeights,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            bootstrap: LayerWeights {
                rule: 0.30,
                history: 0.10,
                model: 0.60,
            },
            steady: LayerWeights {
                rule: 0.20,
                history: 0.30,
                model: 0.50,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub high_confidence_threshold: f32,
    pub medium_confidence_threshold: f32,
    pub weights: WeightsConfig,
    pub smart_llm_skip: bool,
    /// An account is in its bootstrap phase until this many of its messages
    /// have been classified.
    pub bootstrap_classification_count: u64,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            high_confidence_threshold: 0.90,
            medium_confidence_threshold: 0.65,
            weights: WeightsConfig::default(),
            smart_llm_skip: false,
            bootstrap_classification_count: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub learning_rate_alpha: f32,
    pub sender_min_emails: i32,
    pub domain_min_emails: i32,
    pub sender_confidence_base: f32,
    pub domain_confidence_base: f32,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            learning_rate_alpha: 0.15,
            sender_min_emails: 5,
            domain_min_emails: 10,
            sender_confidence_base: 0.85,
            domain_confidence_base: 0.75,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub default_batch_size: usize,
    pub max_concurrent_batches: usize,
    /// A scan fails after this many consecutive batches hit transport errors.
    pub failed_batch_threshold: i32,
    pub eta_window_batches: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            default_batch_size: 50,
            max_concurrent_batches: 1,
            failed_batch_threshold: 5,
            eta_window_batches: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptLimits {
    pub rate_limit_per_sec: usize,
    pub refill_interval_ms: usize,
    pub refill_amount: usize,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self {
            rate_limit_per_sec: 4,
            refill_interval_ms: 250,
            refill_amount: 1,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub prompt_limits: PromptLimits,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailGatewayConfig {
    pub gateway_url: String,
    pub timeout_ms: u64,
}

impl Default for MailGatewayConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://localhost:5007".to_string(),
            timeout_ms: 15_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Overrides DATABASE_URL when set.
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub model: ModelConfig,
    pub classification: ClassificationConfig,
    pub history: HistoryConfig,
    pub scan: ScanConfig,
    pub api: ApiConfig,
    pub mail: MailGatewayConfig,
    pub store: StoreConfig,
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "model.primary: {} ({}), model.fallback: {} ({}), thresholds: {}/{}, smart_llm_skip: {}, alpha: {}, batch_size: {}",
            self.model.primary.endpoint,
            self.model.primary.model_id,
            self.model.fallback.endpoint,
            self.model.fallback.model_id,
            self.classification.high_confidence_threshold,
            self.classification.medium_confidence_threshold,
            self.classification.smart_llm_skip,
            self.history.learning_rate_alpha,
            self.scan.default_batch_size,
        )
    }
}

fn load_config() -> ServerConfig {
    Config::builder()
        .add_source(config::File::with_name("config").required(false))
        .add_source(config::Environment::with_prefix("MAILSIFT").separator("__"))
        .build()
        .expect("Failed to build configuration")
        .try_deserialize()
        .expect("config.toml is invalid")
}

lazy_static! {
    pub static ref cfg: ServerConfig = load_config();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServerConfig::default();

        assert_eq!(config.classification.high_confidence_threshold, 0.90);
        assert_eq!(config.classification.medium_confidence_threshold, 0.65);
        assert_eq!(config.classification.weights.bootstrap.rule, 0.30);
        assert_eq!(config.classification.weights.bootstrap.history, 0.10);
        assert_eq!(config.classification.weights.bootstrap.model, 0.60);
        assert_eq!(config.classification.weights.steady.rule, 0.20);
        assert_eq!(config.classification.weights.steady.history, 0.30);
        assert_eq!(config.classification.weights.steady.model, 0.50);
        assert!(!config.classification.smart_llm_skip);
        assert_eq!(config.history.learning_rate_alpha, 0.15);
        assert_eq!(config.history.sender_min_emails, 5);
        assert_eq!(config.history.domain_min_emails, 10);
        assert_eq!(config.scan.default_batch_size, 50);
        assert_eq!(config.scan.max_concurrent_batches, 1);
    }

    #[test]
    fn weights_sum_to_one() {
        let weights = WeightsConfig::default();
        for w in [weights.bootstrap, weights.steady] {
            let sum = w.rule + w.history + w.model;
            assert!((sum - 1.0).abs() < 1e-6);
        }
    }
}
