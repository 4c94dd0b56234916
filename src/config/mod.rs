use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub navigation: NavigationConfig,
    pub context: ContextConfig,
    pub maintenance: MaintenanceConfig,
    pub audit: AuditConfig,
}

/// Inference-backend API configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Navigation walk limits
#[derive(Debug, Clone)]
pub struct NavigationConfig {
    /// Maximum GOTO depth before the walk terminates as a soft stay.
    pub max_depth: u32,
    /// Maximum independent terminal nodes selectable per turn.
    pub max_terminal_nodes: usize,
}

/// Context assembly limits
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Meta-cognitive memories always included when present (at most N).
    pub max_meta_memories: usize,
    /// Sliding window of most recent working-memory turns.
    pub history_window: usize,
}

/// Maintenance pipeline configuration
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// Re-attempts of the organize stage after a failed verify.
    pub max_retries: u32,
    /// Working-memory count that triggers an integration task.
    pub working_memory_limit: u64,
    /// Navigation-failure count that triggers a graph-repair task.
    pub navigation_failure_limit: u64,
    /// Idle sweep interval in seconds (0 disables the periodic sweep).
    pub idle_sweep_secs: u64,
    /// Working memories fed to the discover stage.
    pub discover_sample_size: usize,
}

/// Audit log configuration
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub dir: PathBuf,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let backend = BackendConfig {
            api_key: env::var("BACKEND_API_KEY").map_err(|_| AppError::Config {
                message: "BACKEND_API_KEY is required".to_string(),
            })?,
            base_url: env::var("BACKEND_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            model: env::var("BACKEND_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/mindgraph.db".to_string()),
            ),
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let request = RequestConfig {
            timeout_ms: env_parse("REQUEST_TIMEOUT_MS", 30000),
            max_retries: env_parse("MAX_RETRIES", 3),
            retry_delay_ms: env_parse("RETRY_DELAY_MS", 1000),
        };

        let navigation = NavigationConfig {
            max_depth: env_parse("NAV_MAX_DEPTH", 6),
            max_terminal_nodes: env_parse("NAV_MAX_TERMINALS", 3),
        };

        let context = ContextConfig {
            max_meta_memories: env_parse("CONTEXT_MAX_META", 5),
            history_window: env_parse("CONTEXT_HISTORY_WINDOW", 8),
        };

        let maintenance = MaintenanceConfig {
            max_retries: env_parse("MAINTENANCE_MAX_RETRIES", 2),
            working_memory_limit: env_parse("WORKING_MEMORY_LIMIT", 20),
            navigation_failure_limit: env_parse("NAV_FAILURE_LIMIT", 10),
            idle_sweep_secs: env_parse("IDLE_SWEEP_SECS", 900),
            discover_sample_size: env_parse("DISCOVER_SAMPLE_SIZE", 10),
        };

        let audit = AuditConfig {
            dir: PathBuf::from(env::var("AUDIT_DIR").unwrap_or_else(|_| "./data/audit".to_string())),
        };

        Ok(Config {
            backend,
            database,
            logging,
            request,
            navigation,
            context,
            maintenance,
            audit,
        })
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            max_depth: 6,
            max_terminal_nodes: 3,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_meta_memories: 5,
            history_window: 8,
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            working_memory_limit: 20,
            navigation_failure_limit: 10,
            idle_sweep_secs: 900,
            discover_sample_size: 10,
        }
    }
}
