use log::warn;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_MODEL_PATH: &str = "models/model.json";
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Configuration du serveur, lue dans l'environnement au démarrage.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub model_path: String,
    pub workers: usize,
    pub max_payload_bytes: usize,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: parse_or("PORT", lookup("PORT"), DEFAULT_PORT),
            model_path: lookup("MODEL_PATH").unwrap_or_else(|| DEFAULT_MODEL_PATH.to_string()),
            workers: parse_or("WORKERS", lookup("WORKERS"), num_cpus::get()),
            max_payload_bytes: parse_or(
                "MAX_PAYLOAD_BYTES",
                lookup("MAX_PAYLOAD_BYTES"),
                DEFAULT_MAX_PAYLOAD_BYTES,
            ),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} invalide ({:?}), valeur par défaut utilisée", key, raw);
            default
        }),
    }
}
