use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub data: DataConfig,
    pub artifacts: ArtifactConfig,
    pub training: TrainingConfig,
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port).parse()?;
        Ok(addr)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub books_path: PathBuf,
    pub ratings_path: PathBuf,
    /// Single ASCII byte separating fields in both CSV files.
    pub delimiter: char,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// A user is kept when their rating count is strictly greater than this.
    pub min_user_ratings: usize,
    /// An item is kept when its rating count among kept users is at least this.
    pub min_item_ratings: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub placeholder_image_url: String,
    pub default_limit: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_user_ratings: 200,
            min_item_ratings: 50,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5002,
                workers: num_cpus::get(),
            },
            data: DataConfig {
                books_path: PathBuf::from("data/Books.csv"),
                ratings_path: PathBuf::from("data/Ratings.csv"),
                delimiter: ',',
            },
            artifacts: ArtifactConfig {
                dir: PathBuf::from("models"),
            },
            training: TrainingConfig::default(),
            catalog: CatalogConfig {
                placeholder_image_url: "https://via.placeholder.com/150".to_string(),
                default_limit: 20,
            },
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let defaults = config::Config::try_from(&Config::default())?;
        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("BOOKREC")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Loads `path` when it exists, otherwise falls back to the defaults.
    pub fn load_or_default(path: &str) -> anyhow::Result<Self> {
        if std::path::Path::new(path).exists() {
            Self::from_file(path)
        } else {
            tracing::info!("Config file {} not found, using default configuration", path);
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let config = Config::default();
        assert_eq!(config.training.min_user_ratings, 200);
        assert_eq!(config.training.min_item_ratings, 50);
        assert_eq!(config.catalog.default_limit, 20);
    }

    #[test]
    fn test_socket_addr() {
        let config = Config::default();
        let addr = config.server.socket_addr().unwrap();
        assert_eq!(addr.port(), 5002);
    }

    #[test]
    fn test_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bookrec.toml");
        std::fs::write(
            &path,
            "[training]\nmin_user_ratings = 3\nmin_item_ratings = 2\n",
        )
        .unwrap();

        let config = Config::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.training.min_user_ratings, 3);
        assert_eq!(config.training.min_item_ratings, 2);
        assert_eq!(config.server.port, 5002);
    }
}
