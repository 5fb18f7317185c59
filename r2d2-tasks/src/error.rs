use r2d2_physics::SimError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Sim(#[from] SimError),

    #[error("episode finished, call reset() before stepping again")]
    EpisodeFinished,

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Urdf(#[from] UrdfError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown task '{0}'")]
    UnknownTask(String),

    #[error("invalid range [{low}, {high}] for {name}")]
    InvalidRange { name: &'static str, low: f32, high: f32 },

    #[error("{name}: expected {expected} entries, found {found}")]
    Mismatch {
        name: &'static str,
        expected: usize,
        found: usize,
    },
}

#[derive(Error, Debug)]
pub enum UrdfError {
    #[error("malformed URDF: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("URDF has no link named '{0}'")]
    MissingLink(String),

    #[error("link '{link}' has no usable collision geometry")]
    MissingGeometry { link: String },

    #[error("bad attribute '{attribute}' on link '{link}': {value}")]
    BadAttribute {
        link: String,
        attribute: &'static str,
        value: String,
    },
}
