use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content load error: {0}")]
    Load(String),

    #[error("area '{area}': {reason}")]
    InvalidArea { area: String, reason: String },

    #[error("area '{area}' spawns unknown monster '{monster}'")]
    UnknownMonster { area: String, monster: String },

    #[error("required area '{0}' is missing")]
    MissingArea(String),
}
