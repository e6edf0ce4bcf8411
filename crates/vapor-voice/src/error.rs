use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("call room request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("call room provider returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}
