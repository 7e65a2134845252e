#[derive(Debug, thiserror::Error)]
pub enum AbrError {
    #[error("level ladder is empty")]
    EmptyLadder,

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}
