use protocol::ErrorKind;

/// Errors raised inside the backbone's own logic (storage, token rendezvous,
/// registry, config). Handlers fold these into a wire [`ErrorKind`] rather
/// than letting them propagate out of the event loop (spec §7).
#[derive(Debug, thiserror::Error)]
pub enum BackboneError {
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("account not found")]
    AccountNotFound,

    #[error("character not found")]
    CharacterNotFound,

    #[error("username already exists")]
    UsernameExists,

    #[error("email already exists")]
    EmailExists,

    #[error("character name already exists")]
    CharacterNameExists,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("bson serialization error: {0}")]
    BsonSerialization(#[from] bson::ser::Error),

    #[error("no game server claims this map")]
    NoRouteForMap,

    #[error("storage failure: {0}")]
    Storage(String),
}

impl BackboneError {
    /// Maps a storage/registry failure onto the wire error kind a handler
    /// replies with (spec §7: storage errors surface as `Failure`, never as
    /// a dropped connection).
    #[must_use]
    pub fn to_wire_kind(&self) -> ErrorKind {
        match self {
            BackboneError::AccountNotFound | BackboneError::CharacterNotFound => {
                ErrorKind::InvalidArgument
            }
            BackboneError::UsernameExists => ErrorKind::ExistsUsername,
            BackboneError::EmailExists => ErrorKind::ExistsEmail,
            BackboneError::CharacterNameExists => ErrorKind::ExistsCharName,
            BackboneError::NoRouteForMap => ErrorKind::Failure,
            _ => ErrorKind::Failure,
        }
    }
}

pub type Result<T> = std::result::Result<T, BackboneError>;
