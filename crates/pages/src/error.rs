use {ims_client::ClientError, ims_protocol::EntityKind};

use crate::access::{AccessDenied, Permission};

#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("{0}")]
    AccessDenied(#[from] AccessDenied),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("this {0} has not been saved yet")]
    Unsaved(EntityKind),

    #[error("cannot encode {kind}: {source}")]
    Encode {
        kind: EntityKind,
        #[source]
        source: serde_json::Error,
    },
}

impl PageError {
    /// Turn a server-side 403 into the same message an early refusal shows.
    pub(crate) fn from_client(err: ClientError, permission: Permission, event_id: &str) -> Self {
        match err {
            ClientError::Forbidden { .. } => Self::AccessDenied(AccessDenied {
                permission,
                event_id: event_id.to_string(),
            }),
            other => Self::Client(other),
        }
    }
}
