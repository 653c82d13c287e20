use thiserror::Error;

#[derive(Debug, Error)]
pub enum GridError {
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("world {world_id} already has a grid")]
    AlreadyExists { world_id: String },

    #[error("invalid grid template: {0}")]
    InvalidTemplate(String),

    /// No cell exists at the resolved home coordinate after bulk insert.
    #[error("no cell at home coordinate ({x}, {y}) in a {width}x{height} grid")]
    TemplateMismatch {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    #[error("sqlite: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("encode cell tags: {0}")]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Open(#[from] anyhow::Error),
}

impl GridError {
    pub(crate) fn grid_not_found(world_id: &str) -> Self {
        Self::NotFound {
            what: "grid for world",
            id: world_id.to_string(),
        }
    }

    pub(crate) fn cell_not_found(cell_id: &str) -> Self {
        Self::NotFound {
            what: "cell",
            id: cell_id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
