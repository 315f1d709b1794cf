use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{label} {} does not exist", .path.display())]
    MissingArtifact { label: &'static str, path: PathBuf },

    #[error("could not find a free TCP port in {start}..{end}")]
    PortExhausted { start: u16, end: u16 },

    #[error("copy {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LaunchError>;
