use thiserror::Error;

/// Errors raised while building, classifying and lighting a bake.
#[derive(Error, Debug)]
pub enum BakeError {
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("frame {0} was not assigned an atlas placement")]
    UnplacedFrame(usize),

    #[error("renderer failure: {0}")]
    Render(String),

    #[error("invalid scene: {0}")]
    InvalidScene(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("OBJ load error: {0}")]
    Obj(#[from] tobj::LoadError),
}

pub type Result<T> = std::result::Result<T, BakeError>;
