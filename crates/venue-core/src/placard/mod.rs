//! Housing placard reading: scene text extraction and ownership verification.

pub mod ownership;
pub mod scene;

pub use ownership::{OwnershipReport, OwnershipVerifier, PlacardSnapshot};
pub use scene::{
    decode_encoded_text, NodeId, NodeKind, PanelHandle, PlacardAccessor, SceneGraph,
    SceneTextExtractor,
};
