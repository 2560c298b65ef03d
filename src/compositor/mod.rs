//! Frame compositing
//!
//! Per-frame drawing onto an off-screen surface. Two variants exist:
//! - `FaceWindowCompositor`: blur everything except a circle in the middle
//! - `MaskCompositor`: blur the background using a segmentation mask

pub mod blur;
pub mod face_window;
pub mod mask_blend;
pub mod surface;

pub use blur::BlurQuality;
pub use face_window::FaceWindowCompositor;
pub use mask_blend::MaskCompositor;
pub use surface::{CircleClip, CompositeOp, DrawingSurface, Filter};
