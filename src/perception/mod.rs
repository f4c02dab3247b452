pub mod pipeline;
pub mod resolver;
pub mod stability;
pub mod traits;
pub mod types;
pub mod vlm_detector;
pub mod yolo_detector;

pub use pipeline::PerceptionPipeline;
pub use resolver::ElementResolver;
pub use traits::{PerceptionProvider, ScreenSource};
pub use types::{BoundingBox, Detection, Point, ScreenCapture};
