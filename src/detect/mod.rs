mod backend;
mod backends;
mod result;

pub use backend::ObjectDetector;
pub use backends::ScriptedDetector;
pub use result::{Detection, RawDetection, RejectReason};
