pub mod stub;

pub use stub::ScriptedDetector;
