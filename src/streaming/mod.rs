// Observer-driven region streaming
// Keeps a square window of regions anchored around a moving target

pub mod window;

pub use window::{SharedTarget, StreamTarget, StreamingWindow, WindowRect};
