pub mod pipeline;
pub mod recognizer;
pub mod settings;
