pub mod chat;
pub mod documents;
pub mod summarizer;
pub mod viewer;
