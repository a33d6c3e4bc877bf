mod sse;

pub use sse::Sse;
