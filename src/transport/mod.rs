pub mod apim;

pub use apim::{ApimClient, UpstreamResponse};
