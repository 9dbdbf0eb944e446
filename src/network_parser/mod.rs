pub mod transport;

#[cfg(test)]
pub(crate) mod fixture;

pub use transport::{
    BodyKind, FetchRequest, FetchResponse, ReqwestTransport, Transport, TransportConfig,
    TransportError,
};
