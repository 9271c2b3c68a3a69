pub mod http_client;
pub mod identity;

pub use http_client::ReqwestTransport;
pub use identity::IdentityProfile;
