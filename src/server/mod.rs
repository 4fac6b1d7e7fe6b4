//! HTTPS front end

pub mod http;
pub mod state;
pub mod tls;

pub use http::{route_request, run};
pub use state::AppState;
pub use tls::load_tls_acceptor;
