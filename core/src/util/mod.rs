pub mod keypair;
pub mod logger;
pub mod macros;
pub mod retry;
pub mod ring;

pub use keypair::read_keypair_from_env;
pub use logger::init_logger;
pub use ring::BoundedHistory;
