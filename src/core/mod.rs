pub mod did;
pub mod exchange;
pub mod proof_request;
pub mod util;
