mod secret;

pub use secret::{Secret, SecretError, NONCE_SIZE, SECRET_SIZE};
