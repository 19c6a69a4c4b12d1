pub use crate::crypto::{Secret, SecretError, SECRET_SIZE};
pub use crate::mime::{content_type_for_name, is_text_family, preview_content_type};
pub use crate::path::{PathError, VirtualPath};
