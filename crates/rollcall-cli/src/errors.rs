pub use rollcall_face_core::errors::{AppError, AppResult};
