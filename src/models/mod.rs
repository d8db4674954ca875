pub mod entity;
pub mod feedback;
pub mod folder;
pub mod follow;
pub mod paper;
pub mod user;

pub use entity::EntityHit;
pub use feedback::{FeedbackAction, FeedbackRecord, FeedbackSummary};
pub use folder::{Folder, LIKES_FOLDER_ID};
pub use follow::{EntityType, Follow};
pub use paper::{Paper, PaperAuthor};
pub use user::{Profile, User};
