//! External collaborators: the social network, web search, SMTP email,
//! the image-generation sidecar, and backups. Each is a thin HTTP/IO
//! client over the stack's shared store, implementing the seams the action
//! pipeline and the scheduler dispatch through.

pub mod backup;
pub mod email;
pub mod imagegen;
pub mod moltbook;
pub mod search;

pub use backup::BackupManager;
pub use email::EmailService;
pub use imagegen::ImageGenService;
pub use moltbook::MoltbookService;
pub use search::WebSearchService;
