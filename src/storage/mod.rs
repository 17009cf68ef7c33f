//! 持久化存储
//!
//! 测验记录与文档归档都走窄接口：
//! - `QuizStore`：读-改-写式的测验记录存储，支持按内容哈希去重查询
//! - `FileStorage`：完成后把源文档移交长期存储（机会性的，失败不致命）
//!
//! 自带基于文件系统的实现；接到对象存储 / 文档数据库时只需换实现

pub mod file_storage;
pub mod quiz_store;

pub use file_storage::{FileStorage, LocalArchiveStorage, StoredFile};
pub use quiz_store::{FileQuizStore, QuizStore};
